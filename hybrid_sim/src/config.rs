// hybrid_sim/src/config.rs

use crate::error::SimError;
use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use hybrid_core::linear::DiagonalNoise;
use hybrid_core::smoother::SmootherParams;
use serde::{Deserialize, Serialize};
use std::path::Path;

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

/// # ExperimentConfig
/// Everything a dataset run needs besides the dataset itself. Parsed from an
/// optional TOML file layered over the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct ExperimentConfig {
    /// Dataset lines to process before the final update.
    pub max_loop_count: usize,
    /// Hybrid factors collected between smoother updates.
    pub update_frequency: usize,
    /// Discrete hypotheses kept by each update.
    pub max_nr_hypotheses: usize,
    /// Updates between intermediate pose estimates.
    pub relinearization_frequency: usize,
    pub smoother: SmootherParams,
    pub noise: NoiseConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            max_loop_count: 3000,
            update_frequency: 3,
            max_nr_hypotheses: 10,
            relinearization_frequency: 1,
            smoother: SmootherParams::default(),
            noise: NoiseConfig::default(),
        }
    }
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

/// Standard deviations of the measurement models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoiseConfig {
    /// Anchor on the first pose `[x, y, θ]`.
    pub prior_sigmas: [f64; 3],
    /// Odometry and accepted loop closures `[x, y, θ]`.
    pub pose_sigmas: [f64; 3],
    /// Isotropic sigma of the "loop closure is wrong" model.
    pub open_loop_sigma: f64,
    /// Isotropic sigma of planar GPS fixes.
    pub gps_sigma: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            prior_sigmas: [1e-4; 3],
            pose_sigmas: [1.0 / 30.0, 1.0 / 30.0, 1.0 / 100.0],
            open_loop_sigma: 10.0,
            gps_sigma: 1.0,
        }
    }
}

impl NoiseConfig {
    pub fn prior(&self) -> DiagonalNoise {
        DiagonalNoise::from_sigmas(self.prior_sigmas.to_vec())
    }

    pub fn pose(&self) -> DiagonalNoise {
        DiagonalNoise::from_sigmas(self.pose_sigmas.to_vec())
    }

    pub fn open_loop(&self) -> DiagonalNoise {
        DiagonalNoise::isotropic(3, self.open_loop_sigma)
    }

    pub fn gps(&self) -> DiagonalNoise {
        DiagonalNoise::isotropic(2, self.gps_sigma)
    }
}

// =========================================================================
// == Loading ==
// =========================================================================

impl ExperimentConfig {
    /// Defaults, overridden by `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, SimError> {
        let mut figment = Self::defaults();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        Self::extract(figment)
    }

    /// Defaults, overridden by a TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self, SimError> {
        Self::extract(Self::defaults().merge(Toml::string(toml)))
    }

    pub fn to_toml_string(&self) -> Result<String, SimError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Rejects settings the experiment loop cannot run with.
    pub fn validate(&self) -> Result<(), SimError> {
        let positive = [
            ("update_frequency", self.update_frequency),
            ("max_nr_hypotheses", self.max_nr_hypotheses),
            ("relinearization_frequency", self.relinearization_frequency),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(SimError::InvalidConfig(format!("{name} must be at least 1")));
        }
        let sigmas = self
            .noise
            .prior_sigmas
            .iter()
            .chain(&self.noise.pose_sigmas)
            .chain([&self.noise.open_loop_sigma, &self.noise.gps_sigma]);
        for sigma in sigmas {
            if !(sigma.is_finite() && *sigma > 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "noise sigmas must be positive and finite, got {sigma}"
                )));
            }
        }
        self.smoother
            .validate()
            .map_err(|e| SimError::InvalidConfig(e.to_string()))
    }

    fn defaults() -> Figment {
        Figment::from(Serialized::defaults(ExperimentConfig::default()))
    }

    fn extract(figment: Figment) -> Result<Self, SimError> {
        let config: ExperimentConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrid_core::smoother::FrontierStrategy;

    #[test]
    fn defaults_follow_the_reference_experiment() {
        let config = ExperimentConfig::load(None).unwrap();
        assert_eq!(config.max_loop_count, 3000);
        assert_eq!(config.update_frequency, 3);
        assert_eq!(config.max_nr_hypotheses, 10);
        assert_eq!(config.relinearization_frequency, 1);
        assert_eq!(config.smoother.marginal_threshold, Some(0.99));
    }

    #[test]
    fn toml_overrides_only_what_it_names() {
        let config = ExperimentConfig::from_toml_str(
            r#"
            update_frequency = 5

            [smoother]
            frontier = "new_factor_keys"

            [noise]
            gps_sigma = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.update_frequency, 5);
        assert_eq!(config.max_nr_hypotheses, 10);
        assert_eq!(config.smoother.frontier, FrontierStrategy::NewFactorKeys);
        assert_eq!(config.smoother.marginal_threshold, Some(0.99));
        assert_eq!(config.noise.gps_sigma, 0.5);
        assert_eq!(config.noise.open_loop_sigma, 10.0);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            ExperimentConfig::from_toml_str("max_hypotheses = 4"),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn zero_update_frequency_is_invalid() {
        assert!(matches!(
            ExperimentConfig::from_toml_str("update_frequency = 0"),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn marginal_threshold_must_exceed_one_half() {
        for bad in ["0.5", "0.3", "1.2"] {
            let toml = format!("[smoother]\nmarginal_threshold = {bad}");
            assert!(matches!(
                ExperimentConfig::from_toml_str(&toml),
                Err(SimError::InvalidConfig(_))
            ));
        }
        let config = ExperimentConfig::from_toml_str("[smoother]\nmarginal_threshold = 0.51").unwrap();
        assert_eq!(config.smoother.marginal_threshold, Some(0.51));
    }

    #[test]
    fn printed_config_loads_back() {
        let config = ExperimentConfig::default();
        let printed = config.to_toml_string().unwrap();
        assert_eq!(ExperimentConfig::from_toml_str(&printed).unwrap(), config);
    }
}
