// hybrid_sim/src/error.rs

use hybrid_core::error::{FactorError, SmootherError};
use thiserror::Error;

/// A dataset line that could not be understood.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("line {line}: {reason}")]
pub struct DatasetError {
    /// 1-based line number in the input.
    pub line: usize,
    pub reason: String,
}

impl DatasetError {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed dataset, {0}")]
    Dataset(#[from] DatasetError),
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("could not serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Smoother(#[from] SmootherError),
    #[error(transparent)]
    Factor(#[from] FactorError),
}

impl From<figment::Error> for SimError {
    fn from(e: figment::Error) -> Self {
        Self::Config(Box::new(e))
    }
}
