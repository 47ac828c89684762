// hybrid_core/src/nonlinear/values.rs

use super::pose2::Pose2;
use crate::error::FactorError;
use crate::types::{Key, VectorValues};
use nalgebra::Vector3;
use std::collections::BTreeMap;

/// Linearization point: one pose per continuous key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    poses: BTreeMap<Key, Pose2>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the pose of `key`.
    pub fn insert(&mut self, key: Key, pose: Pose2) {
        self.poses.insert(key, pose);
    }

    pub fn at(&self, key: Key) -> Result<&Pose2, FactorError> {
        self.poses.get(&key).ok_or(FactorError::MissingValue(key))
    }

    pub fn contains(&self, key: Key) -> bool {
        self.poses.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Pose2)> {
        self.poses.iter()
    }

    /// Applies `delta` to every pose it mentions; others are copied as is.
    pub fn retract(&self, delta: &VectorValues) -> Values {
        let poses = self
            .poses
            .iter()
            .map(|(key, pose)| {
                let moved = match delta.get(key) {
                    Some(d) if d.len() == 3 => pose.retract(&Vector3::new(d[0], d[1], d[2])),
                    _ => *pose,
                };
                (*key, moved)
            })
            .collect();
        Values { poses }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::x;
    use nalgebra::DVector;

    #[test]
    fn retract_only_touches_keys_in_delta() {
        let mut values = Values::new();
        values.insert(x(0), Pose2::new(1.0, 1.0, 0.0));
        values.insert(x(1), Pose2::new(2.0, 2.0, 0.0));
        let mut delta = VectorValues::new();
        delta.insert(x(1), DVector::from_vec(vec![0.5, 0.0, 0.0]));

        let moved = values.retract(&delta);
        assert_eq!(moved.at(x(0)).unwrap(), values.at(x(0)).unwrap());
        assert_eq!(moved.at(x(1)).unwrap().x, 2.5);
    }

    #[test]
    fn missing_key_is_reported() {
        assert_eq!(Values::new().at(x(3)).unwrap_err(), FactorError::MissingValue(x(3)));
    }
}
