//! Rigid-body transforms between sensor and world frames.
//!
//! A [`Transformation`] is a unit-quaternion rotation plus a translation.  To
//! map a point expressed in the child frame (e.g. the sensor) into the parent
//! frame (e.g. the world), rotate it by `rotation` then add `translation`.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::{Point3, UnitQuaternion, Vector3};
//! use volmap_perception::transform::Transformation;
//!
//! // Sensor 1 m above the world origin, yawed 90° to the left.
//! let sensor_to_world = Transformation::new(
//!     Vector3::new(0.0, 0.0, 1.0),
//!     UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
//! );
//!
//! let p = sensor_to_world.transform_point(&Point3::new(1.0, 0.0, 0.0));
//! assert!(p.x.abs() < 1e-9);
//! assert!((p.y - 1.0).abs() < 1e-9);
//! assert!((p.z - 1.0).abs() < 1e-9);
//! ```

use nalgebra::{Matrix3, Point3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use volmap_types::MapError;

/// Maximum deviation from orthonormality accepted for a raw rotation matrix.
const ORTHONORMAL_TOLERANCE: f64 = 1e-6;

/// A rigid-body 3-D transform: rotation followed by translation.
///
/// Rotation is held as a [`UnitQuaternion`], so every value of this type is a
/// proper rotation; [`compose`][Self::compose] and [`inverse`][Self::inverse]
/// keep it that way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Transformation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transformation {
    /// Create a transform from a translation and rotation.
    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    /// A pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(translation, UnitQuaternion::identity())
    }

    /// Build a transform from a raw 3x3 rotation matrix.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidTransform`] when `rotation` is not
    /// orthonormal with determinant +1, or contains non-finite entries.
    pub fn from_rotation_matrix(
        translation: Vector3<f64>,
        rotation: &Matrix3<f64>,
    ) -> Result<Self, MapError> {
        if rotation.iter().any(|v| !v.is_finite()) || translation.iter().any(|v| !v.is_finite()) {
            return Err(MapError::InvalidTransform(
                "transform contains non-finite entries".to_string(),
            ));
        }
        let residual = (rotation.transpose() * rotation - Matrix3::identity()).abs().max();
        if residual > ORTHONORMAL_TOLERANCE {
            return Err(MapError::InvalidTransform(format!(
                "rotation is not orthonormal (residual {residual:e})"
            )));
        }
        if rotation.determinant() < 0.0 {
            return Err(MapError::InvalidTransform(
                "rotation matrix is a reflection (det < 0)".to_string(),
            ));
        }
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
            *rotation,
        ));
        Ok(Self::new(translation, rotation))
    }

    /// Rotation component as a 3x3 matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Compose two transforms.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(&self, other: &Self) -> Self {
        let translation = self.translation + self.rotation * other.translation;
        let rotation = self.rotation * other.rotation;
        Self::new(translation, rotation)
    }

    /// The inverse transform: T_B_A for `self` = T_A_B.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self::new(-(rotation * self.translation), rotation)
    }

    /// Map a point from the child frame into the parent frame.
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * point.coords + self.translation)
    }

    /// Map every point of `points` from the child frame into the parent frame.
    pub fn transform_points(&self, points: &[Point3<f64>]) -> Vec<Point3<f64>> {
        points.iter().map(|p| self.transform_point(p)).collect()
    }
}
