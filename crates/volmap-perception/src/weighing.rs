//! Measurement weighing policies.
//!
//! A [`WeighingFunction`] maps a measurement to a confidence weight.  The
//! map does not fix the curve: it calls whichever policy the caller installs
//! via [`VolumetricWorld::set_weighing_function`][crate::world::VolumetricWorld::set_weighing_function],
//! once per valid sample, and hands the resulting weight buffer to the
//! backend next to the points.
//!
//! Two stock policies are provided:
//!
//! | Policy | Weight |
//! |--------|--------|
//! | [`ConstantWeighing`] | the same value for every sample |
//! | [`InverseSquareRangeWeighing`] | `(reference_range / range)²`, clamped to `[min_weight, 1]` |

use std::sync::Arc;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::disparity::ProjectedDisparity;
use crate::pointcloud::PointCloud;

/// Maps a measurement to a positive confidence weight.
///
/// Implementations are shared read-only between the caller and every map
/// they are installed on, hence `Send + Sync`.
pub trait WeighingFunction: Send + Sync + std::fmt::Debug {
    /// Weight for the disparity observed at pixel `(u, v)`.
    ///
    /// `(u, v)` index the inserted (possibly downsampled) image, while
    /// `disparity` is always expressed in full-resolution pixels, so a
    /// policy calibrated on the full-resolution rig applies at any scale.
    fn weight_for_disparity(&self, u: u32, v: u32, disparity: f32) -> f64;

    /// Weight for a point in the sensor frame.
    fn weight_for_point(&self, point: &Point3<f64>) -> f64;
}

/// Weighs every sample the same.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantWeighing {
    pub weight: f64,
}

impl ConstantWeighing {
    pub fn new(weight: f64) -> Self {
        Self { weight }
    }
}

impl Default for ConstantWeighing {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl WeighingFunction for ConstantWeighing {
    fn weight_for_disparity(&self, _u: u32, _v: u32, _disparity: f32) -> f64 {
        self.weight
    }

    fn weight_for_point(&self, _point: &Point3<f64>) -> f64 {
        self.weight
    }
}

/// Stereo depth error grows with the square of range; this policy discounts
/// far samples accordingly.
///
/// Samples closer than `reference_range` get weight 1.  For disparities the
/// range is `focal_baseline / d`, where `focal_baseline` is `fx * baseline`
/// at the resolution of the disparity image being inserted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseSquareRangeWeighing {
    pub reference_range: f64,
    pub min_weight: f64,
    pub focal_baseline: f64,
}

impl InverseSquareRangeWeighing {
    /// `min_weight` is forced into `[0, 1]`; NaN becomes 0.
    pub fn new(reference_range: f64, min_weight: f64, focal_baseline: f64) -> Self {
        Self {
            reference_range,
            min_weight: if min_weight.is_nan() {
                0.0
            } else {
                min_weight.clamp(0.0, 1.0)
            },
            focal_baseline,
        }
    }

    fn weight_for_range(&self, range: f64) -> f64 {
        if !(range > 0.0) {
            return 1.0;
        }
        let ratio = self.reference_range / range;
        // Tolerates an inverted or NaN floor set through the public fields.
        (ratio * ratio).max(self.min_weight).min(1.0)
    }
}

impl WeighingFunction for InverseSquareRangeWeighing {
    fn weight_for_disparity(&self, _u: u32, _v: u32, disparity: f32) -> f64 {
        self.weight_for_range(self.focal_baseline / f64::from(disparity))
    }

    fn weight_for_point(&self, point: &Point3<f64>) -> f64 {
        self.weight_for_range(point.coords.norm())
    }
}

/// One weight per reprojected pixel, index-aligned with `projected.pixels`.
///
/// Disparities are handed over in full-resolution pixels.
pub fn compute_disparity_weights(
    weighing: &dyn WeighingFunction,
    projected: &ProjectedDisparity,
) -> Vec<f64> {
    projected
        .pixels
        .iter()
        .map(|p| weighing.weight_for_disparity(p.u, p.v, projected.full_resolution_disparity(p)))
        .collect()
}

/// One weight per point, index-aligned with `cloud.points`.
pub fn compute_point_weights(weighing: &dyn WeighingFunction, cloud: &PointCloud) -> Vec<f64> {
    cloud
        .points
        .iter()
        .map(|p| weighing.weight_for_point(p))
        .collect()
}

/// Serialisable selection of a stock policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeighingConfig {
    /// No weighing function; insertion stays unweighted.
    #[default]
    None,
    Constant {
        #[serde(default = "default_constant_weight")]
        weight: f64,
    },
    InverseSquareRange {
        #[serde(default = "default_reference_range")]
        reference_range: f64,
        #[serde(default = "default_min_weight")]
        min_weight: f64,
        focal_baseline: f64,
    },
}

fn default_constant_weight() -> f64 {
    1.0
}
fn default_reference_range() -> f64 {
    1.0
}
fn default_min_weight() -> f64 {
    0.01
}

impl WeighingConfig {
    /// Instantiate the selected policy, or `None` for unweighted insertion.
    pub fn build(&self) -> Option<Arc<dyn WeighingFunction>> {
        match *self {
            WeighingConfig::None => None,
            WeighingConfig::Constant { weight } => Some(Arc::new(ConstantWeighing::new(weight))),
            WeighingConfig::InverseSquareRange {
                reference_range,
                min_weight,
                focal_baseline,
            } => Some(Arc::new(InverseSquareRangeWeighing::new(
                reference_range,
                min_weight,
                focal_baseline,
            ))),
        }
    }
}
