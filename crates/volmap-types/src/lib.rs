use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Occupancy answer returned by every spatial query against a volumetric map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Free = 0,
    Occupied = 1,
    /// Outside the sensed or represented space.
    Unknown = 2,
}

impl CellStatus {
    /// True when the region is known to contain an obstacle.
    pub fn is_occupied(self) -> bool {
        self == CellStatus::Occupied
    }
}

impl std::fmt::Display for CellStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellStatus::Free => write!(f, "free"),
            CellStatus::Occupied => write!(f, "occupied"),
            CellStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// The backend-overridable insertion routines a map implementation supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsertionSeam {
    ProjectedDisparity,
    ProjectedDisparityWithWeights,
    Pointcloud,
    PointcloudWithWeights,
}

impl std::fmt::Display for InsertionSeam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertionSeam::ProjectedDisparity => write!(f, "disparity"),
            InsertionSeam::ProjectedDisparityWithWeights => write!(f, "weighted disparity"),
            InsertionSeam::Pointcloud => write!(f, "pointcloud"),
            InsertionSeam::PointcloudWithWeights => write!(f, "weighted pointcloud"),
        }
    }
}

/// Error type shared by the calibration, projection and insertion layers.
///
/// Individual invalid samples (NaN points, non-positive disparities) are not
/// errors; they are dropped during projection and only show up in the
/// reduced point count.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapError {
    /// Zero baseline or degenerate intrinsics; no reprojection matrix can be built.
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    /// Malformed input buffer (size mismatch, undecodable message, empty image).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Rotation component is not a proper rotation.
    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    /// The backend never overrode the named insertion routine.
    #[error("Calling unimplemented {0} insertion")]
    UnimplementedInsertion(InsertionSeam),
}
