//! Pinhole camera parameters and calibration records.
//!
//! [`CameraIntrinsics`] is the compact (fx, fy, cx, cy) form used by the
//! reprojection builder.  [`CameraInfo`] mirrors the calibration record a
//! camera driver publishes: the image size, the unrectified camera matrix
//! `K`, and the rectified 3x4 projection matrix `P`, whose `[0, 3]` entry
//! carries `-fx' * baseline` for the right camera of a stereo pair.

use nalgebra::{Matrix3, Matrix3x4};
use serde::{Deserialize, Serialize};

/// Focal lengths and principal point of a pinhole camera, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Read the parameters out of a 3x3 camera matrix `K`.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }

    /// The 3x3 camera matrix `K` (zero skew).
    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }
}

/// A camera calibration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Calibrated (full) image width in pixels.
    pub width: u32,
    /// Calibrated (full) image height in pixels.
    pub height: u32,
    /// Unrectified camera matrix, row-major.
    pub k: [f64; 9],
    /// Rectified projection matrix, row-major 3x4.
    pub p: [f64; 12],
}

impl CameraInfo {
    /// Build the record for one camera of a rectified stereo pair.
    ///
    /// `tx` is the `P[0, 3]` entry: `0` for the left camera and
    /// `-fx * baseline` for the right one.
    pub fn from_intrinsics(width: u32, height: u32, intrinsics: CameraIntrinsics, tx: f64) -> Self {
        let CameraIntrinsics { fx, fy, cx, cy } = intrinsics;
        Self {
            width,
            height,
            k: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            p: [fx, 0.0, cx, tx, 0.0, fy, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_row_slice(&self.k)
    }

    pub fn projection_matrix(&self) -> Matrix3x4<f64> {
        Matrix3x4::from_row_slice(&self.p)
    }

    /// Rectified intrinsics taken from `P`.
    pub fn rectified_intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics::new(self.p[0], self.p[5], self.p[2], self.p[6])
    }

    /// The `P[0, 3]` entry (`-fx * baseline` for a right camera).
    pub fn tx(&self) -> f64 {
        self.p[3]
    }
}
