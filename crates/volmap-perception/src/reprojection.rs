//! Disparity-to-depth reprojection matrix (`Q`).
//!
//! For a rectified stereo pair with left parameters `(fx, fy, cx, cy)`, right
//! principal point `cx'` and baseline term `Tx`, the combined projection
//!
//! ```text
//! [u v u-d 1]ᵀ ∝ [ Fx  0   Cx   0    ] [x y z 1]ᵀ
//!                [ 0   Fy  Cy   0    ]
//!                [ Fx' 0   Cx'  FxTx ]
//!                [ 0   0   1    0    ]
//! ```
//!
//! inverts to `[x y z 1]ᵀ ∝ Q [u v d 1]ᵀ` with
//!
//! ```text
//!     [ FyTx  0     0    -FyCxTx    ]
//! Q = [ 0     FxTx  0    -FxCyTx    ]
//!     [ 0     0     0     FxFyTx    ]
//!     [ 0     0    -Fy    Fy(Cx-Cx')]
//! ```
//!
//! `Fx` and `Fy` stay separate, and `(Cx - Cx')` carries asymmetric
//! principal points.
//!
//! A [`ReprojectionMatrix`] is always built for the full calibration
//! resolution.  [`ReprojectionMatrix::scaled_to`] derives the matrix for a
//! downsampled disparity image.

use nalgebra::{Matrix3, Matrix4, Point3, Vector2, Vector4};
use serde::{Deserialize, Serialize};
use volmap_types::MapError;

use crate::camera::{CameraInfo, CameraIntrinsics};
use crate::transform::Transformation;

/// Inputs of the canonical Q generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoParameters {
    /// Signed baseline term; `-baseline` for a right camera at `+baseline`.
    pub tx: f64,
    pub left: CameraIntrinsics,
    pub right: CameraIntrinsics,
}

/// A 4x4 perspective disparity-to-depth matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionMatrix(Matrix4<f64>);

impl ReprojectionMatrix {
    /// Wrap an externally computed matrix.
    pub fn from_matrix(q: Matrix4<f64>) -> Self {
        Self(q)
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    /// Build Q from two unrectified camera matrices and the pose of the left
    /// camera frame (C0) expressed in the right camera frame (C1).
    ///
    /// The x-translation of `t_c1_c0` is the baseline term.
    ///
    /// # Errors
    ///
    /// [`MapError::InvalidCalibration`] on a zero baseline, degenerate focal
    /// lengths, or a principal point outside `full_image_size`.
    pub fn for_cameras(
        t_c1_c0: &Transformation,
        left_cam_matrix: &Matrix3<f64>,
        right_cam_matrix: &Matrix3<f64>,
        full_image_size: &Vector2<f64>,
    ) -> Result<Self, MapError> {
        validate_image_size(full_image_size)?;
        let left = CameraIntrinsics::from_matrix(left_cam_matrix);
        let right = CameraIntrinsics::from_matrix(right_cam_matrix);
        for (name, intr) in [("left", &left), ("right", &right)] {
            if intr.cx < 0.0
                || intr.cx > full_image_size.x
                || intr.cy < 0.0
                || intr.cy > full_image_size.y
            {
                return Err(MapError::InvalidCalibration(format!(
                    "{name} principal point ({}, {}) lies outside the {}x{} image",
                    intr.cx, intr.cy, full_image_size.x, full_image_size.y
                )));
            }
        }
        Self::generate(&StereoParameters {
            tx: t_c1_c0.translation.x,
            left,
            right,
        })
    }

    /// Build Q from the calibration records of a rectified stereo pair.
    ///
    /// Intrinsics come from each record's projection matrix; the baseline
    /// term is `P_right[0, 3] / P_right[0, 0]`.
    ///
    /// # Errors
    ///
    /// [`MapError::InvalidCalibration`] when the right record carries no
    /// baseline or either record has degenerate intrinsics.
    pub fn for_camera_infos(left: &CameraInfo, right: &CameraInfo) -> Result<Self, MapError> {
        let right_intr = right.rectified_intrinsics();
        if right_intr.fx == 0.0 || !right_intr.fx.is_finite() {
            return Err(MapError::InvalidCalibration(format!(
                "right projection matrix has focal length {}",
                right_intr.fx
            )));
        }
        Self::generate(&StereoParameters {
            tx: right.tx() / right_intr.fx,
            left: left.rectified_intrinsics(),
            right: right_intr,
        })
    }

    /// The canonical generator shared by every builder.
    ///
    /// # Errors
    ///
    /// [`MapError::InvalidCalibration`] on a zero or non-finite `tx`,
    /// non-positive focal lengths or non-finite principal points.
    pub fn generate(params: &StereoParameters) -> Result<Self, MapError> {
        let StereoParameters { tx, left, right } = *params;
        if tx == 0.0 || !tx.is_finite() {
            return Err(MapError::InvalidCalibration(format!(
                "stereo baseline must be non-zero and finite, got {tx}"
            )));
        }
        for (name, intr) in [("left", &left), ("right", &right)] {
            validate_intrinsics(name, intr)?;
        }

        let mut q = Matrix4::zeros();
        q[(0, 0)] = left.fy * tx;
        q[(0, 3)] = -left.fy * left.cx * tx;
        q[(1, 1)] = left.fx * tx;
        q[(1, 3)] = -left.fx * left.cy * tx;
        q[(2, 3)] = left.fx * left.fy * tx;
        q[(3, 2)] = -left.fy;
        // Zero when the disparities are already compensated for the offset
        // between the two principal points.
        q[(3, 3)] = left.fy * (left.cx - right.cx);
        Ok(Self(q))
    }

    /// Derive the matrix for a disparity image of `image_size` from this
    /// full-resolution matrix.
    ///
    /// Pixel columns and disparities shrink by `kx = full_w / w`, rows by
    /// `ky = full_h / h`, so the scaled matrix is `Q · diag(kx, ky, kx, 1)`.
    /// Equal sizes return the matrix unchanged.
    ///
    /// # Errors
    ///
    /// [`MapError::InvalidInput`] when either size is not strictly positive.
    pub fn scaled_to(
        &self,
        full_image_size: &Vector2<f64>,
        image_size: &Vector2<f64>,
    ) -> Result<Self, MapError> {
        validate_image_size(full_image_size).map_err(|_| {
            MapError::InvalidInput(format!(
                "full image size must be positive, got {}x{}",
                full_image_size.x, full_image_size.y
            ))
        })?;
        if !(image_size.x > 0.0 && image_size.y > 0.0) {
            return Err(MapError::InvalidInput(format!(
                "disparity image size must be positive, got {}x{}",
                image_size.x, image_size.y
            )));
        }
        if full_image_size == image_size {
            return Ok(*self);
        }
        let kx = full_image_size.x / image_size.x;
        let ky = full_image_size.y / image_size.y;
        let scale = Matrix4::from_diagonal(&Vector4::new(kx, ky, kx, 1.0));
        Ok(Self(self.0 * scale))
    }

    /// Reproject pixel `(u, v)` with disparity `d` to a 3-D point.
    ///
    /// Returns `None` when the homogeneous weight vanishes or the result is
    /// not finite.
    pub fn reproject(&self, u: f64, v: f64, d: f64) -> Option<Point3<f64>> {
        let h = self.0 * Vector4::new(u, v, d, 1.0);
        if h.w == 0.0 {
            return None;
        }
        let p = Point3::new(h.x / h.w, h.y / h.w, h.z / h.w);
        (p.x.is_finite() && p.y.is_finite() && p.z.is_finite()).then_some(p)
    }
}

fn validate_image_size(size: &Vector2<f64>) -> Result<(), MapError> {
    if size.x > 0.0 && size.y > 0.0 && size.x.is_finite() && size.y.is_finite() {
        Ok(())
    } else {
        Err(MapError::InvalidCalibration(format!(
            "full image size must be positive, got {}x{}",
            size.x, size.y
        )))
    }
}

fn validate_intrinsics(name: &str, intr: &CameraIntrinsics) -> Result<(), MapError> {
    if !(intr.fx > 0.0 && intr.fy > 0.0 && intr.fx.is_finite() && intr.fy.is_finite()) {
        return Err(MapError::InvalidCalibration(format!(
            "{name} focal lengths must be positive, got fx={} fy={}",
            intr.fx, intr.fy
        )));
    }
    if !(intr.cx.is_finite() && intr.cy.is_finite()) {
        return Err(MapError::InvalidCalibration(format!(
            "{name} principal point is not finite"
        )));
    }
    Ok(())
}
