//! Volumetric map contract and the sensor-data insertion front end.
//!
//! [`MapBackend`] is the surface a concrete occupancy representation
//! implements.  Every method has a default, and the defaults together describe
//! a valid, completely empty world: every query answers
//! [`CellStatus::Free`], the map is unbounded, manual edits are ignored.  The
//! four insertion seams are the exception: a backend that does not override
//! them cannot store anything, so their defaults log an error and return
//! [`MapError::UnimplementedInsertion`] without touching the map.
//!
//! [`VolumetricWorld`] wraps a backend and owns the fixed part of the
//! pipeline: disparity reprojection, point-cloud decoding and filtering, and
//! optional weighing.  Points reach the backend in the **sensor frame**
//! together with the sensor-to-world transform, so backends that ray-cast can
//! use the sensor origin.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use nalgebra::{Point3, Vector2, Vector3};
//! use volmap_perception::camera::CameraIntrinsics;
//! use volmap_perception::disparity::DisparityImage;
//! use volmap_perception::octree::{OctreeMap, OctreeMapConfig};
//! use volmap_perception::reprojection::ReprojectionMatrix;
//! use volmap_perception::transform::Transformation;
//! use volmap_perception::weighing::ConstantWeighing;
//! use volmap_perception::world::VolumetricWorld;
//! use volmap_types::CellStatus;
//!
//! let k = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0).to_matrix();
//! let full_size = Vector2::new(640.0, 480.0);
//! let t_c1_c0 = Transformation::from_translation(Vector3::new(-0.1, 0.0, 0.0));
//! let q = ReprojectionMatrix::for_cameras(&t_c1_c0, &k, &k, &full_size).unwrap();
//!
//! let mut world = VolumetricWorld::new(OctreeMap::new(OctreeMapConfig::default()));
//! world.set_weighing_function(Arc::new(ConstantWeighing::new(1.0)));
//!
//! let mut disparity = DisparityImage::filled(640, 480, f32::NAN);
//! disparity.set(320, 240, 40.0);
//! let summary = world
//!     .insert_disparity_image(&Transformation::identity(), &disparity, &q, &full_size)
//!     .unwrap();
//! assert_eq!(summary.valid_samples, 1);
//!
//! // 0.1 m * 500 px / 40 px = 1.25 m straight ahead.
//! assert_eq!(world.cell_status_point(&Point3::new(0.0, 0.0, 1.25)), CellStatus::Occupied);
//! ```

use std::sync::Arc;

use nalgebra::{Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use volmap_types::{CellStatus, InsertionSeam, MapError};

use crate::disparity::{DisparityImage, DisparityMessage, ProjectedDisparity, project_disparity};
use crate::pointcloud::{PointCloud, PointCloudMessage};
use crate::reprojection::ReprojectionMatrix;
use crate::transform::Transformation;
use crate::weighing::{WeighingFunction, compute_disparity_weights, compute_point_weights};

/// Occupancy storage plugged into a [`VolumetricWorld`].
///
/// The `insert_*` seams are driven by [`VolumetricWorld`]; callers insert
/// sensor data through the world, not through these methods directly.
pub trait MapBackend {
    /// Manually mark a box as free. Ignored by default.
    fn set_free(&mut self, _position: &Point3<f64>, _bounding_box_size: &Vector3<f64>) {}

    /// Manually mark a box as occupied. Ignored by default.
    fn set_occupied(&mut self, _position: &Point3<f64>, _bounding_box_size: &Vector3<f64>) {}

    fn cell_status_bounding_box(
        &self,
        _point: &Point3<f64>,
        _bounding_box_size: &Vector3<f64>,
    ) -> CellStatus {
        CellStatus::Free
    }

    fn cell_status_point(&self, _point: &Point3<f64>) -> CellStatus {
        CellStatus::Free
    }

    fn line_status(&self, _start: &Point3<f64>, _end: &Point3<f64>) -> CellStatus {
        CellStatus::Free
    }

    /// Status of the volume swept by a box moving from `start` to `end`.
    fn line_status_bounding_box(
        &self,
        _start: &Point3<f64>,
        _end: &Point3<f64>,
        _bounding_box: &Vector3<f64>,
    ) -> CellStatus {
        CellStatus::Free
    }

    fn map_center(&self) -> Point3<f64> {
        Point3::origin()
    }

    /// Extent of the map; unbounded by default.
    fn map_size(&self) -> Vector3<f64> {
        Vector3::repeat(f64::MAX)
    }

    /// Store reprojected disparity points (sensor frame).
    fn insert_projected_disparity(
        &mut self,
        _sensor_to_world: &Transformation,
        _projected: &ProjectedDisparity,
    ) -> Result<(), MapError> {
        Err(unimplemented_insertion(InsertionSeam::ProjectedDisparity))
    }

    /// Store reprojected disparity points with one weight per pixel.
    fn insert_projected_disparity_with_weights(
        &mut self,
        _sensor_to_world: &Transformation,
        _projected: &ProjectedDisparity,
        _weights: &[f64],
    ) -> Result<(), MapError> {
        Err(unimplemented_insertion(
            InsertionSeam::ProjectedDisparityWithWeights,
        ))
    }

    /// Store a filtered point cloud (sensor frame).
    fn insert_pointcloud_into_map(
        &mut self,
        _sensor_to_world: &Transformation,
        _cloud: &PointCloud,
    ) -> Result<(), MapError> {
        Err(unimplemented_insertion(InsertionSeam::Pointcloud))
    }

    /// Store a filtered point cloud with one weight per point.
    fn insert_pointcloud_into_map_with_weights(
        &mut self,
        _sensor_to_world: &Transformation,
        _cloud: &PointCloud,
        _weights: &[f64],
    ) -> Result<(), MapError> {
        Err(unimplemented_insertion(InsertionSeam::PointcloudWithWeights))
    }
}

fn unimplemented_insertion(seam: InsertionSeam) -> MapError {
    error!(%seam, "calling unimplemented {seam} insertion");
    MapError::UnimplementedInsertion(seam)
}

/// A backend that overrides nothing: a valid, completely empty world.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyWorld;

impl MapBackend for EmptyWorld {}

/// Outcome of one insertion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionSummary {
    /// Pixels (disparity) or points (cloud) received.
    pub total_samples: usize,
    /// Samples that survived filtering and were handed to the backend.
    pub valid_samples: usize,
    /// Whether the weighted seam was used.
    pub weighted: bool,
}

/// A map backend plus the sensor insertion pipeline in front of it.
#[derive(Debug, Default)]
pub struct VolumetricWorld<B> {
    backend: B,
    weighing_function: Option<Arc<dyn WeighingFunction>>,
}

impl<B: MapBackend> VolumetricWorld<B> {
    /// Wrap `backend`, with no weighing function installed.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            weighing_function: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    // ── Weighing ────────────────────────────────────────────────────────────

    /// Install (or replace) the weighing function.  Once set, every insertion
    /// goes through the weighted seams.
    pub fn set_weighing_function(&mut self, weighing_function: Arc<dyn WeighingFunction>) {
        self.weighing_function = Some(weighing_function);
    }

    /// Remove the weighing function; insertion becomes unweighted again.
    pub fn clear_weighing_function(&mut self) {
        self.weighing_function = None;
    }

    pub fn is_weighing_function_set(&self) -> bool {
        self.weighing_function.is_some()
    }

    pub fn weighing_function(&self) -> Option<&Arc<dyn WeighingFunction>> {
        self.weighing_function.as_ref()
    }

    // ── Insertion ───────────────────────────────────────────────────────────

    /// Project a disparity image to 3-D and insert it into the map.
    ///
    /// `q_full` is the reprojection matrix for the full-size image of
    /// `full_image_size` (width, height); it is rescaled here when
    /// `disparity` has been downsampled.
    ///
    /// # Errors
    ///
    /// [`MapError::InvalidInput`] for an empty image or non-positive full
    /// size; otherwise whatever the backend seam returns.
    pub fn insert_disparity_image(
        &mut self,
        sensor_to_world: &Transformation,
        disparity: &DisparityImage,
        q_full: &ReprojectionMatrix,
        full_image_size: &Vector2<f64>,
    ) -> Result<InsertionSummary, MapError> {
        let projected = project_disparity(disparity, q_full, full_image_size)?;
        let summary = InsertionSummary {
            total_samples: disparity.pixel_count(),
            valid_samples: projected.len(),
            weighted: self.weighing_function.is_some(),
        };
        if projected.is_empty() && summary.total_samples > 0 {
            warn!(
                width = disparity.width(),
                height = disparity.height(),
                "disparity image has no valid pixels"
            );
        }

        match &self.weighing_function {
            Some(weighing) => {
                let weights = compute_disparity_weights(weighing.as_ref(), &projected);
                self.backend.insert_projected_disparity_with_weights(
                    sensor_to_world,
                    &projected,
                    &weights,
                )?;
            }
            None => self
                .backend
                .insert_projected_disparity(sensor_to_world, &projected)?,
        }

        debug!(
            width = disparity.width(),
            height = disparity.height(),
            valid = summary.valid_samples,
            weighted = summary.weighted,
            "inserted disparity image"
        );
        Ok(summary)
    }

    /// Same as [`insert_disparity_image`][Self::insert_disparity_image], for
    /// a disparity message.  Disparities outside the message's
    /// `[min_disparity, max_disparity]` range are treated as invalid.
    ///
    /// # Errors
    ///
    /// See [`insert_disparity_image`][Self::insert_disparity_image].
    pub fn insert_disparity_message(
        &mut self,
        sensor_to_world: &Transformation,
        disparity: &DisparityMessage,
        q_full: &ReprojectionMatrix,
        full_image_size: &Vector2<f64>,
    ) -> Result<InsertionSummary, MapError> {
        debug!(
            frame_id = %disparity.frame_id,
            min_disparity = disparity.min_disparity,
            max_disparity = disparity.max_disparity,
            "inserting disparity message"
        );
        let image = disparity.range_filtered_image();
        self.insert_disparity_image(sensor_to_world, &image, q_full, full_image_size)
    }

    /// Filter a sensor-frame point cloud and insert it into the map.
    ///
    /// Points with a NaN or infinite coordinate are dropped first.
    ///
    /// # Errors
    ///
    /// Whatever the backend seam returns.
    pub fn insert_pointcloud(
        &mut self,
        sensor_to_world: &Transformation,
        mut cloud: PointCloud,
    ) -> Result<InsertionSummary, MapError> {
        let total_samples = cloud.len();
        let dropped = cloud.retain_finite();
        let summary = InsertionSummary {
            total_samples,
            valid_samples: cloud.len(),
            weighted: self.weighing_function.is_some(),
        };
        if cloud.is_empty() && total_samples > 0 {
            warn!(dropped, "point cloud has no finite points");
        }

        match &self.weighing_function {
            Some(weighing) => {
                let weights = compute_point_weights(weighing.as_ref(), &cloud);
                self.backend.insert_pointcloud_into_map_with_weights(
                    sensor_to_world,
                    &cloud,
                    &weights,
                )?;
            }
            None => self
                .backend
                .insert_pointcloud_into_map(sensor_to_world, &cloud)?,
        }

        debug!(
            valid = summary.valid_samples,
            dropped,
            weighted = summary.weighted,
            "inserted point cloud"
        );
        Ok(summary)
    }

    /// Decode a packed point-cloud buffer and insert it.
    ///
    /// # Errors
    ///
    /// [`MapError::InvalidInput`] when the buffer cannot be decoded;
    /// otherwise whatever the backend seam returns.
    pub fn insert_pointcloud_message(
        &mut self,
        sensor_to_world: &Transformation,
        cloud_msg: &PointCloudMessage,
    ) -> Result<InsertionSummary, MapError> {
        let cloud = PointCloud::from_message(cloud_msg)?;
        debug!(frame_id = %cloud_msg.frame_id, points = cloud.len(), "decoded point cloud message");
        self.insert_pointcloud(sensor_to_world, cloud)
    }

    // ── Manual edits & queries (forwarded to the backend) ───────────────────

    pub fn set_free(&mut self, position: &Point3<f64>, bounding_box_size: &Vector3<f64>) {
        self.backend.set_free(position, bounding_box_size);
    }

    pub fn set_occupied(&mut self, position: &Point3<f64>, bounding_box_size: &Vector3<f64>) {
        self.backend.set_occupied(position, bounding_box_size);
    }

    pub fn cell_status_bounding_box(
        &self,
        point: &Point3<f64>,
        bounding_box_size: &Vector3<f64>,
    ) -> CellStatus {
        self.backend.cell_status_bounding_box(point, bounding_box_size)
    }

    pub fn cell_status_point(&self, point: &Point3<f64>) -> CellStatus {
        self.backend.cell_status_point(point)
    }

    pub fn line_status(&self, start: &Point3<f64>, end: &Point3<f64>) -> CellStatus {
        self.backend.line_status(start, end)
    }

    pub fn line_status_bounding_box(
        &self,
        start: &Point3<f64>,
        end: &Point3<f64>,
        bounding_box: &Vector3<f64>,
    ) -> CellStatus {
        self.backend.line_status_bounding_box(start, end, bounding_box)
    }

    pub fn map_center(&self) -> Point3<f64> {
        self.backend.map_center()
    }

    pub fn map_size(&self) -> Vector3<f64> {
        self.backend.map_size()
    }
}
