//! `volmap-perception` – sensor-to-volumetric-map insertion core.
//!
//! Turns calibrated stereo disparity and raw point clouds into sensor-frame
//! 3-D points and hands them, with the sensor pose and optional confidence
//! weights, to a pluggable occupancy backend.
//!
//! # Modules
//!
//! - [`transform`] – [`Transformation`][transform::Transformation]: rigid
//!   sensor-to-world pose (unit quaternion + translation).
//! - [`camera`] – pinhole intrinsics and `CameraInfo` calibration records.
//! - [`reprojection`] – [`ReprojectionMatrix`][reprojection::ReprojectionMatrix]:
//!   the 4x4 disparity-to-depth matrix `Q`, built from stereo calibration
//!   and rescaled for downsampled disparity images.
//! - [`disparity`] – disparity images and their projection to 3-D points.
//! - [`pointcloud`] – packed point-cloud buffers and the canonical
//!   [`PointCloud`][pointcloud::PointCloud].
//! - [`weighing`] – the [`WeighingFunction`][weighing::WeighingFunction]
//!   capability and stock confidence policies.
//! - [`world`] – the [`MapBackend`][world::MapBackend] contract and the
//!   [`VolumetricWorld`][world::VolumetricWorld] insertion front end.
//! - [`octree`] – [`OctreeMap`][octree::OctreeMap]: a reference backend
//!   storing occupied samples in an octree.

pub mod camera;
pub mod disparity;
pub mod octree;
pub mod pointcloud;
pub mod reprojection;
pub mod transform;
pub mod weighing;
pub mod world;
