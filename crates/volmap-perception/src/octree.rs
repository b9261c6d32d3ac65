//! Octree-backed occupancy map.
//!
//! [`Octree`] partitions 3-D space into eight octants recursively and stores
//! occupied world-frame samples in its leaves.  [`OctreeMap`] puts it behind
//! the [`MapBackend`] contract so a [`VolumetricWorld`][crate::world::VolumetricWorld]
//! can insert disparity images and point clouds into it.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`Aabb`]      | An axis-aligned bounding box.                       |
//! | [`Octree`]    | Spatial index; insert, clear and query points.  |
//! | [`OctreeMap`] | Occupancy backend answering `CellStatus` queries.   |
//!
//! # Occupancy semantics
//!
//! - Outside the configured bounds: [`CellStatus::Unknown`].
//! - A stored sample within the query box (half a voxel around a point
//!   query): [`CellStatus::Occupied`].
//! - Otherwise: [`CellStatus::Free`].
//!
//! Weighted insertion drops samples whose weight is not positive or falls
//! below `min_weight`.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;
use volmap_types::{CellStatus, MapError};

use crate::disparity::ProjectedDisparity;
use crate::pointcloud::PointCloud;
use crate::transform::Transformation;
use crate::world::MapBackend;

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The corners are normalised so that `min ≤ max` per axis.
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            min: a.inf(&b),
            max: a.sup(&b),
        }
    }

    /// Box of `size` centred on `centre`.
    pub fn from_centre_size(centre: &Point3<f64>, size: &Vector3<f64>) -> Self {
        let half = size.abs() * 0.5;
        Self::new(centre - half, centre + half)
    }

    pub fn centre(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// True when `other` lies entirely inside this box.
    pub fn contains_box(&self, other: &Aabb) -> bool {
        self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    /// True when `other` overlaps (intersects or touches) this box.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && self.max[i] >= other.min[i])
    }

    /// Overlapping part of two boxes, `None` when they are disjoint.
    pub fn intersection(&self, other: &Aabb) -> Option<Aabb> {
        self.overlaps(other).then(|| Aabb {
            min: self.min.sup(&other.min),
            max: self.max.inf(&other.max),
        })
    }

    /// Box grown by `margin` on every side.
    pub fn expanded(&self, margin: &Vector3<f64>) -> Aabb {
        let m = margin.abs();
        Aabb::new(self.min - m, self.max + m)
    }

    /// Parameter interval `[t0, t1] ⊆ [0, 1]` of the segment `start → end`
    /// that lies inside the box (slab test).  `None` when the segment misses
    /// the box or has a non-finite endpoint.
    pub fn clip_segment(&self, start: &Point3<f64>, end: &Point3<f64>) -> Option<(f64, f64)> {
        if !start.coords.iter().chain(end.coords.iter()).all(|c| c.is_finite()) {
            return None;
        }
        let delta = end - start;
        let (mut t0, mut t1) = (0.0f64, 1.0f64);
        for i in 0..3 {
            if delta[i] == 0.0 {
                if start[i] < self.min[i] || start[i] > self.max[i] {
                    return None;
                }
                continue;
            }
            let a = (self.min[i] - start[i]) / delta[i];
            let b = (self.max[i] - start[i]) / delta[i];
            t0 = t0.max(a.min(b));
            t1 = t1.min(a.max(b));
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }

    /// The eight octants around the centre.
    fn octants(&self) -> [Aabb; 8] {
        let (min, c, max) = (self.min, self.centre(), self.max);
        std::array::from_fn(|i| {
            let pick = |axis: usize| {
                if i & (1 << axis) == 0 {
                    (min[axis], c[axis])
                } else {
                    (c[axis], max[axis])
                }
            };
            let (x, y, z) = (pick(0), pick(1), pick(2));
            Aabb::new(Point3::new(x.0, y.0, z.0), Point3::new(x.1, y.1, z.1))
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Octree
// ────────────────────────────────────────────────────────────────────────────

/// A recursive spatial index that subdivides 3-D space into eight octants.
///
/// Points are stored in the deepest node whose bounding box still contains
/// them.  A leaf splits once it holds more than `capacity` points, unless
/// `max_depth` levels already exist.
#[derive(Debug, Clone)]
pub struct Octree {
    root: OctreeNode,
    max_depth: usize,
}

impl Octree {
    /// Create an empty octree covering `bounds` with the default depth limit.
    pub fn new(bounds: Aabb, capacity: usize) -> Self {
        Self::with_max_depth(bounds, capacity, 12)
    }

    pub fn with_max_depth(bounds: Aabb, capacity: usize, max_depth: usize) -> Self {
        Self {
            root: OctreeNode::new(bounds, capacity.max(1)),
            max_depth,
        }
    }

    pub fn bounds(&self) -> &Aabb {
        &self.root.bounds
    }

    /// Insert a point. Returns `false` when it lies outside the root box.
    pub fn insert(&mut self, point: Point3<f64>) -> bool {
        self.root.insert(point, self.max_depth, 0)
    }

    /// Total number of points stored in the tree.
    pub fn len(&self) -> usize {
        self.root.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when any stored point lies inside `region`.
    pub fn query_aabb(&self, region: &Aabb) -> bool {
        self.root.query_aabb(region)
    }

    /// Remove every stored point inside `region`. Returns how many went.
    pub fn remove_in(&mut self, region: &Aabb) -> usize {
        self.root.remove_in(region)
    }

    /// All stored points (depth-first order).
    pub fn points(&self) -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        self.root.collect_points(&mut points);
        points
    }
}

#[derive(Debug, Clone)]
struct OctreeNode {
    bounds: Aabb,
    capacity: usize,
    /// Points stored at this node (only non-empty when the node is a leaf).
    points: Vec<Point3<f64>>,
    /// Eight children; `None` while this node is a leaf.
    children: Option<Box<[OctreeNode; 8]>>,
}

impl OctreeNode {
    fn new(bounds: Aabb, capacity: usize) -> Self {
        Self {
            bounds,
            capacity,
            points: Vec::new(),
            children: None,
        }
    }

    fn count(&self) -> usize {
        match &self.children {
            None => self.points.len(),
            Some(children) => children.iter().map(OctreeNode::count).sum(),
        }
    }

    fn insert(&mut self, point: Point3<f64>, max_depth: usize, depth: usize) -> bool {
        if !self.bounds.contains_point(&point) {
            return false;
        }
        match self.children.as_mut() {
            None => {
                self.points.push(point);
                if self.points.len() > self.capacity && depth < max_depth {
                    self.subdivide(max_depth, depth);
                }
                true
            }
            Some(children) => children
                .iter_mut()
                .find(|c| c.bounds.contains_point(&point))
                .is_some_and(|c| c.insert(point, max_depth, depth + 1)),
        }
    }

    fn query_aabb(&self, region: &Aabb) -> bool {
        if !self.bounds.overlaps(region) {
            return false;
        }
        match &self.children {
            None => self.points.iter().any(|p| region.contains_point(p)),
            Some(children) => children.iter().any(|c| c.query_aabb(region)),
        }
    }

    fn remove_in(&mut self, region: &Aabb) -> usize {
        if !self.bounds.overlaps(region) {
            return 0;
        }
        match self.children.as_mut() {
            None => {
                let before = self.points.len();
                self.points.retain(|p| !region.contains_point(p));
                before - self.points.len()
            }
            Some(children) => children.iter_mut().map(|c| c.remove_in(region)).sum(),
        }
    }

    fn collect_points(&self, out: &mut Vec<Point3<f64>>) {
        match &self.children {
            None => out.extend_from_slice(&self.points),
            Some(children) => children.iter().for_each(|c| c.collect_points(out)),
        }
    }

    /// Split this leaf into eight children and redistribute existing points.
    fn subdivide(&mut self, max_depth: usize, depth: usize) {
        let cap = self.capacity;
        let mut children = Box::new(self.bounds.octants().map(|b| OctreeNode::new(b, cap)));

        for p in std::mem::take(&mut self.points) {
            if let Some(child) = children.iter_mut().find(|c| c.bounds.contains_point(&p)) {
                child.insert(p, max_depth, depth + 1);
            }
        }
        self.children = Some(children);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OctreeMap
// ────────────────────────────────────────────────────────────────────────────

/// Construction parameters for an [`OctreeMap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OctreeMapConfig {
    #[serde(default = "default_bounds_min")]
    pub bounds_min: [f64; 3],
    #[serde(default = "default_bounds_max")]
    pub bounds_max: [f64; 3],
    /// Points per leaf before a split.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Edge length of the voxel sampled by point and line queries, metres.
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    /// Weighted samples below this weight are not stored.
    #[serde(default)]
    pub min_weight: f64,
}

fn default_bounds_min() -> [f64; 3] {
    [-50.0, -50.0, -50.0]
}
fn default_bounds_max() -> [f64; 3] {
    [50.0, 50.0, 50.0]
}
fn default_capacity() -> usize {
    16
}
fn default_max_depth() -> usize {
    12
}
fn default_resolution() -> f64 {
    0.05
}

impl Default for OctreeMapConfig {
    fn default() -> Self {
        Self {
            bounds_min: default_bounds_min(),
            bounds_max: default_bounds_max(),
            capacity: default_capacity(),
            max_depth: default_max_depth(),
            resolution: default_resolution(),
            min_weight: 0.0,
        }
    }
}

impl OctreeMapConfig {
    pub fn bounds(&self) -> Aabb {
        Aabb::new(Point3::from(self.bounds_min), Point3::from(self.bounds_max))
    }
}

/// Occupancy backend storing occupied world-frame samples in an [`Octree`].
#[derive(Debug, Clone)]
pub struct OctreeMap {
    tree: Octree,
    resolution: f64,
    min_weight: f64,
}

impl OctreeMap {
    pub fn new(config: OctreeMapConfig) -> Self {
        Self {
            tree: Octree::with_max_depth(config.bounds(), config.capacity, config.max_depth),
            resolution: config.resolution.abs().max(f64::EPSILON),
            min_weight: config.min_weight,
        }
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Number of stored occupied samples.
    pub fn occupied_count(&self) -> usize {
        self.tree.len()
    }

    /// All stored occupied samples, world frame.
    pub fn occupied_points(&self) -> Vec<Point3<f64>> {
        self.tree.points()
    }

    fn insert_world_points(
        &mut self,
        sensor_to_world: &Transformation,
        points: &[Point3<f64>],
    ) -> usize {
        let mut stored = 0usize;
        let mut outside = 0usize;
        for p in sensor_to_world.transform_points(points) {
            if self.tree.insert(p) {
                stored += 1;
            } else {
                outside += 1;
            }
        }
        debug!(stored, outside, total = self.tree.len(), "octree map updated");
        stored
    }

    fn keeps(&self, weight: f64) -> bool {
        weight > 0.0 && weight >= self.min_weight
    }
}

impl MapBackend for OctreeMap {
    fn set_free(&mut self, position: &Point3<f64>, bounding_box_size: &Vector3<f64>) {
        let removed = self
            .tree
            .remove_in(&Aabb::from_centre_size(position, bounding_box_size));
        debug!(removed, "cleared box");
    }

    /// Fills the part of the box inside the map bounds with samples spaced
    /// one resolution apart.
    fn set_occupied(&mut self, position: &Point3<f64>, bounding_box_size: &Vector3<f64>) {
        let requested = Aabb::from_centre_size(position, bounding_box_size);
        let Some(region) = self.tree.bounds().intersection(&requested) else {
            debug!("occupied box lies outside the map");
            return;
        };
        let size = region.size();
        let steps = size.map(|s| (s / self.resolution).ceil().max(1.0) as usize);
        let step = Vector3::new(
            size.x / steps.x as f64,
            size.y / steps.y as f64,
            size.z / steps.z as f64,
        );
        for ix in 0..=steps.x {
            for iy in 0..=steps.y {
                for iz in 0..=steps.z {
                    let offset = Vector3::new(
                        ix as f64 * step.x,
                        iy as f64 * step.y,
                        iz as f64 * step.z,
                    );
                    self.tree.insert(region.min + offset);
                }
            }
        }
    }

    fn cell_status_bounding_box(
        &self,
        point: &Point3<f64>,
        bounding_box_size: &Vector3<f64>,
    ) -> CellStatus {
        let region = Aabb::from_centre_size(point, bounding_box_size);
        if !self.tree.bounds().overlaps(&region) {
            return CellStatus::Unknown;
        }
        if self.tree.query_aabb(&region) {
            CellStatus::Occupied
        } else if self.tree.bounds().contains_box(&region) {
            CellStatus::Free
        } else {
            CellStatus::Unknown
        }
    }

    fn cell_status_point(&self, point: &Point3<f64>) -> CellStatus {
        if !self.tree.bounds().contains_point(point) {
            return CellStatus::Unknown;
        }
        let voxel = Aabb::from_centre_size(point, &Vector3::repeat(self.resolution));
        if self.tree.query_aabb(&voxel) {
            CellStatus::Occupied
        } else {
            CellStatus::Free
        }
    }

    fn line_status(&self, start: &Point3<f64>, end: &Point3<f64>) -> CellStatus {
        self.line_status_bounding_box(start, end, &Vector3::repeat(self.resolution))
    }

    /// Sweeps the box along the segment in steps of at most one resolution.
    ///
    /// Only the part of the segment where the box can touch the map is
    /// swept; anything beyond it makes the answer at best `Unknown`.
    fn line_status_bounding_box(
        &self,
        start: &Point3<f64>,
        end: &Point3<f64>,
        bounding_box: &Vector3<f64>,
    ) -> CellStatus {
        let reach = self.tree.bounds().expanded(&(bounding_box * 0.5));
        let Some((t0, t1)) = reach.clip_segment(start, end) else {
            return CellStatus::Unknown;
        };
        let delta = end - start;
        let (from, to) = (start + delta * t0, start + delta * t1);
        let span = to - from;
        let steps = (span.norm() / self.resolution).ceil().max(1.0) as usize;

        let mut status = if t0 > 0.0 || t1 < 1.0 {
            CellStatus::Unknown
        } else {
            CellStatus::Free
        };
        for i in 0..=steps {
            let centre = from + span * (i as f64 / steps as f64);
            match self.cell_status_bounding_box(&centre, bounding_box) {
                CellStatus::Occupied => return CellStatus::Occupied,
                CellStatus::Unknown => status = CellStatus::Unknown,
                CellStatus::Free => {}
            }
        }
        status
    }

    fn map_center(&self) -> Point3<f64> {
        self.tree.bounds().centre()
    }

    fn map_size(&self) -> Vector3<f64> {
        self.tree.bounds().size()
    }

    fn insert_projected_disparity(
        &mut self,
        sensor_to_world: &Transformation,
        projected: &ProjectedDisparity,
    ) -> Result<(), MapError> {
        let points: Vec<_> = projected.points().collect();
        self.insert_world_points(sensor_to_world, &points);
        Ok(())
    }

    fn insert_projected_disparity_with_weights(
        &mut self,
        sensor_to_world: &Transformation,
        projected: &ProjectedDisparity,
        weights: &[f64],
    ) -> Result<(), MapError> {
        check_weights(projected.len(), weights)?;
        let kept: Vec<_> = projected
            .points()
            .zip(weights)
            .filter(|(_, w)| self.keeps(**w))
            .map(|(p, _)| p)
            .collect();
        self.insert_world_points(sensor_to_world, &kept);
        Ok(())
    }

    fn insert_pointcloud_into_map(
        &mut self,
        sensor_to_world: &Transformation,
        cloud: &PointCloud,
    ) -> Result<(), MapError> {
        self.insert_world_points(sensor_to_world, &cloud.points);
        Ok(())
    }

    fn insert_pointcloud_into_map_with_weights(
        &mut self,
        sensor_to_world: &Transformation,
        cloud: &PointCloud,
        weights: &[f64],
    ) -> Result<(), MapError> {
        check_weights(cloud.len(), weights)?;
        let kept: Vec<_> = cloud
            .points
            .iter()
            .zip(weights)
            .filter(|(_, w)| self.keeps(**w))
            .map(|(p, _)| *p)
            .collect();
        self.insert_world_points(sensor_to_world, &kept);
        Ok(())
    }
}

fn check_weights(points: usize, weights: &[f64]) -> Result<(), MapError> {
    if points == weights.len() {
        Ok(())
    } else {
        Err(MapError::InvalidInput(format!(
            "{} weights for {points} points",
            weights.len()
        )))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disparity::PixelPoint;

    fn unit_tree(capacity: usize) -> Octree {
        Octree::new(
            Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
            capacity,
        )
    }

    fn small_map() -> OctreeMap {
        OctreeMap::new(OctreeMapConfig {
            bounds_min: [-10.0, -10.0, -10.0],
            bounds_max: [10.0, 10.0, 10.0],
            capacity: 4,
            max_depth: 8,
            resolution: 0.1,
            min_weight: 0.5,
        })
    }

    // ── Aabb ────────────────────────────────────────────────────────────────

    #[test]
    fn aabb_contains_boundary_point() {
        let b = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert!(b.contains_point(&Point3::new(0.0, 0.0, 0.0)));
        assert!(b.contains_point(&Point3::new(1.0, 1.0, 1.0)));
        assert!(!b.contains_point(&Point3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn aabb_overlaps_touching_boxes() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));
        let c = Aabb::new(Point3::new(2.5, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn aabb_normalises_min_max() {
        let b = Aabb::new(Point3::new(2.0, 2.0, 2.0), Point3::new(0.0, 0.0, 0.0));
        assert_eq!(b.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(b.max, Point3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn aabb_intersection_and_clipping() {
        let b = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let other = Aabb::new(Point3::new(0.5, -3.0, 0.0), Point3::new(4.0, 0.0, 0.25));
        let i = b.intersection(&other).unwrap();
        assert_eq!(i.min, Point3::new(0.5, -1.0, 0.0));
        assert_eq!(i.max, Point3::new(1.0, 0.0, 0.25));
        assert!(b.intersection(&Aabb::new(Point3::new(2.0, 2.0, 2.0), Point3::new(3.0, 3.0, 3.0))).is_none());

        let (t0, t1) = b
            .clip_segment(&Point3::new(-3.0, 0.0, 0.0), &Point3::new(5.0, 0.0, 0.0))
            .unwrap();
        assert!((t0 - 0.25).abs() < 1e-12);
        assert!((t1 - 0.5).abs() < 1e-12);
        assert_eq!(
            b.clip_segment(&Point3::new(0.0, 0.0, 0.0), &Point3::new(0.5, 0.5, 0.5)),
            Some((0.0, 1.0))
        );
        assert!(b.clip_segment(&Point3::new(-3.0, 2.0, 0.0), &Point3::new(3.0, 2.0, 0.0)).is_none());
        assert!(b.clip_segment(&Point3::origin(), &Point3::new(f64::NAN, 0.0, 0.0)).is_none());
    }

    #[test]
    fn aabb_octants_tile_the_box() {
        let b = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 4.0, 6.0));
        let octants = b.octants();
        let volume: f64 = octants.iter().map(|o| o.size().product()).sum();
        assert!((volume - 48.0).abs() < 1e-9);
        assert_eq!(octants[0].max, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(octants[7].min, Point3::new(1.0, 2.0, 3.0));
    }

    // ── Octree ──────────────────────────────────────────────────────────────

    #[test]
    fn insert_outside_bounds_is_ignored() {
        let mut tree = unit_tree(4);
        assert!(!tree.insert(Point3::new(5.0, 5.0, 5.0)));
        assert!(tree.is_empty());
    }

    #[test]
    fn subdivision_preserves_all_points() {
        let mut tree = unit_tree(2);
        let pts = [
            Point3::new(0.1, 0.1, 0.1),
            Point3::new(0.9, 0.9, 0.9),
            Point3::new(0.2, 0.8, 0.3),
            Point3::new(0.7, 0.2, 0.6),
        ];
        for &p in &pts {
            assert!(tree.insert(p));
        }
        assert_eq!(tree.len(), 4);
        let stored = tree.points();
        for p in &pts {
            assert!(stored.contains(p), "missing {p:?}");
        }
    }

    #[test]
    fn query_aabb_detects_contained_point() {
        let mut tree = unit_tree(4);
        tree.insert(Point3::new(0.5, 0.5, 0.5));
        let hit = Aabb::new(Point3::new(0.4, 0.4, 0.4), Point3::new(0.6, 0.6, 0.6));
        let miss = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(0.3, 0.3, 0.3));
        assert!(tree.query_aabb(&hit));
        assert!(!tree.query_aabb(&miss));
    }

    #[test]
    fn remove_in_clears_only_the_region() {
        let mut tree = unit_tree(2);
        for i in 0..10 {
            tree.insert(Point3::new(i as f64 * 0.1, 0.5, 0.5));
        }
        let removed = tree.remove_in(&Aabb::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.45, 1.0, 1.0),
        ));
        assert_eq!(removed, 5);
        assert_eq!(tree.len(), 5);
        assert!(tree.points().iter().all(|p| p.x > 0.45));
    }

    // ── OctreeMap ───────────────────────────────────────────────────────────

    #[test]
    fn map_reports_bounds() {
        let map = small_map();
        assert_eq!(map.map_center(), Point3::origin());
        assert_eq!(map.map_size(), Vector3::repeat(20.0));
    }

    #[test]
    fn point_queries_distinguish_free_occupied_unknown() {
        let mut map = small_map();
        let cloud = PointCloud::from_points(vec![Point3::new(1.0, 0.0, 0.0)]);
        let pose = Transformation::from_translation(Vector3::new(0.0, 0.0, 2.0));
        map.insert_pointcloud_into_map(&pose, &cloud).unwrap();

        assert_eq!(map.cell_status_point(&Point3::new(1.0, 0.0, 2.0)), CellStatus::Occupied);
        assert_eq!(map.cell_status_point(&Point3::new(1.0, 0.0, 0.0)), CellStatus::Free);
        assert_eq!(map.cell_status_point(&Point3::new(20.0, 0.0, 0.0)), CellStatus::Unknown);
    }

    #[test]
    fn weighted_insertion_respects_min_weight() {
        let mut map = small_map();
        let cloud = PointCloud::from_points(vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
        ]);
        map.insert_pointcloud_into_map_with_weights(
            &Transformation::identity(),
            &cloud,
            &[0.9, 0.1, 0.5],
        )
        .unwrap();
        assert_eq!(map.occupied_count(), 2);
        assert_eq!(map.cell_status_point(&Point3::new(2.0, 0.0, 0.0)), CellStatus::Free);
    }

    #[test]
    fn mismatched_weights_are_rejected() {
        let mut map = small_map();
        let cloud = PointCloud::from_points(vec![Point3::new(1.0, 0.0, 0.0)]);
        let err = map
            .insert_pointcloud_into_map_with_weights(&Transformation::identity(), &cloud, &[])
            .unwrap_err();
        assert!(matches!(err, MapError::InvalidInput(_)));
        assert_eq!(map.occupied_count(), 0);
    }

    #[test]
    fn disparity_points_are_transformed_to_world() {
        let mut map = small_map();
        let projected = ProjectedDisparity {
            width: 2,
            height: 1,
            disparity_scale: 1.0,
            pixels: vec![PixelPoint {
                u: 0,
                v: 0,
                disparity: 10.0,
                point: Point3::new(0.0, 0.0, 1.5),
            }],
        };
        let pose = Transformation::from_translation(Vector3::new(-1.0, 0.0, 0.0));
        map.insert_projected_disparity(&pose, &projected).unwrap();
        assert_eq!(map.occupied_points(), vec![Point3::new(-1.0, 0.0, 1.5)]);

        map.insert_projected_disparity_with_weights(&pose, &projected, &[0.2])
            .unwrap();
        assert_eq!(map.occupied_count(), 1);
    }

    #[test]
    fn set_occupied_then_set_free() {
        let mut map = small_map();
        let centre = Point3::new(2.0, 2.0, 2.0);
        let size = Vector3::repeat(0.3);

        map.set_occupied(&centre, &size);
        assert!(map.occupied_count() > 0);
        assert_eq!(map.cell_status_bounding_box(&centre, &size), CellStatus::Occupied);
        assert_eq!(map.cell_status_point(&Point3::new(2.05, 1.95, 1.95)), CellStatus::Occupied);

        map.set_free(&centre, &Vector3::repeat(0.31));
        assert_eq!(map.occupied_count(), 0);
        assert_eq!(map.cell_status_bounding_box(&centre, &size), CellStatus::Free);
    }

    #[test]
    fn bounding_box_straddling_bounds_is_unknown_unless_hit() {
        let mut map = small_map();
        let edge_point = Point3::new(9.9, 0.0, 0.0);
        assert_eq!(
            map.cell_status_bounding_box(&edge_point, &Vector3::repeat(1.0)),
            CellStatus::Unknown
        );
        map.set_occupied(&Point3::new(9.8, 0.0, 0.0), &Vector3::repeat(0.0));
        assert_eq!(
            map.cell_status_bounding_box(&edge_point, &Vector3::repeat(1.0)),
            CellStatus::Occupied
        );
    }

    #[test]
    fn far_line_queries_only_sweep_inside_the_map() {
        let mut map = small_map();
        let origin = Point3::origin();
        assert_eq!(
            map.line_status(&origin, &Point3::new(1e300, 0.0, 0.0)),
            CellStatus::Unknown
        );
        assert_eq!(
            map.line_status(&Point3::new(-1e300, 0.0, 0.0), &Point3::new(1e300, 0.0, 0.0)),
            CellStatus::Unknown
        );
        assert_eq!(
            map.line_status(&Point3::new(1e5, 1e5, 0.0), &Point3::new(2e5, 1e5, 0.0)),
            CellStatus::Unknown
        );

        map.set_occupied(&Point3::new(5.0, 0.0, 0.0), &Vector3::zeros());
        assert_eq!(
            map.line_status(&origin, &Point3::new(1e300, 0.0, 0.0)),
            CellStatus::Occupied
        );
        assert_eq!(
            map.line_status(&origin, &Point3::new(f64::INFINITY, 0.0, 0.0)),
            CellStatus::Unknown
        );
    }

    #[test]
    fn oversized_occupied_box_is_clipped_to_the_map() {
        let mut map = OctreeMap::new(OctreeMapConfig {
            bounds_min: [-1.0, -1.0, -1.0],
            bounds_max: [1.0, 1.0, 1.0],
            capacity: 8,
            max_depth: 6,
            resolution: 0.5,
            min_weight: 0.0,
        });
        map.set_occupied(&Point3::origin(), &Vector3::repeat(1e12));
        // 2 m / 0.5 m = 4 steps per axis, 5 samples each.
        assert_eq!(map.occupied_count(), 125);
        assert_eq!(map.cell_status_point(&Point3::new(0.9, -0.9, 0.0)), CellStatus::Occupied);

        map.set_occupied(&Point3::new(50.0, 0.0, 0.0), &Vector3::repeat(1.0));
        assert_eq!(map.occupied_count(), 125);
    }

    #[test]
    fn line_status_detects_obstacle_on_segment() {
        let mut map = small_map();
        map.set_occupied(&Point3::new(5.0, 0.0, 0.0), &Vector3::zeros());

        let blocked = map.line_status(&Point3::new(0.0, 0.0, 0.0), &Point3::new(8.0, 0.0, 0.0));
        assert_eq!(blocked, CellStatus::Occupied);

        let clear = map.line_status(&Point3::new(0.0, 1.0, 0.0), &Point3::new(8.0, 1.0, 0.0));
        assert_eq!(clear, CellStatus::Free);

        let leaving = map.line_status(&Point3::new(0.0, 1.0, 0.0), &Point3::new(15.0, 1.0, 0.0));
        assert_eq!(leaving, CellStatus::Unknown);

        let swept = map.line_status_bounding_box(
            &Point3::new(0.0, 1.0, 0.0),
            &Point3::new(8.0, 1.0, 0.0),
            &Vector3::repeat(2.5),
        );
        assert_eq!(swept, CellStatus::Occupied);
    }
}
