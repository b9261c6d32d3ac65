//! Disparity images and their projection to sensor-frame 3-D points.
//!
//! [`project_disparity`] rescales the full-resolution reprojection matrix to
//! the image at hand and reprojects every pixel carrying a finite, positive
//! disparity.  Pixels without depth are dropped, not zero-filled, so the
//! resulting [`ProjectedDisparity`] only holds valid samples.

use nalgebra::{Point3, Vector2};
use serde::{Deserialize, Serialize};
use volmap_types::MapError;

use crate::reprojection::ReprojectionMatrix;

/// A single-channel floating-point disparity image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityImage {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DisparityImage {
    /// Wrap a row-major buffer of `width * height` disparities.
    ///
    /// # Errors
    ///
    /// [`MapError::InvalidInput`] when the buffer length does not match.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, MapError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(MapError::InvalidInput(format!(
                "disparity buffer holds {} values, expected {width}x{height} = {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// An image with every pixel set to `value`.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Decode a raw little-endian `f32` image buffer.
    ///
    /// # Errors
    ///
    /// [`MapError::InvalidInput`] when `bytes` is not exactly
    /// `width * height * 4` bytes long.
    pub fn from_le_bytes(width: u32, height: u32, bytes: &[u8]) -> Result<Self, MapError> {
        if bytes.len() % 4 != 0 {
            return Err(MapError::InvalidInput(format!(
                "raw disparity buffer length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)` as floating point.
    pub fn size(&self) -> Vector2<f64> {
        Vector2::new(f64::from(self.width), f64::from(self.height))
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len()
    }

    pub fn get(&self, u: u32, v: u32) -> Option<f32> {
        if u >= self.width || v >= self.height {
            return None;
        }
        self.data.get(v as usize * self.width as usize + u as usize).copied()
    }

    pub fn set(&mut self, u: u32, v: u32, value: f32) {
        if u >= self.width || v >= self.height {
            return;
        }
        let idx = v as usize * self.width as usize + u as usize;
        if let Some(cell) = self.data.get_mut(idx) {
            *cell = value;
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// True when `d` carries depth: finite and strictly positive.
pub fn is_valid_disparity(d: f32) -> bool {
    d.is_finite() && d > 0.0
}

/// A disparity image as delivered by a stereo pipeline, with the search
/// range the matcher used.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityMessage {
    /// Frame the disparity was computed in.
    pub frame_id: String,
    pub image: DisparityImage,
    /// Smallest disparity the matcher could report, image pixels.
    pub min_disparity: f32,
    /// Largest disparity the matcher could report, image pixels.
    pub max_disparity: f32,
}

impl DisparityMessage {
    /// True when `[min_disparity, max_disparity]` is a usable finite range.
    pub fn has_range(&self) -> bool {
        self.min_disparity.is_finite()
            && self.max_disparity.is_finite()
            && self.min_disparity < self.max_disparity
    }

    /// The image with every disparity outside the matcher range marked
    /// invalid.  Without a usable range the image is returned as is.
    pub fn range_filtered_image(&self) -> DisparityImage {
        let mut image = self.image.clone();
        if self.has_range() {
            let (lo, hi) = (self.min_disparity, self.max_disparity);
            for d in image.data.iter_mut().filter(|d| !(**d >= lo && **d <= hi)) {
                *d = f32::NAN;
            }
        }
        image
    }
}

/// One reprojected disparity pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub u: u32,
    pub v: u32,
    pub disparity: f32,
    /// Position in the sensor frame.
    pub point: Point3<f64>,
}

/// Valid reprojected pixels of one disparity image, in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedDisparity {
    pub width: u32,
    pub height: u32,
    /// `full_width / width`: converts this image's disparities to
    /// full-resolution pixels.
    pub disparity_scale: f64,
    pub pixels: Vec<PixelPoint>,
}

impl ProjectedDisparity {
    /// Disparity of `pixel` in full-resolution pixels.
    pub fn full_resolution_disparity(&self, pixel: &PixelPoint) -> f32 {
        (f64::from(pixel.disparity) * self.disparity_scale) as f32
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Sensor-frame points, in pixel order.
    pub fn points(&self) -> impl Iterator<Item = Point3<f64>> + '_ {
        self.pixels.iter().map(|p| p.point)
    }
}

/// Reproject `disparity` to sensor-frame points.
///
/// `q_full` is valid for `full_image_size`; it is rescaled when the image
/// resolution differs.
///
/// # Errors
///
/// [`MapError::InvalidInput`] for an empty image or a non-positive full size.
pub fn project_disparity(
    disparity: &DisparityImage,
    q_full: &ReprojectionMatrix,
    full_image_size: &Vector2<f64>,
) -> Result<ProjectedDisparity, MapError> {
    let q = q_full.scaled_to(full_image_size, &disparity.size())?;
    let disparity_scale = full_image_size.x / f64::from(disparity.width);

    let mut pixels = Vec::with_capacity(disparity.pixel_count());
    for v in 0..disparity.height {
        for u in 0..disparity.width {
            let Some(d) = disparity.get(u, v).filter(|d| is_valid_disparity(*d)) else {
                continue;
            };
            if let Some(point) = q.reproject(f64::from(u), f64::from(v), f64::from(d)) {
                pixels.push(PixelPoint {
                    u,
                    v,
                    disparity: d,
                    point,
                });
            }
        }
    }

    Ok(ProjectedDisparity {
        width: disparity.width,
        height: disparity.height,
        disparity_scale,
        pixels,
    })
}
