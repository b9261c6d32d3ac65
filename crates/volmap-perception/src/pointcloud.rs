//! Point clouds and raw point-cloud buffers.
//!
//! A [`PointCloudMessage`] is the raw, self-describing buffer a driver emits:
//! a list of named fields with byte offsets and datatypes, a fixed stride per
//! point, and the packed bytes.  [`PointCloud::from_message`] pulls the
//! `x`, `y` and `z` fields out into the canonical [`PointCloud`] container.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use volmap_types::MapError;

/// Datatype of one field of a [`PointCloudMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointFieldType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl PointFieldType {
    pub fn size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

/// Layout of one named field inside each point record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointField {
    pub name: String,
    /// Byte offset from the start of the point record.
    pub offset: usize,
    pub datatype: PointFieldType,
}

impl PointField {
    pub fn new(name: &str, offset: usize, datatype: PointFieldType) -> Self {
        Self {
            name: name.to_string(),
            offset,
            datatype,
        }
    }
}

/// A packed point-cloud buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudMessage {
    pub frame_id: String,
    pub width: u32,
    pub height: u32,
    pub fields: Vec<PointField>,
    pub is_bigendian: bool,
    /// Bytes per point record.
    pub point_step: usize,
    /// Bytes per row.
    pub row_step: usize,
    pub data: Vec<u8>,
}

impl PointCloudMessage {
    /// Pack `points` as an unorganised cloud of little-endian `f32` xyz
    /// records.
    pub fn from_points_f32(frame_id: &str, points: &[Point3<f32>]) -> Self {
        let data = points
            .iter()
            .flat_map(|p| [p.x, p.y, p.z])
            .flat_map(f32::to_le_bytes)
            .collect();
        Self {
            frame_id: frame_id.to_string(),
            width: points.len() as u32,
            height: 1,
            fields: vec![
                PointField::new("x", 0, PointFieldType::Float32),
                PointField::new("y", 4, PointFieldType::Float32),
                PointField::new("z", 8, PointFieldType::Float32),
            ],
            is_bigendian: false,
            point_step: 12,
            row_step: 12 * points.len(),
            data,
        }
    }

    fn field(&self, name: &str) -> Result<&PointField, MapError> {
        let field = self
            .fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| MapError::InvalidInput(format!("point cloud has no '{name}' field")))?;
        if !matches!(field.datatype, PointFieldType::Float32 | PointFieldType::Float64) {
            return Err(MapError::InvalidInput(format!(
                "field '{name}' has unsupported datatype {:?}",
                field.datatype
            )));
        }
        let end = field.offset.checked_add(field.datatype.size());
        if end.is_none_or(|end| end > self.point_step) {
            return Err(MapError::InvalidInput(format!(
                "field '{name}' overruns the {}-byte point record",
                self.point_step
            )));
        }
        Ok(field)
    }

    fn read(&self, record: &[u8], field: &PointField) -> f64 {
        let bytes = &record[field.offset..field.offset + field.datatype.size()];
        match field.datatype {
            PointFieldType::Float64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                if self.is_bigendian {
                    f64::from_be_bytes(raw)
                } else {
                    f64::from_le_bytes(raw)
                }
            }
            _ => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                f64::from(if self.is_bigendian {
                    f32::from_be_bytes(raw)
                } else {
                    f32::from_le_bytes(raw)
                })
            }
        }
    }
}

/// An ordered collection of 3-D points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<Point3<f64>>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    /// Decode the `x`, `y`, `z` fields of a packed buffer.
    ///
    /// Invalid points are kept; call [`retain_finite`][Self::retain_finite]
    /// to drop them.
    ///
    /// # Errors
    ///
    /// [`MapError::InvalidInput`] when a coordinate field is missing or not
    /// floating point, or when the buffer is shorter than its header claims.
    pub fn from_message(msg: &PointCloudMessage) -> Result<Self, MapError> {
        let (fx, fy, fz) = (msg.field("x")?, msg.field("y")?, msg.field("z")?);
        let width = msg.width as usize;
        let height = msg.height as usize;
        let overflow = || MapError::InvalidInput("point cloud header sizes overflow".to_string());

        let row_bytes = width.checked_mul(msg.point_step).ok_or_else(overflow)?;
        if msg.row_step < row_bytes {
            return Err(MapError::InvalidInput(format!(
                "row step {} is smaller than {width} points of {} bytes",
                msg.row_step, msg.point_step
            )));
        }
        let needed = match height.checked_sub(1) {
            None => 0,
            Some(last_row) => last_row
                .checked_mul(msg.row_step)
                .and_then(|n| n.checked_add(row_bytes))
                .ok_or_else(overflow)?,
        };
        if msg.data.len() < needed {
            return Err(MapError::InvalidInput(format!(
                "point cloud buffer holds {} bytes, header needs {needed}",
                msg.data.len()
            )));
        }

        let mut points = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                let start = row * msg.row_step + col * msg.point_step;
                let record = &msg.data[start..start + msg.point_step];
                points.push(Point3::new(
                    msg.read(record, fx),
                    msg.read(record, fy),
                    msg.read(record, fz),
                ));
            }
        }
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drop every point with a NaN or infinite coordinate. Returns how many
    /// were removed.
    pub fn retain_finite(&mut self) -> usize {
        let before = self.points.len();
        self.points
            .retain(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite());
        before - self.points.len()
    }
}
