//! Mapper configuration – reads/writes `~/.volmap/config.toml`.

use nalgebra::{Quaternion, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use volmap_perception::camera::CameraIntrinsics;
use volmap_perception::octree::OctreeMapConfig;
use volmap_perception::reprojection::ReprojectionMatrix;
use volmap_perception::transform::Transformation;
use volmap_perception::weighing::WeighingConfig;

/// Stereo rig calibration for the full-resolution images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoConfig {
    #[serde(default = "default_intrinsics")]
    pub left: CameraIntrinsics,
    #[serde(default = "default_intrinsics")]
    pub right: CameraIntrinsics,
    /// Distance between the two optical centres, metres.  The right camera
    /// sits at `+baseline` along the left camera's x axis.
    #[serde(default = "default_baseline")]
    pub baseline: f64,
    #[serde(default = "default_image_width")]
    pub image_width: u32,
    #[serde(default = "default_image_height")]
    pub image_height: u32,
}

fn default_intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0)
}
fn default_baseline() -> f64 {
    0.1
}
fn default_image_width() -> u32 {
    640
}
fn default_image_height() -> u32 {
    480
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            left: default_intrinsics(),
            right: default_intrinsics(),
            baseline: default_baseline(),
            image_width: default_image_width(),
            image_height: default_image_height(),
        }
    }
}

impl StereoConfig {
    pub fn full_image_size(&self) -> Vector2<f64> {
        Vector2::new(f64::from(self.image_width), f64::from(self.image_height))
    }

    /// Reprojection matrix for the full-resolution images.
    pub fn reprojection_matrix(&self) -> Result<ReprojectionMatrix, String> {
        // Left camera frame expressed in the right camera frame.
        let t_c1_c0 = Transformation::from_translation(Vector3::new(-self.baseline, 0.0, 0.0));
        ReprojectionMatrix::for_cameras(
            &t_c1_c0,
            &self.left.to_matrix(),
            &self.right.to_matrix(),
            &self.full_image_size(),
        )
        .map_err(|e| format!("Invalid stereo calibration: {}", e))
    }
}

/// Sensor-to-world pose applied to every insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPoseConfig {
    #[serde(default)]
    pub translation: [f64; 3],
    /// Quaternion as `[x, y, z, w]`.
    #[serde(default = "default_rotation")]
    pub rotation: [f64; 4],
}

fn default_rotation() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl Default for SensorPoseConfig {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: default_rotation(),
        }
    }
}

impl SensorPoseConfig {
    pub fn transformation(&self) -> Result<Transformation, String> {
        let [x, y, z, w] = self.rotation;
        let q = Quaternion::new(w, x, y, z);
        if !(q.norm() > 1e-9) {
            return Err("Sensor pose rotation must be a non-zero quaternion".to_string());
        }
        Ok(Transformation::new(
            Vector3::from(self.translation),
            UnitQuaternion::from_quaternion(q),
        ))
    }
}

/// Persisted mapper configuration stored in `~/.volmap/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stereo: StereoConfig,
    #[serde(default)]
    pub sensor_pose: SensorPoseConfig,
    #[serde(default)]
    pub weighing: WeighingConfig,
    #[serde(default)]
    pub octree: OctreeMapConfig,
}

/// Return the path to `~/.volmap/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".volmap").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `VOLMAP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VOLMAP_MIN_WEIGHT` | `octree.min_weight` |
/// | `VOLMAP_RESOLUTION` | `octree.resolution` |
/// | `VOLMAP_WEIGHING` | `weighing` (`none`, `constant`, `inverse_square_range`) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("VOLMAP_MIN_WEIGHT")
        && let Ok(w) = v.parse::<f64>()
    {
        cfg.octree.min_weight = w;
    }
    if let Ok(v) = std::env::var("VOLMAP_RESOLUTION")
        && let Ok(r) = v.parse::<f64>()
        && r > 0.0
    {
        cfg.octree.resolution = r;
    }
    if let Ok(v) = std::env::var("VOLMAP_WEIGHING")
        && let Some(weighing) = weighing_from_name(&v, &cfg.stereo)
    {
        cfg.weighing = weighing;
    }
}

/// Stock policy for a short name, parameterised from the stereo rig.
pub(crate) fn weighing_from_name(name: &str, stereo: &StereoConfig) -> Option<WeighingConfig> {
    match name.trim() {
        "none" => Some(WeighingConfig::None),
        "constant" => Some(WeighingConfig::Constant { weight: 1.0 }),
        "inverse_square_range" => Some(WeighingConfig::InverseSquareRange {
            reference_range: 1.0,
            min_weight: 0.01,
            focal_baseline: stereo.left.fx * stereo.baseline,
        }),
        _ => None,
    }
}

/// Save the config to disk, creating `~/.volmap/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.stereo, StereoConfig::default());
        assert_eq!(loaded.sensor_pose, SensorPoseConfig::default());
        assert_eq!(loaded.octree.capacity, cfg.octree.capacity);
    }

    #[test]
    fn roundtrip_weighing_section() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.weighing = WeighingConfig::InverseSquareRange {
            reference_range: 2.0,
            min_weight: 0.1,
            focal_baseline: 50.0,
        };
        save_to(&cfg, &path).expect("save");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("[weighing]"));
        assert!(raw.contains("kind = \"inverse_square_range\""));
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.weighing, cfg.weighing);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[stereo]\nbaseline = 0.25\n\n[octree]\nresolution = 0.2\n")
            .expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert!((loaded.stereo.baseline - 0.25).abs() < 1e-12);
        assert_eq!(loaded.stereo.image_width, 640);
        assert!((loaded.octree.resolution - 0.2).abs() < 1e-12);
        assert_eq!(loaded.weighing, WeighingConfig::None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[stereo\nbaseline = ").expect("write");
        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_volmap_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".volmap"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn default_stereo_yields_expected_depth() {
        let q = StereoConfig::default().reprojection_matrix().expect("valid rig");
        let p = q.reproject(320.0, 240.0, 40.0).expect("finite point");
        assert!((p.z - 1.25).abs() < 1e-9);
    }

    #[test]
    fn zero_baseline_is_rejected() {
        let stereo = StereoConfig {
            baseline: 0.0,
            ..StereoConfig::default()
        };
        let err = stereo.reprojection_matrix().unwrap_err();
        assert!(err.starts_with("Invalid stereo calibration"));
    }

    #[test]
    fn sensor_pose_builds_transformation() {
        let half = std::f64::consts::FRAC_1_SQRT_2;
        let pose = SensorPoseConfig {
            translation: [1.0, 2.0, 3.0],
            // 90° about z.
            rotation: [0.0, 0.0, half, half],
        };
        let t = pose.transformation().expect("valid pose");
        let p = t.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert!((p - Point3::new(1.0, 3.0, 3.0)).norm() < 1e-9);

        let zero = SensorPoseConfig {
            rotation: [0.0; 4],
            ..SensorPoseConfig::default()
        };
        assert!(zero.transformation().is_err());
    }

    #[test]
    fn apply_env_overrides_changes_min_weight() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("VOLMAP_MIN_WEIGHT", "0.35") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!((cfg.octree.min_weight - 0.35).abs() < 1e-12);
        unsafe { std::env::remove_var("VOLMAP_MIN_WEIGHT") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_resolution() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("VOLMAP_RESOLUTION", "-1") };
        let mut cfg = Config::default();
        let original = cfg.octree.resolution;
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.octree.resolution, original);
        unsafe { std::env::remove_var("VOLMAP_RESOLUTION") };
    }

    #[test]
    fn weighing_names_map_to_policies() {
        let stereo = StereoConfig::default();
        assert_eq!(weighing_from_name("none", &stereo), Some(WeighingConfig::None));
        assert_eq!(
            weighing_from_name(" constant ", &stereo),
            Some(WeighingConfig::Constant { weight: 1.0 })
        );
        match weighing_from_name("inverse_square_range", &stereo) {
            Some(WeighingConfig::InverseSquareRange { focal_baseline, .. }) => {
                assert!((focal_baseline - 50.0).abs() < 1e-9);
            }
            other => panic!("unexpected policy: {other:?}"),
        }
        assert_eq!(weighing_from_name("bogus", &stereo), None);
    }
}
