//! `volmap-cli` – insert recorded sensor data into a volumetric map.
//!
//! ```text
//! volmap disparity <file.f32> <width> <height>   raw little-endian f32 disparity
//! volmap cloud <file.xyz>                         ASCII "x y z" lines
//! volmap init                                     write a default config
//! volmap config                                   show the active config
//! ```
//!
//! Calibration, sensor pose, weighing policy and map parameters come from
//! `~/.volmap/config.toml` (see [`config`]).

mod config;

use colored::Colorize;
use nalgebra::Point3;
use std::process::ExitCode;
use tracing::{info, warn};

use volmap_perception::disparity::DisparityImage;
use volmap_perception::octree::OctreeMap;
use volmap_perception::pointcloud::PointCloud;
use volmap_perception::world::{InsertionSummary, MapBackend, VolumetricWorld};

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); VOLMAP_LOG_FORMAT=json switches to
    // newline-delimited JSON.  User-facing output still goes through println!.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("VOLMAP_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["disparity", file, width, height] => run_disparity(file, width, height),
        ["cloud", file] => run_cloud(file),
        ["init"] => run_init(),
        ["config"] => run_show_config(),
        [] | ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            Err("Unrecognised arguments".to_string())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn run_disparity(file: &str, width: &str, height: &str) -> Result<(), String> {
    let width: u32 = width
        .parse()
        .map_err(|_| format!("Invalid width '{}'", width))?;
    let height: u32 = height
        .parse()
        .map_err(|_| format!("Invalid height '{}'", height))?;

    let cfg = load_config();
    let q = cfg.stereo.reprojection_matrix()?;
    let pose = cfg.sensor_pose.transformation()?;

    let bytes = std::fs::read(file).map_err(|e| format!("Failed to read {}: {}", file, e))?;
    let disparity =
        DisparityImage::from_le_bytes(width, height, &bytes).map_err(|e| e.to_string())?;

    let mut world = build_world(&cfg);
    let summary = world
        .insert_disparity_image(&pose, &disparity, &q, &cfg.stereo.full_image_size())
        .map_err(|e| e.to_string())?;

    info!(file, width, height, valid = summary.valid_samples, "disparity inserted");
    print_summary("disparity pixels", &summary, world.backend());
    Ok(())
}

fn run_cloud(file: &str) -> Result<(), String> {
    let cfg = load_config();
    let pose = cfg.sensor_pose.transformation()?;

    let raw =
        std::fs::read_to_string(file).map_err(|e| format!("Failed to read {}: {}", file, e))?;
    let cloud = parse_xyz(&raw)?;

    let mut world = build_world(&cfg);
    let summary = world
        .insert_pointcloud(&pose, cloud)
        .map_err(|e| e.to_string())?;

    info!(file, valid = summary.valid_samples, "point cloud inserted");
    print_summary("points", &summary, world.backend());
    Ok(())
}

fn run_init() -> Result<(), String> {
    let path = config::config_path();
    if path.exists() {
        println!(
            "  Config already present at {}",
            path.display().to_string().bold()
        );
        return Ok(());
    }
    config::save(&config::Config::default())?;
    println!(
        "  {} Config saved to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(())
}

fn run_show_config() -> Result<(), String> {
    let cfg = load_config();
    let raw =
        toml::to_string_pretty(&cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    println!("{}", format!("# {}", config::config_path().display()).dimmed());
    println!("{}", raw);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Load the persisted config, falling back to defaults (with environment
/// overrides) when it is missing or broken.
fn load_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            warn!(error = %e, "using default configuration");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn build_world(cfg: &config::Config) -> VolumetricWorld<OctreeMap> {
    let mut world = VolumetricWorld::new(OctreeMap::new(cfg.octree.clone()));
    if let Some(weighing) = cfg.weighing.build() {
        world.set_weighing_function(weighing);
    }
    world
}

/// Parse whitespace-separated `x y z` lines.  Blank lines and `#` comments
/// are skipped; extra columns are ignored.
fn parse_xyz(raw: &str) -> Result<PointCloud, String> {
    let mut points = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let coords: Vec<f64> = line
            .split_whitespace()
            .take(3)
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|e| format!("Line {}: {}", lineno + 1, e))?;
        let &[x, y, z] = coords.as_slice() else {
            return Err(format!("Line {}: expected 3 coordinates", lineno + 1));
        };
        points.push(Point3::new(x, y, z));
    }
    Ok(PointCloud::from_points(points))
}

fn print_summary(unit: &str, summary: &InsertionSummary, map: &OctreeMap) {
    println!();
    println!("{}", "  Insertion summary".bold().cyan());
    println!(
        "    {} {} of {} valid",
        summary.valid_samples.to_string().bold(),
        unit,
        summary.total_samples
    );
    println!(
        "    weighting: {}",
        if summary.weighted { "on".green() } else { "off".dimmed() }
    );
    println!(
        "    occupied samples in map: {}",
        map.occupied_count().to_string().bold()
    );
    let (c, s) = (map.map_center(), map.map_size());
    println!(
        "    map centre ({:.2}, {:.2}, {:.2}), size {:.2} x {:.2} x {:.2} m",
        c.x, c.y, c.z, s.x, s.y, s.z
    );
}

fn print_usage() {
    println!("{}", "volmap – volumetric map insertion".bold().cyan());
    println!();
    println!("  {} <file> <width> <height>", "volmap disparity".bold());
    println!("      insert a raw little-endian f32 disparity image");
    println!("  {} <file>", "volmap cloud".bold());
    println!("      insert an ASCII point file (x y z per line)");
    println!("  {}", "volmap init".bold());
    println!("      write a default config to {}", config::config_path().display());
    println!("  {}", "volmap config".bold());
    println!("      print the active configuration");
}
