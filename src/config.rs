use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub follower: FollowerConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

/// Orientation EMA mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationBlend {
    /// `a + (b - a) * f` on the raw angle; snaps near ±π
    Linear,
    /// blend along the shortest arc
    Shortest,
}

impl Default for OrientationBlend {
    fn default() -> Self {
        Self::Linear
    }
}

/// Follower tuning. Read once per frame as a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FollowerConfig {
    /// EMA factor for the anchor position
    #[serde(default = "default_position_smoothing")]
    pub position_smoothing: f32,
    /// EMA factor for scale
    #[serde(default = "default_scale_smoothing")]
    pub scale_smoothing: f32,
    /// EMA factor for orientation
    #[serde(default = "default_orientation_smoothing")]
    pub orientation_smoothing: f32,
    #[serde(default = "default_min_scale")]
    pub min_scale: f32,
    #[serde(default = "default_max_scale")]
    pub max_scale: f32,
    /// Distance behind the anchor (world units)
    #[serde(default = "default_behind_distance")]
    pub behind_distance: f32,
    /// Height above the anchor (world units)
    #[serde(default = "default_height_offset")]
    pub height_offset: f32,
    /// Physics step rate at the 60 Hz baseline
    #[serde(default = "default_smoothing_rate")]
    pub smoothing_rate: f32,
    #[serde(default)]
    pub orientation_blend: OrientationBlend,
}

fn default_position_smoothing() -> f32 { 0.3 }
fn default_scale_smoothing() -> f32 { 0.1 }
fn default_orientation_smoothing() -> f32 { 0.2 }
fn default_min_scale() -> f32 { 0.1 }
fn default_max_scale() -> f32 { 3.8 }
fn default_behind_distance() -> f32 { 0.5 }
fn default_height_offset() -> f32 { 0.5 }
fn default_smoothing_rate() -> f32 { 0.05 }

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            position_smoothing: default_position_smoothing(),
            scale_smoothing: default_scale_smoothing(),
            orientation_smoothing: default_orientation_smoothing(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            behind_distance: default_behind_distance(),
            height_offset: default_height_offset(),
            smoothing_rate: default_smoothing_rate(),
            orientation_blend: OrientationBlend::default(),
        }
    }
}

/// Frame size used when a recorded frame does not carry its own
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Consecutive upstream failures tolerated before the loop halts
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

fn default_max_consecutive_failures() -> u32 { 5 }
fn default_log_dir() -> String { "logs".to_string() }

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_consecutive_failures(),
            log_dir: default_log_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    /// ChArUco dictionary (e.g. "DICT_5X5_1000")
    #[serde(default = "default_dictionary")]
    pub dictionary: String,
    #[serde(default = "default_squares_x")]
    pub squares_x: i32,
    #[serde(default = "default_squares_y")]
    pub squares_y: i32,
    /// Square side (meters)
    #[serde(default = "default_square_length")]
    pub square_length: f32,
    /// Marker side (meters)
    #[serde(default = "default_marker_length")]
    pub marker_length: f32,
    /// Where captured calibration images live
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    /// Where calibration results are written
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// ChArUco corners needed for an image to count
    #[serde(default = "default_min_corners")]
    pub min_corners: i32,
    /// Usable images needed to calibrate
    #[serde(default = "default_min_images")]
    pub min_images: usize,
    /// ArUco markers needed before a capture is saved
    #[serde(default = "default_capture_min_markers")]
    pub capture_min_markers: i32,
    /// Corners both cameras must share for a stereo pair to count
    #[serde(default = "default_min_common_corners")]
    pub min_common_corners: usize,
    /// Usable stereo pairs needed to fit the homography
    #[serde(default = "default_min_pairs")]
    pub min_pairs: usize,
    /// RANSAC reprojection threshold (pixels)
    #[serde(default = "default_ransac_threshold")]
    pub ransac_threshold: f64,
}

fn default_dictionary() -> String { "DICT_5X5_1000".to_string() }
fn default_squares_x() -> i32 { 7 }
fn default_squares_y() -> i32 { 5 }
fn default_square_length() -> f32 { 0.035 }
fn default_marker_length() -> f32 { 0.028 }
fn default_image_dir() -> String { "scans".to_string() }
fn default_output_dir() -> String { "data".to_string() }
fn default_min_corners() -> i32 { 8 }
fn default_min_images() -> usize { 5 }
fn default_capture_min_markers() -> i32 { 4 }
fn default_min_common_corners() -> usize { 8 }
fn default_min_pairs() -> usize { 3 }
fn default_ransac_threshold() -> f64 { 5.0 }

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            dictionary: default_dictionary(),
            squares_x: default_squares_x(),
            squares_y: default_squares_y(),
            square_length: default_square_length(),
            marker_length: default_marker_length(),
            image_dir: default_image_dir(),
            output_dir: default_output_dir(),
            min_corners: default_min_corners(),
            min_images: default_min_images(),
            capture_min_markers: default_capture_min_markers(),
            min_common_corners: default_min_common_corners(),
            min_pairs: default_min_pairs(),
            ransac_threshold: default_ransac_threshold(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        Ok(config)
    }

    /// Defaults when the file is missing or invalid
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{:#} (using defaults)", e);
                Self::default()
            }
        }
    }
}
