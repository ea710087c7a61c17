//! Intrinsic calibration from captured ChArUco images.
//!
//! Usage: calibrate <prefix> [prefix ...]
//!
//! Each prefix reads `<image_dir>/cal_<prefix>_*.png` and writes
//! `<output_dir>/<prefix>_intrinsics.json`. A camera that fails is reported
//! in the summary; the others still run.

use anyhow::{bail, Result};
use opencv::objdetect::{CharucoBoard, CharucoDetector};
use std::path::Path;

use balloon_follower::calibration::{
    calibrate_from_images, create_board, create_detector, intrinsics_path,
    list_calibration_images, save_intrinsics, ImageResult,
};
use balloon_follower::config::{CalibrationConfig, Config};
use balloon_follower::log;
use balloon_follower::logging::{open_log_file, LogFile};

const CONFIG_PATH: &str = "config.toml";

/// RMS error of the saved calibration, `None` when there was not enough data
fn calibrate_prefix(
    prefix: &str,
    board: &CharucoBoard,
    detector: &CharucoDetector,
    cal: &CalibrationConfig,
    logfile: Option<&LogFile>,
) -> Result<Option<f64>> {
    let paths = list_calibration_images(Path::new(&cal.image_dir), prefix)?;
    if paths.is_empty() {
        log!(logfile, "No calibration images for {} in {}", prefix, cal.image_dir);
        return Ok(None);
    }
    log!(logfile, "Processing {} images", paths.len());

    let run = calibrate_from_images(prefix, &paths, board, detector, cal)?;
    for (path, result) in &run.per_image {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        match result {
            ImageResult::Used { corners } => log!(logfile, "  {}: {} corners", name, corners),
            ImageResult::TooFewCorners { corners } => log!(
                logfile,
                "  {}: not enough corners ({}, need {})",
                name, corners, cal.min_corners
            ),
            ImageResult::Unreadable => log!(logfile, "  {}: unreadable", name),
        }
    }

    let Some(intrinsics) = run.intrinsics else {
        log!(logfile, "Not enough valid images for {} (need {})", prefix, cal.min_images);
        return Ok(None);
    };

    let out = intrinsics_path(cal, prefix);
    save_intrinsics(&out, &intrinsics)?;
    let k = &intrinsics.intrinsic_matrix;
    log!(
        logfile,
        "{} calibrated from {} images, RMS {:.4} px",
        prefix, intrinsics.image_count, intrinsics.reprojection_error
    );
    log!(logfile, "  fx={:.2} fy={:.2} cx={:.2} cy={:.2}", k[0], k[4], k[2], k[5]);
    log!(logfile, "  dist={:?}", intrinsics.dist_coeffs);
    log!(logfile, "  saved {}", out.display());
    Ok(Some(intrinsics.reprojection_error))
}

/// One summary entry per prefix. Errors are logged and count as a failure.
fn calibrate_all(
    prefixes: &[String],
    board: &CharucoBoard,
    detector: &CharucoDetector,
    cal: &CalibrationConfig,
    logfile: Option<&LogFile>,
) -> Vec<(String, Option<f64>)> {
    prefixes
        .iter()
        .map(|prefix| {
            log!(logfile, "");
            log!(logfile, "--- {} ---", prefix);
            let error = match calibrate_prefix(prefix, board, detector, cal, logfile) {
                Ok(error) => error,
                Err(e) => {
                    log!(logfile, "{} failed: {:#}", prefix, e);
                    None
                }
            };
            (prefix.clone(), error)
        })
        .collect()
}

fn main() -> Result<()> {
    let prefixes: Vec<String> = std::env::args().skip(1).collect();
    if prefixes.is_empty() {
        bail!("usage: calibrate <prefix> [prefix ...]");
    }

    let config = Config::load_or_default(CONFIG_PATH);
    let cal = &config.calibration;
    let logfile = open_log_file(&config.driver.log_dir, "calibrate").ok();

    log!(logfile.as_ref(), "=== ChArUco intrinsic calibration ===");
    log!(
        logfile.as_ref(),
        "Board: {} {}x{}, square {}m, marker {}m",
        cal.dictionary, cal.squares_x, cal.squares_y, cal.square_length, cal.marker_length
    );

    let board = create_board(cal)?;
    let detector = create_detector(&board)?;
    let summary = calibrate_all(&prefixes, &board, &detector, cal, logfile.as_ref());

    log!(logfile.as_ref(), "");
    log!(logfile.as_ref(), "=== Summary ===");
    for (prefix, error) in &summary {
        match error {
            Some(e) => log!(logfile.as_ref(), "  {}: OK (RMS {:.4} px)", prefix, e),
            None => log!(logfile.as_ref(), "  {}: FAILED", prefix),
        }
    }

    if summary.iter().all(|(_, e)| e.is_some()) {
        log!(logfile.as_ref(), "All cameras calibrated");
    } else {
        log!(logfile.as_ref(), "Calibration incomplete. Check the captured images.");
    }
    Ok(())
}
