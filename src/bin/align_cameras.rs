//! Fits the source→target homography from captured stereo pairs.
//!
//! Usage: align_cameras [source_name] [target_name] [config.toml]
//!
//! Reads `<image_dir>/pair0_NNN.png` (source) and `pair1_NNN.png` (target)
//! and writes `<output_dir>/<source>_to_<target>_homography.json`.

use anyhow::{bail, Result};
use std::path::Path;

use balloon_follower::alignment::{homography_path, list_pairs, save_homography, PairResult};
use balloon_follower::calibration::{align_from_pairs, create_board, create_detector};
use balloon_follower::config::Config;
use balloon_follower::log;
use balloon_follower::logging::open_log_file;

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let source = args.first().map(String::as_str).unwrap_or("source");
    let target = args.get(1).map(String::as_str).unwrap_or("target");
    let config = Config::load_or_default(args.get(2).map(String::as_str).unwrap_or(CONFIG_PATH));
    let cal = &config.calibration;
    let logfile = open_log_file(&config.driver.log_dir, "align").ok();

    log!(logfile.as_ref(), "=== {} -> {} alignment ===", source, target);

    let pairs = list_pairs(Path::new(&cal.image_dir))?;
    if pairs.is_empty() {
        bail!("No stereo pairs (pair0_*.png) in {}", cal.image_dir);
    }
    log!(logfile.as_ref(), "Found {} stereo pairs", pairs.len());

    let board = create_board(cal)?;
    let detector = create_detector(&board)?;
    let run = align_from_pairs(source, target, &pairs, &detector, cal)?;

    for (pair, result) in &run.per_pair {
        match result {
            PairResult::Used { common } => {
                log!(logfile.as_ref(), "  pair {:03}: {} common points", pair.index, common)
            }
            PairResult::TooFewCommon { common } => log!(
                logfile.as_ref(),
                "  pair {:03}: only {} common points (need {})",
                pair.index, common, cal.min_common_corners
            ),
            PairResult::TooFewCorners { source, target } => log!(
                logfile.as_ref(),
                "  pair {:03}: board not found in both views ({} / {} corners)",
                pair.index, source, target
            ),
            PairResult::MissingTarget => {
                log!(logfile.as_ref(), "  pair {:03}: pair1 image missing", pair.index)
            }
            PairResult::Unreadable => log!(logfile.as_ref(), "  pair {:03}: unreadable", pair.index),
        }
    }

    let Some(homography) = run.homography else {
        let used = run
            .per_pair
            .iter()
            .filter(|(_, r)| matches!(r, PairResult::Used { .. }))
            .count();
        bail!(
            "Alignment failed: {} usable pairs (need {}). Check the captured pairs.",
            used,
            cal.min_pairs
        );
    };

    let out = homography_path(&cal.output_dir, source, target);
    save_homography(&out, &homography)?;

    let m = &homography.matrix;
    log!(
        logfile.as_ref(),
        "Fitted from {} pairs, {} points, {} inliers ({:.0}%)",
        homography.pair_count,
        homography.point_count,
        homography.inlier_count,
        100.0 * homography.inlier_count as f64 / homography.point_count.max(1) as f64
    );
    for row in m.chunks(3) {
        log!(logfile.as_ref(), "  [{:10.4} {:10.4} {:10.4}]", row[0], row[1], row[2]);
    }
    log!(
        logfile.as_ref(),
        "  {}x{} -> {}x{}",
        homography.source_width, homography.source_height,
        homography.target_width, homography.target_height
    );
    log!(logfile.as_ref(), "Saved {}", out.display());
    Ok(())
}
