//! Renders the configured ChArUco board as a printable A4 PNG.
//!
//! Usage: generate_board [output.png] [config.toml]

use anyhow::{Context, Result};
use opencv::core::{Mat, Size, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;

use balloon_follower::calibration::create_board;
use balloon_follower::config::Config;

const CONFIG_PATH: &str = "config.toml";
/// A4 landscape at ~300 DPI
const A4_WIDTH_PX: i32 = 2480;
const A4_HEIGHT_PX: i32 = 1754;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let output = args.first().cloned().unwrap_or_else(|| "charuco_A4.png".to_string());
    let config_path = args.get(1).map(String::as_str).unwrap_or(CONFIG_PATH);

    let config = Config::load_or_default(config_path);
    let cal = &config.calibration;
    let board = create_board(cal)?;

    let margin = 0;
    let border_bits = 1;
    let mut image = Mat::default();
    board
        .generate_image(Size::new(A4_WIDTH_PX, A4_HEIGHT_PX), &mut image, margin, border_bits)
        .context("Failed to render board")?;

    imgcodecs::imwrite(&output, &image, &Vector::new())
        .with_context(|| format!("Failed to write {}", output))?;

    println!("ChArUco board saved to: {}", output);
    println!("  Board size: {}x{} pixels", image.cols(), image.rows());
    println!("  Squares: {}x{}, dictionary {}", cal.squares_x, cal.squares_y, cal.dictionary);
    println!("  Square size: {}m, marker size: {}m", cal.square_length, cal.marker_length);
    println!("  Print on A4 and measure one square; adjust square_length if it differs");

    Ok(())
}
