//! Live preview of a fitted homography: the warped source camera next to
//! the target camera (or the unwarped source when no target is given).
//!
//! Usage: preview_alignment <homography.json> <source_camera> [target_camera] [config.toml]
//!
//! [S] saves the current warped/reference frames to `<image_dir>`. [Q] / [Esc] quits.

use anyhow::{bail, Context, Result};
use opencv::core::{Mat, Point, Scalar, Size, Vector};
use opencv::{imgcodecs, imgproc, prelude::*};
use std::path::Path;
use std::thread;
use std::time::Duration;

use balloon_follower::alignment::load_homography;
use balloon_follower::calibration::warp_frame;
use balloon_follower::camera::ThreadedCamera;
use balloon_follower::config::Config;
use balloon_follower::driver::{DriveStatus, FailureBudget};
use balloon_follower::log;
use balloon_follower::logging::open_log_file;
use balloon_follower::render::{Key, MinifbRenderer};

const CONFIG_PATH: &str = "config.toml";
const CELL_W: usize = 960;
const CELL_H: usize = 540;

fn to_cell(frame: &Mat, label: &str) -> Result<Mat> {
    let mut cell = Mat::default();
    imgproc::resize(
        frame,
        &mut cell,
        Size::new(CELL_W as i32, CELL_H as i32),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    imgproc::put_text(
        &mut cell, label,
        Point::new(10, 30),
        imgproc::FONT_HERSHEY_SIMPLEX, 0.8,
        Scalar::new(0.0, 255.0, 0.0, 0.0), 2, imgproc::LINE_8, false,
    )?;
    Ok(cell)
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: preview_alignment <homography.json> <source_camera> [target_camera] [config.toml]");
    }
    let homography = load_homography(&args[0])?;
    let source_index: i32 = args[1]
        .parse()
        .with_context(|| format!("Invalid camera index: {}", args[1]))?;
    let target_index: Option<i32> = match args.get(2) {
        Some(s) => Some(s.parse().with_context(|| format!("Invalid camera index: {}", s))?),
        None => None,
    };
    let config = Config::load_or_default(args.get(3).map(String::as_str).unwrap_or(CONFIG_PATH));
    let logfile = open_log_file(&config.driver.log_dir, "preview").ok();
    let image_dir = Path::new(&config.calibration.image_dir);
    std::fs::create_dir_all(image_dir)?;

    let source_cam = ThreadedCamera::start(source_index, Some(1920), Some(1080), Some(30))?;
    let target_cam = match target_index {
        Some(index) => Some(ThreadedCamera::start(index, Some(1920), Some(1080), Some(30))?),
        None => None,
    };

    // warp into the target camera's frame, or back into the source's own size
    let source_res = source_cam.resolution();
    let output_res = target_cam.as_ref().map_or(source_res, |cam| cam.resolution());
    let h = homography.for_resolution(source_res, output_res);
    let output_size = Size::new(output_res.0 as i32, output_res.1 as i32);
    log!(
        logfile.as_ref(),
        "{} -> {}: source {}x{}, output {}x{}",
        homography.source, homography.target,
        source_res.0, source_res.1, output_res.0, output_res.1
    );

    let mut renderer = MinifbRenderer::new("Alignment preview", CELL_W * 2, CELL_H)?;
    let mut source_budget = FailureBudget::new(config.driver.max_consecutive_failures);
    let mut target_budget = FailureBudget::new(config.driver.max_consecutive_failures);
    let mut source_seen = 0u64;
    let mut target_seen = 0u64;
    let mut reference: Option<Mat> = None;
    let mut warped: Option<Mat> = None;
    let mut saved = 0usize;

    while renderer.is_open() && !renderer.is_key_pressed(Key::Q) {
        match source_cam.next_frame(&mut source_seen) {
            Some(Ok(frame)) => {
                source_budget.record_success();
                let out = warp_frame(&frame, &h, output_size)?;
                renderer.draw_frame_at(&to_cell(&out, &format!("{} -> {}", homography.source, homography.target))?, 0, 0)?;
                warped = Some(out);
                if target_cam.is_none() {
                    renderer.draw_frame_at(&to_cell(&frame, "source (unwarped)")?, CELL_W, 0)?;
                    reference = Some(frame);
                }
            }
            Some(Err(e)) => {
                log!(logfile.as_ref(), "[cam{}] {}", source_index, e);
                if source_budget.record_failure() == DriveStatus::Halt {
                    bail!("camera {} keeps failing, giving up", source_index);
                }
            }
            None => {}
        }

        if let Some(cam) = &target_cam {
            match cam.next_frame(&mut target_seen) {
                Some(Ok(frame)) => {
                    target_budget.record_success();
                    renderer.draw_frame_at(&to_cell(&frame, "target (reference)")?, CELL_W, 0)?;
                    reference = Some(frame);
                }
                Some(Err(e)) => {
                    log!(logfile.as_ref(), "[target] {}", e);
                    if target_budget.record_failure() == DriveStatus::Halt {
                        bail!("target camera keeps failing, giving up");
                    }
                }
                None => {}
            }
        }

        if renderer.is_key_pressed(Key::S) {
            if let (Some(w), Some(r)) = (&warped, &reference) {
                for (name, image) in [("warped", w), ("reference", r)] {
                    let path = image_dir.join(format!("{}_{:03}.png", name, saved));
                    let path_str = path.to_string_lossy();
                    imgcodecs::imwrite(&path_str, image, &Vector::new())
                        .with_context(|| format!("Failed to write {}", path_str))?;
                }
                saved += 1;
                log!(logfile.as_ref(), "Saved warped/reference frames: {}", saved);
            }
        }

        renderer.update()?;
        thread::sleep(Duration::from_millis(16));
    }

    Ok(())
}
