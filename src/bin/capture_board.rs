//! Live preview for collecting calibration images.
//!
//! Usage: capture_board <camera_index> <prefix> [config.toml]
//!
//! [S] saves a grayscale frame as `<image_dir>/cal_<prefix>_NNN.png` once
//! enough ArUco markers are visible. [Q] / [Esc] quits.

use anyhow::{bail, Context, Result};
use opencv::core::{Mat, Point, Scalar, Vector};
use opencv::{imgcodecs, imgproc, prelude::*};
use std::path::Path;
use std::time::Duration;

use balloon_follower::calibration::{capture_path, create_board, create_detector, detect_board, next_capture_index};
use balloon_follower::camera::ThreadedCamera;
use balloon_follower::config::Config;
use balloon_follower::driver::{DriveStatus, FailureBudget};
use balloon_follower::log;
use balloon_follower::logging::open_log_file;
use balloon_follower::render::{Key, MinifbRenderer};

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: capture_board <camera_index> <prefix> [config.toml]");
    }
    let camera_index: i32 = args[0]
        .parse()
        .with_context(|| format!("Invalid camera index: {}", args[0]))?;
    let prefix = &args[1];
    let config = Config::load_or_default(args.get(2).map(String::as_str).unwrap_or(CONFIG_PATH));
    let cal = &config.calibration;
    let logfile = open_log_file(&config.driver.log_dir, "capture").ok();

    std::fs::create_dir_all(&cal.image_dir)?;
    let board = create_board(cal)?;
    let detector = create_detector(&board)?;

    let camera = ThreadedCamera::start(camera_index, Some(1920), Some(1080), Some(30))?;
    let (width, height) = camera.resolution();
    log!(logfile.as_ref(), "Camera {}: {}x{}", camera_index, width, height);
    if width < 1280 {
        log!(logfile.as_ref(), "WARNING: low resolution may hurt board detection");
    }
    println!("[S] save frame (needs {}+ markers)  [Q]/[Esc] quit", cal.capture_min_markers);

    let mut renderer = MinifbRenderer::new(
        &format!("Calibration capture - Camera {}", camera_index),
        width as usize,
        height as usize,
    )?;

    let mut budget = FailureBudget::new(config.driver.max_consecutive_failures);
    let mut next_index = next_capture_index(Path::new(&cal.image_dir), prefix);
    let mut saved = 0usize;
    let mut last_seen = 0u64;

    while renderer.is_open() && !renderer.is_key_pressed(Key::Q) {
        let frame = match camera.next_frame(&mut last_seen) {
            Some(Ok(frame)) => {
                budget.record_success();
                frame
            }
            Some(Err(e)) => {
                log!(logfile.as_ref(), "[cam{}] {}", camera_index, e);
                if budget.record_failure() == DriveStatus::Halt {
                    bail!("camera {} keeps failing, giving up", camera_index);
                }
                renderer.update()?;
                continue;
            }
            None => {
                // keep pumping window events while the camera stalls
                renderer.update()?;
                std::thread::sleep(Duration::from_millis(1));
                continue;
            }
        };

        let mut gray = Mat::default();
        imgproc::cvt_color_def(&frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;
        let detection = detect_board(&detector, &gray)?;
        let enough = detection.marker_count >= cal.capture_min_markers;

        if renderer.is_key_pressed(Key::S) {
            if enough {
                let path = capture_path(cal, prefix, next_index);
                let path_str = path.to_string_lossy();
                imgcodecs::imwrite(&path_str, &gray, &Vector::new())
                    .with_context(|| format!("Failed to write {}", path_str))?;
                next_index += 1;
                saved += 1;
                log!(logfile.as_ref(), "Saved: {} ({} images)", path_str, saved);
            } else {
                println!("Not enough markers ({}). Try a different position.", detection.marker_count);
            }
        }

        let mut display = frame;
        let color = if enough {
            Scalar::new(0.0, 255.0, 0.0, 0.0)
        } else {
            Scalar::new(0.0, 0.0, 255.0, 0.0)
        };
        let status = format!(
            "Camera {} - markers {} corners {} - saved {}",
            camera_index, detection.marker_count, detection.corner_count, saved
        );
        imgproc::put_text(
            &mut display, &status,
            Point::new(10, 30),
            imgproc::FONT_HERSHEY_SIMPLEX, 0.8,
            color, 2, imgproc::LINE_8, false,
        )?;
        imgproc::put_text(
            &mut display, "S: save  Q: quit",
            Point::new(10, 70),
            imgproc::FONT_HERSHEY_SIMPLEX, 0.6,
            Scalar::new(255.0, 255.0, 255.0, 0.0), 2, imgproc::LINE_8, false,
        )?;

        renderer.draw_frame(&display)?;
        renderer.update()?;
    }

    log!(logfile.as_ref(), "Captured {} images for {}", saved, prefix);
    Ok(())
}
