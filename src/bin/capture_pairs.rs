//! Captures stereo pairs for aligning one camera onto another.
//!
//! Usage: capture_pairs <source_camera> <target_camera> [config.toml]
//!
//! [1] snapshots the source camera, [2] the target camera, [S] saves both as
//! `<image_dir>/pair0_NNN.png` / `pair1_NNN.png`. [Q] / [Esc] quits.
//! Hold the board still and visible to both cameras; 10-15 poses work well.

use anyhow::{bail, Context, Result};
use opencv::core::{Mat, Point, Scalar, Size, Vector};
use opencv::{imgcodecs, imgproc, prelude::*};
use std::path::Path;
use std::thread;
use std::time::Duration;

use balloon_follower::alignment::{next_pair_index, pair_path};
use balloon_follower::camera::ThreadedCamera;
use balloon_follower::config::Config;
use balloon_follower::driver::{DriveStatus, FailureBudget};
use balloon_follower::log;
use balloon_follower::logging::open_log_file;
use balloon_follower::render::{Key, MinifbRenderer};

const CONFIG_PATH: &str = "config.toml";
const CELL_W: usize = 960;
const CELL_H: usize = 540;

struct CameraSlot {
    label: &'static str,
    index: i32,
    camera: ThreadedCamera,
    budget: FailureBudget,
    last_seen: u64,
    latest: Option<Mat>,
    snapshot: Option<Mat>,
}

impl CameraSlot {
    fn open(label: &'static str, index: i32, max_failures: u32) -> Result<Self> {
        let camera = ThreadedCamera::start(index, Some(1920), Some(1080), Some(30))
            .with_context(|| format!("Failed to start {} camera {}", label, index))?;
        Ok(Self {
            label,
            index,
            camera,
            budget: FailureBudget::new(max_failures),
            last_seen: 0,
            latest: None,
            snapshot: None,
        })
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: capture_pairs <source_camera> <target_camera> [config.toml]");
    }
    let parse_index = |s: &String| -> Result<i32> {
        s.parse().with_context(|| format!("Invalid camera index: {}", s))
    };
    let source_index = parse_index(&args[0])?;
    let target_index = parse_index(&args[1])?;
    let config = Config::load_or_default(args.get(2).map(String::as_str).unwrap_or(CONFIG_PATH));
    let logfile = open_log_file(&config.driver.log_dir, "pairs").ok();
    let image_dir = Path::new(&config.calibration.image_dir);
    std::fs::create_dir_all(image_dir)?;

    let max_failures = config.driver.max_consecutive_failures;
    let mut slots = [
        CameraSlot::open("source", source_index, max_failures)?,
        CameraSlot::open("target", target_index, max_failures)?,
    ];
    for slot in &slots {
        let (w, h) = slot.camera.resolution();
        log!(logfile.as_ref(), "{} camera {}: {}x{}", slot.label, slot.index, w, h);
    }
    println!("[1] snapshot source  [2] snapshot target  [S] save pair  [Q]/[Esc] quit");

    let mut renderer = MinifbRenderer::new("Stereo pair capture", CELL_W * 2, CELL_H)?;
    let mut next_index = next_pair_index(image_dir);
    let mut saved = 0usize;

    while renderer.is_open() && !renderer.is_key_pressed(Key::Q) {
        for slot in slots.iter_mut() {
            match slot.camera.next_frame(&mut slot.last_seen) {
                Some(Ok(frame)) => {
                    slot.budget.record_success();
                    slot.latest = Some(frame);
                }
                Some(Err(e)) => {
                    log!(logfile.as_ref(), "[cam{}] {}", slot.index, e);
                    if slot.budget.record_failure() == DriveStatus::Halt {
                        bail!("{} camera {} keeps failing, giving up", slot.label, slot.index);
                    }
                }
                None => {}
            }
        }

        for (key, slot) in [Key::Key1, Key::Key2].into_iter().zip(slots.iter_mut()) {
            if renderer.is_key_pressed(key) {
                match &slot.latest {
                    Some(frame) => {
                        slot.snapshot = Some(frame.clone());
                        println!("Captured {} camera {}", slot.label, slot.index);
                    }
                    None => println!("No frame from {} camera {} yet", slot.label, slot.index),
                }
            }
        }

        if renderer.is_key_pressed(Key::S) {
            let pair_saved = if let (Some(source), Some(target)) = (&slots[0].snapshot, &slots[1].snapshot) {
                for (slot_no, image) in [(0u8, source), (1u8, target)] {
                    let path = pair_path(image_dir, slot_no, next_index);
                    let path_str = path.to_string_lossy();
                    imgcodecs::imwrite(&path_str, image, &Vector::new())
                        .with_context(|| format!("Failed to write {}", path_str))?;
                }
                log!(logfile.as_ref(), "Saved pair {:03} ({} this session)", next_index, saved + 1);
                next_index += 1;
                saved += 1;
                true
            } else {
                println!("Both cameras must be captured before saving a pair");
                false
            };
            if pair_saved {
                for slot in slots.iter_mut() {
                    slot.snapshot = None;
                }
            }
        }

        for (i, slot) in slots.iter().enumerate() {
            let Some(frame) = &slot.latest else {
                continue;
            };
            let mut cell = Mat::default();
            imgproc::resize(
                frame,
                &mut cell,
                Size::new(CELL_W as i32, CELL_H as i32),
                0.0,
                0.0,
                imgproc::INTER_LINEAR,
            )?;
            let label = format!("Camera {} ({}) - pair {}", slot.index, slot.label, next_index);
            imgproc::put_text(
                &mut cell, &label,
                Point::new(10, 30),
                imgproc::FONT_HERSHEY_SIMPLEX, 0.7,
                Scalar::new(0.0, 255.0, 0.0, 0.0), 2, imgproc::LINE_8, false,
            )?;
            if slot.snapshot.is_some() {
                imgproc::put_text(
                    &mut cell, "CAPTURED",
                    Point::new(10, 65),
                    imgproc::FONT_HERSHEY_SIMPLEX, 0.8,
                    Scalar::new(0.0, 0.0, 255.0, 0.0), 2, imgproc::LINE_8, false,
                )?;
            }
            renderer.draw_frame_at(&cell, i * CELL_W, 0)?;
        }
        renderer.update()?;
        thread::sleep(Duration::from_millis(16));
    }

    log!(logfile.as_ref(), "Captured {} stereo pairs", saved);
    Ok(())
}
