//! Replays recorded keypoint frames (one JSON object per line) through the
//! follower and prints one JSON state per frame.
//!
//! Usage: follow_replay <frames.jsonl> [config.toml] [--realtime]
//!
//! `--realtime` paces the frames by their timestamps on a reader thread and
//! renders at 60 fps, taking whatever frame is newest.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use balloon_follower::config::Config;
use balloon_follower::driver::{DriveStatus, FrameDriver, FrameReport};
use balloon_follower::frame_slot::LatestSlot;
use balloon_follower::log;
use balloon_follower::logging::{open_log_file, LogFile};
use balloon_follower::pose::KeypointFrame;

const CONFIG_PATH: &str = "config.toml";
const RENDER_INTERVAL: Duration = Duration::from_micros(16_667);

struct Args {
    frames_path: String,
    config_path: String,
    realtime: bool,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let realtime = args.iter().any(|a| a == "--realtime");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let Some(frames_path) = positional.first() else {
        bail!("usage: follow_replay <frames.jsonl> [config.toml] [--realtime]");
    };
    Ok(Args {
        frames_path: frames_path.to_string(),
        config_path: positional
            .get(1)
            .map(|s| s.to_string())
            .unwrap_or_else(|| CONFIG_PATH.to_string()),
        realtime,
    })
}

/// `null` and `{}` both mean "no body this frame". Bytes that are not
/// UTF-8 JSON are a malformed frame like any other.
fn parse_frame(line: &[u8]) -> Result<KeypointFrame> {
    if line == b"null" {
        return Ok(KeypointFrame::default());
    }
    serde_json::from_slice(line).context("malformed frame")
}

fn emit(out: &mut impl Write, report: &FrameReport) -> Result<()> {
    serde_json::to_writer(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let config = Config::load_or_default(&args.config_path);
    let logfile = match open_log_file(&config.driver.log_dir, "replay") {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!("{:#} (logging to stderr only)", e);
            None
        }
    };

    log!(logfile.as_ref(), "follow_replay {}", env!("BUILD_VERSION"));
    log!(logfile.as_ref(), "Frames: {}", args.frames_path);
    log!(
        logfile.as_ref(),
        "Follower: smoothing pos={} scale={} rot={} ({:?}), rate={}, behind={}, height={}",
        config.follower.position_smoothing,
        config.follower.scale_smoothing,
        config.follower.orientation_smoothing,
        config.follower.orientation_blend,
        config.follower.smoothing_rate,
        config.follower.behind_distance,
        config.follower.height_offset
    );

    let file = File::open(&args.frames_path)
        .with_context(|| format!("Failed to open {}", args.frames_path))?;
    let reader = BufReader::new(file);

    let mut driver = FrameDriver::new(config.video, config.driver.max_consecutive_failures);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.realtime {
        run_realtime(reader, &mut driver, &config, logfile.as_ref(), &mut out)?;
    } else {
        run_sequential(reader, &mut driver, &config, logfile.as_ref(), &mut out)?;
    }

    log!(
        logfile.as_ref(),
        "Done: final state {:?}",
        driver.follower().state()
    );
    Ok(())
}

fn run_sequential(
    reader: impl BufRead,
    driver: &mut FrameDriver,
    config: &Config,
    logfile: Option<&LogFile>,
    out: &mut impl Write,
) -> Result<()> {
    for (line_no, line) in reader.split(b'\n').enumerate() {
        let frame = match line {
            Ok(bytes) => {
                let bytes = bytes.trim_ascii();
                if bytes.is_empty() {
                    continue;
                }
                parse_frame(bytes)
            }
            Err(e) => Err(anyhow::Error::new(e).context("unreadable frame")),
        };
        match frame {
            Ok(frame) => {
                let report = driver.process(&frame, &config.follower);
                emit(out, &report)?;
            }
            Err(e) => {
                log!(logfile, "line {}: {:#}", line_no + 1, e);
                if driver.fail() == DriveStatus::Halt {
                    bail!(
                        "{} consecutive bad frames, giving up at line {}",
                        driver.failures(),
                        line_no + 1
                    );
                }
            }
        }
    }
    Ok(())
}

type SlotItem = Result<KeypointFrame, String>;

fn run_realtime(
    reader: impl BufRead + Send + 'static,
    driver: &mut FrameDriver,
    config: &Config,
    logfile: Option<&LogFile>,
    out: &mut impl Write,
) -> Result<()> {
    let slot: LatestSlot<SlotItem> = LatestSlot::new();
    let finished = Arc::new(AtomicBool::new(false));

    let producer = slot.clone();
    let producer_done = Arc::clone(&finished);
    let handle = std::thread::spawn(move || {
        let started = Instant::now();
        let mut first_ts: Option<f64> = None;
        for line in reader.split(b'\n') {
            let item = match line {
                Ok(bytes) => {
                    let bytes = bytes.trim_ascii();
                    if bytes.is_empty() {
                        continue;
                    }
                    parse_frame(bytes).map_err(|e| format!("{:#}", e))
                }
                Err(e) => Err(format!("unreadable frame: {}", e)),
            };
            // wait until the frame's time relative to the first one
            if let Ok(KeypointFrame { timestamp_ms: Some(ts), .. }) = &item {
                let base = *first_ts.get_or_insert(*ts);
                let due = Duration::from_secs_f64(((ts - base) / 1000.0).max(0.0));
                if let Some(wait) = due.checked_sub(started.elapsed()) {
                    std::thread::sleep(wait);
                }
            } else {
                std::thread::sleep(RENDER_INTERVAL);
            }
            producer.publish(item);
        }
        producer_done.store(true, Ordering::Release);
    });

    let mut last_seen = 0u64;
    let mut last_update = Instant::now();
    loop {
        let loop_start = Instant::now();
        let done = finished.load(Ordering::Acquire);

        match slot.take_newer(&mut last_seen) {
            Some(Ok(frame)) => {
                let delta_ms = last_update.elapsed().as_secs_f32() * 1000.0;
                last_update = Instant::now();
                let report = driver.process_with_delta(&frame, delta_ms, &config.follower);
                emit(out, &report)?;
            }
            Some(Err(e)) => {
                log!(logfile, "frame {}: {}", last_seen, e);
                if driver.fail() == DriveStatus::Halt {
                    bail!("{} consecutive bad frames, giving up", driver.failures());
                }
            }
            None if done => break,
            None => {}
        }

        if let Some(wait) = RENDER_INTERVAL.checked_sub(loop_start.elapsed()) {
            std::thread::sleep(wait);
        }
    }

    if handle.join().is_err() {
        log!(logfile, "reader thread panicked");
    }
    Ok(())
}
