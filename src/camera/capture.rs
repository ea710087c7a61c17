use anyhow::{bail, Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::frame_slot::LatestSlot;

/// OpenCV camera capture
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// Open with the requested resolution and frame rate. The driver may
    /// pick something else; `resolution` reports what was actually set.
    pub fn open_with_config(index: i32, width: Option<u32>, height: Option<u32>, fps: Option<u32>) -> Result<Self> {
        let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
            .with_context(|| format!("Failed to open camera {}", index))?;

        if !capture.is_opened()? {
            bail!("Camera {} is not available", index);
        }

        if let Some(w) = width {
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)?;
        }
        if let Some(h) = height {
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)?;
        }
        if let Some(f) = fps {
            capture.set(videoio::CAP_PROP_FPS, f as f64)?;
        }
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;

        Ok(Self {
            capture,
            width: actual_width,
            height: actual_height,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// One BGR frame
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// Captures on its own thread and keeps only the newest frame.
///
/// Read errors are published too, so the consumer can count them against
/// its failure budget.
pub struct ThreadedCamera {
    latest: LatestSlot<Result<Mat, String>>,
    running: Arc<AtomicBool>,
    width: u32,
    height: u32,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadedCamera {
    pub fn start(index: i32, width: Option<u32>, height: Option<u32>, fps: Option<u32>) -> Result<Self> {
        let mut camera = OpenCvCamera::open_with_config(index, width, height, fps)?;
        let (w, h) = camera.resolution();
        let latest = LatestSlot::new();
        let producer = latest.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_ref = Arc::clone(&running);

        let handle = thread::spawn(move || {
            while running_ref.load(Ordering::Relaxed) {
                match camera.read_frame() {
                    Ok(frame) => producer.publish(Ok(frame)),
                    Err(e) => {
                        producer.publish(Err(format!("{:#}", e)));
                        thread::sleep(Duration::from_millis(100));
                    }
                }
            }
        });

        Ok(Self {
            latest,
            running,
            width: w,
            height: h,
            handle: Some(handle),
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Newest capture result if it arrived after `last_seen`
    pub fn next_frame(&self, last_seen: &mut u64) -> Option<Result<Mat, String>> {
        self.latest.take_newer(last_seen)
    }
}

impl Drop for ThreadedCamera {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
