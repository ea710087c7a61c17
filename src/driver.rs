use serde::Serialize;

use crate::config::{FollowerConfig, VideoConfig};
use crate::pose::KeypointFrame;
use crate::tracker::{FollowerState, OrientationMethod, TargetFollower, BASELINE_FRAME_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveStatus {
    Continue,
    /// Too many consecutive upstream failures; stop the loop
    Halt,
}

/// Counts consecutive upstream failures. Any success resets the count.
pub struct FailureBudget {
    max_consecutive: u32,
    consecutive: u32,
}

impl FailureBudget {
    pub fn new(max_consecutive: u32) -> Self {
        Self {
            max_consecutive,
            consecutive: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn record_failure(&mut self) -> DriveStatus {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive >= self.max_consecutive {
            DriveStatus::Halt
        } else {
            DriveStatus::Continue
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// One processed frame, as emitted by the tools
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub delta_ms: f32,
    /// Whether this frame moved the follower
    pub updated: bool,
    pub body_size: Option<f32>,
    pub orientation_method: Option<&'static str>,
    #[serde(flatten)]
    pub state: FollowerState,
}

fn method_name(method: OrientationMethod) -> &'static str {
    match method {
        OrientationMethod::Shoulders => "shoulders",
        OrientationMethod::Ears => "ears",
        OrientationMethod::Hips => "hips",
        OrientationMethod::Ankles => "ankles",
        OrientationMethod::HeadToHip => "head_to_hip",
    }
}

/// Runs frames through a [`TargetFollower`] and keeps the failure budget.
///
/// Frame time comes from frame timestamps when present, otherwise from the
/// caller or the 60 Hz baseline.
pub struct FrameDriver {
    follower: TargetFollower,
    budget: FailureBudget,
    video: VideoConfig,
    last_timestamp_ms: Option<f64>,
    frame_count: u64,
}

impl FrameDriver {
    pub fn new(video: VideoConfig, max_consecutive_failures: u32) -> Self {
        Self {
            follower: TargetFollower::new(),
            budget: FailureBudget::new(max_consecutive_failures),
            video,
            last_timestamp_ms: None,
            frame_count: 0,
        }
    }

    pub fn follower(&self) -> &TargetFollower {
        &self.follower
    }

    pub fn failures(&self) -> u32 {
        self.budget.consecutive()
    }

    /// Frame time from timestamps; baseline for the first frame or
    /// frames without one
    fn frame_delta(&mut self, frame: &KeypointFrame) -> f32 {
        let Some(ts) = frame.timestamp_ms else {
            return BASELINE_FRAME_MS;
        };
        let delta = match self.last_timestamp_ms {
            Some(prev) => (ts - prev) as f32,
            None => BASELINE_FRAME_MS,
        };
        self.last_timestamp_ms = Some(ts);
        delta
    }

    /// Process a frame using its own timestamps
    pub fn process(&mut self, frame: &KeypointFrame, config: &FollowerConfig) -> FrameReport {
        let delta_ms = self.frame_delta(frame);
        self.process_with_delta(frame, delta_ms, config)
    }

    /// Process a frame with an externally measured frame time
    pub fn process_with_delta(
        &mut self,
        frame: &KeypointFrame,
        delta_ms: f32,
        config: &FollowerConfig,
    ) -> FrameReport {
        self.budget.record_success();
        self.frame_count += 1;

        let width = frame.width.unwrap_or(self.video.width);
        let height = frame.height.unwrap_or(self.video.height);
        let anchor = self
            .follower
            .update(frame.pose(), width, height, delta_ms, config);

        FrameReport {
            frame: self.frame_count,
            delta_ms,
            updated: anchor.is_some(),
            body_size: anchor.map(|a| a.body_size),
            orientation_method: anchor.and_then(|a| a.orientation_method).map(method_name),
            state: self.follower.state(),
        }
    }

    /// Upstream failed to deliver a frame
    pub fn fail(&mut self) -> DriveStatus {
        self.budget.record_failure()
    }

    /// Back to Hidden; timestamps start over
    pub fn reset(&mut self) {
        self.follower.reset();
        self.last_timestamp_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Keypoint, Pose};
    use crate::tracker::Visibility;

    fn frame(ts: Option<f64>, pose: Option<Pose>) -> KeypointFrame {
        KeypointFrame {
            timestamp_ms: ts,
            width: None,
            height: None,
            keypoints: pose,
        }
    }

    fn nose_only() -> Pose {
        Pose::new(vec![Keypoint::at(0.5, 0.5)])
    }

    #[test]
    fn test_budget_halts_after_consecutive_failures() {
        let mut budget = FailureBudget::new(3);
        assert_eq!(budget.record_failure(), DriveStatus::Continue);
        assert_eq!(budget.record_failure(), DriveStatus::Continue);
        assert_eq!(budget.record_failure(), DriveStatus::Halt);
    }

    #[test]
    fn test_budget_resets_on_success() {
        let mut budget = FailureBudget::new(2);
        budget.record_failure();
        budget.record_success();
        assert_eq!(budget.consecutive(), 0);
        assert_eq!(budget.record_failure(), DriveStatus::Continue);
    }

    #[test]
    fn test_delta_from_timestamps() {
        let mut driver = FrameDriver::new(VideoConfig::default(), 5);
        let cfg = FollowerConfig::default();
        let first = driver.process(&frame(Some(1000.0), Some(nose_only())), &cfg);
        assert_eq!(first.delta_ms, BASELINE_FRAME_MS);
        let second = driver.process(&frame(Some(1040.0), Some(nose_only())), &cfg);
        assert!((second.delta_ms - 40.0).abs() < 1e-4);
        let untimed = driver.process(&frame(None, Some(nose_only())), &cfg);
        assert_eq!(untimed.delta_ms, BASELINE_FRAME_MS);
    }

    #[test]
    fn test_report_flags_skipped_frames() {
        let mut driver = FrameDriver::new(VideoConfig::default(), 5);
        let cfg = FollowerConfig::default();
        let skipped = driver.process(&frame(None, None), &cfg);
        assert!(!skipped.updated);
        assert_eq!(skipped.state.visibility, Visibility::Hidden);

        let used = driver.process(&frame(None, Some(nose_only())), &cfg);
        assert!(used.updated);
        assert_eq!(used.frame, 2);
        assert_eq!(used.body_size, Some(0.0));
        assert_eq!(used.orientation_method, None);
        assert_eq!(used.state.visibility, Visibility::Visible);
    }

    #[test]
    fn test_success_clears_failures() {
        let mut driver = FrameDriver::new(VideoConfig::default(), 2);
        let cfg = FollowerConfig::default();
        assert_eq!(driver.fail(), DriveStatus::Continue);
        driver.process(&frame(None, None), &cfg);
        assert_eq!(driver.failures(), 0);
        assert_eq!(driver.fail(), DriveStatus::Continue);
        assert_eq!(driver.fail(), DriveStatus::Halt);
    }

    #[test]
    fn test_report_serializes_flat() {
        let mut driver = FrameDriver::new(VideoConfig::default(), 5);
        let report = driver.process(&frame(None, Some(nose_only())), &FollowerConfig::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["visibility"], "visible");
        assert!(json["position"].is_array());
        assert_eq!(json["frame"], 1);
    }
}
