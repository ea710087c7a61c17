use nalgebra::Vector3;
use serde::Serialize;

use crate::config::FollowerConfig;
use crate::pose::Pose;
use crate::tracker::anchor::{extract_anchor, Anchor};
use crate::tracker::physics::physics_step;
use crate::tracker::smooth::{raw_scale, SmoothedState, Smoother};
use crate::tracker::target::TargetComposer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Not rendered. Initial state and after `reset`.
    Hidden,
    /// Rendered at the current state. Entered on the first frame with a
    /// visible nose; stays visible when tracking is lost.
    Visible,
}

/// What the renderer needs for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FollowerState {
    pub visibility: Visibility,
    pub position: [f32; 3],
    pub scale: f32,
    /// Roll in radians
    pub orientation: f32,
    pub target: Option<[f32; 3]>,
}

fn to_array(v: &Vector3<f32>) -> [f32; 3] {
    [v.x, v.y, v.z]
}

/// Keeps a virtual object floating behind and above a tracked body.
///
/// Per valid frame: anchor extraction, EMA smoothing, target composition,
/// then a time-normalized physics step on the position. Scale and
/// orientation follow the smoothed values directly.
pub struct TargetFollower {
    visibility: Visibility,
    smoother: Smoother,
    composer: TargetComposer,
    position: Vector3<f32>,
    scale: f32,
    orientation: f32,
    target: Option<Vector3<f32>>,
}

impl TargetFollower {
    pub fn new() -> Self {
        Self {
            visibility: Visibility::Hidden,
            smoother: Smoother::new(),
            composer: TargetComposer::new(),
            position: Vector3::zeros(),
            scale: 1.0,
            orientation: 0.0,
            target: None,
        }
    }

    /// Feed one frame. `pose == None` (or a pose without a visible nose)
    /// leaves everything as it was.
    ///
    /// Returns the measured anchor when the frame was used.
    pub fn update(
        &mut self,
        pose: Option<&Pose>,
        width: u32,
        height: u32,
        delta_ms: f32,
        config: &FollowerConfig,
    ) -> Option<Anchor> {
        let anchor = extract_anchor(pose?, width, height)?;

        let scale = raw_scale(anchor.body_size, &anchor.position, config);
        let smoothed = self
            .smoother
            .apply(anchor.position, scale, anchor.orientation, config);

        let target = self
            .composer
            .compose(&smoothed.position, anchor.has_body_size(), config);

        let delta_ms = if delta_ms.is_finite() && delta_ms > 0.0 { delta_ms } else { 0.0 };
        self.position = physics_step(&self.position, &target, config.smoothing_rate, delta_ms);
        // f32::clamp panics on an inverted range
        self.scale = smoothed.scale.max(config.min_scale).min(config.max_scale);
        self.orientation = smoothed.orientation;
        self.target = Some(target);
        self.visibility = Visibility::Visible;

        Some(anchor)
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    pub fn smoothed(&self) -> Option<&SmoothedState> {
        self.smoother.state()
    }

    pub fn state(&self) -> FollowerState {
        FollowerState {
            visibility: self.visibility,
            position: to_array(&self.position),
            scale: self.scale,
            orientation: self.orientation,
            target: self.target.as_ref().map(to_array),
        }
    }

    /// Back to Hidden with empty filters
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for TargetFollower {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Keypoint, KeypointIndex};
    use crate::tracker::physics::BASELINE_FRAME_MS;

    const W: u32 = 640;
    const H: u32 = 480;

    fn standing_pose() -> Pose {
        let mut keypoints = vec![Keypoint::new(0.0, 0.0, Some(0.0)); KeypointIndex::COUNT];
        let mut set = |idx: KeypointIndex, x: f32, y: f32| {
            keypoints[idx as usize] = Keypoint::new(x, y, Some(0.9));
        };
        set(KeypointIndex::Nose, 0.6, 0.3);
        set(KeypointIndex::LeftShoulder, 0.5, 0.45);
        set(KeypointIndex::RightShoulder, 0.7, 0.46);
        set(KeypointIndex::LeftHip, 0.55, 0.75);
        set(KeypointIndex::RightHip, 0.65, 0.75);
        Pose::new(keypoints)
    }

    fn distance(state: &FollowerState) -> f32 {
        let target = state.target.unwrap();
        let d: Vec<f32> = (0..3).map(|i| target[i] - state.position[i]).collect();
        (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
    }

    #[test]
    fn test_starts_hidden() {
        let follower = TargetFollower::new();
        assert_eq!(follower.visibility(), Visibility::Hidden);
        assert!(follower.state().target.is_none());
    }

    #[test]
    fn test_empty_or_missing_pose_is_ignored() {
        let mut follower = TargetFollower::new();
        let cfg = FollowerConfig::default();
        assert!(follower.update(None, W, H, BASELINE_FRAME_MS, &cfg).is_none());
        assert!(follower.update(Some(&Pose::default()), W, H, BASELINE_FRAME_MS, &cfg).is_none());
        assert!(!follower.is_visible());
    }

    #[test]
    fn test_first_valid_nose_becomes_visible() {
        let mut follower = TargetFollower::new();
        let cfg = FollowerConfig::default();
        let pose = Pose::new(vec![Keypoint::at(0.5, 0.5)]);
        assert!(follower.update(Some(&pose), W, H, BASELINE_FRAME_MS, &cfg).is_some());
        assert_eq!(follower.visibility(), Visibility::Visible);
    }

    #[test]
    fn test_low_visibility_nose_stays_hidden() {
        let mut follower = TargetFollower::new();
        let cfg = FollowerConfig::default();
        let pose = Pose::new(vec![Keypoint::new(0.5, 0.5, Some(0.05))]);
        follower.update(Some(&pose), W, H, BASELINE_FRAME_MS, &cfg);
        assert!(!follower.is_visible());
    }

    #[test]
    fn test_lost_tracking_freezes_and_stays_visible() {
        let mut follower = TargetFollower::new();
        let cfg = FollowerConfig::default();
        let pose = standing_pose();
        for _ in 0..5 {
            follower.update(Some(&pose), W, H, BASELINE_FRAME_MS, &cfg);
        }
        let frozen = follower.state();

        let mut lost = pose.clone();
        lost.keypoints[KeypointIndex::Nose as usize].visibility = Some(0.0);
        for _ in 0..5 {
            follower.update(Some(&lost), W, H, BASELINE_FRAME_MS, &cfg);
            follower.update(None, W, H, BASELINE_FRAME_MS, &cfg);
        }
        assert_eq!(follower.state(), frozen);
        assert!(follower.is_visible());
    }

    #[test]
    fn test_repeated_frame_converges() {
        let mut follower = TargetFollower::new();
        let cfg = FollowerConfig::default();
        let pose = standing_pose();
        follower.update(Some(&pose), W, H, BASELINE_FRAME_MS, &cfg);
        let mut last = distance(&follower.state());
        for _ in 0..200 {
            follower.update(Some(&pose), W, H, BASELINE_FRAME_MS, &cfg);
            let d = distance(&follower.state());
            assert!(d < last, "{} !< {}", d, last);
            last = d;
        }
        assert!(last < 0.01);
    }

    #[test]
    fn test_long_frame_overshoots_target() {
        let mut follower = TargetFollower::new();
        let cfg = FollowerConfig::default();
        let pose = standing_pose();
        follower.update(Some(&pose), W, H, 30.0 * BASELINE_FRAME_MS, &cfg);
        let state = follower.state();
        let target = state.target.unwrap();
        // started at the origin, factor 1.5
        assert!((state.position[1] - 1.5 * target[1]).abs() < 1e-4);
        assert!(state.position[1].abs() > target[1].abs());
    }

    #[test]
    fn test_scale_from_body_size() {
        let mut follower = TargetFollower::new();
        let cfg = FollowerConfig::default();
        let pose = standing_pose();
        follower.update(Some(&pose), W, H, BASELINE_FRAME_MS, &cfg);
        // nose (0.6, 0.3) -> hip mid (0.6, 0.75): 0.45, clamped to 0.35
        assert!((follower.state().scale - cfg.max_scale).abs() < 1e-5);
    }

    #[test]
    fn test_fallback_scale_without_pairs() {
        let mut follower = TargetFollower::new();
        let cfg = FollowerConfig::default();
        let pose = Pose::new(vec![Keypoint::at(0.5, 0.5)]);
        follower.update(Some(&pose), W, H, BASELINE_FRAME_MS, &cfg);
        let state = follower.state();
        assert!((0.5..=1.5).contains(&state.scale));
        // no measurement: default depth, no center pull
        let target = state.target.unwrap();
        assert!((target[2] + 2.0).abs() < 1e-6);
        assert!(target[0].abs() < 1e-6);
    }

    #[test]
    fn test_exposed_scale_respects_configured_range() {
        let mut follower = TargetFollower::new();
        let cfg = FollowerConfig {
            min_scale: 0.1,
            max_scale: 0.3,
            ..FollowerConfig::default()
        };
        // fallback heuristic yields 1.5 for a centered nose
        let pose = Pose::new(vec![Keypoint::at(0.5, 0.5)]);
        follower.update(Some(&pose), W, H, BASELINE_FRAME_MS, &cfg);
        assert!((follower.state().scale - 0.3).abs() < 1e-6);
        assert!((follower.smoothed().unwrap().scale - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_delta_does_not_move() {
        let mut follower = TargetFollower::new();
        let cfg = FollowerConfig::default();
        let pose = standing_pose();
        follower.update(Some(&pose), W, H, f32::NAN, &cfg);
        follower.update(Some(&pose), W, H, -5.0, &cfg);
        assert_eq!(follower.state().position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_reset_hides() {
        let mut follower = TargetFollower::new();
        let cfg = FollowerConfig::default();
        follower.update(Some(&standing_pose()), W, H, BASELINE_FRAME_MS, &cfg);
        follower.reset();
        assert_eq!(follower.visibility(), Visibility::Hidden);
        assert!(follower.smoothed().is_none());
        assert_eq!(follower.state().position, [0.0, 0.0, 0.0]);
    }
}
