use nalgebra::Vector3;

use crate::pose::{KeypointIndex, Pose};

/// Pixel offset from the image center per world unit
const PIXELS_PER_UNIT: f32 = 100.0;
/// Shoulder pairs closer than this (normalized) are near-degenerate,
/// typically a body turned sideways
const MIN_PAIR_SEPARATION: f32 = 0.05;

/// Keypoint pair an orientation was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationMethod {
    Shoulders,
    Ears,
    Hips,
    Ankles,
    HeadToHip,
}

/// Per-frame measurement of the tracked body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    /// Nose in world units, image center at the origin, Y up, Z = 0
    pub position: Vector3<f32>,
    /// Apparent body size (normalized units). 0 = no estimate.
    pub body_size: f32,
    /// Body roll in radians
    pub orientation: Option<f32>,
    pub orientation_method: Option<OrientationMethod>,
}

impl Anchor {
    pub fn has_body_size(&self) -> bool {
        self.body_size > 0.0
    }
}

/// Anchor from one frame's keypoints. `None` without a visible nose.
pub fn extract_anchor(pose: &Pose, width: u32, height: u32) -> Option<Anchor> {
    let nose = pose.visible(KeypointIndex::Nose)?;

    let (px, py) = nose.to_pixel(width, height);
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let position = Vector3::new((px - cx) / PIXELS_PER_UNIT, -(py - cy) / PIXELS_PER_UNIT, 0.0);

    let hip_mid = pose
        .visible_pair(KeypointIndex::LeftHip, KeypointIndex::RightHip)
        .map(|(l, r)| l.midpoint(r));

    // head-to-hip first, then ears, then shoulders
    let body_size = if let Some(mid) = hip_mid {
        nose.distance(&mid)
    } else if let Some((l, r)) = pose.visible_pair(KeypointIndex::LeftEar, KeypointIndex::RightEar) {
        l.distance(r)
    } else if let Some((l, r)) =
        pose.visible_pair(KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder)
    {
        l.distance(r)
    } else {
        0.0
    };

    let (orientation, orientation_method) = match body_orientation(pose) {
        Some((angle, method)) => (Some(angle), Some(method)),
        None => (None, None),
    };

    Some(Anchor {
        position,
        body_size: if body_size.is_finite() { body_size } else { 0.0 },
        orientation,
        orientation_method,
    })
}

/// First available of shoulders, ears, hips, ankles, nose→hip midpoint.
/// The shoulder line is skipped when the pair has collapsed; the other
/// pairs only need to be distinct points.
pub fn body_orientation(pose: &Pose) -> Option<(f32, OrientationMethod)> {
    let line = |a: KeypointIndex, b: KeypointIndex, min_separation: f32| {
        pose.visible_pair(a, b)
            .filter(|(l, r)| l.distance(r) > min_separation)
            .map(|(l, r)| f32::atan2(r.y - l.y, r.x - l.x))
    };

    let candidates = [
        (KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder, MIN_PAIR_SEPARATION, OrientationMethod::Shoulders),
        (KeypointIndex::LeftEar, KeypointIndex::RightEar, 0.0, OrientationMethod::Ears),
        (KeypointIndex::LeftHip, KeypointIndex::RightHip, 0.0, OrientationMethod::Hips),
        (KeypointIndex::LeftAnkle, KeypointIndex::RightAnkle, 0.0, OrientationMethod::Ankles),
    ];
    for (a, b, min_separation, method) in candidates {
        if let Some(angle) = line(a, b, min_separation) {
            return Some((angle, method));
        }
    }

    let nose = pose.visible(KeypointIndex::Nose)?;
    let (l, r) = pose.visible_pair(KeypointIndex::LeftHip, KeypointIndex::RightHip)?;
    let mid = l.midpoint(r);
    Some((f32::atan2(mid.y - nose.y, mid.x - nose.x), OrientationMethod::HeadToHip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;

    fn pose_with(points: &[(KeypointIndex, f32, f32)]) -> Pose {
        // everything not listed is present but invisible
        let mut keypoints = vec![Keypoint::new(0.0, 0.0, Some(0.0)); KeypointIndex::COUNT];
        for &(idx, x, y) in points {
            keypoints[idx as usize] = Keypoint::new(x, y, Some(0.9));
        }
        Pose::new(keypoints)
    }

    #[test]
    fn test_no_nose_no_anchor() {
        let pose = pose_with(&[(KeypointIndex::LeftHip, 0.4, 0.7)]);
        assert!(extract_anchor(&pose, 640, 480).is_none());
        assert!(extract_anchor(&Pose::default(), 640, 480).is_none());
    }

    #[test]
    fn test_anchor_position_centered_and_flipped() {
        let pose = pose_with(&[(KeypointIndex::Nose, 0.75, 0.25)]);
        let anchor = extract_anchor(&pose, 640, 480).unwrap();
        // (480 - 320) / 100, -(120 - 240) / 100
        assert!((anchor.position.x - 1.6).abs() < 1e-5);
        assert!((anchor.position.y - 1.2).abs() < 1e-5);
        assert_eq!(anchor.position.z, 0.0);
    }

    #[test]
    fn test_body_size_prefers_head_to_hip() {
        let pose = pose_with(&[
            (KeypointIndex::Nose, 0.5, 0.2),
            (KeypointIndex::LeftHip, 0.45, 0.5),
            (KeypointIndex::RightHip, 0.55, 0.5),
            (KeypointIndex::LeftEar, 0.45, 0.2),
            (KeypointIndex::RightEar, 0.55, 0.2),
        ]);
        let anchor = extract_anchor(&pose, 640, 480).unwrap();
        assert!((anchor.body_size - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_body_size_falls_back_to_ears_then_shoulders() {
        let ears = pose_with(&[
            (KeypointIndex::Nose, 0.5, 0.2),
            (KeypointIndex::LeftEar, 0.45, 0.2),
            (KeypointIndex::RightEar, 0.55, 0.2),
            (KeypointIndex::LeftShoulder, 0.3, 0.4),
            (KeypointIndex::RightShoulder, 0.7, 0.4),
        ]);
        assert!((extract_anchor(&ears, 640, 480).unwrap().body_size - 0.1).abs() < 1e-5);

        let shoulders = pose_with(&[
            (KeypointIndex::Nose, 0.5, 0.2),
            (KeypointIndex::LeftShoulder, 0.3, 0.4),
            (KeypointIndex::RightShoulder, 0.7, 0.4),
        ]);
        assert!((extract_anchor(&shoulders, 640, 480).unwrap().body_size - 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_body_size_zero_without_pairs() {
        let pose = pose_with(&[
            (KeypointIndex::Nose, 0.5, 0.2),
            (KeypointIndex::LeftHip, 0.45, 0.5),
            (KeypointIndex::LeftEar, 0.45, 0.2),
        ]);
        let anchor = extract_anchor(&pose, 640, 480).unwrap();
        assert_eq!(anchor.body_size, 0.0);
        assert!(!anchor.has_body_size());
    }

    #[test]
    fn test_orientation_shoulders_when_separated() {
        let pose = pose_with(&[
            (KeypointIndex::Nose, 0.5, 0.2),
            (KeypointIndex::LeftShoulder, 0.4, 0.4),
            (KeypointIndex::RightShoulder, 0.6, 0.5),
        ]);
        let (angle, method) = body_orientation(&pose).unwrap();
        assert_eq!(method, OrientationMethod::Shoulders);
        assert!((angle - f32::atan2(0.1, 0.2)).abs() < 1e-6);
    }

    #[test]
    fn test_orientation_close_shoulders_fall_through() {
        let close = [
            (KeypointIndex::Nose, 0.5, 0.2),
            (KeypointIndex::LeftShoulder, 0.49, 0.4),
            (KeypointIndex::RightShoulder, 0.52, 0.4),
        ];
        // nothing else: no orientation at all
        assert!(body_orientation(&pose_with(&close)).is_none());

        let mut with_ears = close.to_vec();
        with_ears.push((KeypointIndex::LeftEar, 0.47, 0.2));
        with_ears.push((KeypointIndex::RightEar, 0.53, 0.2));
        assert_eq!(body_orientation(&pose_with(&with_ears)).unwrap().1, OrientationMethod::Ears);

        let mut with_hips = close.to_vec();
        with_hips.push((KeypointIndex::LeftHip, 0.45, 0.6));
        with_hips.push((KeypointIndex::RightHip, 0.55, 0.6));
        assert_eq!(body_orientation(&pose_with(&with_hips)).unwrap().1, OrientationMethod::Hips);

        let mut with_ankles = close.to_vec();
        with_ankles.push((KeypointIndex::LeftAnkle, 0.45, 0.9));
        with_ankles.push((KeypointIndex::RightAnkle, 0.55, 0.9));
        assert_eq!(body_orientation(&pose_with(&with_ankles)).unwrap().1, OrientationMethod::Ankles);
    }

    #[test]
    fn test_orientation_low_visibility_shoulder_ignored() {
        let mut pose = pose_with(&[
            (KeypointIndex::Nose, 0.5, 0.2),
            (KeypointIndex::LeftShoulder, 0.3, 0.4),
            (KeypointIndex::RightShoulder, 0.7, 0.4),
            (KeypointIndex::LeftEar, 0.45, 0.2),
            (KeypointIndex::RightEar, 0.55, 0.2),
        ]);
        pose.keypoints[KeypointIndex::RightShoulder as usize].visibility = Some(0.05);
        assert_eq!(body_orientation(&pose).unwrap().1, OrientationMethod::Ears);
    }

    #[test]
    fn test_orientation_close_hips_still_used() {
        // side-on body: shoulders overlap, hips close together but distinct
        let pose = pose_with(&[
            (KeypointIndex::Nose, 0.5, 0.2),
            (KeypointIndex::LeftShoulder, 0.5, 0.4),
            (KeypointIndex::RightShoulder, 0.51, 0.4),
            (KeypointIndex::LeftHip, 0.50, 0.6),
            (KeypointIndex::RightHip, 0.53, 0.6),
        ]);
        let (angle, method) = body_orientation(&pose).unwrap();
        assert_eq!(method, OrientationMethod::Hips);
        assert!(angle.abs() < 1e-6);
    }

    #[test]
    fn test_orientation_head_to_hip_for_coincident_hips() {
        let pose = pose_with(&[
            (KeypointIndex::Nose, 0.5, 0.2),
            (KeypointIndex::LeftHip, 0.6, 0.6),
            (KeypointIndex::RightHip, 0.6, 0.6),
        ]);
        let (angle, method) = body_orientation(&pose).unwrap();
        assert_eq!(method, OrientationMethod::HeadToHip);
        assert!((angle - f32::atan2(0.4, 0.1)).abs() < 1e-5);
    }

    #[test]
    fn test_orientation_hips() {
        let pose = pose_with(&[
            (KeypointIndex::Nose, 0.5, 0.2),
            (KeypointIndex::LeftHip, 0.45, 0.6),
            (KeypointIndex::RightHip, 0.55, 0.6),
        ]);
        let (angle, method) = body_orientation(&pose).unwrap();
        assert_eq!(method, OrientationMethod::Hips);
        assert!(angle.abs() < 1e-6);
    }
}
