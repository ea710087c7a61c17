use serde::{Deserialize, Serialize};

/// 33-point body landmark layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl KeypointIndex {
    pub const COUNT: usize = 33;
}

/// Visibility at or below this is treated as not seen
pub const VISIBILITY_THRESHOLD: f32 = 0.1;

/// One body keypoint in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Normalized X (0.0..=1.0)
    pub x: f32,
    /// Normalized Y (0.0..=1.0), grows downward
    pub y: f32,
    /// Visibility score (0.0..=1.0). Absent means fully visible.
    #[serde(default, alias = "score", skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, visibility: Option<f32>) -> Self {
        Self { x, y, visibility }
    }

    /// Keypoint with no visibility score
    pub fn at(x: f32, y: f32) -> Self {
        Self::new(x, y, None)
    }

    /// Visible enough to be used: score absent or above `threshold`.
    /// Non-finite coordinates never count.
    pub fn is_visible(&self, threshold: f32) -> bool {
        if !self.x.is_finite() || !self.y.is_finite() {
            return false;
        }
        match self.visibility {
            None => true,
            Some(v) => v > threshold,
        }
    }

    /// Convert to pixel coordinates
    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }

    pub fn distance(&self, other: &Keypoint) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Keypoint) -> Keypoint {
        Keypoint::at((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// One detected body. Sets shorter than 33 simply lack the trailing points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Keypoint at `index` if present and visible enough
    pub fn visible(&self, index: KeypointIndex) -> Option<&Keypoint> {
        self.keypoints
            .get(index as usize)
            .filter(|kp| kp.is_visible(VISIBILITY_THRESHOLD))
    }

    /// Both keypoints of a left/right pair, if both are visible
    pub fn visible_pair(
        &self,
        a: KeypointIndex,
        b: KeypointIndex,
    ) -> Option<(&Keypoint, &Keypoint)> {
        Some((self.visible(a)?, self.visible(b)?))
    }
}

/// One pose-estimation result as recorded or streamed per frame
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeypointFrame {
    /// Capture time in milliseconds
    #[serde(default)]
    pub timestamp_ms: Option<f64>,
    /// Frame size in pixels
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// `None` or empty: no body this frame
    #[serde(default)]
    pub keypoints: Option<Pose>,
}

impl KeypointFrame {
    pub fn pose(&self) -> Option<&Pose> {
        self.keypoints.as_ref().filter(|p| !p.is_empty())
    }
}
