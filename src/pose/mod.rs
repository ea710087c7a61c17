pub mod keypoint;

pub use keypoint::{Keypoint, KeypointFrame, KeypointIndex, Pose, VISIBILITY_THRESHOLD};
