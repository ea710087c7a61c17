pub mod anchor;
pub mod follower;
pub mod physics;
pub mod smooth;
pub mod target;

pub use anchor::{body_orientation, extract_anchor, Anchor, OrientationMethod};
pub use follower::{FollowerState, TargetFollower, Visibility};
pub use physics::{effective_factor, physics_step, BASELINE_FRAME_MS};
pub use smooth::{raw_scale, SmoothedState, Smoother};
pub use target::TargetComposer;
