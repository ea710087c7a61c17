use nalgebra::Vector3;

use crate::config::FollowerConfig;

/// Behind-offset before the first body-size measurement
pub const DEFAULT_BEHIND_OFFSET_Z: f32 = -2.0;
/// Extra lift above the anchor on top of `height_offset`
const BASE_HEIGHT: f32 = 1.0;
/// Extra depth behind the anchor on top of `behind_distance`
const BASE_DEPTH: f32 = 1.5;
/// Share of the anchor's X offset pulled back toward center
const CENTER_PULL: f32 = 0.5;

/// Places the target relative to the smoothed anchor.
///
/// The Z offset is sticky: frames without a body-size measurement reuse the
/// last one (initially [`DEFAULT_BEHIND_OFFSET_Z`]).
pub struct TargetComposer {
    behind_offset_z: f32,
}

impl TargetComposer {
    pub fn new() -> Self {
        Self {
            behind_offset_z: DEFAULT_BEHIND_OFFSET_Z,
        }
    }

    pub fn behind_offset_z(&self) -> f32 {
        self.behind_offset_z
    }

    pub fn compose(
        &mut self,
        anchor: &Vector3<f32>,
        has_body_size: bool,
        config: &FollowerConfig,
    ) -> Vector3<f32> {
        let behind_offset_x = if has_body_size {
            self.behind_offset_z = -config.behind_distance - BASE_DEPTH;
            -anchor.x * CENTER_PULL
        } else {
            0.0
        };

        Vector3::new(
            anchor.x + behind_offset_x,
            anchor.y + config.height_offset + BASE_HEIGHT,
            anchor.z + self.behind_offset_z,
        )
    }

    pub fn reset(&mut self) {
        self.behind_offset_z = DEFAULT_BEHIND_OFFSET_Z;
    }
}

impl Default for TargetComposer {
    fn default() -> Self {
        Self::new()
    }
}
