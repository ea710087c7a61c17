use nalgebra::Vector3;
use std::f32::consts::{PI, TAU};

use crate::config::{FollowerConfig, OrientationBlend};

/// Body-size band mapped onto [min_scale, max_scale]
pub const MIN_BODY_SIZE: f32 = 0.08;
pub const MAX_BODY_SIZE: f32 = 0.35;

/// Range of the anchor-distance fallback, independent of the configured scale range
const FALLBACK_MIN_SCALE: f32 = 0.5;
const FALLBACK_MAX_SCALE: f32 = 1.5;

/// Filter memory: anchor position, scale, orientation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedState {
    pub position: Vector3<f32>,
    pub scale: f32,
    pub orientation: f32,
}

/// `value + (raw - value) * factor`
pub fn ema(value: f32, raw: f32, factor: f32) -> f32 {
    value + (raw - value) * factor
}

/// EMA along the shortest arc; result wrapped to (-π, π]
pub fn ema_angle(value: f32, raw: f32, factor: f32) -> f32 {
    let mut delta = (raw - value) % TAU;
    if delta > PI {
        delta -= TAU;
    } else if delta < -PI {
        delta += TAU;
    }
    wrap_angle(value + delta * factor)
}

fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI { PI } else { wrapped }
}

/// Raw scale from a body-size measurement.
///
/// With a measurement the size is clamped to the body-size band and mapped
/// linearly onto the configured scale range. Without one (`body_size == 0`)
/// the object shrinks as the anchor moves off center, bounded to [0.5, 1.5].
pub fn raw_scale(body_size: f32, anchor: &Vector3<f32>, config: &FollowerConfig) -> f32 {
    if body_size > 0.0 {
        let size = body_size.clamp(MIN_BODY_SIZE, MAX_BODY_SIZE);
        let t = (size - MIN_BODY_SIZE) / (MAX_BODY_SIZE - MIN_BODY_SIZE);
        config.min_scale + (config.max_scale - config.min_scale) * t
    } else {
        let distance = anchor.xy().norm();
        (1.0 / (distance + 0.5)).clamp(FALLBACK_MIN_SCALE, FALLBACK_MAX_SCALE)
    }
}

/// Per-attribute EMA, frame-count based
pub struct Smoother {
    prev: Option<SmoothedState>,
}

impl Smoother {
    pub fn new() -> Self {
        Self { prev: None }
    }

    pub fn state(&self) -> Option<&SmoothedState> {
        self.prev.as_ref()
    }

    /// Blend one measurement in. The first call seeds the filter.
    /// `orientation == None` leaves the smoothed orientation untouched.
    pub fn apply(
        &mut self,
        position: Vector3<f32>,
        scale: f32,
        orientation: Option<f32>,
        config: &FollowerConfig,
    ) -> SmoothedState {
        let prev = match self.prev {
            Some(prev) => prev,
            None => {
                let seeded = SmoothedState {
                    position,
                    scale,
                    orientation: orientation.unwrap_or(0.0),
                };
                self.prev = Some(seeded);
                return seeded;
            }
        };

        let ap = config.position_smoothing;
        let position = Vector3::new(
            ema(prev.position.x, position.x, ap),
            ema(prev.position.y, position.y, ap),
            ema(prev.position.z, position.z, ap),
        );

        let scale = ema(prev.scale, scale, config.scale_smoothing);

        let orientation = match orientation {
            Some(raw) => match config.orientation_blend {
                OrientationBlend::Linear => ema(prev.orientation, raw, config.orientation_smoothing),
                OrientationBlend::Shortest => {
                    ema_angle(prev.orientation, raw, config.orientation_smoothing)
                }
            },
            None => prev.orientation,
        };

        let result = SmoothedState {
            position,
            scale,
            orientation,
        };
        self.prev = Some(result);
        result
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    fn config(position: f32, scale: f32, orientation: f32) -> FollowerConfig {
        FollowerConfig {
            position_smoothing: position,
            scale_smoothing: scale,
            orientation_smoothing: orientation,
            ..FollowerConfig::default()
        }
    }

    #[test]
    fn test_first_frame_passthrough() {
        let mut s = Smoother::new();
        let result = s.apply(Vector3::new(1.0, 2.0, 3.0), 1.5, Some(0.3), &config(0.5, 0.5, 0.5));
        assert_eq!(result.position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(result.scale, 1.5);
        assert_eq!(result.orientation, 0.3);
    }

    #[test]
    fn test_independent_factors() {
        let mut s = Smoother::new();
        let cfg = config(0.5, 0.25, 1.0);
        s.apply(Vector3::zeros(), 1.0, Some(0.0), &cfg);
        let result = s.apply(Vector3::new(2.0, 4.0, 6.0), 2.0, Some(0.8), &cfg);
        assert!(approx_eq_f32(result.position.x, 1.0, 1e-6));
        assert!(approx_eq_f32(result.position.y, 2.0, 1e-6));
        assert!(approx_eq_f32(result.position.z, 3.0, 1e-6));
        assert!(approx_eq_f32(result.scale, 1.25, 1e-6));
        assert!(approx_eq_f32(result.orientation, 0.8, 1e-6));
    }

    #[test]
    fn test_missing_orientation_keeps_previous() {
        let mut s = Smoother::new();
        let cfg = config(0.5, 0.5, 0.5);
        s.apply(Vector3::zeros(), 1.0, Some(0.4), &cfg);
        let result = s.apply(Vector3::zeros(), 1.0, None, &cfg);
        assert_eq!(result.orientation, 0.4);
    }

    #[test]
    fn test_linear_blend_crosses_zero_near_pi() {
        let mut s = Smoother::new();
        let cfg = config(1.0, 1.0, 0.5);
        s.apply(Vector3::zeros(), 1.0, Some(3.1), &cfg);
        let result = s.apply(Vector3::zeros(), 1.0, Some(-3.1), &cfg);
        // halfway the long way round
        assert!(approx_eq_f32(result.orientation, 0.0, 1e-6));
    }

    #[test]
    fn test_shortest_blend_wraps() {
        let mut s = Smoother::new();
        let mut cfg = config(1.0, 1.0, 0.5);
        cfg.orientation_blend = OrientationBlend::Shortest;
        s.apply(Vector3::zeros(), 1.0, Some(3.1), &cfg);
        let result = s.apply(Vector3::zeros(), 1.0, Some(-3.1), &cfg);
        assert!(result.orientation.abs() > 3.1);
    }

    #[test]
    fn test_ema_angle_plain_case() {
        assert!(approx_eq_f32(ema_angle(0.0, 1.0, 0.5), 0.5, 1e-6));
        assert!(approx_eq_f32(ema_angle(1.0, 0.0, 0.25), 0.75, 1e-6));
    }

    #[test]
    fn test_raw_scale_midpoint() {
        let cfg = FollowerConfig {
            min_scale: 0.1,
            max_scale: 3.8,
            ..FollowerConfig::default()
        };
        let scale = raw_scale(0.215, &Vector3::zeros(), &cfg);
        assert!(approx_eq_f32(scale, 1.95, 1e-4));
    }

    #[test]
    fn test_raw_scale_clamps_band() {
        let cfg = FollowerConfig::default();
        assert!(approx_eq_f32(raw_scale(0.01, &Vector3::zeros(), &cfg), cfg.min_scale, 1e-6));
        assert!(approx_eq_f32(raw_scale(2.0, &Vector3::zeros(), &cfg), cfg.max_scale, 1e-6));
    }

    #[test]
    fn test_raw_scale_fallback_bounds() {
        let cfg = FollowerConfig {
            min_scale: 0.1,
            max_scale: 0.2,
            ..FollowerConfig::default()
        };
        // centered: 1 / 0.5 = 2.0 -> 1.5
        assert!(approx_eq_f32(raw_scale(0.0, &Vector3::zeros(), &cfg), 1.5, 1e-6));
        // far away -> 0.5, ignoring the configured range
        assert!(approx_eq_f32(raw_scale(0.0, &Vector3::new(3.0, 4.0, 9.0), &cfg), 0.5, 1e-6));
        // 1 / (0.5 + 0.5) = 1.0
        assert!(approx_eq_f32(raw_scale(0.0, &Vector3::new(0.3, 0.4, 0.0), &cfg), 1.0, 1e-6));
    }

    #[test]
    fn test_reset() {
        let mut s = Smoother::new();
        let cfg = config(0.0, 0.0, 0.0);
        s.apply(Vector3::new(1.0, 2.0, 3.0), 1.0, None, &cfg);
        s.reset();
        assert!(s.state().is_none());
        let result = s.apply(Vector3::new(4.0, 5.0, 6.0), 2.0, None, &cfg);
        assert_eq!(result.position, Vector3::new(4.0, 5.0, 6.0));
    }
}
