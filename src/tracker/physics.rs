use nalgebra::Vector3;

/// Frame interval the smoothing rate is tuned for (60 updates per second)
pub const BASELINE_FRAME_MS: f32 = 16.67;

/// Blend factor for one step of `delta_ms`, normalized to the 60 Hz baseline.
///
/// Not clamped: a long frame gives a factor above 1 and the step overshoots.
pub fn effective_factor(smoothing_rate: f32, delta_ms: f32) -> f32 {
    smoothing_rate * (delta_ms / BASELINE_FRAME_MS)
}

/// Move `current` toward `target` by one time-normalized step
pub fn physics_step(
    current: &Vector3<f32>,
    target: &Vector3<f32>,
    smoothing_rate: f32,
    delta_ms: f32,
) -> Vector3<f32> {
    let factor = effective_factor(smoothing_rate, delta_ms);
    current + (target - current) * factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_at_baseline() {
        assert!((effective_factor(0.05, BASELINE_FRAME_MS) - 0.05).abs() < 1e-6);
        assert!((effective_factor(0.05, 2.0 * BASELINE_FRAME_MS) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_zero_delta_does_not_move() {
        let current = Vector3::new(1.0, 2.0, 3.0);
        let next = physics_step(&current, &Vector3::zeros(), 0.05, 0.0);
        assert_eq!(next, current);
    }

    #[test]
    fn test_converges_monotonically() {
        let target = Vector3::new(1.0, -2.0, 0.5);
        let mut current = Vector3::zeros();
        let mut last = (target - current).norm();
        for _ in 0..100 {
            current = physics_step(&current, &target, 0.05, BASELINE_FRAME_MS);
            let distance = (target - current).norm();
            assert!(distance < last);
            last = distance;
        }
        assert!(last < 0.05);
    }

    #[test]
    fn test_long_frame_overshoots() {
        let target = Vector3::new(1.0, 0.0, 0.0);
        // half a second stall: factor 0.05 * 30 = 1.5
        let next = physics_step(&Vector3::zeros(), &target, 0.05, 30.0 * BASELINE_FRAME_MS);
        assert!(effective_factor(0.05, 30.0 * BASELINE_FRAME_MS) > 1.0);
        assert!((next.x - 1.5).abs() < 1e-5);
    }
}
