// DSP utilities - Audio hygiene and parameter smoothing for the render callback

/// Flush denormals to zero
///
/// Threshold 1e-15, far below 32-bit float noise
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// Hard clamp into [-1, 1]. Decoded audio is already normalized, so this
/// only catches gain overshoot.
#[inline]
pub fn hard_clip(x: f32) -> f32 {
    x.clamp(-1.0, 1.0)
}

/// One-pole smoother: y[n] = y[n-1] + α * (x[n] - y[n-1])
///
/// Used on gain changes to avoid clicks.
#[derive(Debug, Clone)]
pub struct OnePoleSmoother {
    current: f32,
    coefficient: f32,
}

impl OnePoleSmoother {
    /// `time_constant_ms` is the time to reach ~63% of the target
    pub fn new(initial_value: f32, time_constant_ms: f32, sample_rate: f32) -> Self {
        let time_constant_samples = (time_constant_ms * 0.001 * sample_rate).max(1.0);
        Self {
            current: initial_value,
            coefficient: (1.0 / time_constant_samples).min(1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        self.current += self.coefficient * (target - self.current);
        self.current = flush_denormals_to_zero(self.current);
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_denormals() {
        assert_eq!(flush_denormals_to_zero(1e-20), 0.0);
        assert_eq!(flush_denormals_to_zero(0.1), 0.1);
        assert_eq!(flush_denormals_to_zero(-0.1), -0.1);
    }

    #[test]
    fn test_hard_clip() {
        assert_eq!(hard_clip(1.5), 1.0);
        assert_eq!(hard_clip(-2.0), -1.0);
        assert_eq!(hard_clip(0.3), 0.3);
    }

    #[test]
    fn test_smoother_convergence() {
        // 10ms at 44.1kHz = 441 samples for 63%; run 100ms
        let mut smoother = OnePoleSmoother::new(0.0, 10.0, 44100.0);
        let mut final_value = 0.0;
        for _ in 0..4410 {
            final_value = smoother.process(1.0);
        }
        assert!((final_value - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_smoother_no_overshoot() {
        let mut smoother = OnePoleSmoother::new(0.0, 5.0, 44100.0);
        for _ in 0..100 {
            let value = smoother.process(1.0);
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn test_smoother_holds_initial_value() {
        let mut smoother = OnePoleSmoother::new(0.7, 10.0, 48000.0);
        for _ in 0..64 {
            assert!((smoother.process(0.7) - 0.7).abs() < 1e-6);
        }
    }
}
