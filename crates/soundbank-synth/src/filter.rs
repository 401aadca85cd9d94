//! Voice lowpass filter.
//!
//! RBJ cookbook lowpass in Direct Form I, driven by `initialFilterFc`
//! (absolute cents) and `initialFilterQ` (centibels of resonance). A cutoff
//! at the top of the generator range leaves the signal untouched.

use core::f32::consts::PI;
use libm::{cosf, sinf};

use crate::units::{abs_cents_to_hz, db_to_linear};

/// Cutoff at or above which the filter is bypassed (absolute cents).
pub const BYPASS_CENTS: f32 = 13500.0;

/// RBJ lowpass coefficients `(b0, b1, b2, a0, a1, a2)`.
pub fn lowpass_coefficients(
    frequency: f32,
    q: f32,
    sample_rate: f32,
) -> (f32, f32, f32, f32, f32, f32) {
    let omega = 2.0 * PI * frequency / sample_rate;
    let cos_omega = cosf(omega);
    let alpha = sinf(omega) / (2.0 * q);

    let b1 = 1.0 - cos_omega;
    let b0 = b1 / 2.0;
    (b0, b1, b0, 1.0 + alpha, -2.0 * cos_omega, 1.0 - alpha)
}

/// Resonant lowpass with bypass.
///
/// ```text
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
/// ```
#[derive(Debug, Clone)]
pub struct LowpassFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
    sample_rate: f32,
    bypass: bool,
    cutoff_cents: f32,
    q_cb: f32,
}

impl LowpassFilter {
    /// A bypassed filter.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            sample_rate,
            bypass: true,
            cutoff_cents: BYPASS_CENTS,
            q_cb: 0.0,
        }
    }

    /// Set cutoff in absolute cents and resonance in centibels.
    ///
    /// Coefficients are only recomputed when a value changes.
    pub fn set(&mut self, cutoff_cents: f32, q_cb: f32) {
        if cutoff_cents == self.cutoff_cents && q_cb == self.q_cb {
            return;
        }
        self.cutoff_cents = cutoff_cents;
        self.q_cb = q_cb;

        let hz = abs_cents_to_hz(cutoff_cents).min(self.sample_rate * 0.45);
        if cutoff_cents >= BYPASS_CENTS || !hz.is_finite() || hz <= 0.0 {
            if !self.bypass {
                self.clear();
            }
            self.bypass = true;
            return;
        }
        self.bypass = false;
        let q = core::f32::consts::FRAC_1_SQRT_2 * db_to_linear(q_cb.max(0.0) / 10.0);
        let (b0, b1, b2, a0, a1, a2) = lowpass_coefficients(hz, q, self.sample_rate);
        let a0_inv = 1.0 / a0;
        self.b0 = b0 * a0_inv;
        self.b1 = b1 * a0_inv;
        self.b2 = b2 * a0_inv;
        self.a1 = a1 * a0_inv;
        self.a2 = a2 * a0_inv;
    }

    /// Whether the filter currently passes input through.
    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Filter one sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        if self.bypass {
            return input;
        }
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }

    /// Clear the delay lines.
    pub fn clear(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cutoff_bypasses() {
        let mut filter = LowpassFilter::new(48000.0);
        filter.set(13500.0, 0.0);
        assert!(filter.is_bypassed());
        assert_eq!(filter.process(0.25), 0.25);
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let mut filter = LowpassFilter::new(44100.0);
        filter.set(8000.0, 0.0);
        assert!(!filter.is_bypassed());
        let mut out = 0.0;
        for _ in 0..2000 {
            out = filter.process(1.0);
        }
        assert!((out - 1.0).abs() < 0.05, "Expected DC near 1.0, got {out}");
    }

    #[test]
    fn test_lowpass_attenuates_nyquist() {
        let mut filter = LowpassFilter::new(44100.0);
        // ~261 Hz
        filter.set(6000.0, 0.0);
        let mut peak = 0.0f32;
        for n in 0..4000 {
            let x = if n % 2 == 0 { 1.0 } else { -1.0 };
            let y = filter.process(x);
            if n > 2000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.01, "Expected Nyquist to be removed, got {peak}");
    }

    #[test]
    fn test_coefficients_finite() {
        let (b0, b1, b2, a0, a1, a2) = lowpass_coefficients(1000.0, 0.707, 44100.0);
        for c in [b0, b1, b2, a0, a1, a2] {
            assert!(c.is_finite());
        }
        assert!(a0 > 0.0);
    }
}
