//! Delayed low frequency oscillators for vibrato and tremolo.
//!
//! SoundFont LFOs are triangles that start at zero, rise first, and stay
//! silent for their delay time. The channel vibrato installed through NRPN
//! uses a sine of the same shape.

use core::f32::consts::PI;
use libm::sinf;

/// LFO waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LfoShape {
    /// Zero-start triangle, the SoundFont LFO shape.
    #[default]
    Triangle,
    /// Zero-start sine.
    Sine,
}

/// Phase-accumulating LFO with an initial delay.
///
/// Output is in `-1.0..=1.0` and stays at zero until the delay has elapsed.
///
/// # Example
///
/// ```rust
/// use soundbank_synth::{Lfo, LfoShape};
///
/// let mut lfo = Lfo::new(1000.0, 5.0, 0.1, LfoShape::Triangle);
/// assert_eq!(lfo.advance(100), 0.0);
/// assert!(lfo.advance(50) > 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct Lfo {
    /// Phase in `0.0..1.0`.
    phase: f32,
    phase_inc: f32,
    sample_rate: f32,
    delay_remaining: u32,
    shape: LfoShape,
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new(48000.0, 8.176, 0.0, LfoShape::Triangle)
    }
}

impl Lfo {
    /// Create an LFO at `freq_hz` that starts after `delay_secs`.
    pub fn new(sample_rate: f32, freq_hz: f32, delay_secs: f32, shape: LfoShape) -> Self {
        let delay = delay_secs * sample_rate;
        Self {
            phase: 0.0,
            phase_inc: (freq_hz / sample_rate).max(0.0),
            sample_rate,
            delay_remaining: if delay.is_finite() && delay > 0.0 {
                delay as u32
            } else {
                0
            },
            shape,
        }
    }

    /// Frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.phase_inc * self.sample_rate
    }

    /// Waveform.
    pub fn shape(&self) -> LfoShape {
        self.shape
    }

    /// Whether the delay is still running.
    pub fn is_delayed(&self) -> bool {
        self.delay_remaining > 0
    }

    /// Current output without advancing.
    #[inline]
    pub fn value(&self) -> f32 {
        if self.delay_remaining > 0 {
            return 0.0;
        }
        let p = self.phase;
        match self.shape {
            LfoShape::Triangle => {
                if p < 0.25 {
                    4.0 * p
                } else if p < 0.75 {
                    2.0 - 4.0 * p
                } else {
                    4.0 * p - 4.0
                }
            }
            LfoShape::Sine => sinf(2.0 * PI * p),
        }
    }

    /// Next output, one sample at a time.
    #[inline]
    pub fn next(&mut self) -> f32 {
        self.advance(1)
    }

    /// Return the current output and move `samples` ahead.
    ///
    /// Voices call this once per control block.
    pub fn advance(&mut self, samples: u32) -> f32 {
        let out = self.value();
        let mut samples = samples;
        if self.delay_remaining > 0 {
            let waited = samples.min(self.delay_remaining);
            self.delay_remaining -= waited;
            samples -= waited;
        }
        self.phase = (self.phase + self.phase_inc * samples as f32).fract();
        out
    }
}
