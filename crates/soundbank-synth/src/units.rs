//! Unit conversions used by the SoundFont generator model.
//!
//! - [`timecents_to_seconds`] / [`seconds_to_timecents`] - envelope and LFO delay times
//! - [`centibels_to_gain`] / [`db_to_linear`] - attenuation
//! - [`abs_cents_to_hz`] - filter cutoff and LFO frequency
//! - [`cents_to_ratio`] / [`semitones_to_ratio`] - pitch

use libm::{exp2, exp2f, expf, log2};

/// Convert timecents to seconds: `2^(tc / 1200)`.
///
/// Computed in `f64` so that [`seconds_to_timecents`] inverts it exactly
/// enough for round-tripping.
///
/// ```rust
/// use soundbank_synth::units::timecents_to_seconds;
///
/// assert!((timecents_to_seconds(0.0) - 1.0).abs() < 1e-12);
/// assert!((timecents_to_seconds(1200.0) - 2.0).abs() < 1e-12);
/// ```
#[inline]
pub fn timecents_to_seconds(timecents: f64) -> f64 {
    exp2(timecents / 1200.0)
}

/// Convert seconds to timecents: `1200 * log2(s)`.
#[inline]
pub fn seconds_to_timecents(seconds: f64) -> f64 {
    1200.0 * log2(seconds)
}

/// Convert decibels to linear gain: `10^(dB / 20)`.
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    const FACTOR: f32 = core::f32::consts::LN_10 / 20.0;
    expf(db * FACTOR)
}

/// Gain for an attenuation in centibels (0 cB = unity).
#[inline]
pub fn centibels_to_gain(centibels: f32) -> f32 {
    db_to_linear(-centibels / 10.0)
}

/// Convert absolute cents to Hz (0 cents = 8.176 Hz, MIDI key 0).
#[inline]
pub fn abs_cents_to_hz(cents: f32) -> f32 {
    8.175_799 * exp2f(cents / 1200.0)
}

/// Frequency ratio for a pitch offset in cents.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    exp2f(cents / 1200.0)
}

/// Frequency ratio for a pitch offset in semitones.
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    exp2f(semitones / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timecent_defaults() {
        // -12000 tc is the "instant" default of envelope phases.
        let s = timecents_to_seconds(-12000.0);
        assert!((s - 0.000_976_562_5).abs() < 1e-12, "got {s}");
        assert!((timecents_to_seconds(-1200.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_attenuation() {
        assert_eq!(centibels_to_gain(0.0), 1.0);
        assert!((centibels_to_gain(60.0) - 0.501).abs() < 0.001);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_abs_cents() {
        // 6900 absolute cents is A4.
        let hz = abs_cents_to_hz(6900.0);
        assert!((hz - 440.0).abs() < 0.05, "got {hz}");
        assert!((abs_cents_to_hz(13500.0) - 19_912.0).abs() < 5.0);
    }

    #[test]
    fn test_ratios() {
        assert!((semitones_to_ratio(12.0) - 2.0).abs() < 1e-6);
        assert!((semitones_to_ratio(-12.0) - 0.5).abs() < 1e-6);
        assert!((cents_to_ratio(1200.0) - 2.0).abs() < 1e-6);
    }
}
