//! Real-time modulator evaluation.
//!
//! Modulators are evaluated against live controller values once per render
//! block, so controller changes reach notes that are already sounding. A
//! modulator's contribution is
//!
//! ```text
//! amount * curve(source) * curve(amount_source)   (then the transform)
//! ```
//!
//! where `curve` maps the raw controller value to `0..1` or `-1..1` following
//! the source's direction, polarity and curve shape.
//!
//! Some sources are applied by the channel itself: the pitch wheel through
//! note bending, CC7 and CC11 through the channel gain law, CC10 through the
//! channel pan, and CC91/CC93 through the channel's send buses. Modulators
//! driven by those sources are skipped here so they are not applied twice.

use libm::log10f;
use soundbank_sf2::{
    CurveType, Direction, GENERATOR_COUNT, GeneratorType, Modulator, ModulatorSource, Polarity,
    Transform, general,
};

/// MIDI controller numbers the engine interprets.
pub mod cc {
    /// Bank select MSB.
    pub const BANK_SELECT: u8 = 0;
    /// Modulation wheel.
    pub const MODULATION: u8 = 1;
    /// Data entry MSB.
    pub const DATA_ENTRY: u8 = 6;
    /// Channel volume MSB.
    pub const VOLUME: u8 = 7;
    /// Pan.
    pub const PAN: u8 = 10;
    /// Expression MSB.
    pub const EXPRESSION: u8 = 11;
    /// Channel volume LSB.
    pub const VOLUME_LSB: u8 = 39;
    /// Expression LSB.
    pub const EXPRESSION_LSB: u8 = 43;
    /// Sustain (hold) pedal.
    pub const SUSTAIN: u8 = 64;
    /// Release time.
    pub const RELEASE_TIME: u8 = 72;
    /// Brightness.
    pub const BRIGHTNESS: u8 = 74;
    /// Reverb send.
    pub const REVERB: u8 = 91;
    /// Tremolo depth.
    pub const TREMOLO: u8 = 92;
    /// Chorus send.
    pub const CHORUS: u8 = 93;
    /// NRPN LSB.
    pub const NRPN_LSB: u8 = 98;
    /// NRPN MSB.
    pub const NRPN_MSB: u8 = 99;
    /// RPN LSB.
    pub const RPN_LSB: u8 = 100;
    /// RPN MSB.
    pub const RPN_MSB: u8 = 101;
    /// All sound off.
    pub const ALL_SOUND_OFF: u8 = 120;
    /// Reset all controllers.
    pub const RESET_ALL_CONTROLLERS: u8 = 121;
    /// All notes off.
    pub const ALL_NOTES_OFF: u8 = 123;
}

/// Pitch wheel center position.
pub const PITCH_WHEEL_CENTER: u16 = 8192;

/// Live controller values of one channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerState {
    controllers: [u8; 128],
    /// 14-bit pitch wheel position (`0..=16383`, center 8192).
    pub pitch_wheel: u16,
    /// Pitch wheel range in semitones.
    pub pitch_wheel_range: f32,
    /// Channel aftertouch.
    pub channel_pressure: u8,
}

impl Default for ControllerState {
    fn default() -> Self {
        let mut controllers = [0; 128];
        controllers[cc::VOLUME as usize] = 100;
        controllers[cc::PAN as usize] = 64;
        controllers[cc::EXPRESSION as usize] = 127;
        controllers[cc::RELEASE_TIME as usize] = 64;
        controllers[cc::BRIGHTNESS as usize] = 64;
        Self {
            controllers,
            pitch_wheel: PITCH_WHEEL_CENTER,
            pitch_wheel_range: 2.0,
            channel_pressure: 0,
        }
    }
}

impl ControllerState {
    /// Current value of a controller.
    pub fn get(&self, controller: u8) -> u8 {
        self.controllers[usize::from(controller & 0x7F)]
    }

    /// Store a controller value.
    pub fn set(&mut self, controller: u8, value: u8) {
        self.controllers[usize::from(controller & 0x7F)] = value & 0x7F;
    }

    /// Reset every controller except volume and pan, and center the wheel.
    /// The pitch wheel range is kept.
    pub fn reset(&mut self) {
        let volume = self.get(cc::VOLUME);
        let pan = self.get(cc::PAN);
        let range = self.pitch_wheel_range;
        *self = Self::default();
        self.set(cc::VOLUME, volume);
        self.set(cc::PAN, pan);
        self.pitch_wheel_range = range;
    }

    /// Pitch wheel offset in semitones.
    pub fn pitch_bend_semitones(&self) -> f32 {
        (f32::from(self.pitch_wheel) - f32::from(PITCH_WHEEL_CENTER)) / 8192.0
            * self.pitch_wheel_range
    }
}

/// Everything a modulator source can read.
#[derive(Clone, Copy, Debug)]
pub struct ModulationContext<'a> {
    /// Note-on key.
    pub key: u8,
    /// Note-on velocity.
    pub velocity: u8,
    /// Channel controllers.
    pub controllers: &'a ControllerState,
}

impl<'a> ModulationContext<'a> {
    /// Bundle a note with its channel's controllers.
    pub fn new(key: u8, velocity: u8, controllers: &'a ControllerState) -> Self {
        Self {
            key,
            velocity,
            controllers,
        }
    }
}

/// Whether the channel applies this source itself.
pub fn is_channel_applied(source: ModulatorSource) -> bool {
    source.is_pitch_wheel()
        || source.is_cc_number(cc::VOLUME)
        || source.is_cc_number(cc::EXPRESSION)
        || source.is_cc_number(cc::PAN)
        || source.is_cc_number(cc::REVERB)
        || source.is_cc_number(cc::CHORUS)
}

/// Raw source value normalized to `0..=1`, before the curve.
///
/// `None` for sources that have no value (no controller, links).
pub fn raw_source_value(source: ModulatorSource, ctx: &ModulationContext<'_>) -> Option<f32> {
    if source.is_cc {
        return Some(f32::from(ctx.controllers.get(source.index)) / 127.0);
    }
    match source.index {
        general::NOTE_ON_VELOCITY => Some(f32::from(ctx.velocity) / 127.0),
        general::NOTE_ON_KEY => Some(f32::from(ctx.key) / 127.0),
        general::CHANNEL_PRESSURE | general::POLY_PRESSURE => {
            Some(f32::from(ctx.controllers.channel_pressure) / 127.0)
        }
        general::PITCH_WHEEL => Some(f32::from(ctx.controllers.pitch_wheel) / 16384.0),
        general::PITCH_WHEEL_SENSITIVITY => Some(ctx.controllers.pitch_wheel_range / 127.0),
        _ => None,
    }
}

/// SF2 concave curve on `0..=1`.
#[inline]
pub fn concave(x: f32) -> f32 {
    if x >= 1.0 {
        return 1.0;
    }
    (-(5.0 / 12.0) * log10f(1.0 - x)).clamp(0.0, 1.0)
}

/// SF2 convex curve on `0..=1`.
#[inline]
pub fn convex(x: f32) -> f32 {
    1.0 - concave(1.0 - x)
}

/// Apply a source's direction, polarity and curve to a normalized value.
pub fn shape(source: ModulatorSource, value: f32) -> f32 {
    let x = match source.direction {
        Direction::Positive => value,
        Direction::Negative => 1.0 - value,
    };
    let unipolar = |x: f32| match source.curve {
        CurveType::Linear => x,
        CurveType::Concave => concave(x),
        CurveType::Convex => convex(x),
        CurveType::Switch => {
            if x >= 0.5 {
                1.0
            } else {
                0.0
            }
        }
    };
    match source.polarity {
        Polarity::Unipolar => unipolar(x),
        Polarity::Bipolar => match source.curve {
            CurveType::Linear => 2.0 * x - 1.0,
            CurveType::Switch => {
                if x >= 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            _ if x >= 0.5 => unipolar(2.0 * x - 1.0),
            _ => -unipolar(1.0 - 2.0 * x),
        },
    }
}

/// Contribution of one modulator in the destination's units.
pub fn evaluate(modulator: &Modulator, ctx: &ModulationContext<'_>) -> f32 {
    if modulator.destination.is_none() {
        return 0.0;
    }
    let Some(primary) = raw_source_value(modulator.source, ctx) else {
        return 0.0;
    };
    let secondary = if modulator.amount_source.is_none() {
        1.0
    } else {
        match raw_source_value(modulator.amount_source, ctx) {
            Some(v) => shape(modulator.amount_source, v),
            None => return 0.0,
        }
    };
    let value = f32::from(modulator.amount) * shape(modulator.source, primary) * secondary;
    match modulator.transform {
        Transform::Linear => value,
        Transform::Absolute => value.abs(),
    }
}

/// Per-destination sums of every modulator's contribution.
#[derive(Clone, Debug, PartialEq)]
pub struct ModulationSums {
    values: [f32; GENERATOR_COUNT],
}

impl Default for ModulationSums {
    fn default() -> Self {
        Self {
            values: [0.0; GENERATOR_COUNT],
        }
    }
}

impl ModulationSums {
    /// Evaluate `modulators`, skipping channel-applied sources.
    pub fn evaluate(modulators: &[Modulator], ctx: &ModulationContext<'_>) -> Self {
        let mut sums = Self::default();
        for m in modulators {
            if is_channel_applied(m.source) {
                continue;
            }
            if let Some(dest) = m.destination {
                sums.values[dest.index()] += evaluate(m, ctx);
            }
        }
        sums
    }

    /// Summed contribution to one generator.
    pub fn get(&self, kind: GeneratorType) -> f32 {
        self.values[kind.index()]
    }
}

/// Combine the default modulators with a layer's zone modulators.
///
/// Instrument-level modulators (local over global) replace identical default
/// modulators; preset-level modulators (local over global) are added on top.
pub fn merge_modulators(
    defaults: &[Modulator],
    instrument_global: &[Modulator],
    instrument_local: &[Modulator],
    preset_global: &[Modulator],
    preset_local: &[Modulator],
) -> Vec<Modulator> {
    let mut merged = defaults.to_vec();
    for m in override_level(instrument_global, instrument_local) {
        replace_or_push(&mut merged, m);
    }
    merged.extend(override_level(preset_global, preset_local));
    merged
}

fn override_level(global: &[Modulator], local: &[Modulator]) -> Vec<Modulator> {
    let mut level = global.to_vec();
    for m in local {
        replace_or_push(&mut level, *m);
    }
    level
}

fn replace_or_push(list: &mut Vec<Modulator>, modulator: Modulator) {
    match list.iter_mut().find(|m| m.is_identical(&modulator)) {
        Some(slot) => *slot = modulator,
        None => list.push(modulator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundbank_sf2::DEFAULT_MODULATORS;

    fn ctx(controllers: &ControllerState, velocity: u8) -> ModulationContext<'_> {
        ModulationContext::new(60, velocity, controllers)
    }

    #[test]
    fn test_curves_endpoints() {
        assert_eq!(concave(0.0), 0.0);
        assert_eq!(concave(1.0), 1.0);
        assert!((convex(0.0)).abs() < 1e-6);
        assert_eq!(convex(1.0), 1.0);
        assert!(concave(0.5) < 0.5 && convex(0.5) > 0.5);
    }

    #[test]
    fn test_full_velocity_has_no_attenuation() {
        let controllers = ControllerState::default();
        let sums = ModulationSums::evaluate(&DEFAULT_MODULATORS, &ctx(&controllers, 127));
        assert_eq!(sums.get(GeneratorType::InitialAttenuation), 0.0);
    }

    #[test]
    fn test_low_velocity_attenuates() {
        let controllers = ControllerState::default();
        let soft = ModulationSums::evaluate(&DEFAULT_MODULATORS, &ctx(&controllers, 20));
        let loud = ModulationSums::evaluate(&DEFAULT_MODULATORS, &ctx(&controllers, 100));
        let soft_cb = soft.get(GeneratorType::InitialAttenuation);
        assert!(soft_cb > loud.get(GeneratorType::InitialAttenuation));
        assert!(soft_cb <= 960.0, "got {soft_cb}");
    }

    #[test]
    fn test_mod_wheel_drives_vibrato_depth() {
        let mut controllers = ControllerState::default();
        controllers.set(cc::MODULATION, 127);
        let sums = ModulationSums::evaluate(&DEFAULT_MODULATORS, &ctx(&controllers, 100));
        assert!((sums.get(GeneratorType::VibLfoToPitch) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_channel_sources_are_masked() {
        let mut controllers = ControllerState::default();
        controllers.set(cc::VOLUME, 0);
        controllers.set(cc::PAN, 0);
        controllers.set(cc::REVERB, 127);
        controllers.pitch_wheel = 16383;
        let sums = ModulationSums::evaluate(&DEFAULT_MODULATORS, &ctx(&controllers, 127));
        assert_eq!(sums.get(GeneratorType::InitialAttenuation), 0.0);
        assert_eq!(sums.get(GeneratorType::Pan), 0.0);
        assert_eq!(sums.get(GeneratorType::FineTune), 0.0);
        assert_eq!(sums.get(GeneratorType::ReverbEffectsSend), 0.0);
    }

    #[test]
    fn test_bipolar_release_centered() {
        let controllers = ControllerState::default();
        let sums = ModulationSums::evaluate(&DEFAULT_MODULATORS, &ctx(&controllers, 100));
        let release = sums.get(GeneratorType::ReleaseVolEnv);
        assert!(release.abs() < 12.0, "CC72 at 64 should be near neutral, got {release}");
    }

    #[test]
    fn test_pitch_wheel_evaluation_uses_range() {
        let mut controllers = ControllerState::default();
        controllers.pitch_wheel = 16383;
        controllers.pitch_wheel_range = 12.0;
        // The wheel default modulator, evaluated directly.
        let cents = evaluate(&DEFAULT_MODULATORS[3], &ctx(&controllers, 100));
        assert!((cents - 1200.0).abs() < 1.0, "got {cents}");
    }

    #[test]
    fn test_merge_replaces_identical_defaults() {
        let mut louder = DEFAULT_MODULATORS[0];
        louder.amount = 480;
        let merged = merge_modulators(&DEFAULT_MODULATORS, &[], &[louder], &[], &[]);
        assert_eq!(merged.len(), DEFAULT_MODULATORS.len());
        assert_eq!(merged[0].amount, 480);
    }

    #[test]
    fn test_merge_local_overrides_global_then_presets_add() {
        let mut global = DEFAULT_MODULATORS[1];
        global.amount = 10;
        let mut local = DEFAULT_MODULATORS[1];
        local.amount = 20;
        let merged = merge_modulators(&DEFAULT_MODULATORS, &[global], &[local], &[], &[global]);
        assert_eq!(merged.len(), DEFAULT_MODULATORS.len() + 1);
        assert_eq!(merged[1].amount, 20);
        assert_eq!(merged.last().map(|m| m.amount), Some(10));
    }

    #[test]
    fn test_reset_keeps_volume_pan_and_range() {
        let mut controllers = ControllerState::default();
        controllers.set(cc::VOLUME, 30);
        controllers.set(cc::MODULATION, 90);
        controllers.pitch_wheel = 0;
        controllers.pitch_wheel_range = 7.0;
        controllers.reset();
        assert_eq!(controllers.get(cc::VOLUME), 30);
        assert_eq!(controllers.get(cc::MODULATION), 0);
        assert_eq!(controllers.pitch_wheel, PITCH_WHEEL_CENTER);
        assert_eq!(controllers.pitch_wheel_range, 7.0);
    }

    #[test]
    fn test_pitch_bend_semitones() {
        let mut controllers = ControllerState::default();
        controllers.pitch_wheel = 0;
        assert_eq!(controllers.pitch_bend_semitones(), -2.0);
    }
}
