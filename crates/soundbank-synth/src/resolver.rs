//! Generator resolution for one sample layer.
//!
//! [`VoiceParams::resolve`] folds the four zones of a [`Layer`] into one value
//! per generator:
//!
//! ```text
//! instrument = local zone, else instrument global zone, else default
//! preset     = local zone, else preset global zone, else 0
//! additive   : clamp(instrument + preset)
//! otherwise  : instrument, else preset, else default
//! ```
//!
//! The static values are fixed at note-on. Everything that can move while the
//! note sounds (attenuation, pitch, pan, filter, envelope times) is derived on
//! demand from those values plus the live [`ModulationSums`].

use std::ops::Range;

use soundbank_config::SynthConfig;
use soundbank_sf2::{
    DEFAULT_MODULATORS, GENERATOR_COUNT, GeneratorType, Layer, Modulator, SampleKind, Zone,
};

use crate::envelope::EnvelopeTimes;
use crate::modulation::{ModulationSums, merge_modulators};
use crate::units::{abs_cents_to_hz, db_to_linear, timecents_to_seconds};

/// Points per coarse address offset unit.
const COARSE_OFFSET: i64 = 32768;

/// Sustain attenuation at which the sustain phase is silent (100 dB).
const SILENT_SUSTAIN_CB: f32 = 1000.0;

/// `sampleModes` generator values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopMode {
    /// Play start to end once.
    #[default]
    NoLoop,
    /// Loop for the whole life of the voice, including release.
    Continuous,
    /// Loop until release, then play out to the end.
    UntilRelease,
}

impl LoopMode {
    /// Decode a `sampleModes` value. Mode 2 is reserved and plays unlooped.
    pub fn from_generator(value: i32) -> Self {
        match value & 3 {
            1 => LoopMode::Continuous,
            3 => LoopMode::UntilRelease,
            _ => LoopMode::NoLoop,
        }
    }
}

/// Resolved synthesis parameters of one sample layer.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceParams {
    generators: [i32; GENERATOR_COUNT],
    modulators: Vec<Modulator>,
    /// Key used for pitch and keynum scaling.
    pub key: u8,
    /// Velocity seen by modulators.
    pub velocity: u8,
    /// Key at which the sample plays at its recorded pitch.
    pub root_key: u8,
    /// Sample pitch correction in cents.
    pub pitch_correction: i8,
    /// Recorded sample rate.
    pub sample_rate: u32,
    /// Index into the font's sample table.
    pub sample_index: usize,
    /// Channel role of the sample.
    pub kind: SampleKind,
    /// Absolute playback range in the PCM blob.
    pub range: Range<usize>,
    /// Absolute loop range, when the loop is usable.
    pub loop_range: Option<Range<usize>>,
    /// Loop behaviour.
    pub loop_mode: LoopMode,
    /// Choke group, 0 for none.
    pub exclusive_class: u8,
    attenuation_correction: f32,
    max_release_secs: f32,
}

impl VoiceParams {
    /// Resolve a layer for the given note.
    pub fn resolve(layer: &Layer<'_>, key: u8, velocity: u8, config: &SynthConfig) -> Self {
        let mut generators = [0i32; GENERATOR_COUNT];
        for kind in GeneratorType::ALL {
            generators[kind.index()] = resolve_generator(layer, kind);
        }
        let get = |kind: GeneratorType| generators[kind.index()];

        let modulators = merge_modulators(
            &DEFAULT_MODULATORS,
            zone_modulators(layer.instrument_global),
            &layer.instrument_zone.modulators,
            zone_modulators(layer.preset_global),
            &layer.preset_zone.modulators,
        );

        let override_u8 = |kind: GeneratorType, fallback: u8| {
            u8::try_from(get(kind)).ok().filter(|v| *v <= 127).unwrap_or(fallback)
        };
        let sample = layer.sample;
        let recorded_root = if sample.original_pitch <= 127 {
            sample.original_pitch
        } else {
            60
        };

        let offset = |fine: GeneratorType, coarse: GeneratorType| {
            i64::from(get(fine)) + COARSE_OFFSET * i64::from(get(coarse))
        };
        let lo = sample.start as i64;
        let hi = sample.end as i64;
        let start_offset = offset(
            GeneratorType::StartAddrsOffset,
            GeneratorType::StartAddrsCoarseOffset,
        );
        let start = (lo + start_offset).clamp(lo, hi);
        let end = (hi + offset(GeneratorType::EndAddrsOffset, GeneratorType::EndAddrsCoarseOffset))
            .clamp(start, hi);
        let loop_start = sample.loop_start as i64
            + offset(
                GeneratorType::StartloopAddrsOffset,
                GeneratorType::StartloopAddrsCoarseOffset,
            );
        let loop_end = sample.loop_end as i64
            + offset(
                GeneratorType::EndloopAddrsOffset,
                GeneratorType::EndloopAddrsCoarseOffset,
            );
        let loop_range = (start <= loop_start && loop_start < loop_end && loop_end <= end)
            .then(|| loop_start as usize..loop_end as usize);

        Self {
            modulators,
            key: override_u8(GeneratorType::Keynum, key),
            velocity: override_u8(GeneratorType::Velocity, velocity),
            root_key: override_u8(GeneratorType::OverridingRootKey, recorded_root),
            pitch_correction: sample.pitch_correction,
            sample_rate: sample.sample_rate,
            sample_index: layer.sample_index,
            kind: sample.kind,
            range: start as usize..end as usize,
            loop_range,
            loop_mode: LoopMode::from_generator(get(GeneratorType::SampleModes)),
            exclusive_class: u8::try_from(get(GeneratorType::ExclusiveClass)).unwrap_or(0),
            attenuation_correction: config.attenuation_correction,
            max_release_secs: config.max_release_secs,
            generators,
        }
    }

    /// Resolved static value of a generator.
    pub fn generator(&self, kind: GeneratorType) -> i32 {
        self.generators[kind.index()]
    }

    /// Merged modulators evaluated every block.
    pub fn modulators(&self) -> &[Modulator] {
        &self.modulators
    }

    /// Generator plus modulation, clamped to the generator's range.
    pub fn modulated(&self, kind: GeneratorType, sums: &ModulationSums) -> f32 {
        let (min, max) = kind.limits();
        (self.generator(kind) as f32 + sums.get(kind)).clamp(min as f32, max as f32)
    }

    /// Attenuation in centibels.
    pub fn attenuation_cb(&self, sums: &ModulationSums) -> f32 {
        self.modulated(GeneratorType::InitialAttenuation, sums)
    }

    /// Linear gain for the modulated attenuation.
    pub fn attenuation_gain(&self, sums: &ModulationSums) -> f32 {
        db_to_linear(-(self.attenuation_cb(sums) / 10.0) * self.attenuation_correction)
    }

    /// Sustain level relative to the envelope peak.
    pub fn sustain_level(&self, sums: &ModulationSums) -> f32 {
        let cb = self.modulated(GeneratorType::SustainVolEnv, sums);
        if cb >= SILENT_SUSTAIN_CB {
            0.0
        } else {
            db_to_linear(-cb / 10.0)
        }
    }

    /// Absolute gain while sustaining: attenuation times sustain level.
    pub fn sustain_absolute_gain(&self, sums: &ModulationSums) -> f32 {
        self.attenuation_gain(sums) * self.sustain_level(sums)
    }

    /// Volume envelope phases, with keynum scaling of hold and decay.
    pub fn envelope_times(&self, sums: &ModulationSums) -> EnvelopeTimes {
        let key_offset = 60.0 - f32::from(self.key);
        let seconds = |kind: GeneratorType, extra: f32| {
            timecents_to_seconds(f64::from(self.modulated(kind, sums) + extra)) as f32
        };
        EnvelopeTimes {
            delay: seconds(GeneratorType::DelayVolEnv, 0.0),
            attack: seconds(GeneratorType::AttackVolEnv, 0.0),
            hold: seconds(
                GeneratorType::HoldVolEnv,
                self.modulated(GeneratorType::KeynumToVolEnvHold, sums) * key_offset,
            ),
            decay: seconds(
                GeneratorType::DecayVolEnv,
                self.modulated(GeneratorType::KeynumToVolEnvDecay, sums) * key_offset,
            ),
            sustain_level: self.sustain_level(sums),
        }
    }

    /// Release time in seconds, capped by the configured maximum.
    pub fn release_secs(&self, sums: &ModulationSums) -> f32 {
        let secs =
            timecents_to_seconds(f64::from(self.modulated(GeneratorType::ReleaseVolEnv, sums)));
        (secs as f32).min(self.max_release_secs)
    }

    /// Pan in `-1.0..=1.0`.
    pub fn pan(&self, sums: &ModulationSums) -> f32 {
        self.modulated(GeneratorType::Pan, sums) / 500.0
    }

    /// Pitch offset from the recorded pitch, in semitones.
    ///
    /// LFO and pitch-bend offsets are added by the voice.
    pub fn pitch_semitones(&self, sums: &ModulationSums) -> f32 {
        let scale = self.modulated(GeneratorType::ScaleTuning, sums) / 100.0;
        let keys = (f32::from(self.key) - f32::from(self.root_key)) * scale;
        keys + self.modulated(GeneratorType::CoarseTune, sums)
            + (self.modulated(GeneratorType::FineTune, sums) + f32::from(self.pitch_correction))
                / 100.0
    }

    /// Vibrato LFO `(frequency Hz, delay seconds)`.
    pub fn vibrato_lfo(&self) -> (f32, f32) {
        self.lfo(GeneratorType::FreqVibLfo, GeneratorType::DelayVibLfo)
    }

    /// Modulation LFO `(frequency Hz, delay seconds)`.
    pub fn modulation_lfo(&self) -> (f32, f32) {
        self.lfo(GeneratorType::FreqModLfo, GeneratorType::DelayModLfo)
    }

    fn lfo(&self, freq: GeneratorType, delay: GeneratorType) -> (f32, f32) {
        (
            abs_cents_to_hz(self.generator(freq) as f32),
            timecents_to_seconds(f64::from(self.generator(delay))) as f32,
        )
    }

    /// Filter cutoff in absolute cents, before LFO modulation.
    pub fn filter_cutoff(&self, sums: &ModulationSums) -> f32 {
        self.modulated(GeneratorType::InitialFilterFc, sums)
    }

    /// Filter resonance in centibels.
    pub fn filter_q(&self, sums: &ModulationSums) -> f32 {
        self.modulated(GeneratorType::InitialFilterQ, sums)
    }

    /// Reverb send in `0.0..=1.0`.
    pub fn reverb_send(&self, sums: &ModulationSums) -> f32 {
        self.modulated(GeneratorType::ReverbEffectsSend, sums) / 1000.0
    }

    /// Chorus send in `0.0..=1.0`.
    pub fn chorus_send(&self, sums: &ModulationSums) -> f32 {
        self.modulated(GeneratorType::ChorusEffectsSend, sums) / 1000.0
    }
}

fn zone_modulators(zone: Option<&Zone>) -> &[Modulator] {
    zone.map(|z| z.modulators.as_slice()).unwrap_or_default()
}

fn resolve_generator(layer: &Layer<'_>, kind: GeneratorType) -> i32 {
    let level = |local: &Zone, global: Option<&Zone>| {
        local
            .generator(kind)
            .or_else(|| global.and_then(|g| g.generator(kind)))
            .map(i32::from)
    };
    let instrument = level(layer.instrument_zone, layer.instrument_global);
    let preset = level(layer.preset_zone, layer.preset_global);
    let value = if kind.is_additive() {
        instrument.unwrap_or(kind.default_value()) + preset.unwrap_or(0)
    } else {
        instrument.or(preset).unwrap_or(kind.default_value())
    };
    kind.clamp(value)
}
