//! Modulator records and the default modulator table.
//!
//! A modulator routes a live controller (velocity, a MIDI CC, the pitch
//! wheel...) through a response curve into a generator destination. The
//! 16-bit source word packs the controller index and its curve shape:
//!
//! ```text
//! bit  15..10   9         8          7      6..0
//!      curve    polarity  direction  CC     index
//! ```

use crate::generator::GeneratorType;
use crate::hydra::ModulatorRecord;

/// Response curve applied to a normalized source value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CurveType {
    /// Straight line.
    #[default]
    Linear,
    /// Slow start, fast finish (the SF2 "concave" dB-like curve).
    Concave,
    /// Fast start, slow finish.
    Convex,
    /// Step at the midpoint.
    Switch,
}

/// Whether a source maps to `0..1` or `-1..1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Polarity {
    /// `0.0..=1.0`.
    #[default]
    Unipolar,
    /// `-1.0..=1.0`.
    Bipolar,
}

/// Whether the curve runs from the controller minimum to its maximum or the reverse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    /// Minimum controller value maps to the start of the curve.
    #[default]
    Positive,
    /// Maximum controller value maps to the start of the curve.
    Negative,
}

/// Non-CC source indices (SF2 "general controllers").
pub mod general {
    /// Constant source; as a secondary source it multiplies by one.
    pub const NO_CONTROLLER: u8 = 0;
    /// Note-on velocity.
    pub const NOTE_ON_VELOCITY: u8 = 2;
    /// Note-on key number.
    pub const NOTE_ON_KEY: u8 = 3;
    /// Polyphonic aftertouch.
    pub const POLY_PRESSURE: u8 = 10;
    /// Channel aftertouch.
    pub const CHANNEL_PRESSURE: u8 = 13;
    /// Pitch wheel.
    pub const PITCH_WHEEL: u8 = 14;
    /// Pitch wheel sensitivity (RPN 0).
    pub const PITCH_WHEEL_SENSITIVITY: u8 = 16;
    /// Output of another modulator.
    pub const LINK: u8 = 127;
}

/// A decoded modulator source word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModulatorSource {
    /// Controller number (CC number when `is_cc`, else a [`general`] index).
    pub index: u8,
    /// Whether `index` names a MIDI continuous controller.
    pub is_cc: bool,
    /// Curve direction.
    pub direction: Direction,
    /// Curve polarity.
    pub polarity: Polarity,
    /// Curve shape.
    pub curve: CurveType,
}

impl ModulatorSource {
    /// The "no controller" source.
    pub const NONE: ModulatorSource = ModulatorSource::from_bits(0);

    /// Decode a raw 16-bit source word.
    pub const fn from_bits(bits: u16) -> Self {
        Self {
            index: (bits & 0x7F) as u8,
            is_cc: bits >> 7 & 1 == 1,
            direction: if bits >> 8 & 1 == 1 {
                Direction::Negative
            } else {
                Direction::Positive
            },
            polarity: if bits >> 9 & 1 == 1 {
                Polarity::Bipolar
            } else {
                Polarity::Unipolar
            },
            curve: match bits >> 10 & 0x3F {
                1 => CurveType::Concave,
                2 => CurveType::Convex,
                3 => CurveType::Switch,
                _ => CurveType::Linear,
            },
        }
    }

    /// Encode back into a raw source word.
    pub const fn to_bits(self) -> u16 {
        let curve = match self.curve {
            CurveType::Linear => 0,
            CurveType::Concave => 1,
            CurveType::Convex => 2,
            CurveType::Switch => 3,
        };
        let polarity = match self.polarity {
            Polarity::Unipolar => 0,
            Polarity::Bipolar => 1,
        };
        let direction = match self.direction {
            Direction::Positive => 0,
            Direction::Negative => 1,
        };
        (curve << 10) | (polarity << 9) | (direction << 8) | ((self.is_cc as u16) << 7)
            | (self.index as u16 & 0x7F)
    }

    /// A MIDI CC source.
    pub const fn cc(index: u8, curve: CurveType, polarity: Polarity, direction: Direction) -> Self {
        Self {
            index,
            is_cc: true,
            direction,
            polarity,
            curve,
        }
    }

    /// A general-controller source (see [`general`]).
    pub const fn general(
        index: u8,
        curve: CurveType,
        polarity: Polarity,
        direction: Direction,
    ) -> Self {
        Self {
            index,
            is_cc: false,
            direction,
            polarity,
            curve,
        }
    }

    /// Whether this is the constant "no controller" source.
    pub const fn is_none(self) -> bool {
        !self.is_cc && self.index == general::NO_CONTROLLER
    }

    /// Whether this source reads MIDI CC `cc`.
    pub const fn is_cc_number(self, cc: u8) -> bool {
        self.is_cc && self.index == cc
    }

    /// Whether this source is the pitch wheel.
    pub const fn is_pitch_wheel(self) -> bool {
        !self.is_cc && self.index == general::PITCH_WHEEL
    }
}

/// Output transform applied after scaling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Transform {
    /// Pass through.
    #[default]
    Linear,
    /// Absolute value.
    Absolute,
}

impl Transform {
    /// Decode a raw transform operator; unknown values fall back to linear.
    pub const fn from_u16(raw: u16) -> Self {
        match raw {
            2 => Transform::Absolute,
            _ => Transform::Linear,
        }
    }
}

/// A modulator: `destination += amount * curve(source) * curve(amount_source)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Modulator {
    /// Primary source.
    pub source: ModulatorSource,
    /// Generator destination; `None` for linked or unknown destinations,
    /// which are kept for identity comparison but never evaluated.
    pub destination: Option<GeneratorType>,
    /// Scale applied to the source product.
    pub amount: i16,
    /// Secondary (amount) source.
    pub amount_source: ModulatorSource,
    /// Output transform.
    pub transform: Transform,
}

impl Modulator {
    /// Build a modulator from literal parts.
    pub const fn new(
        source: ModulatorSource,
        destination: GeneratorType,
        amount: i16,
        amount_source: ModulatorSource,
        transform: Transform,
    ) -> Self {
        Self {
            source,
            destination: Some(destination),
            amount,
            amount_source,
            transform,
        }
    }

    /// Build a modulator from a decoded `pmod`/`imod` record.
    pub fn from_record(record: &ModulatorRecord) -> Self {
        // Bit 15 marks a link to another modulator rather than a generator.
        let destination = if record.destination & 0x8000 != 0 {
            None
        } else {
            GeneratorType::from_u16(record.destination)
        };
        Self {
            source: ModulatorSource::from_bits(record.source),
            destination,
            amount: record.amount,
            amount_source: ModulatorSource::from_bits(record.amount_source),
            transform: Transform::from_u16(record.transform),
        }
    }

    /// Two modulators are identical when everything but the amount matches;
    /// an identical modulator at a more specific level replaces the other.
    pub fn is_identical(&self, other: &Modulator) -> bool {
        self.source == other.source
            && self.destination == other.destination
            && self.amount_source == other.amount_source
            && self.transform == other.transform
    }
}

const fn cc_mod(
    cc: u8,
    curve: CurveType,
    polarity: Polarity,
    direction: Direction,
    destination: GeneratorType,
    amount: i16,
) -> Modulator {
    Modulator::new(
        ModulatorSource::cc(cc, curve, polarity, direction),
        destination,
        amount,
        ModulatorSource::NONE,
        Transform::Linear,
    )
}

/// Modulators that apply to every instrument zone unless the zone defines an
/// identical one.
pub static DEFAULT_MODULATORS: [Modulator; 11] = [
    // velocity -> attenuation
    Modulator::new(
        ModulatorSource::general(
            general::NOTE_ON_VELOCITY,
            CurveType::Concave,
            Polarity::Unipolar,
            Direction::Negative,
        ),
        GeneratorType::InitialAttenuation,
        960,
        ModulatorSource::NONE,
        Transform::Linear,
    ),
    // mod wheel -> vibrato depth
    cc_mod(
        1,
        CurveType::Linear,
        Polarity::Unipolar,
        Direction::Positive,
        GeneratorType::VibLfoToPitch,
        50,
    ),
    // volume -> attenuation
    cc_mod(
        7,
        CurveType::Concave,
        Polarity::Unipolar,
        Direction::Negative,
        GeneratorType::InitialAttenuation,
        960,
    ),
    // pitch wheel (scaled by its range) -> fine tune
    Modulator::new(
        ModulatorSource::general(
            general::PITCH_WHEEL,
            CurveType::Linear,
            Polarity::Bipolar,
            Direction::Positive,
        ),
        GeneratorType::FineTune,
        12700,
        ModulatorSource::general(
            general::PITCH_WHEEL_SENSITIVITY,
            CurveType::Linear,
            Polarity::Unipolar,
            Direction::Positive,
        ),
        Transform::Linear,
    ),
    // pan -> pan
    cc_mod(
        10,
        CurveType::Linear,
        Polarity::Bipolar,
        Direction::Positive,
        GeneratorType::Pan,
        1000,
    ),
    // expression -> attenuation
    cc_mod(
        11,
        CurveType::Concave,
        Polarity::Unipolar,
        Direction::Negative,
        GeneratorType::InitialAttenuation,
        960,
    ),
    // reverb depth -> reverb send
    cc_mod(
        91,
        CurveType::Linear,
        Polarity::Unipolar,
        Direction::Positive,
        GeneratorType::ReverbEffectsSend,
        200,
    ),
    // chorus depth -> chorus send
    cc_mod(
        93,
        CurveType::Linear,
        Polarity::Unipolar,
        Direction::Positive,
        GeneratorType::ChorusEffectsSend,
        200,
    ),
    // tremolo depth -> mod LFO volume
    cc_mod(
        92,
        CurveType::Linear,
        Polarity::Unipolar,
        Direction::Positive,
        GeneratorType::ModLfoToVolume,
        24,
    ),
    // release time -> volume envelope release
    cc_mod(
        72,
        CurveType::Linear,
        Polarity::Bipolar,
        Direction::Positive,
        GeneratorType::ReleaseVolEnv,
        1200,
    ),
    // brightness -> filter cutoff
    cc_mod(
        74,
        CurveType::Linear,
        Polarity::Bipolar,
        Direction::Positive,
        GeneratorType::InitialFilterFc,
        5000,
    ),
];
