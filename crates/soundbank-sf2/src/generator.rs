//! Generator operators and per-zone generator sets.
//!
//! A generator is a numeric synthesis parameter attached to a zone. The
//! operator table below follows SoundFont 2.04 §8.1: each operator has a
//! default used when no zone sets it, a legal range the summed value is
//! clamped to, and an additivity flag that decides how preset-level values
//! combine with instrument-level ones.

/// SoundFont generator operators (`sfGenOper`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum GeneratorType {
    StartAddrsOffset = 0,
    EndAddrsOffset = 1,
    StartloopAddrsOffset = 2,
    EndloopAddrsOffset = 3,
    StartAddrsCoarseOffset = 4,
    ModLfoToPitch = 5,
    VibLfoToPitch = 6,
    ModEnvToPitch = 7,
    InitialFilterFc = 8,
    InitialFilterQ = 9,
    ModLfoToFilterFc = 10,
    ModEnvToFilterFc = 11,
    EndAddrsCoarseOffset = 12,
    ModLfoToVolume = 13,
    Unused1 = 14,
    ChorusEffectsSend = 15,
    ReverbEffectsSend = 16,
    Pan = 17,
    Unused2 = 18,
    Unused3 = 19,
    Unused4 = 20,
    DelayModLfo = 21,
    FreqModLfo = 22,
    DelayVibLfo = 23,
    FreqVibLfo = 24,
    DelayModEnv = 25,
    AttackModEnv = 26,
    HoldModEnv = 27,
    DecayModEnv = 28,
    SustainModEnv = 29,
    ReleaseModEnv = 30,
    KeynumToModEnvHold = 31,
    KeynumToModEnvDecay = 32,
    DelayVolEnv = 33,
    AttackVolEnv = 34,
    HoldVolEnv = 35,
    DecayVolEnv = 36,
    SustainVolEnv = 37,
    ReleaseVolEnv = 38,
    KeynumToVolEnvHold = 39,
    KeynumToVolEnvDecay = 40,
    Instrument = 41,
    Reserved1 = 42,
    KeyRange = 43,
    VelRange = 44,
    StartloopAddrsCoarseOffset = 45,
    Keynum = 46,
    Velocity = 47,
    InitialAttenuation = 48,
    Reserved2 = 49,
    EndloopAddrsCoarseOffset = 50,
    CoarseTune = 51,
    FineTune = 52,
    SampleId = 53,
    SampleModes = 54,
    Reserved3 = 55,
    ScaleTuning = 56,
    ExclusiveClass = 57,
    OverridingRootKey = 58,
    Unused5 = 59,
    EndOper = 60,
}

/// Number of defined operators (`0..=60`).
pub const GENERATOR_COUNT: usize = 61;

impl GeneratorType {
    /// Every operator in numeric order.
    pub const ALL: [GeneratorType; GENERATOR_COUNT] = {
        use GeneratorType::*;
        [
            StartAddrsOffset,
            EndAddrsOffset,
            StartloopAddrsOffset,
            EndloopAddrsOffset,
            StartAddrsCoarseOffset,
            ModLfoToPitch,
            VibLfoToPitch,
            ModEnvToPitch,
            InitialFilterFc,
            InitialFilterQ,
            ModLfoToFilterFc,
            ModEnvToFilterFc,
            EndAddrsCoarseOffset,
            ModLfoToVolume,
            Unused1,
            ChorusEffectsSend,
            ReverbEffectsSend,
            Pan,
            Unused2,
            Unused3,
            Unused4,
            DelayModLfo,
            FreqModLfo,
            DelayVibLfo,
            FreqVibLfo,
            DelayModEnv,
            AttackModEnv,
            HoldModEnv,
            DecayModEnv,
            SustainModEnv,
            ReleaseModEnv,
            KeynumToModEnvHold,
            KeynumToModEnvDecay,
            DelayVolEnv,
            AttackVolEnv,
            HoldVolEnv,
            DecayVolEnv,
            SustainVolEnv,
            ReleaseVolEnv,
            KeynumToVolEnvHold,
            KeynumToVolEnvDecay,
            Instrument,
            Reserved1,
            KeyRange,
            VelRange,
            StartloopAddrsCoarseOffset,
            Keynum,
            Velocity,
            InitialAttenuation,
            Reserved2,
            EndloopAddrsCoarseOffset,
            CoarseTune,
            FineTune,
            SampleId,
            SampleModes,
            Reserved3,
            ScaleTuning,
            ExclusiveClass,
            OverridingRootKey,
            Unused5,
            EndOper,
        ]
    };

    /// Decode a raw operator number. Unknown operators yield `None` and are
    /// skipped by the parser.
    pub const fn from_u16(raw: u16) -> Option<Self> {
        if (raw as usize) < GENERATOR_COUNT {
            Some(Self::ALL[raw as usize])
        } else {
            None
        }
    }

    /// Operator number.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Value used when neither the preset nor the instrument sets this operator.
    pub const fn default_value(self) -> i32 {
        use GeneratorType::*;
        match self {
            InitialFilterFc => 13500,
            DelayModLfo | DelayVibLfo | DelayModEnv | AttackModEnv | HoldModEnv
            | DecayModEnv | ReleaseModEnv | DelayVolEnv | AttackVolEnv | HoldVolEnv
            | DecayVolEnv | ReleaseVolEnv => -12000,
            KeyRange | VelRange => 0x7F00,
            Keynum | Velocity | OverridingRootKey => -1,
            ScaleTuning => 100,
            _ => 0,
        }
    }

    /// Legal range `(min, max)` the resolved value is clamped to.
    pub const fn limits(self) -> (i32, i32) {
        use GeneratorType::*;
        match self {
            ModLfoToPitch | VibLfoToPitch | ModEnvToPitch | ModLfoToFilterFc
            | ModEnvToFilterFc => (-12000, 12000),
            InitialFilterFc => (1500, 13500),
            InitialFilterQ => (0, 960),
            ModLfoToVolume => (-960, 960),
            ChorusEffectsSend | ReverbEffectsSend | SustainModEnv => (0, 1000),
            Pan => (-500, 500),
            DelayModLfo | DelayVibLfo | DelayModEnv | HoldModEnv | DelayVolEnv
            | HoldVolEnv => (-12000, 5000),
            FreqModLfo | FreqVibLfo => (-16000, 4500),
            AttackModEnv | DecayModEnv | ReleaseModEnv | AttackVolEnv | DecayVolEnv
            | ReleaseVolEnv => (-12000, 8000),
            KeynumToModEnvHold | KeynumToModEnvDecay | KeynumToVolEnvHold
            | KeynumToVolEnvDecay => (-1200, 1200),
            SustainVolEnv | InitialAttenuation => (0, 1440),
            Keynum | Velocity | OverridingRootKey => (-1, 127),
            ExclusiveClass => (0, 127),
            CoarseTune => (-120, 120),
            FineTune => (-99, 99),
            SampleModes => (0, 3),
            ScaleTuning => (0, 1200),
            // Sample address offsets are bounded by the sample itself, not here.
            _ => (i16::MIN as i32, i16::MAX as i32),
        }
    }

    /// Clamp `value` into this operator's legal range.
    pub const fn clamp(self, value: i32) -> i32 {
        let (min, max) = self.limits();
        if value < min {
            min
        } else if value > max {
            max
        } else {
            value
        }
    }

    /// Whether preset-level values add to instrument-level values.
    ///
    /// Non-additive operators (sample offsets, loop mode, key/velocity
    /// overrides, exclusive class, root key) take the instrument value, with
    /// the preset value used only when the instrument leaves it unset.
    pub const fn is_additive(self) -> bool {
        use GeneratorType::*;
        !matches!(
            self,
            StartAddrsOffset
                | EndAddrsOffset
                | StartloopAddrsOffset
                | EndloopAddrsOffset
                | StartAddrsCoarseOffset
                | EndAddrsCoarseOffset
                | StartloopAddrsCoarseOffset
                | EndloopAddrsCoarseOffset
                | Keynum
                | Velocity
                | SampleModes
                | ExclusiveClass
                | OverridingRootKey
                | KeyRange
                | VelRange
                | Instrument
                | SampleId
        )
    }

    /// Whether this operator ends a zone by naming its sample or instrument.
    pub const fn is_terminal(self) -> bool {
        matches!(self, GeneratorType::Instrument | GeneratorType::SampleId)
    }
}

/// An inclusive `lo..=hi` key or velocity range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range8 {
    /// Lowest included value.
    pub lo: u8,
    /// Highest included value.
    pub hi: u8,
}

impl Range8 {
    /// The full MIDI range `0..=127`.
    pub const FULL: Range8 = Range8 { lo: 0, hi: 127 };

    /// Decode a range generator amount (low byte = lo, high byte = hi).
    pub const fn from_amount(amount: i16) -> Self {
        let raw = amount as u16;
        Self {
            lo: (raw & 0xFF) as u8,
            hi: (raw >> 8) as u8,
        }
    }

    /// Encode as a range generator amount.
    pub const fn to_amount(self) -> i16 {
        (((self.hi as u16) << 8) | self.lo as u16) as i16
    }

    /// Whether `value` lies inside the range.
    pub const fn contains(self, value: u8) -> bool {
        self.lo <= value && value <= self.hi
    }
}

impl Default for Range8 {
    fn default() -> Self {
        Self::FULL
    }
}

/// A single generator: operator plus raw signed amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Generator {
    /// Destination operator.
    pub kind: GeneratorType,
    /// Raw 16-bit amount.
    pub amount: i16,
}

/// One optional value per operator for a single zone.
///
/// Insertion is last-one-wins, which is how the parser tolerates zones that
/// repeat an operator.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GeneratorSet {
    values: [Option<i16>; GENERATOR_COUNT],
}

impl Default for GeneratorSet {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for GeneratorSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter().map(|g| (g.kind, g.amount))).finish()
    }
}

impl GeneratorSet {
    /// An empty set.
    pub const fn new() -> Self {
        Self {
            values: [None; GENERATOR_COUNT],
        }
    }

    /// Set an operator. Returns the previous value, if any.
    pub fn set(&mut self, kind: GeneratorType, amount: i16) -> Option<i16> {
        self.values[kind.index()].replace(amount)
    }

    /// Raw amount for an operator, if set.
    pub fn get(&self, kind: GeneratorType) -> Option<i16> {
        self.values[kind.index()]
    }

    /// Whether the operator is set.
    pub fn contains(&self, kind: GeneratorType) -> bool {
        self.values[kind.index()].is_some()
    }

    /// Number of operators set.
    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Whether no operator is set.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Iterate the set operators in numeric order.
    pub fn iter(&self) -> impl Iterator<Item = Generator> + '_ {
        self.values.iter().enumerate().filter_map(|(i, v)| {
            v.map(|amount| Generator {
                kind: GeneratorType::ALL[i],
                amount,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_numbers_round_trip() {
        for (i, kind) in GeneratorType::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(GeneratorType::from_u16(i as u16), Some(*kind));
        }
        assert_eq!(GeneratorType::from_u16(61), None);
        assert_eq!(GeneratorType::from_u16(u16::MAX), None);
    }

    #[test]
    fn defaults_lie_within_limits() {
        for kind in GeneratorType::ALL {
            if matches!(kind, GeneratorType::KeyRange | GeneratorType::VelRange) {
                continue;
            }
            let (min, max) = kind.limits();
            let d = kind.default_value();
            assert!(
                (min..=max).contains(&d),
                "{kind:?} default {d} outside [{min}, {max}]"
            );
        }
    }

    #[test]
    fn envelope_defaults_are_instant() {
        assert_eq!(GeneratorType::AttackVolEnv.default_value(), -12000);
        assert_eq!(GeneratorType::ReleaseVolEnv.default_value(), -12000);
        assert_eq!(GeneratorType::InitialAttenuation.default_value(), 0);
        assert_eq!(GeneratorType::ScaleTuning.default_value(), 100);
    }

    #[test]
    fn clamp_respects_range() {
        assert_eq!(GeneratorType::Pan.clamp(900), 500);
        assert_eq!(GeneratorType::Pan.clamp(-900), -500);
        assert_eq!(GeneratorType::FineTune.clamp(42), 42);
    }

    #[test]
    fn additivity() {
        assert!(GeneratorType::Pan.is_additive());
        assert!(GeneratorType::AttackVolEnv.is_additive());
        assert!(!GeneratorType::SampleModes.is_additive());
        assert!(!GeneratorType::OverridingRootKey.is_additive());
        assert!(!GeneratorType::StartAddrsOffset.is_additive());
    }

    #[test]
    fn range_amount_encoding() {
        let r = Range8::from_amount(0x7F10);
        assert_eq!(r, Range8 { lo: 0x10, hi: 0x7F });
        assert_eq!(r.to_amount(), 0x7F10);
        assert!(r.contains(64));
        assert!(!r.contains(3));
    }

    #[test]
    fn generator_set_last_one_wins() {
        let mut set = GeneratorSet::new();
        assert!(set.is_empty());
        assert_eq!(set.set(GeneratorType::Pan, 100), None);
        assert_eq!(set.set(GeneratorType::Pan, -200), Some(100));
        assert_eq!(set.get(GeneratorType::Pan), Some(-200));
        assert_eq!(set.len(), 1);

        set.set(GeneratorType::CoarseTune, 2);
        let kinds: Vec<_> = set.iter().map(|g| g.kind).collect();
        assert_eq!(kinds, vec![GeneratorType::Pan, GeneratorType::CoarseTune]);
    }
}
