//! Preset and instrument zones.

use tracing::{debug, warn};

use crate::error::{Result, Sf2Error};
use crate::generator::{GeneratorSet, GeneratorType, Range8};
use crate::hydra::{GeneratorRecord, ModulatorRecord, ZoneRecord};
use crate::modulator::Modulator;

/// A key/velocity-scoped bundle of generators and modulators.
///
/// `target` is the sample index for instrument zones and the instrument
/// index for preset zones. A zone without a target is the global zone of its
/// owner and supplies defaults to every sibling.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Zone {
    /// Generators, at most one per operator. Key and velocity ranges and the
    /// target reference are stored in their own fields instead.
    pub generators: GeneratorSet,
    /// Modulators in file order.
    pub modulators: Vec<Modulator>,
    /// Keys this zone responds to.
    pub key_range: Range8,
    /// Velocities this zone responds to.
    pub vel_range: Range8,
    /// Sample or instrument index.
    pub target: Option<usize>,
}

impl Zone {
    /// Whether this is a global zone.
    pub fn is_global(&self) -> bool {
        self.target.is_none()
    }

    /// Whether a note with this key and velocity falls inside the zone.
    pub fn matches(&self, key: u8, velocity: u8) -> bool {
        self.key_range.contains(key) && self.vel_range.contains(velocity)
    }

    /// Raw generator amount, if set on this zone.
    pub fn generator(&self, kind: GeneratorType) -> Option<i16> {
        self.generators.get(kind)
    }
}

/// Which table a zone lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ZoneLevel {
    Preset,
    Instrument,
}

impl ZoneLevel {
    fn terminal(self) -> GeneratorType {
        match self {
            ZoneLevel::Preset => GeneratorType::Instrument,
            ZoneLevel::Instrument => GeneratorType::SampleId,
        }
    }

    fn target_table(self) -> &'static str {
        match self {
            ZoneLevel::Preset => "inst",
            ZoneLevel::Instrument => "shdr",
        }
    }
}

/// Zones of one preset or instrument, split into the global zone and the rest.
#[derive(Debug, Default)]
pub(crate) struct ZoneList {
    pub global: Option<Zone>,
    pub zones: Vec<Zone>,
}

struct ParsedZone {
    zone: Zone,
    key_range: Option<Range8>,
    vel_range: Option<Range8>,
}

/// Bind the generators and modulators of `records` into zones.
pub(crate) fn build_zones(
    level: ZoneLevel,
    owner: &str,
    records: &[ZoneRecord],
    generators: &[GeneratorRecord],
    modulators: &[ModulatorRecord],
    target_len: usize,
) -> Result<ZoneList> {
    let mut list = ZoneList::default();
    for (i, record) in records.iter().enumerate() {
        let parsed = parse_zone(level, owner, record, generators, modulators, target_len)?;
        if parsed.zone.target.is_some() {
            list.zones.push(resolve_ranges(parsed, list.global.as_ref()));
        } else if i == 0 {
            // Global ranges are kept so siblings without their own can inherit them.
            let mut zone = parsed.zone;
            zone.key_range = parsed.key_range.unwrap_or(Range8::FULL);
            zone.vel_range = parsed.vel_range.unwrap_or(Range8::FULL);
            list.global = Some(zone);
        } else {
            warn!(owner, zone = i, "zone without a target after the first, dropping");
        }
    }
    Ok(list)
}

fn resolve_ranges(parsed: ParsedZone, global: Option<&Zone>) -> Zone {
    let mut zone = parsed.zone;
    zone.key_range = parsed
        .key_range
        .or(global.map(|g| g.key_range))
        .unwrap_or(Range8::FULL);
    zone.vel_range = parsed
        .vel_range
        .or(global.map(|g| g.vel_range))
        .unwrap_or(Range8::FULL);
    zone
}

fn parse_zone(
    level: ZoneLevel,
    owner: &str,
    record: &ZoneRecord,
    generators: &[GeneratorRecord],
    modulators: &[ModulatorRecord],
    target_len: usize,
) -> Result<ParsedZone> {
    let mut parsed = ParsedZone {
        zone: Zone::default(),
        key_range: None,
        vel_range: None,
    };

    for raw in &generators[record.generators.clone()] {
        let Some(kind) = GeneratorType::from_u16(raw.operator) else {
            debug!(owner, operator = raw.operator, "skipping unknown generator");
            continue;
        };
        if parsed.zone.target.is_some() {
            warn!(owner, ?kind, "generator after the zone's terminal generator, ignoring");
            continue;
        }
        match kind {
            GeneratorType::KeyRange => parsed.key_range = Some(Range8::from_amount(raw.amount)),
            GeneratorType::VelRange => parsed.vel_range = Some(Range8::from_amount(raw.amount)),
            k if k == level.terminal() => {
                let index = raw.amount as u16 as usize;
                if index >= target_len {
                    return Err(Sf2Error::broken(level.target_table(), index, target_len));
                }
                parsed.zone.target = Some(index);
            }
            GeneratorType::Instrument | GeneratorType::SampleId => {
                warn!(owner, ?kind, "terminal generator at the wrong level, ignoring");
            }
            _ => {
                if parsed.zone.generators.set(kind, raw.amount).is_some() {
                    warn!(owner, ?kind, "duplicate generator in zone, last one wins");
                }
            }
        }
    }

    parsed.zone.modulators = modulators[record.modulators.clone()]
        .iter()
        .map(Modulator::from_record)
        .collect();
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen_record(kind: GeneratorType, amount: i16) -> GeneratorRecord {
        GeneratorRecord {
            operator: kind as u16,
            amount,
        }
    }

    fn zone_record(generators: core::ops::Range<usize>) -> ZoneRecord {
        ZoneRecord {
            generators,
            modulators: 0..0,
        }
    }

    #[test]
    fn test_global_zone_ranges_are_inherited() {
        let gens = vec![
            gen_record(GeneratorType::KeyRange, Range8 { lo: 36, hi: 72 }.to_amount()),
            gen_record(GeneratorType::Pan, 100),
            gen_record(GeneratorType::SampleId, 0),
            gen_record(GeneratorType::VelRange, Range8 { lo: 1, hi: 64 }.to_amount()),
            gen_record(GeneratorType::SampleId, 1),
        ];
        let zones = [zone_record(0..2), zone_record(2..3), zone_record(3..5)];
        let list = build_zones(ZoneLevel::Instrument, "test", &zones, &gens, &[], 2).unwrap();

        let global = list.global.unwrap();
        assert_eq!(global.generator(GeneratorType::Pan), Some(100));
        assert_eq!(list.zones.len(), 2);
        assert_eq!(list.zones[0].key_range, Range8 { lo: 36, hi: 72 });
        assert_eq!(list.zones[0].vel_range, Range8::FULL);
        assert_eq!(list.zones[1].key_range, Range8 { lo: 36, hi: 72 });
        assert_eq!(list.zones[1].vel_range, Range8 { lo: 1, hi: 64 });
        assert!(list.zones[1].matches(60, 64));
        assert!(!list.zones[1].matches(60, 65));
    }

    #[test]
    fn test_later_targetless_zone_dropped() {
        let gens = vec![
            gen_record(GeneratorType::SampleId, 0),
            gen_record(GeneratorType::Pan, 5),
        ];
        let zones = [zone_record(0..1), zone_record(1..2)];
        let list = build_zones(ZoneLevel::Instrument, "test", &zones, &gens, &[], 1).unwrap();
        assert!(list.global.is_none());
        assert_eq!(list.zones.len(), 1);
    }

    #[test]
    fn test_target_out_of_range_is_broken_reference() {
        let gens = vec![gen_record(GeneratorType::Instrument, 3)];
        let err = build_zones(ZoneLevel::Preset, "p", &[zone_record(0..1)], &gens, &[], 2)
            .unwrap_err();
        assert!(
            matches!(err, Sf2Error::BrokenReference { table: "inst", index: 3, len: 2 }),
            "got {err:?}"
        );
    }

    #[test]
    fn test_duplicate_generator_last_wins() {
        let gens = vec![
            gen_record(GeneratorType::CoarseTune, 2),
            gen_record(GeneratorType::CoarseTune, -3),
            gen_record(GeneratorType::SampleId, 0),
        ];
        let list =
            build_zones(ZoneLevel::Instrument, "t", &[zone_record(0..3)], &gens, &[], 1).unwrap();
        assert_eq!(list.zones[0].generator(GeneratorType::CoarseTune), Some(-3));
    }

    #[test]
    fn test_generators_after_terminal_ignored() {
        let gens = vec![
            gen_record(GeneratorType::SampleId, 0),
            gen_record(GeneratorType::Pan, 250),
        ];
        let list =
            build_zones(ZoneLevel::Instrument, "t", &[zone_record(0..2)], &gens, &[], 1).unwrap();
        assert_eq!(list.zones[0].generator(GeneratorType::Pan), None);
    }
}
