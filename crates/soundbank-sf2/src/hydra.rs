//! Fixed-layout records of the `pdta` list (the "hydra").
//!
//! The nine sub-chunks always appear in the same order:
//!
//! | Chunk | Record | Size |
//! |-------|--------|------|
//! | `phdr` | [`PresetHeader`] | 38 |
//! | `pbag` | [`Bag`] | 4 |
//! | `pmod` | [`ModulatorRecord`] | 10 |
//! | `pgen` | [`GeneratorRecord`] | 4 |
//! | `inst` | [`InstrumentHeader`] | 22 |
//! | `ibag` | [`Bag`] | 4 |
//! | `imod` | [`ModulatorRecord`] | 10 |
//! | `igen` | [`GeneratorRecord`] | 4 |
//! | `shdr` | [`SampleHeader`] | 46 |
//!
//! Every table ends with a terminal record. Ownership is implicit: a header
//! owns the records from its own start index up to the next header's start
//! index. [`Hydra::decode`] turns those deltas into validated ranges right
//! away so nothing downstream has to re-derive them.

use core::ops::Range;

use tracing::debug;

use crate::chunk::{ByteReader, ChunkReader, FourCc};
use crate::error::{Result, Sf2Error};

/// `phdr` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresetHeader {
    /// Preset name (up to 20 characters).
    pub name: String,
    /// MIDI program number.
    pub program: u16,
    /// MIDI bank number (128 for percussion).
    pub bank: u16,
    /// Index of the first `pbag` record owned by this preset.
    pub bag_index: u16,
    /// Reserved.
    pub library: u32,
    /// Reserved.
    pub genre: u32,
    /// Reserved.
    pub morphology: u32,
}

/// `pbag`/`ibag` record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bag {
    /// Index of the first generator owned by this zone.
    pub generator_index: u16,
    /// Index of the first modulator owned by this zone.
    pub modulator_index: u16,
}

/// `pgen`/`igen` record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeneratorRecord {
    /// Raw operator number.
    pub operator: u16,
    /// Raw amount.
    pub amount: i16,
}

/// `pmod`/`imod` record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModulatorRecord {
    /// Raw source word.
    pub source: u16,
    /// Destination generator (bit 15 set: link to another modulator).
    pub destination: u16,
    /// Amount.
    pub amount: i16,
    /// Raw amount-source word.
    pub amount_source: u16,
    /// Raw transform operator.
    pub transform: u16,
}

/// `inst` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentHeader {
    /// Instrument name.
    pub name: String,
    /// Index of the first `ibag` record owned by this instrument.
    pub bag_index: u16,
}

/// `shdr` record. Addresses are in sample points from the start of `smpl`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleHeader {
    /// Sample name.
    pub name: String,
    /// First sample point.
    pub start: u32,
    /// One past the last sample point.
    pub end: u32,
    /// First point of the loop.
    pub loop_start: u32,
    /// One past the last point of the loop.
    pub loop_end: u32,
    /// Recording rate in Hz.
    pub sample_rate: u32,
    /// MIDI key the sample was recorded at.
    pub original_pitch: u8,
    /// Pitch correction in cents.
    pub pitch_correction: i8,
    /// Index of the other half of a stereo pair.
    pub sample_link: u16,
    /// Raw sample type flags.
    pub sample_type: u16,
}

/// Record byte sizes.
pub mod sizes {
    /// `phdr` record.
    pub const PRESET_HEADER: usize = 38;
    /// `pbag`/`ibag` record.
    pub const BAG: usize = 4;
    /// `pgen`/`igen` record.
    pub const GENERATOR: usize = 4;
    /// `pmod`/`imod` record.
    pub const MODULATOR: usize = 10;
    /// `inst` record.
    pub const INSTRUMENT_HEADER: usize = 22;
    /// `shdr` record.
    pub const SAMPLE_HEADER: usize = 46;
}

/// Generator and modulator ranges owned by one zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneRecord {
    /// Indices into the generator table.
    pub generators: Range<usize>,
    /// Indices into the modulator table.
    pub modulators: Range<usize>,
}

/// Decoded `pdta` list with terminal records dropped and ownership resolved.
#[derive(Clone, Debug, Default)]
pub struct Hydra {
    /// Preset headers.
    pub presets: Vec<PresetHeader>,
    /// Zone range owned by each preset (parallel to `presets`).
    pub preset_zone_ranges: Vec<Range<usize>>,
    /// Preset zones.
    pub preset_zones: Vec<ZoneRecord>,
    /// Preset generators.
    pub preset_generators: Vec<GeneratorRecord>,
    /// Preset modulators.
    pub preset_modulators: Vec<ModulatorRecord>,
    /// Instrument headers.
    pub instruments: Vec<InstrumentHeader>,
    /// Zone range owned by each instrument (parallel to `instruments`).
    pub instrument_zone_ranges: Vec<Range<usize>>,
    /// Instrument zones.
    pub instrument_zones: Vec<ZoneRecord>,
    /// Instrument generators.
    pub instrument_generators: Vec<GeneratorRecord>,
    /// Instrument modulators.
    pub instrument_modulators: Vec<ModulatorRecord>,
    /// Sample headers.
    pub samples: Vec<SampleHeader>,
}

impl Hydra {
    /// Decode the nine `pdta` sub-chunks from a reader positioned after the
    /// `pdta` form type.
    pub fn decode(mut pdta: ChunkReader<'_>) -> Result<Self> {
        let mut phdr = read_table(&mut pdta, FourCc::PHDR, sizes::PRESET_HEADER, read_preset)?;
        let mut pbag = read_table(&mut pdta, FourCc::PBAG, sizes::BAG, read_bag)?;
        let mut pmod = read_table(&mut pdta, FourCc::PMOD, sizes::MODULATOR, read_modulator)?;
        let mut pgen = read_table(&mut pdta, FourCc::PGEN, sizes::GENERATOR, read_generator)?;
        let mut inst =
            read_table(&mut pdta, FourCc::INST, sizes::INSTRUMENT_HEADER, read_instrument)?;
        let mut ibag = read_table(&mut pdta, FourCc::IBAG, sizes::BAG, read_bag)?;
        let mut imod = read_table(&mut pdta, FourCc::IMOD, sizes::MODULATOR, read_modulator)?;
        let mut igen = read_table(&mut pdta, FourCc::IGEN, sizes::GENERATOR, read_generator)?;
        let mut shdr = read_table(&mut pdta, FourCc::SHDR, sizes::SAMPLE_HEADER, read_sample)?;

        // The terminal records stay in place while ranges are computed; each
        // header's range ends at its successor's start, the last at the terminal's.
        require_terminal(FourCc::PHDR, &phdr)?;
        require_terminal(FourCc::PBAG, &pbag)?;
        require_terminal(FourCc::INST, &inst)?;
        require_terminal(FourCc::IBAG, &ibag)?;
        require_terminal(FourCc::SHDR, &shdr)?;

        let preset_zone_ranges = ownership_ranges(
            "pbag",
            phdr.iter().map(|p| p.bag_index as usize),
            pbag.len() - 1,
        )?;
        let instrument_zone_ranges = ownership_ranges(
            "ibag",
            inst.iter().map(|i| i.bag_index as usize),
            ibag.len() - 1,
        )?;

        drop_terminal(&mut pgen);
        drop_terminal(&mut pmod);
        drop_terminal(&mut igen);
        drop_terminal(&mut imod);

        let preset_zones = zone_records("pgen", "pmod", &pbag, pgen.len(), pmod.len())?;
        let instrument_zones = zone_records("igen", "imod", &ibag, igen.len(), imod.len())?;

        phdr.pop();
        pbag.pop();
        inst.pop();
        ibag.pop();
        shdr.pop();

        debug!(
            presets = phdr.len(),
            preset_zones = preset_zones.len(),
            preset_generators = pgen.len(),
            preset_modulators = pmod.len(),
            "decoded preset tables"
        );
        debug!(
            instruments = inst.len(),
            instrument_zones = instrument_zones.len(),
            instrument_generators = igen.len(),
            instrument_modulators = imod.len(),
            samples = shdr.len(),
            "decoded instrument and sample tables"
        );

        Ok(Self {
            presets: phdr,
            preset_zone_ranges,
            preset_zones,
            preset_generators: pgen,
            preset_modulators: pmod,
            instruments: inst,
            instrument_zone_ranges,
            instrument_zones,
            instrument_generators: igen,
            instrument_modulators: imod,
            samples: shdr,
        })
    }
}

/// Convert a sequence of start indices (the last one taken from the
/// terminal record) into one range per header.
///
/// Fails with [`Sf2Error::BrokenReference`] when a start index decreases or
/// points past `table_len`.
pub fn ownership_ranges(
    table: &'static str,
    starts: impl IntoIterator<Item = usize>,
    table_len: usize,
) -> Result<Vec<Range<usize>>> {
    let starts: Vec<usize> = starts.into_iter().collect();
    let mut ranges = Vec::with_capacity(starts.len().saturating_sub(1));
    for pair in starts.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if start > table_len {
            return Err(Sf2Error::broken(table, start, table_len));
        }
        if end > table_len || end < start {
            return Err(Sf2Error::broken(table, end, table_len));
        }
        ranges.push(start..end);
    }
    Ok(ranges)
}

fn zone_records(
    gen_table: &'static str,
    mod_table: &'static str,
    bags: &[Bag],
    gen_len: usize,
    mod_len: usize,
) -> Result<Vec<ZoneRecord>> {
    let generators =
        ownership_ranges(gen_table, bags.iter().map(|b| b.generator_index as usize), gen_len)?;
    let modulators =
        ownership_ranges(mod_table, bags.iter().map(|b| b.modulator_index as usize), mod_len)?;
    Ok(generators
        .into_iter()
        .zip(modulators)
        .map(|(generators, modulators)| ZoneRecord {
            generators,
            modulators,
        })
        .collect())
}

fn require_terminal<T>(id: FourCc, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return Err(Sf2Error::malformed(format!(
            "'{id}' table is missing its terminal record"
        )));
    }
    Ok(())
}

// Generator and modulator tables may omit the terminal record entirely
// (some writers emit an empty `pmod`); that simply means no records.
fn drop_terminal<T>(records: &mut Vec<T>) {
    records.pop();
}

fn read_table<'a, T>(
    pdta: &mut ChunkReader<'a>,
    id: FourCc,
    record_size: usize,
    read: fn(&mut ByteReader<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    let chunk = pdta.expect_chunk(id)?;
    if chunk.size() % record_size != 0 {
        return Err(Sf2Error::malformed(format!(
            "'{id}' chunk size {} is not a multiple of {record_size}",
            chunk.size()
        )));
    }
    let mut bytes = ByteReader::new(chunk.data);
    let count = chunk.size() / record_size;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(read(&mut bytes)?);
    }
    Ok(records)
}

fn read_preset(r: &mut ByteReader<'_>) -> Result<PresetHeader> {
    Ok(PresetHeader {
        name: r.name(20)?,
        program: r.u16()?,
        bank: r.u16()?,
        bag_index: r.u16()?,
        library: r.u32()?,
        genre: r.u32()?,
        morphology: r.u32()?,
    })
}

fn read_bag(r: &mut ByteReader<'_>) -> Result<Bag> {
    Ok(Bag {
        generator_index: r.u16()?,
        modulator_index: r.u16()?,
    })
}

fn read_generator(r: &mut ByteReader<'_>) -> Result<GeneratorRecord> {
    Ok(GeneratorRecord {
        operator: r.u16()?,
        amount: r.i16()?,
    })
}

fn read_modulator(r: &mut ByteReader<'_>) -> Result<ModulatorRecord> {
    Ok(ModulatorRecord {
        source: r.u16()?,
        destination: r.u16()?,
        amount: r.i16()?,
        amount_source: r.u16()?,
        transform: r.u16()?,
    })
}

fn read_instrument(r: &mut ByteReader<'_>) -> Result<InstrumentHeader> {
    Ok(InstrumentHeader {
        name: r.name(20)?,
        bag_index: r.u16()?,
    })
}

fn read_sample(r: &mut ByteReader<'_>) -> Result<SampleHeader> {
    Ok(SampleHeader {
        name: r.name(20)?,
        start: r.u32()?,
        end: r.u32()?,
        loop_start: r.u32()?,
        loop_end: r.u32()?,
        sample_rate: r.u32()?,
        original_pitch: r.u8()?,
        pitch_correction: r.i8()?,
        sample_link: r.u16()?,
        sample_type: r.u16()?,
    })
}
