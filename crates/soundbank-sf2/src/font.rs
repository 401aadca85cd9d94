//! The linked SoundFont graph.
//!
//! Construction order is fixed by the references between tables:
//! samples, then instrument zones and instruments (zones point at samples),
//! then preset zones and presets (zones point at instruments). Any index that
//! falls outside its table aborts the load; nothing partial is returned.
//!
//! # Example
//!
//! ```rust,ignore
//! use soundbank_sf2::SoundFont;
//!
//! let font = SoundFont::from_bytes(&std::fs::read("piano.sf2")?)?;
//! let found = font.resolve_preset(0, 0);
//! for layer in font.layers(found.index, 60, 100) {
//!     println!("{} -> {}", layer.instrument_name, layer.sample.name);
//! }
//! ```

use std::io::Read;
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chunk::{ChunkReader, FourCc};
use crate::error::{Result, Sf2Error};
use crate::hydra::Hydra;
use crate::sample::{Sample, SampleKind};
use crate::zone::{Zone, ZoneLevel, build_zones};

/// Percussion bank number.
pub const PERCUSSION_BANK: u16 = 128;

/// An instrument: a name and its zones.
#[derive(Clone, Debug, PartialEq)]
pub struct Instrument {
    /// Instrument name.
    pub name: String,
    /// Global zone, if the instrument has one.
    pub global_zone: Option<Zone>,
    /// Range of this instrument's zones in the font's instrument zone arena.
    pub zones: Range<usize>,
}

/// A preset: the unit selected by bank and program.
#[derive(Clone, Debug, PartialEq)]
pub struct Preset {
    /// Preset name.
    pub name: String,
    /// MIDI program number.
    pub program: u16,
    /// MIDI bank number.
    pub bank: u16,
    /// Global zone, if the preset has one.
    pub global_zone: Option<Zone>,
    /// Range of this preset's zones in the font's preset zone arena.
    pub zones: Range<usize>,
}

impl Preset {
    /// Whether this preset lives in the percussion bank.
    pub fn is_percussion(&self) -> bool {
        self.bank == PERCUSSION_BANK
    }
}

/// How a preset lookup was satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// Bank and program both matched (or the name matched).
    Exact,
    /// Program matched in a melodic bank other than the one requested.
    ProgramOnly,
    /// Percussion was requested and some percussion preset was used.
    AnyPercussion,
    /// Nothing matched; the first preset was used.
    Fallback,
}

/// Result of a preset lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresetMatch {
    /// Index into [`SoundFont::presets`].
    pub index: usize,
    /// How the lookup was satisfied.
    pub kind: MatchKind,
}

impl PresetMatch {
    /// Whether the lookup fell back to the first preset.
    pub fn is_fallback(&self) -> bool {
        self.kind == MatchKind::Fallback
    }
}

/// One sounding sample layer for a key and velocity.
#[derive(Clone, Copy, Debug)]
pub struct Layer<'a> {
    /// Matching preset zone.
    pub preset_zone: &'a Zone,
    /// Global zone of the preset.
    pub preset_global: Option<&'a Zone>,
    /// Matching instrument zone.
    pub instrument_zone: &'a Zone,
    /// Global zone of the instrument.
    pub instrument_global: Option<&'a Zone>,
    /// Name of the instrument the layer came from.
    pub instrument_name: &'a str,
    /// Index into [`SoundFont::samples`].
    pub sample_index: usize,
    /// The sample itself.
    pub sample: &'a Sample,
}

/// Version stamp from `ifil`/`iver`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Version {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
}

/// One `INFO` sub-chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoEntry {
    /// Sub-chunk tag (`INAM`, `ICOP`, ...).
    pub id: FourCc,
    /// Text contents with trailing NULs removed.
    pub text: String,
}

/// Metadata from the `INFO` list. Passed through, never interpreted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FontInfo {
    /// Format version (`ifil`).
    pub version: Option<Version>,
    /// Text entries in file order.
    pub entries: Vec<InfoEntry>,
}

impl FontInfo {
    /// Text of the first entry with tag `id`.
    pub fn get(&self, id: [u8; 4]) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.id == FourCc(id))
            .map(|e| e.text.as_str())
    }

    /// Bank name (`INAM`).
    pub fn name(&self) -> Option<&str> {
        self.get(*b"INAM")
    }
}

/// An immutable, fully linked SoundFont.
///
/// Share it between synthesizer threads with `Arc<SoundFont>`; the PCM blob
/// is itself an `Arc<[i16]>` so voices can hold it without borrowing the font.
#[derive(Clone, Debug)]
pub struct SoundFont {
    info: FontInfo,
    pcm: Arc<[i16]>,
    samples: Vec<Sample>,
    instruments: Vec<Instrument>,
    instrument_zones: Vec<Zone>,
    presets: Vec<Preset>,
    preset_zones: Vec<Zone>,
}

impl SoundFont {
    /// Parse and link a complete SF2 file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut top = ChunkReader::new(bytes);
        let riff = top.expect_chunk(FourCc::RIFF)?;
        let mut body = ChunkReader::nested(&riff);
        body.expect_fourcc(FourCc::SFBK)?;

        let mut info = FontInfo::default();
        let mut pcm: Option<Arc<[i16]>> = None;
        let mut hydra: Option<Hydra> = None;

        while !body.is_empty() {
            let chunk = body.read_chunk()?;
            if chunk.id != FourCc::LIST {
                debug!(id = %chunk.id, "skipping unknown top-level chunk");
                continue;
            }
            let mut list = ChunkReader::nested(&chunk);
            match list.read_fourcc()? {
                FourCc::INFO => info = read_info(list)?,
                FourCc::SDTA => pcm = Some(read_pcm(list)?),
                FourCc::PDTA => hydra = Some(Hydra::decode(list)?),
                other => debug!(form = %other, "skipping unknown LIST"),
            }
        }

        let pcm = pcm.ok_or_else(|| Sf2Error::malformed("missing 'sdta' list"))?;
        let hydra = hydra.ok_or_else(|| Sf2Error::malformed("missing 'pdta' list"))?;
        Self::link(info, pcm, &hydra)
    }

    /// Read a complete SF2 file from a stream and parse it.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    fn link(info: FontInfo, pcm: Arc<[i16]>, hydra: &Hydra) -> Result<Self> {
        if hydra.presets.is_empty() {
            return Err(Sf2Error::malformed("soundfont defines no presets"));
        }

        let sample_count = hydra.samples.len();
        let samples: Vec<Sample> = hydra
            .samples
            .iter()
            .map(|h| Sample::from_header(h, pcm.len(), sample_count))
            .collect();
        check_stereo_links(&samples);

        let mut instrument_zones = Vec::new();
        let mut instruments = Vec::with_capacity(hydra.instruments.len());
        for (header, range) in hydra.instruments.iter().zip(&hydra.instrument_zone_ranges) {
            let list = build_zones(
                ZoneLevel::Instrument,
                &header.name,
                &hydra.instrument_zones[range.clone()],
                &hydra.instrument_generators,
                &hydra.instrument_modulators,
                samples.len(),
            )?;
            if list.zones.is_empty() {
                warn!(instrument = %header.name, "instrument has no sample zones");
            }
            let start = instrument_zones.len();
            instrument_zones.extend(list.zones);
            instruments.push(Instrument {
                name: header.name.clone(),
                global_zone: list.global,
                zones: start..instrument_zones.len(),
            });
        }

        let mut preset_zones = Vec::new();
        let mut presets = Vec::with_capacity(hydra.presets.len());
        for (header, range) in hydra.presets.iter().zip(&hydra.preset_zone_ranges) {
            let list = build_zones(
                ZoneLevel::Preset,
                &header.name,
                &hydra.preset_zones[range.clone()],
                &hydra.preset_generators,
                &hydra.preset_modulators,
                instruments.len(),
            )?;
            let start = preset_zones.len();
            preset_zones.extend(list.zones);
            presets.push(Preset {
                name: header.name.clone(),
                program: header.program,
                bank: header.bank,
                global_zone: list.global,
                zones: start..preset_zones.len(),
            });
        }
        presets.sort_by_key(|p| (p.program, p.bank));

        info!(
            presets = presets.len(),
            instruments = instruments.len(),
            samples = samples.len(),
            pcm_points = pcm.len(),
            "soundfont loaded"
        );

        Ok(Self {
            info,
            pcm,
            samples,
            instruments,
            instrument_zones,
            presets,
            preset_zones,
        })
    }

    /// `INFO` metadata.
    pub fn info(&self) -> &FontInfo {
        &self.info
    }

    /// The shared 16-bit PCM blob.
    pub fn pcm(&self) -> &Arc<[i16]> {
        &self.pcm
    }

    /// All samples.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// All instruments.
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// All presets, sorted by `(program, bank)`.
    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    /// Non-global zones of an instrument.
    pub fn instrument_zones(&self, instrument: &Instrument) -> &[Zone] {
        &self.instrument_zones[instrument.zones.clone()]
    }

    /// Non-global zones of a preset.
    pub fn preset_zones(&self, preset: &Preset) -> &[Zone] {
        &self.preset_zones[preset.zones.clone()]
    }

    /// Find the preset for a bank/program pair.
    ///
    /// Order: exact match; for the percussion bank, any percussion preset;
    /// otherwise the program in any melodic bank; finally the first preset.
    /// The lookup never fails.
    pub fn resolve_preset(&self, bank: u16, program: u8) -> PresetMatch {
        let program = u16::from(program);
        if let Some(m) = self.find_preset(MatchKind::Exact, |p| {
            p.bank == bank && p.program == program
        }) {
            return m;
        }
        let relaxed = if bank == PERCUSSION_BANK {
            self.find_preset(MatchKind::AnyPercussion, Preset::is_percussion)
        } else {
            self.find_preset(MatchKind::ProgramOnly, |p| {
                p.program == program && !p.is_percussion()
            })
        };
        relaxed.unwrap_or(PresetMatch {
            index: 0,
            kind: MatchKind::Fallback,
        })
    }

    fn find_preset(&self, kind: MatchKind, pred: impl Fn(&Preset) -> bool) -> Option<PresetMatch> {
        self.presets
            .iter()
            .position(pred)
            .map(|index| PresetMatch { index, kind })
    }

    /// Find a preset by exact name, falling back to the first preset.
    pub fn preset_by_name(&self, name: &str) -> PresetMatch {
        self.presets
            .iter()
            .position(|p| p.name == name)
            .map(|index| PresetMatch {
                index,
                kind: MatchKind::Exact,
            })
            .unwrap_or(PresetMatch {
                index: 0,
                kind: MatchKind::Fallback,
            })
    }

    /// Every sample layer the preset plays for this key and velocity, in
    /// preset-zone then instrument-zone order.
    pub fn layers(&self, preset_index: usize, key: u8, velocity: u8) -> Vec<Layer<'_>> {
        let Some(preset) = self.presets.get(preset_index) else {
            return Vec::new();
        };
        let mut layers = Vec::new();
        for preset_zone in self.preset_zones(preset) {
            if !preset_zone.matches(key, velocity) {
                continue;
            }
            let Some(instrument) = preset_zone.target.and_then(|i| self.instruments.get(i)) else {
                continue;
            };
            for instrument_zone in self.instrument_zones(instrument) {
                if !instrument_zone.matches(key, velocity) {
                    continue;
                }
                let Some(sample_index) = instrument_zone.target else {
                    continue;
                };
                let Some(sample) = self.samples.get(sample_index) else {
                    continue;
                };
                layers.push(Layer {
                    preset_zone,
                    preset_global: preset.global_zone.as_ref(),
                    instrument_zone,
                    instrument_global: instrument.global_zone.as_ref(),
                    instrument_name: &instrument.name,
                    sample_index,
                    sample,
                });
            }
        }
        layers
    }
}

fn check_stereo_links(samples: &[Sample]) {
    for sample in samples {
        let Some(link) = sample.link else { continue };
        let partner = &samples[link];
        let expected = match sample.kind {
            SampleKind::Left => SampleKind::Right,
            SampleKind::Right => SampleKind::Left,
            _ => continue,
        };
        if partner.kind != expected {
            warn!(
                sample = %sample.name,
                partner = %partner.name,
                "stereo link points at a sample of the wrong channel"
            );
        }
    }
}

fn read_info(mut list: ChunkReader<'_>) -> Result<FontInfo> {
    let mut info = FontInfo::default();
    while !list.is_empty() {
        let chunk = list.read_chunk()?;
        if chunk.id == FourCc(*b"ifil") {
            if chunk.size() >= 4 {
                info.version = Some(Version {
                    major: u16::from_le_bytes([chunk.data[0], chunk.data[1]]),
                    minor: u16::from_le_bytes([chunk.data[2], chunk.data[3]]),
                });
            }
            continue;
        }
        if chunk.id == FourCc(*b"iver") {
            continue;
        }
        let end = chunk
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(chunk.data.len());
        info.entries.push(InfoEntry {
            id: chunk.id,
            text: String::from_utf8_lossy(&chunk.data[..end]).into_owned(),
        });
    }
    Ok(info)
}

fn read_pcm(mut list: ChunkReader<'_>) -> Result<Arc<[i16]>> {
    let mut pcm: Arc<[i16]> = Arc::from(Vec::new());
    while !list.is_empty() {
        let chunk = list.read_chunk()?;
        match chunk.id {
            FourCc::SMPL => {
                pcm = chunk
                    .data
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
                    .collect();
            }
            FourCc::SM24 => debug!("ignoring 24-bit sample extension"),
            other => debug!(id = %other, "skipping unknown sdta chunk"),
        }
    }
    Ok(pcm)
}
