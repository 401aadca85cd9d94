//! Soundbank SF2 - SoundFont2 container parser
//!
//! Turns the bytes of a `.sf2` file into an immutable, fully linked graph of
//! presets, instruments, zones, generators, modulators and samples.
//!
//! # Layers
//!
//! ## Chunk reader
//!
//! - [`ChunkReader`] - Walks RIFF chunks without copying
//! - [`ByteReader`] - Little-endian field reader for fixed-size records
//!
//! ## Hydra decoder
//!
//! - [`Hydra`] - The nine `pdta` tables with terminal records dropped and
//!   ownership ranges resolved by [`ownership_ranges`]
//!
//! ## Graph
//!
//! - [`SoundFont`] - Samples, instruments and presets linked by index
//! - [`Zone`] - Key/velocity-scoped generators and modulators
//! - [`GeneratorType`] / [`GeneratorSet`] - The 61 SF2 operators
//! - [`Modulator`] / [`DEFAULT_MODULATORS`] - Controller routing
//!
//! # Example
//!
//! ```rust,ignore
//! use soundbank_sf2::SoundFont;
//!
//! let font = SoundFont::from_reader(std::fs::File::open("bank.sf2")?)?;
//! let piano = font.resolve_preset(0, 0);
//! assert!(!font.layers(piano.index, 60, 100).is_empty());
//! ```
//!
//! Loading is all-or-nothing. Structural corruption yields
//! [`Sf2Error::MalformedContainer`], dangling indices yield
//! [`Sf2Error::BrokenReference`]. Defects that still leave a playable bank
//! (truncated sample ranges, bad stereo links, duplicate generators) are
//! logged through `tracing` and tolerated.

pub mod chunk;
pub mod error;
pub mod font;
pub mod generator;
pub mod hydra;
pub mod modulator;
pub mod sample;
pub mod zone;

#[cfg(feature = "test-fixtures")]
pub mod fixture;

pub use chunk::{ByteReader, Chunk, ChunkReader, FourCc};
pub use error::{Result, Sf2Error};
pub use font::{
    FontInfo, InfoEntry, Instrument, Layer, MatchKind, PERCUSSION_BANK, Preset, PresetMatch,
    SoundFont, Version,
};
pub use generator::{GENERATOR_COUNT, Generator, GeneratorSet, GeneratorType, Range8};
pub use hydra::{
    Bag, GeneratorRecord, Hydra, InstrumentHeader, ModulatorRecord, PresetHeader, SampleHeader,
    ZoneRecord, ownership_ranges,
};
pub use modulator::{
    CurveType, DEFAULT_MODULATORS, Direction, Modulator, ModulatorSource, Polarity, Transform,
    general,
};
pub use sample::{Sample, SampleKind};
pub use zone::Zone;
