//! Soundbank Synth - SoundFont synthesis engine
//!
//! Plays a [`soundbank_sf2::SoundFont`] in response to MIDI channel events
//! and renders blocks of dry stereo plus reverb and chorus send buses.
//!
//! # Layers
//!
//! ## Resolver
//!
//! - [`VoiceParams`] - Preset and instrument generators merged for one layer
//! - [`ModulationSums`] - Real-time modulator contributions per generator
//! - [`ControllerState`] - Live controller values of a channel
//!
//! ## Voice
//!
//! - [`Voice`] - One sample layer: interpolated playback, envelope, filter, LFOs
//! - [`VolumeEnvelope`] / [`EnvelopeState`] - Delay-attack-hold-decay-sustain-release
//! - [`Lfo`] - Delayed triangle or sine LFO
//! - [`LowpassFilter`] - Resonant lowpass from `initialFilterFc`/`initialFilterQ`
//!
//! ## Note and channel
//!
//! - [`Note`] - The voices of one key press, with [`Completion`] handles for
//!   stop and kill
//! - [`Channel`] - Controllers, data entry, sustain pedal and the gain law
//!
//! ## Synthesizer
//!
//! - [`Synthesizer`] - Channels, MIDI dispatch and the voice budget
//! - [`MidiEvent`] / [`SynthEvent`] - Transport and observer boundaries
//! - [`RenderBuffers`] - One block of output
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use soundbank_config::SynthConfig;
//! use soundbank_sf2::SoundFont;
//! use soundbank_synth::{MidiEvent, RenderBuffers, Synthesizer};
//!
//! # let bytes = soundbank_sf2::fixture::piano_and_drums();
//! let font = Arc::new(SoundFont::from_bytes(&bytes).unwrap());
//! let mut synth = Synthesizer::new(font, SynthConfig::default()).unwrap();
//!
//! synth.handle(MidiEvent::NoteOn { channel: 0, key: 60, velocity: 100 });
//!
//! let mut block = RenderBuffers::new(512);
//! synth.render(&mut block);
//! assert_eq!(synth.voice_count(), 1);
//! ```
//!
//! Rendering never blocks and never allocates per frame. Waiting for a note
//! to fade is done through [`Completion`], a future resolved by the render
//! path.

pub mod channel;
pub mod envelope;
pub mod filter;
pub mod lfo;
pub mod modulation;
pub mod note;
pub mod resolver;
pub mod synth;
pub mod units;
pub mod voice;

pub use channel::{Channel, DataEntryState};
pub use envelope::{EnvelopeState, EnvelopeTimes, VolumeEnvelope};
pub use filter::LowpassFilter;
pub use lfo::{Lfo, LfoShape};
pub use modulation::{ControllerState, ModulationContext, ModulationSums, cc, merge_modulators};
pub use note::{Completion, Note, NoteState, select_layers};
pub use resolver::{LoopMode, VoiceParams};
pub use synth::{EventSink, Frame, MidiEvent, RenderBuffers, SynthEvent, Synthesizer, Warning};
pub use voice::{CONTROL_BLOCK, ChannelVibrato, Voice};
