//! The synthesizer facade.
//!
//! [`Synthesizer`] owns one [`Channel`] per MIDI channel, dispatches
//! [`MidiEvent`]s in receipt order, enforces the global voice budget and
//! forwards [`SynthEvent`] notifications to an [`EventSink`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use soundbank_config::SynthConfig;
//! use soundbank_sf2::SoundFont;
//! use soundbank_synth::{MidiEvent, RenderBuffers, Synthesizer};
//!
//! let font = Arc::new(SoundFont::from_bytes(&bytes)?);
//! let mut synth = Synthesizer::new(font, SynthConfig::default())?;
//! synth.set_event_sink(|event| println!("{event:?}"));
//!
//! synth.handle(MidiEvent::NoteOn { channel: 0, key: 60, velocity: 100 });
//!
//! let mut block = RenderBuffers::new(512);
//! synth.render(&mut block);
//! ```

use std::fmt;
use std::sync::Arc;

use soundbank_config::{ConfigError, SynthConfig};
use soundbank_sf2::SoundFont;
use tracing::debug;

use crate::channel::Channel;

/// A channel message from the transport layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiEvent {
    /// Key pressed. Velocity 0 acts as a note-off.
    NoteOn {
        /// Zero-based channel.
        channel: u8,
        /// MIDI key.
        key: u8,
        /// Velocity.
        velocity: u8,
    },
    /// Key released.
    NoteOff {
        /// Zero-based channel.
        channel: u8,
        /// MIDI key.
        key: u8,
    },
    /// Control change.
    ControllerChange {
        /// Zero-based channel.
        channel: u8,
        /// Controller number.
        controller: u8,
        /// Controller value.
        value: u8,
    },
    /// Program change.
    ProgramChange {
        /// Zero-based channel.
        channel: u8,
        /// Program number.
        program: u8,
    },
    /// Pitch wheel.
    PitchBend {
        /// Zero-based channel.
        channel: u8,
        /// 14-bit wheel position, center 8192.
        value: u16,
    },
    /// Stop every note and restore the channel defaults.
    ChannelReset {
        /// Zero-based channel.
        channel: u8,
    },
}

impl MidiEvent {
    /// Decode one channel voice message from raw bytes.
    ///
    /// Returns `None` for system messages, unsupported statuses, running
    /// status and short messages.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        if status < 0x80 {
            return None;
        }
        let channel = status & 0x0F;
        let byte = |i: usize| data.get(i).map(|b| b & 0x7F);
        let event = match status & 0xF0 {
            0x80 => Self::NoteOff {
                channel,
                key: byte(0)?,
            },
            0x90 => Self::NoteOn {
                channel,
                key: byte(0)?,
                velocity: byte(1)?,
            },
            0xB0 => Self::ControllerChange {
                channel,
                controller: byte(0)?,
                value: byte(1)?,
            },
            0xC0 => Self::ProgramChange {
                channel,
                program: byte(0)?,
            },
            0xE0 => Self::PitchBend {
                channel,
                value: u16::from(byte(1)?) << 7 | u16::from(byte(0)?),
            },
            _ => return None,
        };
        Some(event)
    }

    /// Channel the event is addressed to.
    pub fn channel(&self) -> u8 {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ControllerChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::PitchBend { channel, .. }
            | Self::ChannelReset { channel } => channel,
        }
    }
}

/// Non-fatal conditions, reported and then worked around.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Warning {
    /// The requested preset does not exist; another one is playing.
    PresetNotFound {
        /// Zero-based channel.
        channel: u8,
        /// Requested bank.
        bank: u16,
        /// Requested program.
        program: u8,
        /// Index of the preset used instead.
        fallback: usize,
    },
    /// The controller has no channel-level meaning. Its value is still
    /// visible to modulators.
    UnrecognizedController {
        /// Zero-based channel.
        channel: u8,
        /// Controller number.
        controller: u8,
        /// Controller value.
        value: u8,
    },
}

/// Notifications for observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthEvent {
    /// A note was started.
    NoteStarted {
        /// Zero-based channel.
        channel: u8,
        /// MIDI key.
        key: u8,
        /// Velocity.
        velocity: u8,
    },
    /// A note finished or was removed.
    NoteEnded {
        /// Zero-based channel.
        channel: u8,
        /// MIDI key.
        key: u8,
    },
    /// The channel's voice count changed.
    VoiceCount {
        /// Zero-based channel.
        channel: u8,
        /// Voices added (positive) or removed (negative).
        delta: isize,
    },
    /// Something was worked around.
    Warning(Warning),
}

/// Receiver of [`SynthEvent`]s.
pub trait EventSink {
    /// Handle one event.
    fn event(&mut self, event: SynthEvent);
}

impl<F: FnMut(SynthEvent)> EventSink for F {
    fn event(&mut self, event: SynthEvent) {
        self(event);
    }
}

/// One block of output: dry stereo plus the reverb and chorus send buses.
///
/// The four buffers always have the same length. Rendering adds into them;
/// clear them between blocks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderBuffers {
    left: Vec<f32>,
    right: Vec<f32>,
    reverb: Vec<f32>,
    chorus: Vec<f32>,
}

/// One frame of a [`RenderBuffers`] block: `(left, right, reverb, chorus)`.
pub type Frame = (f32, f32, f32, f32);

impl RenderBuffers {
    /// Silent buffers of `frames` frames.
    pub fn new(frames: usize) -> Self {
        Self {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
            reverb: vec![0.0; frames],
            chorus: vec![0.0; frames],
        }
    }

    /// Frames per block.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    /// Whether the block holds no frames.
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Dry left.
    pub fn left(&self) -> &[f32] {
        &self.left
    }

    /// Dry right.
    pub fn right(&self) -> &[f32] {
        &self.right
    }

    /// Mono reverb send.
    pub fn reverb(&self) -> &[f32] {
        &self.reverb
    }

    /// Mono chorus send.
    pub fn chorus(&self) -> &[f32] {
        &self.chorus
    }

    /// Frames in order.
    pub fn iter(&self) -> impl Iterator<Item = Frame> + '_ {
        self.left
            .iter()
            .zip(&self.right)
            .zip(&self.reverb)
            .zip(&self.chorus)
            .map(|(((l, r), rev), cho)| (*l, *r, *rev, *cho))
    }

    /// Mutable frames in order.
    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (&mut f32, &mut f32, &mut f32, &mut f32)> + '_ {
        self.left
            .iter_mut()
            .zip(&mut self.right)
            .zip(&mut self.reverb)
            .zip(&mut self.chorus)
            .map(|(((l, r), rev), cho)| (l, r, rev, cho))
    }

    /// Zero every buffer.
    pub fn clear(&mut self) {
        for buf in [
            &mut self.left,
            &mut self.right,
            &mut self.reverb,
            &mut self.chorus,
        ] {
            buf.fill(0.0);
        }
    }

    /// Change the block length. New frames are silent.
    pub fn resize(&mut self, frames: usize) {
        for buf in [
            &mut self.left,
            &mut self.right,
            &mut self.reverb,
            &mut self.chorus,
        ] {
            buf.resize(frames, 0.0);
        }
    }
}

/// A multi-channel SoundFont synthesizer.
pub struct Synthesizer {
    font: Arc<SoundFont>,
    config: Arc<SynthConfig>,
    channels: Vec<Channel>,
    sink: Option<Box<dyn EventSink + Send>>,
    pending: Vec<SynthEvent>,
}

impl fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synthesizer")
            .field("config", &self.config)
            .field("channels", &self.channels.len())
            .field("voices", &self.voice_count())
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl Synthesizer {
    /// Create a synthesizer over a loaded font.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `config` does not validate.
    pub fn new(font: Arc<SoundFont>, config: SynthConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = Arc::new(config);
        let channels = (0..config.channel_count)
            .map(|n| {
                let number = u8::try_from(n).unwrap_or(u8::MAX);
                Channel::new(number, Arc::clone(&font), Arc::clone(&config))
            })
            .collect();
        let mut synth = Self {
            font,
            config,
            channels,
            sink: None,
            pending: Vec::new(),
        };
        synth.dispatch_events();
        Ok(synth)
    }

    /// The shared font.
    pub fn font(&self) -> &Arc<SoundFont> {
        &self.font
    }

    /// The engine configuration.
    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Deliver events to `sink` from now on.
    ///
    /// Events produced before a sink was set are delivered immediately.
    pub fn set_event_sink(&mut self, sink: impl EventSink + Send + 'static) {
        let mut sink: Box<dyn EventSink + Send> = Box::new(sink);
        for event in self.pending.drain(..) {
            sink.event(event);
        }
        self.sink = Some(sink);
    }

    /// Take events queued while no sink is set.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, SynthEvent> {
        self.pending.drain(..)
    }

    /// Channel `n`, if it exists.
    pub fn channel(&self, n: u8) -> Option<&Channel> {
        self.channels.get(usize::from(n))
    }

    /// Mutable channel `n`, if it exists.
    ///
    /// Changes made here bypass the voice budget.
    pub fn channel_mut(&mut self, n: u8) -> Option<&mut Channel> {
        self.channels.get_mut(usize::from(n))
    }

    /// All channels.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Sounding voices across every channel.
    pub fn voice_count(&self) -> usize {
        self.channels.iter().map(Channel::voice_count).sum()
    }

    /// Apply one MIDI event.
    pub fn handle(&mut self, event: MidiEvent) {
        let index = usize::from(event.channel());
        if index >= self.channels.len() {
            debug!(channel = event.channel(), "event for a channel that does not exist");
            return;
        }
        match event {
            MidiEvent::NoteOn { key, velocity, .. } => {
                if velocity > 0 && !self.channels[index].is_muted() {
                    self.make_room();
                }
                self.channels[index].note_on(key, velocity);
            }
            MidiEvent::NoteOff { key, .. } => {
                self.channels[index].note_off(key);
            }
            MidiEvent::ControllerChange {
                controller, value, ..
            } => self.channels[index].control_change(controller, value),
            MidiEvent::ProgramChange { program, .. } => {
                self.channels[index].program_change(program);
            }
            MidiEvent::PitchBend { value, .. } => self.channels[index].pitch_bend(value),
            MidiEvent::ChannelReset { .. } => {
                let channel = &mut self.channels[index];
                channel.stop_all(true);
                channel.reset_controllers();
            }
        }
        self.dispatch_events();
    }

    /// Render one block from every channel, adding into `out`.
    pub fn render(&mut self, out: &mut RenderBuffers) {
        for channel in &mut self.channels {
            channel.render(out);
        }
        self.dispatch_events();
    }

    /// Steal notes until a full-size note fits in the voice budget.
    ///
    /// Oldest releasing notes go first, then the oldest playing notes.
    fn make_room(&mut self) {
        let Some(max) = self.config.max_voices else {
            return;
        };
        let needed = self.config.sample_cap;
        while self.voice_count() + needed > max {
            let victim = self
                .oldest(true)
                .map(|i| (i, true))
                .or_else(|| self.oldest(false).map(|i| (i, false)));
            let Some((index, releasing)) = victim else {
                break;
            };
            self.channels[index].steal_oldest(releasing);
        }
    }

    /// Channel holding the oldest releasing or playing note.
    fn oldest(&self, releasing: bool) -> Option<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.oldest_note(releasing).map(|at| (at, i)))
            .min()
            .map(|(_, i)| i)
    }

    fn dispatch_events(&mut self) {
        for channel in &mut self.channels {
            match &mut self.sink {
                Some(sink) => channel.drain_events().for_each(|e| sink.event(e)),
                None => self.pending.extend(channel.drain_events()),
            }
        }
    }
}
