//! MIDI channel state.
//!
//! A [`Channel`] owns its controller values, its data-entry state machine,
//! the sustain pedal, and every note it started. It mixes its notes through
//! the channel gain law
//!
//! ```text
//! gain = loudness * volume^2 * expression^2
//! ```
//!
//! and the channel pan, then feeds the reverb and chorus buses at the levels
//! set by CC91 and CC93.

use std::sync::Arc;

use soundbank_config::SynthConfig;
use soundbank_sf2::{PERCUSSION_BANK, SoundFont};
use tracing::{debug, info, warn};

use crate::modulation::{ControllerState, cc};
use crate::note::{Completion, Note};
use crate::synth::{RenderBuffers, SynthEvent, Warning};
use crate::voice::{ChannelVibrato, pan_gains};

/// Registered parameter numbers.
mod rpn {
    pub const PITCH_BEND_RANGE: u16 = 0x0000;
    pub const COARSE_TUNING: u16 = 0x0002;
    pub const NULL: u16 = 0x3FFF;
}

/// NRPN MSB of the vibrato parameters, and their LSBs.
mod nrpn {
    pub const VIBRATO: u8 = 1;
    pub const VIBRATO_RATE: u8 = 8;
    pub const VIBRATO_DEPTH: u8 = 9;
    pub const VIBRATO_DELAY: u8 = 10;
}

/// Vibrato installed by the first NRPN vibrato write.
const DEFAULT_VIBRATO: ChannelVibrato = ChannelVibrato {
    depth_cents: 50.0,
    rate_hz: 8.0,
    delay_secs: 0.6,
};

/// Which parameter the next data entry applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DataEntryState {
    /// No parameter selected.
    #[default]
    Idle,
    /// RPN MSB received.
    RpCoarse,
    /// RPN LSB received.
    RpFine,
    /// NRPN MSB received.
    NrpCoarse,
    /// NRPN LSB received.
    NrpFine,
}

#[derive(Debug)]
struct ChannelNote {
    note: Note,
    /// Channel frame at which the note started.
    started_at: u64,
    /// Voices reported when the note started.
    voices: usize,
}

/// One MIDI channel.
#[derive(Debug)]
pub struct Channel {
    number: u8,
    font: Arc<SoundFont>,
    config: Arc<SynthConfig>,
    percussion: bool,

    preset_index: usize,
    bank: u16,
    pending_bank: u16,
    program: u8,
    lock_preset: bool,
    lock_vibrato: bool,

    controllers: ControllerState,
    loudness: f32,
    volume: f32,
    expression: f32,
    pan: f32,
    reverb: f32,
    chorus: f32,
    transpose: f32,
    coarse_tuning: f32,
    vibrato: ChannelVibrato,

    data_entry: DataEntryState,
    rpn_coarse: u8,
    rpn: u16,
    nrpn_coarse: u8,
    nrpn_fine: u8,

    hold_pedal: bool,
    held_notes: Vec<u8>,
    playing: Vec<ChannelNote>,
    stopping: Vec<ChannelNote>,

    frames_rendered: u64,
    scratch: RenderBuffers,
    events: Vec<SynthEvent>,
}

impl Channel {
    /// Create a channel playing program 0 of its default bank.
    pub fn new(number: u8, font: Arc<SoundFont>, config: Arc<SynthConfig>) -> Self {
        let percussion = config.percussion_channel == Some(number);
        let bank = if percussion { PERCUSSION_BANK } else { 0 };
        let mut channel = Self {
            number,
            percussion,
            preset_index: 0,
            bank,
            pending_bank: bank,
            program: 0,
            lock_preset: false,
            lock_vibrato: false,
            controllers: ControllerState::default(),
            loudness: config.channel_loudness,
            volume: 100.0 / 127.0,
            expression: 1.0,
            pan: 0.0,
            reverb: 0.0,
            chorus: 0.0,
            transpose: 0.0,
            coarse_tuning: 0.0,
            vibrato: ChannelVibrato::default(),
            data_entry: DataEntryState::Idle,
            rpn_coarse: 0,
            rpn: 0,
            nrpn_coarse: 0,
            nrpn_fine: 0,
            hold_pedal: false,
            held_notes: Vec::new(),
            playing: Vec::new(),
            stopping: Vec::new(),
            frames_rendered: 0,
            scratch: RenderBuffers::new(0),
            events: Vec::new(),
            font,
            config,
        };
        channel.select_preset(bank, 0);
        channel
    }

    /// Zero-based channel number.
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Whether this is the percussion channel.
    pub fn is_percussion(&self) -> bool {
        self.percussion
    }

    /// Index of the current preset in the font.
    pub fn preset_index(&self) -> usize {
        self.preset_index
    }

    /// Bank and program last requested.
    pub fn bank_program(&self) -> (u16, u8) {
        (self.bank, self.program)
    }

    /// Live controller values.
    pub fn controllers(&self) -> &ControllerState {
        &self.controllers
    }

    /// Current NRPN vibrato.
    pub fn vibrato(&self) -> ChannelVibrato {
        self.vibrato
    }

    /// Data-entry selector state.
    pub fn data_entry_state(&self) -> DataEntryState {
        self.data_entry
    }

    /// Channel gain from loudness, volume and expression.
    pub fn gain(&self) -> f32 {
        self.loudness * self.volume * self.volume * self.expression * self.expression
    }

    /// Pan in `-1.0..=1.0`.
    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Reverb bus level.
    pub fn reverb_level(&self) -> f32 {
        self.reverb
    }

    /// Chorus bus level.
    pub fn chorus_level(&self) -> f32 {
        self.chorus
    }

    /// Whether the sustain pedal is down.
    pub fn is_holding(&self) -> bool {
        self.hold_pedal
    }

    /// Keys whose note-off is waiting for the pedal, in receipt order.
    pub fn held_notes(&self) -> &[u8] {
        &self.held_notes
    }

    /// Keys of notes still playing, oldest first.
    pub fn playing_keys(&self) -> Vec<u8> {
        self.playing.iter().map(|n| n.note.key()).collect()
    }

    /// Keys of notes releasing or fading, in the order they were stopped.
    pub fn stopping_keys(&self) -> Vec<u8> {
        self.stopping.iter().map(|n| n.note.key()).collect()
    }

    /// Every live note, playing ones first.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.playing.iter().chain(&self.stopping).map(|n| &n.note)
    }

    /// Sounding voices across all notes.
    pub fn voice_count(&self) -> usize {
        self.notes().map(Note::voice_count).sum()
    }

    /// Take the events produced since the last call.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, SynthEvent> {
        self.events.drain(..)
    }

    /// Pitch offset applied to every note: wheel, transpose and coarse tuning.
    pub fn bend_semitones(&self) -> f32 {
        self.controllers.pitch_bend_semitones() + self.transpose + self.coarse_tuning
    }

    fn rebend(&mut self) {
        let semitones = self.bend_semitones();
        for n in self.playing.iter_mut().chain(&mut self.stopping) {
            n.note.bend(semitones);
        }
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Start a note. Velocity 0 is a note-off.
    ///
    /// Returns the number of voices added.
    pub fn note_on(&mut self, key: u8, velocity: u8) -> usize {
        if velocity == 0 {
            self.note_off(key);
            return 0;
        }
        if self.is_muted() {
            return 0;
        }
        let mut note = Note::new(
            &self.font,
            self.preset_index,
            key,
            velocity,
            &self.config,
            self.vibrato,
        );
        let classes = note.start(&self.controllers);
        note.bend(self.bend_semitones());
        for class in classes {
            self.choke(class);
        }

        let voices = note.voice_count();
        self.playing.push(ChannelNote {
            note,
            started_at: self.frames_rendered,
            voices,
        });
        self.events.push(SynthEvent::NoteStarted {
            channel: self.number,
            key,
            velocity,
        });
        self.events.push(SynthEvent::VoiceCount {
            channel: self.number,
            delta: voices as isize,
        });
        voices
    }

    /// Disconnect every playing or stopping note in an exclusive class.
    fn choke(&mut self, class: u8) {
        let mut choked = Vec::new();
        for list in [&mut self.playing, &mut self.stopping] {
            let mut i = 0;
            while i < list.len() {
                if list[i].note.exclusive_classes().contains(&class) {
                    choked.push(list.remove(i));
                } else {
                    i += 1;
                }
            }
        }
        for n in choked {
            debug!(channel = self.number, class, key = n.note.key(), "exclusive class steal");
            self.retire(n);
        }
    }

    /// Stop the most recent playing note on `key`, or hold it while the
    /// sustain pedal is down.
    ///
    /// Returns the note's completion if a note was stopped.
    pub fn note_off(&mut self, key: u8) -> Option<Completion> {
        if self.hold_pedal {
            self.held_notes.push(key);
            return None;
        }
        let index = self.playing.iter().rposition(|n| n.note.key() == key)?;
        let mut n = self.playing.remove(index);
        let completion = n.note.stop();
        self.stopping.push(n);
        Some(completion)
    }

    /// Kill the most recent playing note on `key` with the fast fade.
    pub fn kill_note(&mut self, key: u8) -> Option<Completion> {
        let index = self.playing.iter().rposition(|n| n.note.key() == key)?;
        let mut n = self.playing.remove(index);
        let completion = n.note.kill();
        self.stopping.push(n);
        Some(completion)
    }

    /// Stop every playing note.
    ///
    /// With `force`, the pedal is released first and every note is
    /// disconnected at once.
    pub fn stop_all(&mut self, force: bool) {
        if force {
            self.hold_pedal = false;
            self.held_notes.clear();
        }
        let keys = self.playing_keys();
        for key in keys {
            self.note_off(key);
        }
        if force {
            let stopping = std::mem::take(&mut self.stopping);
            for n in stopping {
                self.retire(n);
            }
        }
    }

    /// Silence the channel for good: stop everything and mute.
    pub fn kill_channel(&mut self) {
        self.stop_all(true);
        let playing = std::mem::take(&mut self.playing);
        for n in playing {
            self.retire(n);
        }
        self.mute();
    }

    /// Drop a note: disconnect it and report it gone.
    fn retire(&mut self, mut n: ChannelNote) {
        n.note.disconnect();
        self.events.push(SynthEvent::NoteEnded {
            channel: self.number,
            key: n.note.key(),
        });
        self.events.push(SynthEvent::VoiceCount {
            channel: self.number,
            delta: -(n.voices as isize),
        });
    }

    // ------------------------------------------------------------------
    // Channel parameters
    // ------------------------------------------------------------------

    /// Set the 14-bit pitch wheel position and bend every note.
    pub fn pitch_bend(&mut self, value: u16) {
        self.controllers.pitch_wheel = value.min(0x3FFF);
        self.rebend();
    }

    /// Transpose in semitones. Ignored on the percussion channel.
    pub fn transpose(&mut self, semitones: f32) {
        if self.percussion {
            return;
        }
        self.transpose = semitones;
        self.rebend();
    }

    /// Silence the channel's output and refuse new notes.
    pub fn mute(&mut self) {
        self.loudness = 0.0;
    }

    /// Restore the configured loudness.
    pub fn unmute(&mut self) {
        self.loudness = self.config.channel_loudness;
    }

    /// Whether the channel is muted.
    pub fn is_muted(&self) -> bool {
        self.loudness == 0.0
    }

    /// Ignore program and bank changes while locked.
    pub fn lock_preset(&mut self, locked: bool) {
        self.lock_preset = locked;
    }

    /// Ignore NRPN vibrato writes while locked.
    pub fn lock_vibrato(&mut self, locked: bool) {
        self.lock_vibrato = locked;
    }

    /// Select a program in the latched bank.
    pub fn program_change(&mut self, program: u8) {
        if self.lock_preset {
            return;
        }
        let bank = if self.percussion {
            PERCUSSION_BANK
        } else {
            self.pending_bank
        };
        self.select_preset(bank, program);
    }

    fn select_preset(&mut self, bank: u16, program: u8) {
        let found = self.font.resolve_preset(bank, program);
        if found.is_fallback() {
            warn!(
                channel = self.number,
                bank, program, "preset not found, using the first preset"
            );
            self.events.push(SynthEvent::Warning(Warning::PresetNotFound {
                channel: self.number,
                bank,
                program,
                fallback: found.index,
            }));
        }
        self.bank = bank;
        self.program = program;
        self.preset_index = found.index;
        if self.font.presets()[found.index].is_percussion() {
            self.transpose = 0.0;
            self.rebend();
        }
    }

    /// Restore every controller and channel parameter to its default.
    ///
    /// Transpose and the locks are kept.
    pub fn reset_controllers(&mut self) {
        self.controllers = ControllerState::default();
        self.volume = 100.0 / 127.0;
        self.expression = 1.0;
        self.pan = 0.0;
        self.reverb = 0.0;
        self.chorus = 0.0;
        self.coarse_tuning = 0.0;
        self.vibrato = ChannelVibrato::default();
        self.reset_data_entry();
        self.release_hold_pedal();
        self.rebend();
    }

    fn reset_data_entry(&mut self) {
        self.data_entry = DataEntryState::Idle;
        self.rpn_coarse = 0;
        self.rpn = 0;
        self.nrpn_coarse = 0;
        self.nrpn_fine = 0;
    }

    fn release_hold_pedal(&mut self) {
        self.hold_pedal = false;
        let held = std::mem::take(&mut self.held_notes);
        for key in held {
            self.note_off(key);
        }
    }

    /// Apply a controller change.
    ///
    /// The value is stored for modulators in every case.
    pub fn control_change(&mut self, controller: u8, value: u8) {
        let value = value & 0x7F;
        self.controllers.set(controller, value);
        match controller & 0x7F {
            cc::BANK_SELECT => {
                if !self.percussion {
                    self.pending_bank = u16::from(value);
                }
            }
            cc::MODULATION => {}
            cc::DATA_ENTRY => self.data_entry_coarse(value),
            cc::VOLUME => self.volume = f32::from(value) / 127.0,
            cc::VOLUME_LSB => {
                let msb = u16::from(self.controllers.get(cc::VOLUME));
                self.volume = f32::from(msb << 7 | u16::from(value)) / 16383.0;
            }
            cc::PAN => self.pan = ((f32::from(value) - 64.0) / 64.0).max(-1.0),
            cc::EXPRESSION => self.expression = f32::from(value) / 127.0,
            cc::EXPRESSION_LSB => {
                let msb = u16::from(self.controllers.get(cc::EXPRESSION));
                self.expression = f32::from(msb << 7 | u16::from(value)) / 16383.0;
            }
            cc::SUSTAIN => {
                if value >= 64 {
                    self.hold_pedal = true;
                } else if self.hold_pedal {
                    self.release_hold_pedal();
                }
            }
            cc::REVERB => self.reverb = f32::from(value) / 127.0,
            cc::CHORUS => self.chorus = f32::from(value) / 127.0,
            cc::NRPN_MSB => {
                self.nrpn_coarse = value;
                self.data_entry = DataEntryState::NrpCoarse;
            }
            cc::NRPN_LSB => {
                self.nrpn_fine = value;
                self.data_entry = DataEntryState::NrpFine;
            }
            cc::RPN_MSB => {
                self.rpn_coarse = value;
                self.rpn = u16::from(value);
                self.data_entry = DataEntryState::RpCoarse;
            }
            cc::RPN_LSB => {
                self.rpn = u16::from(self.rpn_coarse) << 7 | u16::from(value);
                self.data_entry = DataEntryState::RpFine;
            }
            cc::ALL_SOUND_OFF => {
                let playing = std::mem::take(&mut self.playing);
                self.stopping.extend(playing);
                for n in &mut self.stopping {
                    n.note.kill();
                }
            }
            cc::RESET_ALL_CONTROLLERS => {
                self.controllers.reset();
                self.expression = 1.0;
                self.reverb = f32::from(self.controllers.get(cc::REVERB)) / 127.0;
                self.chorus = f32::from(self.controllers.get(cc::CHORUS)) / 127.0;
                self.reset_data_entry();
                self.release_hold_pedal();
                self.rebend();
            }
            cc::ALL_NOTES_OFF => self.stop_all(false),
            other => {
                debug!(channel = self.number, controller = other, value, "unrecognized controller");
                self.events.push(SynthEvent::Warning(Warning::UnrecognizedController {
                    channel: self.number,
                    controller: other,
                    value,
                }));
            }
        }
    }

    /// Apply data entry MSB to the selected RPN or NRPN.
    fn data_entry_coarse(&mut self, value: u8) {
        match self.data_entry {
            DataEntryState::Idle | DataEntryState::NrpCoarse => {}
            DataEntryState::RpCoarse | DataEntryState::RpFine => match self.rpn {
                rpn::PITCH_BEND_RANGE => {
                    self.controllers.pitch_wheel_range = f32::from(value);
                    info!(channel = self.number, semitones = value, "pitch bend range");
                    self.rebend();
                }
                rpn::COARSE_TUNING => {
                    self.coarse_tuning = f32::from(value) - 64.0;
                    info!(
                        channel = self.number,
                        semitones = self.coarse_tuning,
                        "coarse tuning"
                    );
                    self.rebend();
                }
                rpn::NULL => self.reset_data_entry(),
                _ => {}
            },
            DataEntryState::NrpFine => {
                if self.nrpn_coarse != nrpn::VIBRATO || self.lock_vibrato || value == 64 {
                    return;
                }
                let v = f32::from(value);
                let param = match self.nrpn_fine {
                    nrpn::VIBRATO_RATE => "rate",
                    nrpn::VIBRATO_DEPTH => "depth",
                    nrpn::VIBRATO_DELAY => "delay",
                    _ => return,
                };
                if self.vibrato == ChannelVibrato::default() {
                    self.vibrato = DEFAULT_VIBRATO;
                }
                match self.nrpn_fine {
                    nrpn::VIBRATO_RATE => self.vibrato.rate_hz = v / 64.0 * 8.0,
                    nrpn::VIBRATO_DEPTH => self.vibrato.depth_cents = v / 2.0,
                    _ => self.vibrato.delay_secs = v / 64.0 / 3.0,
                }
                info!(channel = self.number, param, vibrato = ?self.vibrato, "channel vibrato");
            }
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Render every note and add the channel's output to `out`.
    pub fn render(&mut self, out: &mut RenderBuffers) {
        let frames = out.len();
        self.scratch.resize(frames);
        self.scratch.clear();
        for n in self.playing.iter_mut().chain(&mut self.stopping) {
            n.note.update(&self.controllers);
            n.note.render(&mut self.scratch);
        }

        let gain = self.gain();
        let (pan_left, pan_right) = pan_gains(self.pan);
        for ((left, right, reverb, chorus), (sl, sr, srev, scho)) in
            out.iter_mut().zip(self.scratch.iter())
        {
            let l = sl * gain;
            let r = sr * gain;
            *left += l * pan_left;
            *right += r * pan_right;
            let mono = 0.5 * (l + r);
            *reverb += mono * self.reverb + srev * gain;
            *chorus += mono * self.chorus + scho * gain;
        }
        self.frames_rendered += frames as u64;
        self.reap();
    }

    /// Retire notes whose voices have all finished.
    fn reap(&mut self) {
        let mut finished = Vec::new();
        for list in [&mut self.playing, &mut self.stopping] {
            let mut i = 0;
            while i < list.len() {
                if list[i].note.is_finished() {
                    finished.push(list.remove(i));
                } else {
                    i += 1;
                }
            }
        }
        for n in finished {
            self.retire(n);
        }
    }

    /// Start frame of the oldest note, releasing or playing.
    pub(crate) fn oldest_note(&self, releasing: bool) -> Option<u64> {
        let list = if releasing { &self.stopping } else { &self.playing };
        list.iter().map(|n| n.started_at).min()
    }

    /// Disconnect the oldest releasing or playing note. Returns the voices freed.
    pub(crate) fn steal_oldest(&mut self, releasing: bool) -> usize {
        let list = if releasing {
            &mut self.stopping
        } else {
            &mut self.playing
        };
        let Some(index) = list
            .iter()
            .enumerate()
            .min_by_key(|(_, n)| n.started_at)
            .map(|(i, _)| i)
        else {
            return 0;
        };
        let n = list.remove(index);
        let freed = n.note.voice_count();
        debug!(channel = self.number, key = n.note.key(), releasing, "voice budget steal");
        self.retire(n);
        freed
    }
}
