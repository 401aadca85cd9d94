//! One playing sample layer.
//!
//! A [`Voice`] walks a range of the shared PCM blob at a pitch-dependent
//! rate, shapes it with the volume envelope, the lowpass filter and the LFOs,
//! and adds the result into a stereo buffer. Parameters that depend on
//! controllers are refreshed by [`Voice::update`]; pitch, LFOs and filter
//! cutoff are recomputed every [`CONTROL_BLOCK`] frames.

use std::sync::Arc;

use soundbank_sf2::GeneratorType;

use crate::envelope::{EnvelopeState, VolumeEnvelope};
use crate::filter::LowpassFilter;
use crate::lfo::{Lfo, LfoShape};
use crate::modulation::{ModulationContext, ModulationSums};
use crate::resolver::{LoopMode, VoiceParams};
use crate::units::{centibels_to_gain, semitones_to_ratio};

/// Frames between control-rate updates.
pub const CONTROL_BLOCK: u32 = 64;

/// Channel-wide vibrato set through NRPN, applied on top of the SoundFont
/// vibrato LFO.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelVibrato {
    /// Depth in cents.
    pub depth_cents: f32,
    /// Rate in Hz. Zero disables the vibrato.
    pub rate_hz: f32,
    /// Delay before the vibrato starts.
    pub delay_secs: f32,
}

impl ChannelVibrato {
    /// Whether this vibrato produces any modulation.
    pub fn is_active(&self) -> bool {
        self.rate_hz > 0.0 && self.depth_cents != 0.0
    }
}

/// Stereo gains for a pan position in `-1.0..=1.0`.
///
/// Center is `(1.0, 1.0)`; hard left is `(1.0, 0.0)`.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0))
}

/// A sample layer with its envelope, filter and LFOs.
#[derive(Debug, Clone)]
pub struct Voice {
    params: VoiceParams,
    pcm: Option<Arc<[i16]>>,
    /// Absolute read position in the PCM blob.
    position: f64,
    output_rate: f32,
    kill_fade_secs: f32,
    envelope: VolumeEnvelope,
    filter: LowpassFilter,
    vibrato_lfo: Lfo,
    modulation_lfo: Lfo,
    channel_vibrato: Option<(Lfo, f32)>,
    sums: ModulationSums,
    released: bool,
    bend_semitones: f32,
    frames_since_control: u32,
    control_dirty: bool,

    // Refreshed by `update`.
    base_semitones: f32,
    attenuation_gain: f32,
    pan_gains: (f32, f32),
    reverb_send: f32,
    chorus_send: f32,

    // Refreshed every control block.
    playback_rate: f32,
    lfo_gain: f32,
}

impl Voice {
    /// Create a voice over `pcm` at the engine's output rate.
    pub fn new(
        params: VoiceParams,
        pcm: Arc<[i16]>,
        output_rate: f32,
        kill_fade_secs: f32,
        vibrato: ChannelVibrato,
    ) -> Self {
        let (vib_hz, vib_delay) = params.vibrato_lfo();
        let (mod_hz, mod_delay) = params.modulation_lfo();
        let channel_vibrato = vibrato.is_active().then(|| {
            (
                Lfo::new(output_rate, vibrato.rate_hz, vibrato.delay_secs, LfoShape::Sine),
                vibrato.depth_cents,
            )
        });
        Self {
            position: params.range.start as f64,
            pcm: Some(pcm),
            output_rate,
            kill_fade_secs,
            envelope: VolumeEnvelope::new(output_rate),
            filter: LowpassFilter::new(output_rate),
            vibrato_lfo: Lfo::new(output_rate, vib_hz, vib_delay, LfoShape::Triangle),
            modulation_lfo: Lfo::new(output_rate, mod_hz, mod_delay, LfoShape::Triangle),
            channel_vibrato,
            sums: ModulationSums::default(),
            released: false,
            bend_semitones: 0.0,
            frames_since_control: 0,
            control_dirty: true,
            base_semitones: 0.0,
            attenuation_gain: 1.0,
            pan_gains: (1.0, 1.0),
            reverb_send: 0.0,
            chorus_send: 0.0,
            playback_rate: 1.0,
            lfo_gain: 1.0,
            params,
        }
    }

    /// Evaluate modulators and start the envelope.
    pub fn start(&mut self, ctx: &ModulationContext<'_>) {
        self.update(ctx);
        self.envelope.start(self.params.envelope_times(&self.sums));
        self.control();
    }

    /// Re-evaluate modulators against live controller values.
    pub fn update(&mut self, ctx: &ModulationContext<'_>) {
        self.sums = ModulationSums::evaluate(self.params.modulators(), ctx);
        let p = &self.params;
        self.base_semitones = p.pitch_semitones(&self.sums);
        self.attenuation_gain = p.attenuation_gain(&self.sums);
        self.pan_gains = pan_gains(p.pan(&self.sums));
        self.reverb_send = p.reverb_send(&self.sums);
        self.chorus_send = p.chorus_send(&self.sums);
        self.control_dirty = true;
    }

    /// Set the pitch-bend offset in semitones. Takes effect on the next frame.
    pub fn bend(&mut self, semitones: f32) {
        self.bend_semitones = semitones;
        self.control_dirty = true;
    }

    /// Enter the release phase with the resolved release time.
    pub fn release(&mut self) {
        if self.envelope.is_finished() {
            return;
        }
        self.released = true;
        self.envelope.release(self.params.release_secs(&self.sums));
    }

    /// Fade out over the kill time, replacing any release in progress.
    pub fn kill(&mut self) {
        if self.envelope.is_finished() {
            return;
        }
        self.released = true;
        self.envelope.release(self.kill_fade_secs);
    }

    /// Drop the PCM reference and silence the voice.
    ///
    /// Returns `false` when the voice was already disconnected.
    pub fn disconnect(&mut self) -> bool {
        self.envelope.finish();
        self.pcm.take().is_some()
    }

    /// Whether the PCM reference has been released.
    pub fn is_disconnected(&self) -> bool {
        self.pcm.is_none()
    }

    /// Resolved parameters.
    pub fn params(&self) -> &VoiceParams {
        &self.params
    }

    /// Envelope state.
    pub fn state(&self) -> EnvelopeState {
        self.envelope.state()
    }

    /// Whether the voice will produce no more output.
    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    /// Whether a release or kill has been requested.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Absolute read position in the PCM blob.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Current normalized envelope level.
    pub fn envelope_gain(&self) -> f32 {
        self.envelope.level()
    }

    /// Gain the voice settles at while sustaining.
    pub fn sustain_absolute_gain(&self) -> f32 {
        self.params.sustain_absolute_gain(&self.sums)
    }

    /// Current `(left, right)` pan gains.
    pub fn pan_gains(&self) -> (f32, f32) {
        self.pan_gains
    }

    /// PCM points advanced per output frame.
    pub fn playback_rate(&self) -> f32 {
        self.playback_rate
    }

    /// Reverb send level.
    pub fn reverb_send(&self) -> f32 {
        self.reverb_send
    }

    /// Chorus send level.
    pub fn chorus_send(&self) -> f32 {
        self.chorus_send
    }

    /// Choke group, 0 for none.
    pub fn exclusive_class(&self) -> u8 {
        self.params.exclusive_class
    }

    /// Seconds until the current release or kill completes.
    pub fn remaining_release_secs(&self) -> f32 {
        self.envelope.remaining_release_secs()
    }

    fn is_looping(&self) -> bool {
        self.params.loop_range.is_some()
            && match self.params.loop_mode {
                LoopMode::Continuous => true,
                LoopMode::UntilRelease => !self.released,
                LoopMode::NoLoop => false,
            }
    }

    /// Control-rate update: LFOs, pitch and filter.
    fn control(&mut self) {
        let elapsed = std::mem::take(&mut self.frames_since_control);
        self.control_dirty = false;
        self.vibrato_lfo.advance(elapsed);
        self.modulation_lfo.advance(elapsed);
        let vib = self.vibrato_lfo.value();
        let modulation = self.modulation_lfo.value();

        let p = &self.params;
        let s = &self.sums;
        let mut cents = vib * p.modulated(GeneratorType::VibLfoToPitch, s)
            + modulation * p.modulated(GeneratorType::ModLfoToPitch, s);
        if let Some((lfo, depth)) = &mut self.channel_vibrato {
            lfo.advance(elapsed);
            cents += lfo.value() * *depth;
        }

        let semitones = self.base_semitones + self.bend_semitones + cents / 100.0;
        self.playback_rate =
            p.sample_rate as f32 / self.output_rate * semitones_to_ratio(semitones);
        self.lfo_gain =
            centibels_to_gain(-modulation * p.modulated(GeneratorType::ModLfoToVolume, s));

        let cutoff =
            p.filter_cutoff(s) + modulation * p.modulated(GeneratorType::ModLfoToFilterFc, s);
        self.filter.set(cutoff, p.filter_q(s));
    }

    /// Interpolated PCM value at the read position, then advance.
    fn read(&mut self) -> Option<f32> {
        let pcm = self.pcm.as_deref()?;
        let looped = if self.is_looping() {
            self.params.loop_range.clone()
        } else {
            None
        };
        if let Some(lp) = &looped {
            let (start, end) = (lp.start as f64, lp.end as f64);
            if self.position >= end {
                self.position = start + (self.position - start) % (end - start);
            }
        }

        let end = self.params.range.end;
        let index = self.position as usize;
        if index >= end {
            return None;
        }
        let next = index + 1;
        let s0 = f32::from(pcm[index]);
        let s1 = match &looped {
            Some(lp) if next >= lp.end => f32::from(pcm[lp.start]),
            _ if next < end => f32::from(pcm[next]),
            _ => 0.0,
        };
        let frac = (self.position - index as f64) as f32;
        self.position += f64::from(self.playback_rate);
        Some((s0 + (s1 - s0) * frac) / 32768.0)
    }

    /// Produce one `(left, right)` frame, or `None` once finished.
    #[inline]
    pub fn next_frame(&mut self) -> Option<(f32, f32)> {
        if self.envelope.is_finished() {
            return None;
        }
        if self.control_dirty || self.frames_since_control >= CONTROL_BLOCK {
            self.control();
        }
        self.frames_since_control += 1;

        let Some(sample) = self.read() else {
            self.envelope.finish();
            return None;
        };
        let env = self.envelope.advance();
        let out = self.filter.process(sample) * env * self.attenuation_gain * self.lfo_gain;
        Some((out * self.pan_gains.0, out * self.pan_gains.1))
    }

    /// Add up to `left.len()` frames into the buffers.
    ///
    /// Returns the number of frames written; fewer than requested means the
    /// voice finished.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        let mut written = 0;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let Some((a, b)) = self.next_frame() else {
                break;
            };
            *l += a;
            *r += b;
            written += 1;
        }
        written
    }
}
