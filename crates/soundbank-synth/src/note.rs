//! Notes: the voices started by one key press.
//!
//! A [`Note`] resolves the preset's layers for its key and velocity, caps
//! them with [`select_layers`], and drives the resulting voices as a group.
//! Stopping and killing hand back a [`Completion`] that resolves when the
//! render path sees every voice finish, so nothing ever waits on a timer.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

use soundbank_config::SynthConfig;
use soundbank_sf2::{Layer, SampleKind, SoundFont};
use tracing::trace;

use crate::modulation::{ControllerState, ModulationContext};
use crate::resolver::VoiceParams;
use crate::synth::RenderBuffers;
use crate::voice::{ChannelVibrato, Voice};

#[derive(Debug, Default)]
struct CompletionState {
    done: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

/// Resolves once a stopped or killed note has gone silent.
///
/// Cloning shares the same signal. Poll it as a future or check
/// [`Completion::is_complete`] from a non-async context.
#[derive(Clone, Debug, Default)]
pub struct Completion {
    state: Arc<CompletionState>,
}

impl Completion {
    /// An unresolved completion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the note has finished.
    pub fn is_complete(&self) -> bool {
        self.state.done.load(Ordering::Acquire)
    }

    pub(crate) fn complete(&self) {
        self.state.done.store(true, Ordering::Release);
        let waker = self
            .state
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl Future for Completion {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.is_complete() {
            return Poll::Ready(());
        }
        *self
            .state
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cx.waker().clone());
        // Re-check so a completion racing the waker store is not lost.
        if self.is_complete() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Lifecycle of a note.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoteState {
    /// Created, not started.
    #[default]
    Pending,
    /// Sounding.
    Playing,
    /// Releasing after `stop`.
    Stopping,
    /// Fading out after `kill`.
    Killing,
    /// Silent; every voice finished or was disconnected.
    Finished,
}

/// Cap the layers of one key press at `cap`.
///
/// This reproduces a deliberate playback heuristic, not a SoundFont rule.
/// Only when there are more than `cap` layers:
///
/// 1. if any layer is shorter than `short_secs`, layers are stably sorted
///    by length, longest first;
/// 2. if a left and a right sample exist, the first of each is kept;
/// 3. otherwise the first `cap` layers are kept.
pub fn select_layers<'a>(
    mut layers: Vec<Layer<'a>>,
    cap: usize,
    short_secs: f32,
) -> Vec<Layer<'a>> {
    if layers.len() <= cap {
        return layers;
    }
    if layers.iter().any(|l| l.sample.duration_secs() < short_secs) {
        layers.sort_by(|a, b| b.sample.len().cmp(&a.sample.len()));
    }
    let first = |kind: SampleKind| layers.iter().position(|l| l.sample.kind == kind);
    if cap >= 2 {
        if let (Some(left), Some(right)) = (first(SampleKind::Left), first(SampleKind::Right)) {
            return vec![layers[left], layers[right]];
        }
    }
    layers.truncate(cap);
    layers
}

/// The voices of one key press.
#[derive(Debug)]
pub struct Note {
    key: u8,
    velocity: u8,
    voices: Vec<Voice>,
    state: NoteState,
    completion: Option<Completion>,
    disconnected: bool,
}

impl Note {
    /// Resolve and cap the layers of `preset_index` for this key and velocity.
    pub fn new(
        font: &SoundFont,
        preset_index: usize,
        key: u8,
        velocity: u8,
        config: &SynthConfig,
        vibrato: ChannelVibrato,
    ) -> Self {
        let layers = select_layers(
            font.layers(preset_index, key, velocity),
            config.sample_cap,
            config.short_sample_secs,
        );
        let voices = layers
            .iter()
            .map(|layer| {
                let params = VoiceParams::resolve(layer, key, velocity, config);
                Voice::new(
                    params,
                    Arc::clone(font.pcm()),
                    config.sample_rate as f32,
                    config.kill_fade_secs,
                    vibrato,
                )
            })
            .collect();
        Self {
            key,
            velocity,
            voices,
            state: NoteState::Pending,
            completion: None,
            disconnected: false,
        }
    }

    /// Start every voice and return the note's non-zero exclusive classes.
    ///
    /// The caller must silence other notes in those classes before this
    /// note renders.
    pub fn start(&mut self, controllers: &ControllerState) -> Vec<u8> {
        if self.state != NoteState::Pending {
            return Vec::new();
        }
        for voice in &mut self.voices {
            let p = voice.params();
            let ctx = ModulationContext::new(p.key, p.velocity, controllers);
            voice.start(&ctx);
        }
        self.state = if self.voices.is_empty() {
            NoteState::Finished
        } else {
            NoteState::Playing
        };
        trace!(key = self.key, voices = self.voices.len(), "note started");
        self.exclusive_classes()
    }

    /// Distinct non-zero exclusive classes of the voices.
    pub fn exclusive_classes(&self) -> Vec<u8> {
        let mut classes: Vec<u8> = self
            .voices
            .iter()
            .map(Voice::exclusive_class)
            .filter(|c| *c != 0)
            .collect();
        classes.sort_unstable();
        classes.dedup();
        classes
    }

    /// Apply a pitch-bend offset in semitones to every voice.
    pub fn bend(&mut self, semitones: f32) {
        for voice in &mut self.voices {
            voice.bend(semitones);
        }
    }

    /// Re-evaluate modulators against the channel's controllers.
    pub fn update(&mut self, controllers: &ControllerState) {
        for voice in &mut self.voices {
            let p = voice.params();
            let ctx = ModulationContext::new(p.key, p.velocity, controllers);
            voice.update(&ctx);
        }
    }

    /// Release every voice.
    ///
    /// Calling `stop` again, or after `kill`, returns the pending completion.
    pub fn stop(&mut self) -> Completion {
        if self.state == NoteState::Playing || self.state == NoteState::Pending {
            for voice in &mut self.voices {
                voice.release();
            }
            self.state = NoteState::Stopping;
        }
        self.pending_completion()
    }

    /// Fade every voice out over the kill time, cancelling any release.
    pub fn kill(&mut self) -> Completion {
        if matches!(
            self.state,
            NoteState::Pending | NoteState::Playing | NoteState::Stopping
        ) {
            for voice in &mut self.voices {
                voice.kill();
            }
            self.state = NoteState::Killing;
        }
        self.pending_completion()
    }

    fn pending_completion(&mut self) -> Completion {
        let completion = self.completion.get_or_insert_with(Completion::new).clone();
        if self.state == NoteState::Finished || self.voices.iter().all(Voice::is_finished) {
            self.finish();
        }
        completion
    }

    fn finish(&mut self) {
        self.state = NoteState::Finished;
        if let Some(completion) = &self.completion {
            completion.complete();
        }
    }

    /// Release every voice's PCM reference. Safe to call in any state.
    ///
    /// Returns the number of voices released by this call, so a second call
    /// returns 0.
    pub fn disconnect(&mut self) -> usize {
        let released = self
            .voices
            .iter_mut()
            .map(Voice::disconnect)
            .filter(|released| *released)
            .count();
        self.disconnected = true;
        self.finish();
        released
    }

    /// Add this note's output to `buffers`.
    pub fn render(&mut self, buffers: &mut RenderBuffers) {
        if matches!(self.state, NoteState::Pending | NoteState::Finished) {
            return;
        }
        for voice in &mut self.voices {
            let reverb_send = voice.reverb_send();
            let chorus_send = voice.chorus_send();
            for (left, right, reverb, chorus) in buffers.iter_mut() {
                let Some((l, r)) = voice.next_frame() else {
                    break;
                };
                *left += l;
                *right += r;
                let mono = 0.5 * (l + r);
                *reverb += mono * reverb_send;
                *chorus += mono * chorus_send;
            }
        }
        if self.voices.iter().all(Voice::is_finished) {
            self.finish();
        }
    }

    /// MIDI key.
    pub fn key(&self) -> u8 {
        self.key
    }

    /// Note-on velocity.
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Lifecycle state.
    pub fn state(&self) -> NoteState {
        self.state
    }

    /// Whether the note will produce no more output.
    pub fn is_finished(&self) -> bool {
        self.state == NoteState::Finished
    }

    /// Whether the note is releasing or fading out.
    pub fn is_releasing(&self) -> bool {
        matches!(self.state, NoteState::Stopping | NoteState::Killing)
    }

    /// Whether `disconnect` has been called.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Voices still producing output.
    pub fn voice_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_finished()).count()
    }

    /// The voices, for inspection.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundbank_sf2::GeneratorType;
    use soundbank_sf2::fixture::{FontBuilder, SampleSpec, ZoneSpec};

    fn poll_once(completion: &mut Completion) -> Poll<()> {
        let mut cx = Context::from_waker(Waker::noop());
        Pin::new(completion).poll(&mut cx)
    }

    fn sustained_font(release_tc: i16) -> SoundFont {
        let mut b = FontBuilder::new();
        let s = b.sample(SampleSpec::sine("s", 44100));
        let i = b.instrument(
            "i",
            vec![
                ZoneSpec::new()
                    .generator(GeneratorType::SampleModes, 1)
                    .generator(GeneratorType::ReleaseVolEnv, release_tc)
                    .sample(s),
            ],
        );
        b.preset("p", 0, 0, vec![ZoneSpec::new().instrument(i)]);
        SoundFont::from_bytes(&b.build()).unwrap()
    }

    fn config() -> SynthConfig {
        SynthConfig::default().with_sample_rate(44100)
    }

    fn started(font: &SoundFont) -> Note {
        let mut note = Note::new(font, 0, 60, 100, &config(), ChannelVibrato::default());
        note.start(&ControllerState::default());
        note
    }

    #[test]
    fn test_completion_future() {
        let mut completion = Completion::new();
        assert_eq!(poll_once(&mut completion), Poll::Pending);
        completion.clone().complete();
        assert!(completion.is_complete());
        assert_eq!(poll_once(&mut completion), Poll::Ready(()));
    }

    #[test]
    fn test_stop_resolves_after_release() {
        let font = sustained_font(-1200);
        let mut note = started(&font);
        let mut buffers = RenderBuffers::new(512);
        note.render(&mut buffers);
        let completion = note.stop();
        assert!(note.is_releasing());
        assert!(!completion.is_complete());

        // 0.5 s release at 44.1 kHz.
        for _ in 0..40 {
            buffers.clear();
            note.render(&mut buffers);
        }
        assert!(!completion.is_complete());
        for _ in 0..10 {
            buffers.clear();
            note.render(&mut buffers);
        }
        assert!(completion.is_complete());
        assert!(note.is_finished());
    }

    #[test]
    fn test_kill_reuses_stop_completion() {
        let font = sustained_font(2400);
        let mut note = started(&font);
        let mut buffers = RenderBuffers::new(512);
        note.render(&mut buffers);
        let stop = note.stop();
        let kill = note.kill();
        assert_eq!(note.state(), NoteState::Killing);
        // 0.2 s kill fade is 8820 frames.
        for _ in 0..18 {
            buffers.clear();
            note.render(&mut buffers);
        }
        assert!(stop.is_complete() && kill.is_complete());
    }

    #[test]
    fn test_disconnect_twice() {
        let font = sustained_font(0);
        let mut note = started(&font);
        let completion = note.stop();
        assert_eq!(note.disconnect(), 1);
        assert_eq!(note.disconnect(), 0);
        assert!(completion.is_complete());
        assert_eq!(note.voice_count(), 0);
    }

    #[test]
    fn test_disconnect_before_start() {
        let font = sustained_font(0);
        let mut note = Note::new(&font, 0, 60, 100, &config(), ChannelVibrato::default());
        assert_eq!(note.disconnect(), 1);
        assert!(note.is_finished());
        assert!(note.start(&ControllerState::default()).is_empty());
    }

    #[test]
    fn test_note_without_layers_is_finished() {
        let mut b = FontBuilder::new();
        let s = b.sample(SampleSpec::sine("s", 200));
        let i = b.instrument("i", vec![ZoneSpec::new().keys(0, 10).sample(s)]);
        b.preset("p", 0, 0, vec![ZoneSpec::new().instrument(i)]);
        let font = SoundFont::from_bytes(&b.build()).unwrap();
        let note = started(&font);
        assert!(note.is_finished());
        assert_eq!(note.voice_count(), 0);
    }

    #[test]
    fn test_bend_reaches_voices() {
        let font = sustained_font(0);
        let mut note = started(&font);
        note.bend(12.0);
        let mut buffers = RenderBuffers::new(1);
        note.render(&mut buffers);
        assert!((note.voices()[0].playback_rate() - 2.0).abs() < 1e-5);
    }
}
