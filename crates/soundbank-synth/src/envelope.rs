//! DAHDSR volume envelope for sample voices.
//!
//! Phases run `Delay -> Attack -> Hold -> Decay -> Sustain -> Release -> Finished`.
//! Every timed phase is a linear ramp on a normalized level, so a phase
//! configured for `t` seconds takes exactly `t * sample_rate` samples.
//! Release and kill start from whatever level the envelope has reached.

/// Volume envelope states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopeState {
    /// Not started yet; output is zero.
    #[default]
    Idle,
    /// Silent wait before the attack.
    Delay,
    /// Level ramps from zero to one.
    Attack,
    /// Level holds at one.
    Hold,
    /// Level ramps from one to the sustain level.
    Decay,
    /// Level holds at the sustain level until released.
    Sustain,
    /// Level ramps to zero.
    Release,
    /// Terminal; output is zero.
    Finished,
}

/// Phase durations in seconds plus the sustain level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopeTimes {
    /// Delay before the attack.
    pub delay: f32,
    /// Attack duration.
    pub attack: f32,
    /// Hold duration.
    pub hold: f32,
    /// Time to fall from full level to the sustain level.
    pub decay: f32,
    /// Sustain level in `0.0..=1.0`.
    pub sustain_level: f32,
}

impl Default for EnvelopeTimes {
    fn default() -> Self {
        Self {
            delay: 0.0,
            attack: 0.0,
            hold: 0.0,
            decay: 0.0,
            sustain_level: 1.0,
        }
    }
}

/// Linear DAHDSR envelope.
///
/// # Example
///
/// ```rust
/// use soundbank_synth::{EnvelopeState, EnvelopeTimes, VolumeEnvelope};
///
/// let mut env = VolumeEnvelope::new(48000.0);
/// env.start(EnvelopeTimes { attack: 0.01, sustain_level: 0.5, decay: 0.1, ..Default::default() });
/// for _ in 0..480 {
///     env.advance();
/// }
/// assert_eq!(env.state(), EnvelopeState::Hold);
///
/// env.release(0.2);
/// assert_eq!(env.state(), EnvelopeState::Release);
/// ```
#[derive(Debug, Clone)]
pub struct VolumeEnvelope {
    state: EnvelopeState,
    level: f32,
    sample_rate: f32,
    times: EnvelopeTimes,
    /// Samples left in the current timed phase.
    remaining: u32,
    /// Level change per sample in the current ramp.
    step: f32,
}

impl Default for VolumeEnvelope {
    fn default() -> Self {
        Self::new(48000.0)
    }
}

impl VolumeEnvelope {
    /// Create an idle envelope.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            state: EnvelopeState::Idle,
            level: 0.0,
            sample_rate,
            times: EnvelopeTimes::default(),
            remaining: 0,
            step: 0.0,
        }
    }

    /// Start from the delay phase with the given times.
    pub fn start(&mut self, times: EnvelopeTimes) {
        self.times = EnvelopeTimes {
            sustain_level: times.sustain_level.clamp(0.0, 1.0),
            ..times
        };
        self.level = 0.0;
        self.enter(EnvelopeState::Delay);
    }

    /// Begin a release of `seconds` from the current level.
    ///
    /// No effect once finished. Releasing before the start finishes at once.
    pub fn release(&mut self, seconds: f32) {
        match self.state {
            EnvelopeState::Finished => {}
            EnvelopeState::Idle => self.finish(),
            _ => {
                let samples = self.samples(seconds);
                if samples == 0 || self.level <= 0.0 {
                    self.finish();
                } else {
                    self.state = EnvelopeState::Release;
                    self.remaining = samples;
                    self.step = -self.level / samples as f32;
                }
            }
        }
    }

    /// Jump straight to `Finished`.
    pub fn finish(&mut self) {
        self.state = EnvelopeState::Finished;
        self.level = 0.0;
        self.remaining = 0;
        self.step = 0.0;
    }

    /// Current state.
    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Current level without advancing.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Configured sustain level.
    pub fn sustain_level(&self) -> f32 {
        self.times.sustain_level
    }

    /// Whether the envelope has started and not finished.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, EnvelopeState::Idle | EnvelopeState::Finished)
    }

    /// Whether the envelope reached its terminal state.
    pub fn is_finished(&self) -> bool {
        self.state == EnvelopeState::Finished
    }

    /// Seconds until a release in progress reaches zero.
    pub fn remaining_release_secs(&self) -> f32 {
        if self.state == EnvelopeState::Release {
            self.remaining as f32 / self.sample_rate
        } else {
            0.0
        }
    }

    /// Advance by one sample and return the level.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        match self.state {
            EnvelopeState::Idle | EnvelopeState::Finished | EnvelopeState::Sustain => {}
            EnvelopeState::Delay | EnvelopeState::Hold => self.tick(),
            EnvelopeState::Attack | EnvelopeState::Decay | EnvelopeState::Release => {
                self.level = (self.level + self.step).clamp(0.0, 1.0);
                self.tick();
            }
        }
        self.level
    }

    fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.enter(self.next_state());
        }
    }

    fn next_state(&self) -> EnvelopeState {
        match self.state {
            EnvelopeState::Delay => EnvelopeState::Attack,
            EnvelopeState::Attack => EnvelopeState::Hold,
            EnvelopeState::Hold => EnvelopeState::Decay,
            EnvelopeState::Decay => EnvelopeState::Sustain,
            _ => EnvelopeState::Finished,
        }
    }

    /// Enter `state`, skipping zero-length phases.
    fn enter(&mut self, mut state: EnvelopeState) {
        loop {
            let (seconds, target) = match state {
                EnvelopeState::Delay => (self.times.delay, 0.0),
                EnvelopeState::Attack => (self.times.attack, 1.0),
                EnvelopeState::Hold => (self.times.hold, 1.0),
                EnvelopeState::Decay => (self.times.decay, self.times.sustain_level),
                EnvelopeState::Sustain => {
                    self.level = self.times.sustain_level;
                    if self.level <= 0.0 {
                        self.finish();
                    } else {
                        self.state = EnvelopeState::Sustain;
                    }
                    return;
                }
                _ => {
                    self.finish();
                    return;
                }
            };
            // Decay covers the full 1 -> 0 range in `decay` seconds; reaching
            // the sustain level takes the matching fraction of it.
            let seconds = if state == EnvelopeState::Decay {
                seconds * (1.0 - self.times.sustain_level)
            } else {
                seconds
            };
            let samples = self.samples(seconds);
            if samples == 0 {
                self.level = target;
                self.state = state;
                state = self.next_state();
                continue;
            }
            self.state = state;
            self.remaining = samples;
            self.step = (target - self.level) / samples as f32;
            return;
        }
    }

    fn samples(&self, seconds: f32) -> u32 {
        let n = seconds * self.sample_rate;
        if n.is_finite() && n > 0.0 {
            n.round() as u32
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 1000.0;

    fn run(env: &mut VolumeEnvelope, n: usize) {
        for _ in 0..n {
            env.advance();
        }
    }

    #[test]
    fn test_idle_until_started() {
        let mut env = VolumeEnvelope::new(SR);
        assert_eq!(env.state(), EnvelopeState::Idle);
        for _ in 0..100 {
            assert_eq!(env.advance(), 0.0);
        }
    }

    #[test]
    fn test_phase_durations_are_exact() {
        let mut env = VolumeEnvelope::new(SR);
        env.start(EnvelopeTimes {
            delay: 0.01,
            attack: 0.02,
            hold: 0.03,
            decay: 0.1,
            sustain_level: 0.5,
        });
        assert_eq!(env.state(), EnvelopeState::Delay);
        run(&mut env, 10);
        assert_eq!(env.state(), EnvelopeState::Attack);
        run(&mut env, 10);
        assert!((env.level() - 0.5).abs() < 1e-5, "mid-attack got {}", env.level());
        run(&mut env, 10);
        assert_eq!(env.state(), EnvelopeState::Hold);
        assert!((env.level() - 1.0).abs() < 1e-5);
        run(&mut env, 30);
        assert_eq!(env.state(), EnvelopeState::Decay);
        // Half of the 0.1 s full-range decay reaches 0.5.
        run(&mut env, 50);
        assert_eq!(env.state(), EnvelopeState::Sustain);
        assert!((env.level() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_sustain_holds_until_release() {
        let mut env = VolumeEnvelope::new(SR);
        env.start(EnvelopeTimes {
            sustain_level: 0.7,
            ..Default::default()
        });
        assert_eq!(env.state(), EnvelopeState::Sustain);
        run(&mut env, 5000);
        assert_eq!(env.level(), 0.7);
    }

    #[test]
    fn test_release_from_attack_is_continuous() {
        let mut env = VolumeEnvelope::new(SR);
        env.start(EnvelopeTimes {
            attack: 0.1,
            ..Default::default()
        });
        run(&mut env, 25);
        let before = env.level();
        env.release(0.05);
        assert_eq!(env.state(), EnvelopeState::Release);
        assert_eq!(env.level(), before);
        assert!((env.remaining_release_secs() - 0.05).abs() < 1e-6);

        let next = env.advance();
        assert!(next < before && before - next < 0.01, "jump {before} -> {next}");
        run(&mut env, 49);
        assert!(env.is_finished());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn test_release_before_start_finishes() {
        let mut env = VolumeEnvelope::new(SR);
        env.release(1.0);
        assert!(env.is_finished());
    }

    #[test]
    fn test_zero_sustain_finishes_after_decay() {
        let mut env = VolumeEnvelope::new(SR);
        env.start(EnvelopeTimes {
            decay: 0.02,
            sustain_level: 0.0,
            ..Default::default()
        });
        assert_eq!(env.state(), EnvelopeState::Decay);
        run(&mut env, 20);
        assert!(env.is_finished());
    }

    #[test]
    fn test_output_range() {
        let mut env = VolumeEnvelope::new(SR);
        env.start(EnvelopeTimes {
            delay: 0.005,
            attack: 0.013,
            hold: 0.002,
            decay: 0.07,
            sustain_level: 0.3,
        });
        for _ in 0..200 {
            let level = env.advance();
            assert!((0.0..=1.0).contains(&level), "level out of range: {level}");
        }
        env.release(0.033);
        for _ in 0..100 {
            let level = env.advance();
            assert!((0.0..=1.0).contains(&level), "level out of range: {level}");
        }
        assert!(env.is_finished());
    }
}
