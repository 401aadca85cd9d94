//! Synthesizer engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Engine settings shared by every channel of a synthesizer.
///
/// All fields have defaults, so a TOML file only needs the ones it changes.
/// Optional settings are switched off with `false`.
///
/// # TOML Format
///
/// ```toml
/// sample_rate = 44100
/// channel_count = 16
/// percussion_channel = 9
/// channel_loudness = 0.3
/// max_voices = 128        # or `false` for no limit
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthConfig {
    /// Output rate in Hz.
    pub sample_rate: u32,

    /// Number of MIDI channels.
    pub channel_count: usize,

    /// Zero-based channel that plays from the percussion bank.
    #[serde(with = "switch")]
    pub percussion_channel: Option<u8>,

    /// Base loudness in the channel gain law `loudness * volume² * expression²`.
    pub channel_loudness: f32,

    /// Most sample layers a single note may start.
    pub sample_cap: usize,

    /// Layers shorter than this (in seconds) trigger length-ordered capping.
    pub short_sample_secs: f32,

    /// Duration of the fast fade used when a note is killed.
    pub kill_fade_secs: f32,

    /// Upper bound on any voice's release time in seconds.
    pub max_release_secs: f32,

    /// Scale applied to centibel attenuation before conversion to gain.
    pub attenuation_correction: f32,

    /// Global voice budget.
    #[serde(with = "switch")]
    pub max_voices: Option<usize>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channel_count: 16,
            percussion_channel: Some(9),
            channel_loudness: 0.3,
            sample_cap: 2,
            short_sample_secs: 0.15,
            kill_fade_secs: 0.2,
            max_release_secs: 5.0,
            attenuation_correction: 0.4,
            max_voices: Some(256),
        }
    }
}

impl SynthConfig {
    /// Set the output rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the global voice budget.
    pub fn with_max_voices(mut self, max_voices: Option<usize>) -> Self {
        self.max_voices = max_voices;
        self
    }

    /// Set the percussion channel.
    pub fn with_percussion_channel(mut self, channel: Option<u8>) -> Self {
        self.percussion_channel = channel;
        self
    }

    /// Load and validate a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: SynthConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check that every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(ConfigError::invalid(
                "sample_rate",
                format!("must be within 8000..=192000, got {}", self.sample_rate),
            ));
        }
        if !(1..=64).contains(&self.channel_count) {
            return Err(ConfigError::invalid(
                "channel_count",
                format!("must be within 1..=64, got {}", self.channel_count),
            ));
        }
        if let Some(ch) = self.percussion_channel
            && usize::from(ch) >= self.channel_count
        {
            return Err(ConfigError::invalid(
                "percussion_channel",
                format!("channel {ch} does not exist ({} channels)", self.channel_count),
            ));
        }
        if self.sample_cap == 0 {
            return Err(ConfigError::invalid("sample_cap", "must be at least 1"));
        }
        if self.max_voices == Some(0) {
            return Err(ConfigError::invalid(
                "max_voices",
                "must be at least 1 (use `false` for no limit)",
            ));
        }
        if let Some(max) = self.max_voices
            && max < self.sample_cap
        {
            return Err(ConfigError::invalid(
                "max_voices",
                format!("must be at least sample_cap ({}), got {max}", self.sample_cap),
            ));
        }
        non_negative("channel_loudness", self.channel_loudness)?;
        non_negative("short_sample_secs", self.short_sample_secs)?;
        non_negative("attenuation_correction", self.attenuation_correction)?;
        positive("kill_fade_secs", self.kill_fade_secs)?;
        positive("max_release_secs", self.max_release_secs)?;
        Ok(())
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be a finite value >= 0, got {value}"),
        ))
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be a finite value > 0, got {value}"),
        ))
    }
}

/// Serde adapter for optional settings: a value, or `false` for off.
mod switch {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr<T> {
        On(T),
        Off(bool),
    }

    pub fn serialize<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize + Copy,
    {
        match value {
            Some(v) => Repr::On(*v).serialize(serializer),
            None => Repr::<T>::Off(false).serialize(serializer),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        match Repr::<T>::deserialize(deserializer)? {
            Repr::On(v) => Ok(Some(v)),
            Repr::Off(false) => Ok(None),
            Repr::Off(true) => Err(D::Error::custom("expected a value or `false`")),
        }
    }
}
