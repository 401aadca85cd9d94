//! Configuration for the soundbank synthesizer.
//!
//! [`SynthConfig`] collects the engine constants that are not part of a
//! SoundFont: output rate, channel layout, loudness law, layer capping,
//! fade and release limits and the global voice budget. It loads from and
//! saves to TOML and validates itself on load.
//!
//! # Example
//!
//! ```rust
//! use soundbank_config::SynthConfig;
//!
//! let config = SynthConfig::from_toml("sample_rate = 44100").unwrap();
//! assert_eq!(config.sample_rate, 44100);
//! assert_eq!(config.channel_count, 16);
//! ```

mod error;
mod synth_config;

pub use error::ConfigError;
pub use synth_config::SynthConfig;
