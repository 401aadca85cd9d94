//! Sample headers linked against the shared PCM blob.

use core::ops::Range;

use tracing::warn;

use crate::hydra::SampleHeader;

/// Channel role of a sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SampleKind {
    /// Standalone mono sample.
    #[default]
    Mono,
    /// Right half of a stereo pair.
    Right,
    /// Left half of a stereo pair.
    Left,
    /// Member of a linked chain.
    Linked,
}

impl SampleKind {
    /// Decode the `sfSampleType` flags. The ROM bit is ignored.
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw & 0x7FFF {
            1 => Some(SampleKind::Mono),
            2 => Some(SampleKind::Right),
            4 => Some(SampleKind::Left),
            8 => Some(SampleKind::Linked),
            _ => None,
        }
    }

    /// Encode as `sfSampleType` flags.
    pub const fn to_raw(self) -> u16 {
        match self {
            SampleKind::Mono => 1,
            SampleKind::Right => 2,
            SampleKind::Left => 4,
            SampleKind::Linked => 8,
        }
    }
}

/// A sample: an index range into the font's PCM blob plus playback metadata.
///
/// All addresses are absolute sample-point indices into [`SoundFont::pcm`](crate::SoundFont::pcm).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Sample name.
    pub name: String,
    /// First sample point.
    pub start: usize,
    /// One past the last sample point.
    pub end: usize,
    /// First point of the loop.
    pub loop_start: usize,
    /// One past the last loop point.
    pub loop_end: usize,
    /// Recording rate in Hz.
    pub sample_rate: u32,
    /// MIDI key the sample plays back unaltered at.
    pub original_pitch: u8,
    /// Pitch correction in cents.
    pub pitch_correction: i8,
    /// Channel role.
    pub kind: SampleKind,
    /// Index of the linked sample in the font's sample table.
    pub link: Option<usize>,
}

impl Sample {
    /// Link a decoded header against a PCM blob of `pcm_len` points and a
    /// sample table of `sample_count` entries.
    ///
    /// Defects are tolerated: addresses are clamped to the blob, an unknown
    /// type becomes mono, a dangling stereo link is dropped.
    pub fn from_header(header: &SampleHeader, pcm_len: usize, sample_count: usize) -> Self {
        let mut end = header.end as usize;
        if end > pcm_len {
            warn!(
                sample = %header.name,
                end,
                pcm_len,
                "sample extends past the PCM data, truncating"
            );
            end = pcm_len;
        }
        let start = (header.start as usize).min(end);

        let kind = SampleKind::from_raw(header.sample_type).unwrap_or_else(|| {
            warn!(
                sample = %header.name,
                sample_type = header.sample_type,
                "unknown sample type, treating as mono"
            );
            SampleKind::Mono
        });
        if header.sample_type & 0x8000 != 0 {
            warn!(sample = %header.name, "ROM sample referenced, playing from the PCM blob");
        }

        let link = match kind {
            SampleKind::Mono => None,
            _ if (header.sample_link as usize) < sample_count => Some(header.sample_link as usize),
            _ => {
                warn!(
                    sample = %header.name,
                    link = header.sample_link,
                    "stereo link points outside the sample table"
                );
                None
            }
        };

        let sample_rate = if header.sample_rate == 0 {
            warn!(sample = %header.name, "sample rate of zero, assuming 44100 Hz");
            44_100
        } else {
            header.sample_rate
        };

        Self {
            name: header.name.clone(),
            start,
            end,
            loop_start: header.loop_start as usize,
            loop_end: header.loop_end as usize,
            sample_rate,
            original_pitch: header.original_pitch,
            pitch_correction: header.pitch_correction,
            kind,
            link,
        }
    }

    /// Number of sample points.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the sample holds no points.
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Absolute sample-point range in the PCM blob.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// The loop, if it is well formed (`start <= loop_start < loop_end <= end`).
    pub fn loop_range(&self) -> Option<Range<usize>> {
        (self.start <= self.loop_start
            && self.loop_start < self.loop_end
            && self.loop_end <= self.end)
            .then_some(self.loop_start..self.loop_end)
    }

    /// Length in seconds at the recorded rate.
    pub fn duration_secs(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }
}
