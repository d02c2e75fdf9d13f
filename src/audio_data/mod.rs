mod default_loader;
mod loader;
mod resampler;

use crate::error::{PetalWaveError, Result};
pub use default_loader::DefaultMediaLoader;
pub use loader::MediaLoader;
pub use resampler::AudioResampler;
use std::sync::Arc;
use std::time::Duration;

/// Container for decoded audio with reference-counted sharing.
///
/// Samples are stored **interleaved**: stereo is `[L0, R0, L1, R1, ...]`.
#[derive(Debug, Clone)]
pub struct AudioData {
    inner: Arc<AudioDataInner>,
}

#[derive(Debug)]
struct AudioDataInner {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    duration: Duration,
    total_frames: usize,
}

impl AudioData {
    /// Wraps interleaved samples. A trailing partial frame is dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(PetalWaveError::AudioFormat(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(PetalWaveError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        let total_frames = samples.len() / channels as usize;
        samples.truncate(total_frames * channels as usize);
        let duration = Duration::from_secs_f64(total_frames as f64 / sample_rate as f64);

        Ok(Self {
            inner: Arc::new(AudioDataInner {
                samples,
                sample_rate,
                channels,
                duration,
                total_frames,
            }),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    pub fn duration_secs(&self) -> f64 {
        self.inner.total_frames as f64 / self.inner.sample_rate as f64
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.samples.len()
    }

    /// Interleaved samples of one frame, or `None` past the end.
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let channels = self.inner.channels as usize;
        let start = index.checked_mul(channels)?;
        let end = start.checked_add(channels)?;
        self.inner.samples.get(start..end)
    }

    /// Resample to a different sample rate using rubato.
    ///
    /// The result holds exactly `round(total_frames * target / source)` frames.
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.inner.sample_rate {
            return Ok(self.clone());
        }

        let resampler = AudioResampler::new(
            self.inner.sample_rate,
            target_sample_rate,
            self.inner.channels,
            Some(1024),
        )?;

        let expected_frames =
            (self.inner.total_frames as f64 * resampler.resample_ratio()).round() as usize;
        let mut resampled = resampler.resample_interleaved(&self.inner.samples)?;
        resampled.resize(expected_frames * self.inner.channels as usize, 0.0);

        Self::new(resampled, target_sample_rate, self.inner.channels)
    }
}
