use crate::error::{PetalWaveError, Result};
use rubato::{FftFixedIn, Resampler};

/// Offline sample-rate converter for whole buffers.
pub struct AudioResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl AudioResampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(PetalWaveError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        if channels == 0 {
            return Err(PetalWaveError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024).max(1),
        })
    }

    /// Resample one channel to exactly `round(len * ratio)` frames.
    ///
    /// The resampler's output delay is skipped and the input is followed by
    /// zero chunks until the tail has been flushed.
    pub fn resample_channel(&self, channel_samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(channel_samples.to_vec());
        }
        if channel_samples.is_empty() {
            return Ok(Vec::new());
        }

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2, // sub_chunks
            1,
        )
        .map_err(|e| PetalWaveError::AudioLoading(format!("Failed to create resampler: {}", e)))?;

        let delay = resampler.output_delay();
        let expected = (channel_samples.len() as f64 * self.resample_ratio()).round() as usize;
        let needed = delay + expected;

        let mut output = Vec::with_capacity(needed + resampler.output_frames_max());
        let mut chunks = channel_samples.chunks(self.chunk_size);

        while output.len() < needed {
            let mut input_chunk = vec![0.0f32; self.chunk_size];
            if let Some(chunk) = chunks.next() {
                input_chunk[..chunk.len()].copy_from_slice(chunk);
            }

            let waves_in = vec![input_chunk];
            let waves_out = resampler
                .process(&waves_in, None)
                .map_err(|e| PetalWaveError::AudioLoading(format!("Resampling error: {}", e)))?;

            match waves_out.first() {
                Some(first_channel) if !first_channel.is_empty() => {
                    output.extend_from_slice(first_channel)
                }
                _ => break,
            }
        }

        output.drain(..delay.min(output.len()));
        output.resize(expected, 0.0);
        Ok(output)
    }

    pub fn resample_interleaved(&self, interleaved_samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(interleaved_samples.to_vec());
        }

        let channels = self.channels as usize;
        let resampled_channels = (0..channels)
            .map(|ch| {
                let channel_data: Vec<f32> = interleaved_samples
                    .chunks(channels)
                    .map(|frame| frame.get(ch).copied().unwrap_or(0.0))
                    .collect();
                self.resample_channel(&channel_data)
            })
            .collect::<Result<Vec<_>>>()?;

        let new_frames = resampled_channels
            .iter()
            .map(Vec::len)
            .min()
            .unwrap_or(0);

        let mut interleaved = Vec::with_capacity(new_frames * channels);
        for frame_idx in 0..new_frames {
            for channel in &resampled_channels {
                interleaved.push(channel[frame_idx]);
            }
        }

        Ok(interleaved)
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampler_creation() {
        let resampler = AudioResampler::new(44100, 48000, 2, None).unwrap();
        assert_eq!(resampler.source_sample_rate(), 44100);
        assert_eq!(resampler.target_sample_rate(), 48000);
    }

    #[test]
    fn test_resampler_no_resampling_needed() {
        let resampler = AudioResampler::new(44100, 44100, 1, None).unwrap();
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resampler.resample_channel(&samples).unwrap(), samples);
    }

    #[test]
    fn test_invalid_sample_rates() {
        assert!(AudioResampler::new(0, 48000, 2, None).is_err());
        assert!(AudioResampler::new(44100, 0, 2, None).is_err());
        assert!(AudioResampler::new(44100, 48000, 0, None).is_err());
    }

    #[test]
    fn test_upsample_keeps_frames_whole() {
        let resampler = AudioResampler::new(24000, 48000, 2, Some(512)).unwrap();
        let input = vec![0.0f32; 2400 * 2];
        let output = resampler.resample_interleaved(&input).unwrap();
        assert!(!output.is_empty());
        assert_eq!(output.len() % 2, 0);
    }

    fn impulse(len: usize, at: usize) -> Vec<f32> {
        let mut samples = vec![0.0f32; len];
        samples[at] = 1.0;
        samples
    }

    fn peak_index(samples: &[f32]) -> usize {
        samples
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_output_is_exact_length() {
        let resampler = AudioResampler::new(22050, 44100, 1, Some(1024)).unwrap();
        let output = resampler.resample_channel(&vec![0.0f32; 1500]).unwrap();
        assert_eq!(output.len(), 3000);

        let resampler = AudioResampler::new(44100, 22050, 1, Some(1024)).unwrap();
        let output = resampler.resample_channel(&vec![0.0f32; 1501]).unwrap();
        assert_eq!(output.len(), 751);
    }

    #[test]
    fn test_onset_is_not_delayed() {
        let resampler = AudioResampler::new(22050, 44100, 1, Some(1024)).unwrap();
        let output = resampler.resample_channel(&impulse(22050, 0)).unwrap();
        assert_eq!(output.len(), 44100);
        assert!(peak_index(&output) <= 2, "peak at {}", peak_index(&output));
        assert!(output[0].abs() > 0.5);
    }

    #[test]
    fn test_tail_is_kept() {
        let resampler = AudioResampler::new(22050, 44100, 1, Some(1024)).unwrap();
        let output = resampler.resample_channel(&impulse(22050, 22049)).unwrap();
        assert_eq!(output.len(), 44100);
        let peak = peak_index(&output);
        assert!((44096..44100).contains(&peak), "peak at {}", peak);
        assert!(output[peak].abs() > 0.5);
    }

    #[test]
    fn test_interleaved_channels_stay_aligned() {
        let resampler = AudioResampler::new(8000, 16000, 2, Some(256)).unwrap();
        let mut input = vec![0.0f32; 1000 * 2];
        input[2 * 300] = 1.0;
        input[2 * 300 + 1] = -1.0;
        let output = resampler.resample_interleaved(&input).unwrap();
        assert_eq!(output.len(), 2000 * 2);

        let left: Vec<f32> = output.iter().step_by(2).copied().collect();
        let right: Vec<f32> = output.iter().skip(1).step_by(2).copied().collect();
        let peak = peak_index(&left);
        assert!((598..=602).contains(&peak), "peak at {}", peak);
        assert_eq!(peak_index(&right), peak);
    }
}
