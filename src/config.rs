//! Configuration for PetalWave contexts and controllers

use crate::audio_data::MediaLoader;
use crate::context::AudioContext;
use std::fmt;
use std::sync::Arc;

/// Configuration descriptor for a real-time audio context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioContextDesc {
    /// Sample rate of the processing graph. Media is resampled to this rate on load.
    pub sample_rate: u32,
    /// Number of output channels (typically 2 for stereo)
    pub channels: u16,
    /// Frames requested from the device per callback
    pub block_size: usize,
}

impl Default for AudioContextDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            block_size: 1024,
        }
    }
}

impl AudioContextDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        if self.sample_rate == 0 {
            return Err(crate::error::PetalWaveError::Configuration(
                "Sample rate must be greater than 0".into(),
            ));
        }
        if self.channels == 0 {
            return Err(crate::error::PetalWaveError::Configuration(
                "Channel count must be greater than 0".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(crate::error::PetalWaveError::Configuration(
                "Block size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Whether the element being decoded is also heard while it renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePreview {
    /// Render to samples only
    #[default]
    Silent,
    /// Play the element through the controller's gain chain while rendering
    Audible,
}

/// Configuration passed to [`AudioController::init`](crate::AudioController::init)
#[derive(Clone, Default)]
pub struct ControllerDesc {
    /// Externally owned context. When `None`, the engine's shared context is used.
    pub audio_context: Option<AudioContext>,
    pub decode_preview: DecodePreview,
    /// Loader for media elements. When `None`, [`DefaultMediaLoader`](crate::audio_data::DefaultMediaLoader) is used.
    pub loader: Option<Arc<dyn MediaLoader>>,
}

impl ControllerDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audio_context(mut self, context: AudioContext) -> Self {
        self.audio_context = Some(context);
        self
    }

    pub fn decode_preview(mut self, preview: DecodePreview) -> Self {
        self.decode_preview = preview;
        self
    }

    pub fn loader(mut self, loader: Arc<dyn MediaLoader>) -> Self {
        self.loader = Some(loader);
        self
    }
}

impl fmt::Debug for ControllerDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerDesc")
            .field("audio_context", &self.audio_context)
            .field("decode_preview", &self.decode_preview)
            .field("custom_loader", &self.loader.is_some())
            .finish()
    }
}
