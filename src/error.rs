//! Error types for PetalWave

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PetalWaveError {
    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to load {url}: {reason}")]
    LoadFailed { url: String, reason: String },

    #[error("No media source is attached")]
    NoSource,

    #[error("No {0} is pending")]
    NothingPending(&'static str),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PetalWaveError {
    /// Whether the error comes from the asynchronous load/render paths rather
    /// than from a synchronous call.
    pub fn is_async_failure(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::LoadFailed { .. } | Self::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, PetalWaveError>;
