use crate::audio_data::AudioData;
use crate::error::Result;

/// Turns a media URL into decoded audio.
///
/// Loaders run on a media element's worker thread, so they must be `Send + Sync`.
/// PetalWave ships [`DefaultMediaLoader`](super::DefaultMediaLoader); implement this
/// trait to plug in other fetchers or decoders.
///
/// # Example
///
/// ```ignore
/// use petalwave::audio_data::{AudioData, MediaLoader};
/// use petalwave::error::Result;
///
/// struct Silence;
///
/// impl MediaLoader for Silence {
///     fn load(&self, _url: &str) -> Result<AudioData> {
///         AudioData::new(vec![0.0; 48000], 48000, 1)
///     }
/// }
/// ```
pub trait MediaLoader: Send + Sync {
    /// Fetches and decodes `url`. Blocking is fine: this never runs on the caller's thread.
    fn load(&self, url: &str) -> Result<AudioData>;
}
