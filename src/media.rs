//! Media elements: playable resources that load in the background and signal
//! when they can play.

use crate::audio_data::{AudioData, MediaLoader};
use crate::error::{PetalWaveError, Result};
use crate::graph::NodeId;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

/// Cooperative cancellation flag for a pending load or render.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub(crate) struct ElementShared {
    pub(crate) id: NodeId,
    pub(crate) url: String,
    pub(crate) sample_rate: u32,
    pub(crate) data: OnceLock<AudioData>,
    pub(crate) frame: AtomicUsize,
    pub(crate) paused: AtomicBool,
    pub(crate) ended: AtomicBool,
}

/// A playable resource identified by a URL.
///
/// Elements never autoplay. Until the element has loaded, it has no duration,
/// reports position 0 and plays nothing. Audio is held at the sample rate of
/// the context that requested it.
#[derive(Clone)]
pub struct MediaElement {
    shared: Arc<ElementShared>,
}

impl MediaElement {
    fn new(url: &str, sample_rate: u32) -> Self {
        Self {
            shared: Arc::new(ElementShared {
                id: NodeId::new(),
                url: url.to_string(),
                sample_rate,
                data: OnceLock::new(),
                frame: AtomicUsize::new(0),
                paused: AtomicBool::new(true),
                ended: AtomicBool::new(false),
            }),
        }
    }

    /// An element that is playable immediately.
    pub fn from_audio(url: &str, audio: AudioData) -> Self {
        let element = Self::new(url, audio.sample_rate());
        let _ = element.shared.data.set(audio);
        element
    }

    /// Start loading `url` on a worker thread.
    ///
    /// `on_settled` runs on the worker once the element is playable (`Ok`) or
    /// has failed. It is skipped entirely when `token` is cancelled first.
    pub(crate) fn spawn_load<F>(
        url: &str,
        sample_rate: u32,
        loader: Arc<dyn MediaLoader>,
        token: CancelToken,
        on_settled: F,
    ) -> Result<Self>
    where
        F: FnOnce(&MediaElement, Result<()>) + Send + 'static,
    {
        let element = Self::new(url, sample_rate);
        let worker = element.clone();

        thread::Builder::new()
            .name("petalwave-media".into())
            .spawn(move || {
                let result = loader
                    .load(&worker.shared.url)
                    .and_then(|audio| audio.resample(worker.shared.sample_rate));

                if token.is_cancelled() {
                    log::debug!("Load of {} cancelled", worker.shared.url);
                    return;
                }

                let settled = result.map(|audio| {
                    let _ = worker.shared.data.set(audio);
                });
                if let Err(e) = &settled {
                    log::warn!("Media element {} failed to load: {}", worker.shared.url, e);
                }
                on_settled(&worker, settled);
            })
            .map_err(|e| PetalWaveError::Engine(format!("Failed to spawn loader thread: {}", e)))?;

        Ok(element)
    }

    pub(crate) fn shared(&self) -> &ElementShared {
        &self.shared
    }

    pub fn id(&self) -> NodeId {
        self.shared.id
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// Whether the element has loaded and can play.
    pub fn is_ready(&self) -> bool {
        self.shared.data.get().is_some()
    }

    pub fn audio(&self) -> Option<&AudioData> {
        self.shared.data.get()
    }

    /// Duration in seconds, `None` until loaded.
    pub fn duration(&self) -> Option<f64> {
        self.audio().map(AudioData::duration_secs)
    }

    /// Playback position in seconds.
    pub fn current_time(&self) -> f64 {
        self.shared.frame.load(Ordering::Acquire) as f64 / self.shared.sample_rate as f64
    }

    /// Seek. Negative or NaN positions land at 0. Once loaded, positions past
    /// the end land at the end and the element ends on the next block.
    pub fn set_current_time(&self, seconds: f64) {
        let frame = (seconds * self.shared.sample_rate as f64) as usize;
        let frame = self
            .shared
            .data
            .get()
            .map_or(frame, |audio| frame.min(audio.total_frames()));
        self.shared.frame.store(frame, Ordering::Release);
        self.shared.ended.store(false, Ordering::Release);
    }

    pub fn play(&self) {
        if self.shared.ended.swap(false, Ordering::AcqRel) {
            self.shared.frame.store(0, Ordering::Release);
        }
        self.shared.paused.store(false, Ordering::Release);
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    pub fn paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn ended(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
    }
}

impl fmt::Debug for MediaElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaElement")
            .field("id", &self.shared.id)
            .field("url", &self.shared.url)
            .field("ready", &self.is_ready())
            .field("paused", &self.paused())
            .field("current_time", &self.current_time())
            .finish()
    }
}
