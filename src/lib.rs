//! PetalWave: an audio controller over a small processing graph.
//!
//! An [`AudioController`] owns a gain node wired into a shared real-time
//! [`AudioContext`], optionally through an externally supplied filter. It
//! attaches media elements as sources, renders them off-line into sample
//! buffers, and reports `ready`, `decoded`, `play` and `pause` through an
//! [`AudioNotifier`].
//!
//! ```no_run
//! use petalwave::{AudioController, AudioEngine, ControllerDesc, EventKind, Observer};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> petalwave::Result<()> {
//! let engine = AudioEngine::default();
//! let observer = Arc::new(Observer::new());
//! observer.on(EventKind::Decoded, |event| {
//!     println!("decoded {} samples", event.samples().map_or(0, <[f32]>::len));
//! });
//!
//! let mut controller = AudioController::init(ControllerDesc::new(), &engine, observer)?;
//! controller.set_volume(0.8);
//! controller.load("track.mp3")?;
//! controller.wait_ready(Duration::from_secs(10))?;
//! controller.play(None)?;
//! # Ok(())
//! # }
//! ```

pub mod audio_data;
pub mod config;
pub mod context;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod host;
pub mod media;
pub mod offline;

pub use config::{AudioContextDesc, ControllerDesc, DecodePreview};
pub use context::AudioContext;
pub use controller::{AudioController, ControllerState};
pub use engine::AudioEngine;
pub use error::{PetalWaveError, Result};
pub use events::{AudioEvent, AudioNotifier, ChannelNotifier, EventKind, Observer, SubscriptionId};
pub use graph::{AudioFilter, BiquadFilter, FilterNode, FilterType, GainNode, Routing};
pub use host::{AudioHost, CpalHost, ManualDestination, ManualHost};
pub use media::{CancelToken, MediaElement};
pub use offline::{OfflineAudioContext, RenderedBuffer};
