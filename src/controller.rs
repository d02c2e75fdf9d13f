//! The audio controller: volume, filter wiring, media attachment, off-line
//! decoding and playback state, reported through an [`AudioNotifier`].

use crate::audio_data::{DefaultMediaLoader, MediaLoader};
use crate::config::{ControllerDesc, DecodePreview};
use crate::context::AudioContext;
use crate::engine::AudioEngine;
use crate::error::{PetalWaveError, Result};
use crate::events::{AudioEvent, AudioNotifier};
use crate::graph::{BusId, FilterNode, GainNode, MediaSourceNode, Routing, SourceNode};
use crate::media::{CancelToken, MediaElement};
use crate::offline::{OfflineAudioContext, RenderedBuffer};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of an [`AudioController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Gain node wired, nothing loaded
    Initialized,
    /// A load is pending
    Loading,
    /// A source is attached and not playing
    Ready,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    Attach,
    Decode,
}

impl Purpose {
    fn name(self) -> &'static str {
        match self {
            Self::Attach => "load",
            Self::Decode => "decode",
        }
    }
}

/// Messages from worker threads, consumed on the controller's thread.
enum HostSignal {
    CanPlay {
        purpose: Purpose,
        generation: u64,
        element: MediaElement,
    },
    LoadError {
        purpose: Purpose,
        generation: u64,
        reason: String,
    },
    Rendered {
        generation: u64,
        result: Result<RenderedBuffer>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Progress {
    Loading,
    Rendering,
    Done,
    Failed(String),
}

#[derive(Debug)]
struct Pending {
    generation: u64,
    url: String,
    token: CancelToken,
    progress: Progress,
}

impl Pending {
    fn in_flight(&self) -> bool {
        matches!(self.progress, Progress::Loading | Progress::Rendering)
    }

    fn outcome(&self) -> Option<Result<()>> {
        match &self.progress {
            Progress::Done => Some(Ok(())),
            Progress::Failed(reason) => Some(Err(PetalWaveError::LoadFailed {
                url: self.url.clone(),
                reason: reason.clone(),
            })),
            Progress::Loading | Progress::Rendering => None,
        }
    }
}

/// Controls playback and decoding of one media resource at a time.
///
/// The graph per controller is `source → gain → [filter] → destination`.
/// Asynchronous work (loading, off-line rendering) happens on worker threads;
/// its results are applied and notified only when the owner calls
/// [`poll_events`](Self::poll_events), [`wait_ready`](Self::wait_ready) or
/// [`wait_decoded`](Self::wait_decoded).
pub struct AudioController {
    context: AudioContext,
    bus: BusId,
    gain: GainNode,
    filter: Option<FilterNode>,
    source: Option<MediaSourceNode>,
    preview: Option<MediaSourceNode>,
    notifier: Arc<dyn AudioNotifier>,
    loader: Arc<dyn MediaLoader>,
    decode_preview: DecodePreview,
    signal_tx: Sender<HostSignal>,
    signal_rx: Receiver<HostSignal>,
    next_generation: u64,
    attach: Option<Pending>,
    decode: Option<Pending>,
    decoded: Option<Arc<[f32]>>,
    state: ControllerState,
}

impl AudioController {
    /// Create a controller on `desc.audio_context` or the engine's shared context.
    ///
    /// Fails with [`PetalWaveError::UnsupportedEnvironment`] before creating
    /// anything when the engine's host cannot produce audio.
    pub fn init(
        desc: ControllerDesc,
        engine: &AudioEngine,
        notifier: Arc<dyn AudioNotifier>,
    ) -> Result<Self> {
        if !engine.is_supported() {
            return Err(PetalWaveError::UnsupportedEnvironment(format!(
                "{} host has no audio output",
                engine.host().name()
            )));
        }

        let context = match desc.audio_context {
            Some(context) => context,
            None => engine.context()?,
        };

        let gain = GainNode::default();
        let bus = context.add_bus(gain.clone());
        let (signal_tx, signal_rx) = crossbeam_channel::unbounded();
        let loader = desc
            .loader
            .unwrap_or_else(|| Arc::new(DefaultMediaLoader::default()));

        log::debug!("Controller initialized on {}", bus);

        Ok(Self {
            context,
            bus,
            gain,
            filter: None,
            source: None,
            preview: None,
            notifier,
            loader,
            decode_preview: desc.decode_preview,
            signal_tx,
            signal_rx,
            next_generation: 0,
            attach: None,
            decode: None,
            decoded: None,
            state: ControllerState::Initialized,
        })
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn gain_node(&self) -> &GainNode {
        &self.gain
    }

    /// Wire `filter` between the gain node and the destination, or remove
    /// the current filter with `None`.
    pub fn set_filter(&mut self, filter: Option<FilterNode>) {
        self.context.set_filter(self.bus, filter.clone());
        self.filter = filter;
    }

    pub fn filter(&self) -> Option<&FilterNode> {
        self.filter.as_ref()
    }

    pub fn routing(&self) -> Routing {
        self.context.routing(self.bus).unwrap_or(Routing::Direct)
    }

    /// Set the gain. Any value is accepted, including negative or above 1.
    pub fn set_volume(&self, level: f32) {
        self.gain.set_gain(level);
    }

    pub fn volume(&self) -> f32 {
        self.gain.gain()
    }

    /// Start decoding `url` and attaching it as the playback source.
    ///
    /// `ready` fires once the source is attached; `decoded` once the
    /// off-line render has finished. Pending work from a previous call is
    /// cancelled.
    pub fn load(&mut self, url: &str) -> Result<()> {
        self.decode(url)?;

        if let Some(previous) = self.attach.take().filter(Pending::in_flight) {
            log::debug!("Superseding pending load of {}", previous.url);
            previous.token.cancel();
        }

        let pending = self.spawn_element(Purpose::Attach, url)?;
        self.attach = Some(pending);
        self.state = ControllerState::Loading;
        Ok(())
    }

    /// Render `url` off-line into a single-channel buffer at the context's
    /// sample rate. `decoded` fires with the samples.
    pub fn decode(&mut self, url: &str) -> Result<()> {
        if let Some(previous) = self.decode.take().filter(Pending::in_flight) {
            log::debug!("Superseding pending decode of {}", previous.url);
            previous.token.cancel();
        }
        self.stop_preview();

        let pending = self.spawn_element(Purpose::Decode, url)?;
        self.decode = Some(pending);
        Ok(())
    }

    /// Start playback, seeking to `start` seconds first if given.
    pub fn play(&mut self, start: Option<f64>) -> Result<()> {
        let element = self.element().ok_or(PetalWaveError::NoSource)?;
        if let Some(start) = start {
            element.set_current_time(start);
        }
        element.play();
        self.state = ControllerState::Playing;
        self.emit(&AudioEvent::Play);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        let element = self.element().ok_or(PetalWaveError::NoSource)?;
        element.pause();
        self.state = ControllerState::Paused;
        self.emit(&AudioEvent::Pause);
        Ok(())
    }

    /// `true` when nothing is attached or the attached element is paused.
    pub fn is_paused(&self) -> bool {
        self.element().is_none_or(MediaElement::paused)
    }

    /// Playback position in seconds, 0 without a source.
    pub fn current_time(&self) -> f64 {
        self.element().map_or(0.0, MediaElement::current_time)
    }

    pub fn duration(&self) -> Option<f64> {
        self.element().and_then(MediaElement::duration)
    }

    /// Fraction of the duration played, in `0.0..=1.0` for in-range positions.
    ///
    /// 0 when the duration is zero or unknown.
    pub fn played_percents(&self) -> f64 {
        let Some(duration) = self.duration() else {
            return 0.0;
        };
        let ratio = self.current_time() / duration;
        if ratio.is_finite() { ratio } else { 0.0 }
    }

    pub fn state(&self) -> ControllerState {
        match self.state {
            ControllerState::Playing if self.is_paused() => ControllerState::Paused,
            state => state,
        }
    }

    pub fn source(&self) -> Option<&MediaSourceNode> {
        self.source.as_ref()
    }

    /// Samples from the most recent completed decode.
    pub fn decoded_samples(&self) -> Option<Arc<[f32]>> {
        self.decoded.clone()
    }

    /// Apply everything the workers have reported so far and notify the
    /// resulting events in arrival order. Returns the events notified.
    pub fn poll_events(&mut self) -> Vec<AudioEvent> {
        let mut events = Vec::new();
        loop {
            let signal = match self.signal_rx.try_recv() {
                Ok(signal) => signal,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            if let Some(event) = self.handle_signal(signal) {
                events.push(event);
            }
        }
        events
    }

    /// Block until the pending load has attached its source.
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = self
                .attach
                .as_ref()
                .ok_or(PetalWaveError::NothingPending("load"))?;
            if let Some(outcome) = pending.outcome() {
                return outcome;
            }
            self.wait_signal(deadline, timeout)?;
        }
    }

    /// Block until the pending decode has rendered, returning its samples.
    pub fn wait_decoded(&mut self, timeout: Duration) -> Result<Arc<[f32]>> {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = self
                .decode
                .as_ref()
                .ok_or(PetalWaveError::NothingPending("decode"))?;
            if let Some(outcome) = pending.outcome() {
                outcome?;
                return self
                    .decoded
                    .clone()
                    .ok_or(PetalWaveError::NothingPending("decode"));
            }
            self.wait_signal(deadline, timeout)?;
        }
    }

    /// Cancel any pending load and decode. Completed work is kept.
    pub fn cancel_pending(&mut self) {
        for purpose in [Purpose::Attach, Purpose::Decode] {
            let slot = self.slot_mut(purpose);
            if let Some(pending) = slot.take_if(|pending| pending.in_flight()) {
                log::debug!("Cancelled pending {} of {}", purpose.name(), pending.url);
                pending.token.cancel();
            }
        }
        self.stop_preview();

        if self.state == ControllerState::Loading {
            self.state = if self.source.is_some() {
                ControllerState::Ready
            } else {
                ControllerState::Initialized
            };
        }
    }

    fn element(&self) -> Option<&MediaElement> {
        self.source.as_ref().map(MediaSourceNode::element)
    }

    fn emit(&self, event: &AudioEvent) {
        log::debug!("Notifying {}", event.kind());
        self.notifier.notify(event);
    }

    fn slot_mut(&mut self, purpose: Purpose) -> &mut Option<Pending> {
        match purpose {
            Purpose::Attach => &mut self.attach,
            Purpose::Decode => &mut self.decode,
        }
    }

    fn spawn_element(&mut self, purpose: Purpose, url: &str) -> Result<Pending> {
        let generation = self.next_generation;
        self.next_generation += 1;

        let token = CancelToken::new();
        let tx = self.signal_tx.clone();
        MediaElement::spawn_load(
            url,
            self.context.sample_rate(),
            self.loader.clone(),
            token.clone(),
            move |element, result| {
                let signal = match result {
                    Ok(()) => HostSignal::CanPlay {
                        purpose,
                        generation,
                        element: element.clone(),
                    },
                    Err(e) => HostSignal::LoadError {
                        purpose,
                        generation,
                        reason: e.to_string(),
                    },
                };
                let _ = tx.send(signal);
            },
        )?;

        log::debug!("Started {} #{} of {}", purpose.name(), generation, url);
        Ok(Pending {
            generation,
            url: url.to_string(),
            token,
            progress: Progress::Loading,
        })
    }

    fn wait_signal(&mut self, deadline: Instant, timeout: Duration) -> Result<()> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.signal_rx.recv_timeout(remaining) {
            Ok(signal) => {
                self.handle_signal(signal);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(PetalWaveError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(PetalWaveError::Engine("Signal channel closed".into()))
            }
        }
    }

    /// Whether `generation` is the in-flight operation for `purpose`.
    fn is_current(&mut self, purpose: Purpose, generation: u64) -> bool {
        let current = self
            .slot_mut(purpose)
            .as_ref()
            .is_some_and(|pending| pending.generation == generation && pending.in_flight());
        if !current {
            log::debug!(
                "Discarding stale {} signal #{}",
                purpose.name(),
                generation
            );
        }
        current
    }

    fn set_progress(&mut self, purpose: Purpose, progress: Progress) {
        if let Some(pending) = self.slot_mut(purpose) {
            pending.progress = progress;
        }
    }

    fn handle_signal(&mut self, signal: HostSignal) -> Option<AudioEvent> {
        let event = match signal {
            HostSignal::CanPlay {
                purpose,
                generation,
                element,
            } => {
                if !self.is_current(purpose, generation) {
                    return None;
                }
                match purpose {
                    Purpose::Attach => Some(self.attach_source(element)),
                    Purpose::Decode => {
                        if let Err(e) = self.start_render(generation, element) {
                            log::warn!("Could not render decode #{}: {}", generation, e);
                            self.stop_preview();
                            self.set_progress(Purpose::Decode, Progress::Failed(e.to_string()));
                        }
                        None
                    }
                }
            }
            HostSignal::LoadError {
                purpose,
                generation,
                reason,
            } => {
                if self.is_current(purpose, generation) {
                    log::warn!("Pending {} #{} failed: {}", purpose.name(), generation, reason);
                    self.set_progress(purpose, Progress::Failed(reason));
                }
                None
            }
            HostSignal::Rendered { generation, result } => {
                if !self.is_current(Purpose::Decode, generation) {
                    return None;
                }
                self.stop_preview();
                match result {
                    Ok(buffer) => Some(self.finish_decode(buffer)),
                    Err(e) => {
                        log::warn!("Decode #{} render failed: {}", generation, e);
                        self.set_progress(Purpose::Decode, Progress::Failed(e.to_string()));
                        None
                    }
                }
            }
        };

        if let Some(event) = &event {
            self.emit(event);
        }
        event
    }

    fn attach_source(&mut self, element: MediaElement) -> AudioEvent {
        if let Some(old) = self.source.take() {
            old.element().pause();
            self.context.disconnect_source(self.bus, old.id());
        }

        let node = MediaSourceNode::new(element);
        self.context
            .connect_source(self.bus, SourceNode::Media(node.clone()));
        log::info!("Attached {} ({:?} s)", node.element().url(), node.element().duration());

        self.source = Some(node);
        self.set_progress(Purpose::Attach, Progress::Done);
        self.state = ControllerState::Ready;
        AudioEvent::Ready
    }

    fn start_render(&mut self, generation: u64, element: MediaElement) -> Result<()> {
        let sample_rate = self.context.sample_rate();
        let duration = element.duration().unwrap_or(0.0);
        let length = (duration * sample_rate as f64).round() as usize;

        let mut offline = OfflineAudioContext::new(1, length, sample_rate)?;
        offline.connect_element(&element)?;

        if self.decode_preview == DecodePreview::Audible {
            let node = MediaSourceNode::new(element.clone());
            self.context
                .connect_source(self.bus, SourceNode::Media(node.clone()));
            element.play();
            self.preview = Some(node);
        }

        let token = match self.decode.as_ref() {
            Some(pending) => pending.token.clone(),
            None => return Err(PetalWaveError::NothingPending("decode")),
        };
        let tx = self.signal_tx.clone();
        let worker_token = token.clone();
        offline.start_rendering(token, move |result| {
            if worker_token.is_cancelled() {
                return;
            }
            let _ = tx.send(HostSignal::Rendered { generation, result });
        })?;

        log::debug!("Rendering {} frames of {}", length, element.url());
        self.set_progress(Purpose::Decode, Progress::Rendering);
        Ok(())
    }

    fn finish_decode(&mut self, buffer: RenderedBuffer) -> AudioEvent {
        let sample_rate = buffer.sample_rate();
        let samples: Arc<[f32]> = buffer.into_channel(0).unwrap_or_default().into();
        log::info!("Decoded {} samples at {} Hz", samples.len(), sample_rate);

        self.decoded = Some(samples.clone());
        self.set_progress(Purpose::Decode, Progress::Done);
        AudioEvent::Decoded {
            samples,
            sample_rate,
        }
    }

    fn stop_preview(&mut self) {
        if let Some(node) = self.preview.take() {
            node.element().pause();
            self.context.disconnect_source(self.bus, node.id());
        }
    }
}

impl Drop for AudioController {
    fn drop(&mut self) {
        self.cancel_pending();
        self.context.remove_bus(self.bus);
        log::debug!("Controller on {} dropped", self.bus);
    }
}

impl fmt::Debug for AudioController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioController")
            .field("context", &self.context)
            .field("bus", &self.bus)
            .field("state", &self.state())
            .field("volume", &self.volume())
            .field("filter", &self.filter)
            .field("source", &self.source)
            .finish()
    }
}
