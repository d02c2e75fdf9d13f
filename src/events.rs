//! Event types and notification plumbing for PetalWave

use crossbeam_channel::Sender;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Notification emitted by an [`AudioController`](crate::AudioController).
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// A media source is attached and playable
    Ready,
    /// Off-line rendering finished
    Decoded {
        /// Single-channel rendered samples
        samples: Arc<[f32]>,
        sample_rate: u32,
    },
    Play,
    Pause,
}

/// Name of an [`AudioEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    Decoded,
    Play,
    Pause,
}

impl AudioEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Ready => EventKind::Ready,
            Self::Decoded { .. } => EventKind::Decoded,
            Self::Play => EventKind::Play,
            Self::Pause => EventKind::Pause,
        }
    }

    /// Rendered samples for a `Decoded` event
    pub fn samples(&self) -> Option<&[f32]> {
        match self {
            Self::Decoded { samples, .. } => Some(samples),
            _ => None,
        }
    }
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Decoded => "decoded",
            Self::Play => "play",
            Self::Pause => "pause",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receives notifications from a controller.
///
/// Notifications are delivered synchronously on the thread that drives the
/// controller, in emission order.
pub trait AudioNotifier {
    fn notify(&self, event: &AudioEvent);
}

impl<F> AudioNotifier for F
where
    F: Fn(&AudioEvent),
{
    fn notify(&self, event: &AudioEvent) {
        self(event)
    }
}

/// Forwards every event into a channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: Sender<AudioEvent>,
}

impl ChannelNotifier {
    pub fn new(sender: Sender<AudioEvent>) -> Self {
        Self { sender }
    }
}

impl AudioNotifier for ChannelNotifier {
    fn notify(&self, event: &AudioEvent) {
        if self.sender.send(event.clone()).is_err() {
            log::debug!("Dropping {} event: receiver disconnected", event.kind());
        }
    }
}

/// Handle returned by [`Observer::on`], used to unsubscribe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&AudioEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
    once: bool,
}

#[derive(Default)]
struct ObserverInner {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

/// Name-keyed event subscriptions.
///
/// Handlers subscribed while an event is being dispatched only see later events.
#[derive(Default)]
pub struct Observer {
    inner: Mutex<ObserverInner>,
}

impl Observer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to every event of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&AudioEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(handler), false)
    }

    /// Subscribe `handler` to the next event of `kind` only.
    pub fn once<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&AudioEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(handler), true)
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn un(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        inner.subscriptions.len() != before
    }

    pub fn un_all(&self) {
        self.lock().subscriptions.clear();
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock()
            .subscriptions
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Deliver `event` to every matching subscriber.
    pub fn fire(&self, event: &AudioEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = {
            let mut inner = self.lock();
            let handlers = inner
                .subscriptions
                .iter()
                .filter(|s| s.kind == kind)
                .map(|s| s.handler.clone())
                .collect();
            inner.subscriptions.retain(|s| !(s.once && s.kind == kind));
            handlers
        };

        for handler in handlers {
            handler(event);
        }
    }

    fn subscribe(&self, kind: EventKind, handler: Handler, once: bool) -> SubscriptionId {
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subscriptions.push(Subscription {
            id,
            kind,
            handler,
            once,
        });
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ObserverInner> {
        // A panicking handler never runs under the lock, so poisoning carries no broken state.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AudioNotifier for Observer {
    fn notify(&self, event: &AudioEvent) {
        self.fire(event);
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("subscriptions", &self.lock().subscriptions.len())
            .finish()
    }
}
