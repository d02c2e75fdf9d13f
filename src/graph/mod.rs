//! Audio graph: per-controller buses of `sources → gain → [filter]` mixed into a destination.

mod filter;
mod gain;
mod source;

pub use filter::{AudioFilter, BiquadFilter, FilterNode, FilterType};
pub use gain::GainNode;
pub(crate) use source::SourceNode;
pub use source::{BufferSourceNode, MediaSourceNode};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use uuid::Uuid;

/// Identity of a graph node (gain, filter or source).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Handle for one controller's chain inside a shared graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BusId(u64);

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BusId({})", self.0)
    }
}

/// Where a bus's gain node is currently connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// gain → destination
    Direct,
    /// gain → filter → destination
    Filtered(NodeId),
}

#[derive(Debug)]
pub(crate) struct Bus {
    id: BusId,
    gain: GainNode,
    filter: Option<FilterNode>,
    sources: Vec<SourceNode>,
}

impl Bus {
    fn routing(&self) -> Routing {
        match &self.filter {
            Some(filter) => Routing::Filtered(filter.id()),
            None => Routing::Direct,
        }
    }
}

/// Mixing state shared between the owning context and the audio thread.
#[derive(Debug)]
pub(crate) struct GraphState {
    sample_rate: u32,
    channels: u16,
    buses: Vec<Bus>,
    next_bus_id: u64,
    frames_rendered: u64,
    scratch: Vec<f32>,
}

pub(crate) type SharedGraph = Arc<Mutex<GraphState>>;

/// Lock the graph from a control thread. The graph holds no invariants a
/// panicking holder could break halfway, so a poisoned lock is recovered.
pub(crate) fn lock_graph(graph: &SharedGraph) -> MutexGuard<'_, GraphState> {
    graph.lock().unwrap_or_else(|e| e.into_inner())
}

/// Render-side view of a context's graph, handed to an [`AudioHost`](crate::host::AudioHost).
#[derive(Debug, Clone)]
pub struct GraphHandle {
    graph: SharedGraph,
}

impl GraphHandle {
    pub(crate) fn new(graph: SharedGraph) -> Self {
        Self { graph }
    }

    pub fn sample_rate(&self) -> u32 {
        lock_graph(&self.graph).sample_rate()
    }

    pub fn channels(&self) -> u16 {
        lock_graph(&self.graph).channels()
    }

    /// Overwrite `output` with the next mixed block, waiting for the graph lock.
    pub fn render(&self, output: &mut [f32]) -> usize {
        lock_graph(&self.graph).render(output)
    }

    /// Like [`render`](Self::render) but never blocks; `None` if the graph is
    /// being rewired. Use this from real-time callbacks.
    pub fn try_render(&self, output: &mut [f32]) -> Option<usize> {
        self.graph
            .try_lock()
            .ok()
            .map(|mut graph| graph.render(output))
    }

    pub(crate) fn downgrade(&self) -> WeakGraphHandle {
        WeakGraphHandle {
            graph: Arc::downgrade(&self.graph),
        }
    }
}

/// A [`GraphHandle`] that does not keep the graph alive.
#[derive(Debug, Clone)]
pub(crate) struct WeakGraphHandle {
    graph: Weak<Mutex<GraphState>>,
}

impl WeakGraphHandle {
    pub(crate) fn upgrade(&self) -> Option<GraphHandle> {
        self.graph.upgrade().map(GraphHandle::new)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.graph.strong_count() > 0
    }
}

impl GraphState {
    pub(crate) fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            buses: Vec::new(),
            next_bus_id: 0,
            frames_rendered: 0,
            scratch: Vec::new(),
        }
    }

    pub(crate) fn shared(sample_rate: u32, channels: u16) -> SharedGraph {
        Arc::new(Mutex::new(Self::new(sample_rate, channels)))
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn channels(&self) -> u16 {
        self.channels
    }

    pub(crate) fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Connect `gain` straight to the destination as a new bus.
    pub(crate) fn add_bus(&mut self, gain: GainNode) -> BusId {
        let id = BusId(self.next_bus_id);
        self.next_bus_id += 1;
        log::debug!("{}: {} → destination", id, gain.id());
        self.buses.push(Bus {
            id,
            gain,
            filter: None,
            sources: Vec::new(),
        });
        id
    }

    pub(crate) fn remove_bus(&mut self, id: BusId) -> bool {
        let before = self.buses.len();
        self.buses.retain(|bus| bus.id != id);
        let removed = self.buses.len() != before;
        if removed {
            log::debug!("{} disconnected from destination", id);
        }
        removed
    }

    pub(crate) fn bus_count(&self) -> usize {
        self.buses.len()
    }

    fn bus_mut(&mut self, id: BusId) -> Option<&mut Bus> {
        self.buses.iter_mut().find(|bus| bus.id == id)
    }

    fn bus(&self, id: BusId) -> Option<&Bus> {
        self.buses.iter().find(|bus| bus.id == id)
    }

    /// Disconnect the current filter and gain, then re-wire through `filter` (or directly).
    pub(crate) fn set_filter(&mut self, id: BusId, filter: Option<FilterNode>) -> bool {
        let Some(bus) = self.bus_mut(id) else {
            return false;
        };
        if let Some(old) = bus.filter.take() {
            log::debug!("{}: disconnected filter {}", id, old.id());
        }
        match &filter {
            Some(f) => log::debug!("{}: {} → {} → destination", id, bus.gain.id(), f.id()),
            None => log::debug!("{}: {} → destination", id, bus.gain.id()),
        }
        bus.filter = filter;
        true
    }

    pub(crate) fn routing(&self, id: BusId) -> Option<Routing> {
        self.bus(id).map(Bus::routing)
    }

    pub(crate) fn connect_source(&mut self, id: BusId, source: SourceNode) -> bool {
        let Some(bus) = self.bus_mut(id) else {
            return false;
        };
        log::debug!("{}: source {} → {}", id, source.id(), bus.gain.id());
        bus.sources.push(source);
        true
    }

    pub(crate) fn disconnect_source(&mut self, id: BusId, source: NodeId) -> bool {
        let Some(bus) = self.bus_mut(id) else {
            return false;
        };
        let before = bus.sources.len();
        bus.sources.retain(|s| s.id() != source);
        bus.sources.len() != before
    }

    pub(crate) fn source_ids(&self, id: BusId) -> Vec<NodeId> {
        self.bus(id)
            .map(|bus| bus.sources.iter().map(SourceNode::id).collect())
            .unwrap_or_default()
    }

    /// Overwrite `output` (interleaved, graph channel count) with the next mixed block.
    ///
    /// Returns the largest number of frames any source produced.
    pub(crate) fn render(&mut self, output: &mut [f32]) -> usize {
        output.fill(0.0);
        if self.scratch.len() < output.len() {
            self.scratch.resize(output.len(), 0.0);
        }

        let channels = self.channels;
        let sample_rate = self.sample_rate;
        let mut frames_max = 0;

        for bus in &mut self.buses {
            let scratch = &mut self.scratch[..output.len()];
            scratch.fill(0.0);

            for source in &mut bus.sources {
                frames_max = frames_max.max(source.fill(scratch, channels));
            }

            bus.gain.apply(scratch);
            if let Some(filter) = &bus.filter {
                filter.process(scratch, channels, sample_rate);
            }

            for (out, sample) in output.iter_mut().zip(scratch.iter()) {
                *out += sample;
            }
        }

        self.frames_rendered += (output.len() / channels.max(1) as usize) as u64;
        frames_max
    }
}
