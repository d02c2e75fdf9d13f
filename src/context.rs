//! Real-time audio context: a graph plus the destination that plays it.

use crate::config::AudioContextDesc;
use crate::error::Result;
use crate::graph::{
    BusId, FilterNode, GainNode, GraphHandle, GraphState, NodeId, Routing, SharedGraph,
    SourceNode, lock_graph,
};
use crate::host::{AudioHost, OutputStream};
use std::fmt;
use std::rc::Rc;

struct ContextInner {
    desc: AudioContextDesc,
    graph: SharedGraph,
    _output: Box<dyn OutputStream>,
}

/// Handle to a running processing graph.
///
/// Cheap to clone; all clones share one graph and one destination. Output
/// stops when the last handle is dropped. Handles stay on the thread that
/// created them.
#[derive(Clone)]
pub struct AudioContext {
    inner: Rc<ContextInner>,
}

impl AudioContext {
    /// Open a destination on `host` and start rendering an empty graph.
    pub fn new(host: &dyn AudioHost, desc: &AudioContextDesc) -> Result<Self> {
        desc.validate()?;
        let desc = host.negotiate(desc)?;
        desc.validate()?;

        let graph = GraphState::shared(desc.sample_rate, desc.channels);
        let output = host.open_output(&desc, GraphHandle::new(graph.clone()))?;

        log::info!(
            "Audio context created on {} host: {} Hz, {} ch",
            host.name(),
            desc.sample_rate,
            desc.channels
        );

        Ok(Self {
            inner: Rc::new(ContextInner {
                desc,
                graph,
                _output: output,
            }),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.desc.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.desc.channels
    }

    pub fn desc(&self) -> &AudioContextDesc {
        &self.inner.desc
    }

    /// Seconds of audio rendered by the destination so far.
    pub fn current_time(&self) -> f64 {
        lock_graph(&self.inner.graph).frames_rendered() as f64 / self.sample_rate() as f64
    }

    /// Number of gain chains connected to the destination.
    pub fn connected_buses(&self) -> usize {
        lock_graph(&self.inner.graph).bus_count()
    }

    pub fn same_context(&self, other: &AudioContext) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn add_bus(&self, gain: GainNode) -> BusId {
        lock_graph(&self.inner.graph).add_bus(gain)
    }

    pub(crate) fn remove_bus(&self, bus: BusId) -> bool {
        lock_graph(&self.inner.graph).remove_bus(bus)
    }

    pub(crate) fn set_filter(&self, bus: BusId, filter: Option<FilterNode>) -> bool {
        lock_graph(&self.inner.graph).set_filter(bus, filter)
    }

    pub(crate) fn routing(&self, bus: BusId) -> Option<Routing> {
        lock_graph(&self.inner.graph).routing(bus)
    }

    pub(crate) fn connect_source(&self, bus: BusId, source: SourceNode) -> bool {
        lock_graph(&self.inner.graph).connect_source(bus, source)
    }

    pub(crate) fn disconnect_source(&self, bus: BusId, source: NodeId) -> bool {
        lock_graph(&self.inner.graph).disconnect_source(bus, source)
    }

    pub(crate) fn source_ids(&self, bus: BusId) -> Vec<NodeId> {
        lock_graph(&self.inner.graph).source_ids(bus)
    }
}

impl fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioContext")
            .field("sample_rate", &self.sample_rate())
            .field("channels", &self.channels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PetalWaveError;
    use crate::host::ManualHost;

    #[test]
    fn creates_on_manual_host() {
        let host = ManualHost::new();
        let desc = AudioContextDesc::new().sample_rate(8000).channels(1);
        let context = AudioContext::new(&host, &desc).unwrap();
        assert_eq!(context.sample_rate(), 8000);
        assert_eq!(context.channels(), 1);
        assert_eq!(context.connected_buses(), 0);
        assert_eq!(host.destination_count(), 1);
    }

    #[test]
    fn dropping_the_last_clone_releases_the_destination() {
        let host = ManualHost::new();
        let context = AudioContext::new(&host, &AudioContextDesc::default()).unwrap();
        let clone = context.clone();

        drop(context);
        assert_eq!(host.destination_count(), 1);
        drop(clone);
        assert_eq!(host.destination_count(), 0);
        assert!(host.destination().is_none());
    }

    #[test]
    fn clones_share_the_graph() {
        let host = ManualHost::new();
        let context = AudioContext::new(&host, &AudioContextDesc::default()).unwrap();
        let clone = context.clone();
        clone.add_bus(GainNode::default());
        assert_eq!(context.connected_buses(), 1);
        assert!(context.same_context(&clone));
    }

    #[test]
    fn current_time_follows_rendered_frames() {
        let host = ManualHost::new();
        let desc = AudioContextDesc::new().sample_rate(8000).channels(2);
        let context = AudioContext::new(&host, &desc).unwrap();
        host.destination().unwrap().render_frames(4000);
        assert_eq!(context.current_time(), 0.5);
    }

    #[test]
    fn fails_on_unsupported_host() {
        let err = AudioContext::new(&ManualHost::unsupported(), &AudioContextDesc::default())
            .unwrap_err();
        assert!(matches!(err, PetalWaveError::UnsupportedEnvironment(_)));
    }

    #[test]
    fn rejects_invalid_desc() {
        let err = AudioContext::new(
            &ManualHost::new(),
            &AudioContextDesc::new().sample_rate(0),
        )
        .unwrap_err();
        assert!(matches!(err, PetalWaveError::Configuration(_)));
    }
}
