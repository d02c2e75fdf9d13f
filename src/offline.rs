//! Off-line rendering: run a private graph as fast as possible into a buffer.

use crate::audio_data::AudioData;
use crate::error::{PetalWaveError, Result};
use crate::graph::{BufferSourceNode, BusId, GainNode, GraphState, NodeId, SourceNode};
use crate::media::{CancelToken, MediaElement};
use std::thread;

/// Frames rendered per step.
pub const RENDER_QUANTUM: usize = 128;

/// Result of an off-line render, one vector per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl RenderedBuffer {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn length(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel_data(&self, channel: usize) -> Option<&[f32]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    pub fn into_channel(mut self, channel: usize) -> Option<Vec<f32>> {
        if channel < self.channels.len() {
            Some(self.channels.swap_remove(channel))
        } else {
            None
        }
    }
}

/// A graph with a fixed output length that renders without a device.
#[derive(Debug)]
pub struct OfflineAudioContext {
    graph: GraphState,
    bus: BusId,
    length: usize,
}

impl OfflineAudioContext {
    pub fn new(channels: u16, length: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(PetalWaveError::Configuration(
                "Offline context needs at least one channel".into(),
            ));
        }
        if length == 0 {
            return Err(PetalWaveError::Configuration(
                "Offline context length must be greater than 0".into(),
            ));
        }
        if sample_rate == 0 {
            return Err(PetalWaveError::Configuration(
                "Sample rate must be greater than 0".into(),
            ));
        }

        let mut graph = GraphState::new(sample_rate, channels);
        let bus = graph.add_bus(GainNode::default());
        Ok(Self { graph, bus, length })
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    pub fn channels(&self) -> u16 {
        self.graph.channels()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Connect a buffer to the destination, starting at frame 0.
    pub fn connect_buffer(&mut self, data: AudioData) -> NodeId {
        let node = BufferSourceNode::new(data);
        let id = node.id();
        self.graph.connect_source(self.bus, SourceNode::Buffer(node));
        id
    }

    /// Connect a loaded element. Its audio is read from the start, independent
    /// of the element's own playback position.
    pub fn connect_element(&mut self, element: &MediaElement) -> Result<NodeId> {
        let audio = element.audio().cloned().ok_or_else(|| {
            PetalWaveError::AudioLoading(format!("{} has not loaded yet", element.url()))
        })?;
        if audio.sample_rate() != self.sample_rate() {
            log::warn!(
                "Rendering {} at {} Hz into a {} Hz offline context",
                element.url(),
                audio.sample_rate(),
                self.sample_rate()
            );
        }
        Ok(self.connect_buffer(audio))
    }

    pub fn disconnect(&mut self, source: NodeId) -> bool {
        self.graph.disconnect_source(self.bus, source)
    }

    /// Render the whole length on the current thread.
    pub fn render_blocking(mut self, token: &CancelToken) -> Result<RenderedBuffer> {
        let channels = self.channels() as usize;
        let mut interleaved = vec![0.0f32; self.length * channels];

        for block in interleaved.chunks_mut(RENDER_QUANTUM * channels) {
            if token.is_cancelled() {
                return Err(PetalWaveError::Cancelled);
            }
            self.graph.render(block);
        }

        let mut planar = vec![Vec::with_capacity(self.length); channels];
        for frame in interleaved.chunks(channels) {
            for (channel, sample) in planar.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        log::debug!(
            "Offline render finished: {} frames, {} ch",
            self.length,
            channels
        );
        Ok(RenderedBuffer {
            channels: planar,
            sample_rate: self.sample_rate(),
        })
    }

    /// Render on a worker thread. `on_complete` runs on that thread.
    pub fn start_rendering<F>(self, token: CancelToken, on_complete: F) -> Result<()>
    where
        F: FnOnce(Result<RenderedBuffer>) + Send + 'static,
    {
        thread::Builder::new()
            .name("petalwave-offline".into())
            .spawn(move || on_complete(self.render_blocking(&token)))
            .map_err(|e| PetalWaveError::Engine(format!("Failed to spawn render thread: {}", e)))?;
        Ok(())
    }
}
