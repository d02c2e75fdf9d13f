use super::NodeId;
use crate::audio_data::AudioData;
use crate::media::MediaElement;
use std::sync::atomic::Ordering;

/// Adds one source frame into one destination frame, up/down-mixing as needed.
pub(crate) fn mix_frame(src: &[f32], dst: &mut [f32]) {
    match (src.len(), dst.len()) {
        (s, d) if s == d => {
            for (out, sample) in dst.iter_mut().zip(src) {
                *out += sample;
            }
        }
        (1, _) => {
            for out in dst.iter_mut() {
                *out += src[0];
            }
        }
        (s, 1) => {
            dst[0] += src.iter().sum::<f32>() / s as f32;
        }
        (s, _) => {
            for (ch, out) in dst.iter_mut().enumerate() {
                *out += src[ch % s];
            }
        }
    }
}

/// Graph node that plays a [`MediaElement`] following its play/pause/seek state.
#[derive(Debug, Clone)]
pub struct MediaSourceNode {
    id: NodeId,
    element: MediaElement,
}

impl MediaSourceNode {
    pub fn new(element: MediaElement) -> Self {
        Self {
            id: NodeId::new(),
            element,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn element(&self) -> &MediaElement {
        &self.element
    }

    /// Mix the element's next frames into `buffer`. Returns frames written.
    pub(crate) fn fill(&self, buffer: &mut [f32], channels: u16) -> usize {
        let shared = self.element.shared();
        if shared.paused.load(Ordering::Acquire) {
            return 0;
        }
        let Some(data) = shared.data.get() else {
            return 0;
        };

        let channels = channels as usize;
        let start = shared.frame.load(Ordering::Acquire);
        let mut filled = 0;

        for out in buffer.chunks_mut(channels) {
            match data.frame(start.saturating_add(filled)) {
                Some(frame) => mix_frame(frame, out),
                None => {
                    shared.ended.store(true, Ordering::Release);
                    shared.paused.store(true, Ordering::Release);
                    break;
                }
            }
            filled += 1;
        }

        // A seek from the controller thread wins over our advance.
        let _ = shared.frame.compare_exchange(
            start,
            start.saturating_add(filled),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        filled
    }
}

/// Graph node that plays an in-memory buffer once, with its own cursor.
#[derive(Debug, Clone)]
pub struct BufferSourceNode {
    id: NodeId,
    data: AudioData,
    cursor: usize,
}

impl BufferSourceNode {
    pub fn new(data: AudioData) -> Self {
        Self {
            id: NodeId::new(),
            data,
            cursor: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn fill(&mut self, buffer: &mut [f32], channels: u16) -> usize {
        let mut filled = 0;
        for out in buffer.chunks_mut(channels as usize) {
            let Some(frame) = self.data.frame(self.cursor) else {
                break;
            };
            mix_frame(frame, out);
            self.cursor += 1;
            filled += 1;
        }
        filled
    }
}

/// Anything that can feed a bus.
#[derive(Debug, Clone)]
pub(crate) enum SourceNode {
    Media(MediaSourceNode),
    Buffer(BufferSourceNode),
}

impl SourceNode {
    pub(crate) fn id(&self) -> NodeId {
        match self {
            Self::Media(node) => node.id(),
            Self::Buffer(node) => node.id(),
        }
    }

    pub(crate) fn fill(&mut self, buffer: &mut [f32], channels: u16) -> usize {
        match self {
            Self::Media(node) => node.fill(buffer, channels),
            Self::Buffer(node) => node.fill(buffer, channels),
        }
    }
}
