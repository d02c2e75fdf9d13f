use super::NodeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Volume multiplier shared between a controller and the audio callback.
///
/// The value is stored as raw `f32` bits, so whatever is written is read back
/// unchanged. No clamping is applied.
#[derive(Debug, Clone)]
pub struct GainNode {
    id: NodeId,
    value: Arc<AtomicU32>,
}

impl GainNode {
    pub fn new(gain: f32) -> Self {
        Self {
            id: NodeId::new(),
            value: Arc::new(AtomicU32::new(gain.to_bits())),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn set_gain(&self, gain: f32) {
        self.value.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Relaxed))
    }

    /// Scale `buffer` in place by the current gain.
    pub fn apply(&self, buffer: &mut [f32]) {
        let gain = self.gain();
        if gain == 1.0 {
            return;
        }
        for sample in buffer.iter_mut() {
            *sample *= gain;
        }
    }
}

impl Default for GainNode {
    fn default() -> Self {
        Self::new(1.0)
    }
}
