use super::NodeId;
use std::any::Any;
use std::f32::consts::PI;
use std::fmt;
use std::sync::{Arc, Mutex};

/// In-place processor that can be wired between a gain node and the destination.
pub trait AudioFilter: Any + Send {
    /// Process one block of interleaved samples.
    fn process(&mut self, block: &mut [f32], channels: u16, sample_rate: u32);

    /// Clear any internal state (delay lines etc.)
    fn reset(&mut self) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared handle to an externally supplied filter.
///
/// The controller never owns the filter; it only wires the handle into its graph.
#[derive(Clone)]
pub struct FilterNode {
    id: NodeId,
    processor: Arc<Mutex<Box<dyn AudioFilter>>>,
}

impl FilterNode {
    pub fn new<F: AudioFilter>(filter: F) -> Self {
        Self {
            id: NodeId::new(),
            processor: Arc::new(Mutex::new(Box::new(filter))),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Mutate the wrapped filter if it is an `F`. Returns `false` on a type mismatch.
    pub fn update<F: AudioFilter>(&self, f: impl FnOnce(&mut F)) -> bool {
        let mut guard = self.processor.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_any_mut().downcast_mut::<F>() {
            Some(filter) => {
                f(filter);
                true
            }
            None => false,
        }
    }

    pub fn reset(&self) {
        self.processor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
    }

    /// Called from the audio thread; a block is left unfiltered if the filter is being updated.
    pub(crate) fn process(&self, block: &mut [f32], channels: u16, sample_rate: u32) {
        match self.processor.try_lock() {
            Ok(mut filter) => filter.process(block, channels, sample_rate),
            Err(_) => log::debug!("Filter {} busy, passing block through", self.id),
        }
    }
}

impl PartialEq for FilterNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterNode").field("id", &self.id).finish()
    }
}

/// Response shape of a [`BiquadFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    LowPass,
    HighPass,
    BandPass,
    Notch,
}

#[derive(Debug, Clone, Copy, Default)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

/// Second-order IIR filter (RBJ audio EQ cookbook), with independent state per channel.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    filter_type: FilterType,
    frequency: f32,
    q: f32,
    coefficients: Coefficients,
    designed_for: Option<u32>,
    // x1, x2, y1, y2 per channel
    state: Vec<[f32; 4]>,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, frequency: f32, q: f32) -> Self {
        Self {
            filter_type,
            frequency,
            q,
            coefficients: Coefficients::default(),
            designed_for: None,
            state: Vec::new(),
        }
    }

    pub fn low_pass(frequency: f32) -> Self {
        Self::new(FilterType::LowPass, frequency, std::f32::consts::FRAC_1_SQRT_2)
    }

    pub fn high_pass(frequency: f32) -> Self {
        Self::new(FilterType::HighPass, frequency, std::f32::consts::FRAC_1_SQRT_2)
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency;
        self.designed_for = None;
    }

    pub fn set_q(&mut self, q: f32) {
        self.q = q;
        self.designed_for = None;
    }

    pub fn set_filter_type(&mut self, filter_type: FilterType) {
        self.filter_type = filter_type;
        self.designed_for = None;
    }

    fn design(&mut self, sample_rate: u32) {
        let fs = sample_rate as f32;
        // Keep the design inside (0, nyquist) so the filter stays stable.
        let frequency = self.frequency.clamp(1.0e-3, fs * 0.499);
        let q = self.q.max(1.0e-4);

        let w0 = 2.0 * PI * frequency / fs;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2) = match self.filter_type {
            FilterType::LowPass => ((1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0),
            FilterType::HighPass => ((1.0 + cos_w0) / 2.0, -(1.0 + cos_w0), (1.0 + cos_w0) / 2.0),
            FilterType::BandPass => (alpha, 0.0, -alpha),
            FilterType::Notch => (1.0, -2.0 * cos_w0, 1.0),
        };
        let a0 = 1.0 + alpha;

        self.coefficients = Coefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        };
        self.designed_for = Some(sample_rate);
    }
}

impl AudioFilter for BiquadFilter {
    fn process(&mut self, block: &mut [f32], channels: u16, sample_rate: u32) {
        if channels == 0 || sample_rate == 0 {
            return;
        }
        if self.designed_for != Some(sample_rate) {
            self.design(sample_rate);
        }
        let channels = channels as usize;
        if self.state.len() != channels {
            self.state = vec![[0.0; 4]; channels];
        }

        let c = self.coefficients;
        for frame in block.chunks_mut(channels) {
            for (sample, state) in frame.iter_mut().zip(self.state.iter_mut()) {
                let [x1, x2, y1, y2] = *state;
                let x0 = *sample;
                let y0 = c.b0 * x0 + c.b1 * x1 + c.b2 * x2 - c.a1 * y1 - c.a2 * y2;
                *state = [x0, x1, y0, y1];
                *sample = y0;
            }
        }
    }

    fn reset(&mut self) {
        self.state.iter_mut().for_each(|s| *s = [0.0; 4]);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn low_pass_attenuates_high_frequencies() {
        let mut filter = BiquadFilter::low_pass(200.0);
        let mut block = sine(3000.0, 8000, 8000);
        let before = rms(&block[4000..]);
        filter.process(&mut block, 1, 8000);
        assert!(rms(&block[4000..]) < before * 0.1);
    }

    #[test]
    fn low_pass_passes_dc() {
        let mut filter = BiquadFilter::low_pass(500.0);
        let mut block = vec![1.0f32; 4000];
        filter.process(&mut block, 1, 8000);
        assert!((block[3999] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn high_pass_blocks_dc() {
        let mut filter = BiquadFilter::high_pass(500.0);
        let mut block = vec![1.0f32; 4000];
        filter.process(&mut block, 1, 8000);
        assert!(block[3999].abs() < 1e-3);
    }

    #[test]
    fn channels_are_filtered_independently() {
        let mut filter = BiquadFilter::high_pass(500.0);
        // left is DC, right is silence
        let mut block: Vec<f32> = (0..4000).flat_map(|_| [1.0, 0.0]).collect();
        filter.process(&mut block, 2, 8000);
        assert!(block.iter().skip(1).step_by(2).all(|s| *s == 0.0));
    }

    #[test]
    fn node_update_downcasts() {
        let node = FilterNode::new(BiquadFilter::low_pass(1000.0));
        assert!(node.update::<BiquadFilter>(|f| f.set_frequency(250.0)));

        struct Passthrough;
        impl AudioFilter for Passthrough {
            fn process(&mut self, _: &mut [f32], _: u16, _: u32) {}
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
        assert!(!node.update::<Passthrough>(|_| {}));

        let mut frequency = 0.0;
        node.update::<BiquadFilter>(|f| frequency = f.frequency());
        assert_eq!(frequency, 250.0);
    }

    #[test]
    fn node_equality_is_identity() {
        let a = FilterNode::new(BiquadFilter::low_pass(100.0));
        let b = FilterNode::new(BiquadFilter::low_pass(100.0));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
