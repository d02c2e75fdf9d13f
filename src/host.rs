//! Output hosts: what a real-time context's destination is backed by.

use crate::config::AudioContextDesc;
use crate::error::{PetalWaveError, Result};
use crate::graph::{GraphHandle, WeakGraphHandle};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::{Arc, Mutex, MutexGuard};

/// A running destination. Dropping it stops output.
pub trait OutputStream {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
}

/// Provider of real-time audio output.
pub trait AudioHost {
    fn name(&self) -> &'static str;

    /// Whether this environment can produce audio at all.
    fn is_supported(&self) -> bool;

    /// Settle the stream format before the graph is built. Hosts that cannot
    /// honour the requested rate or channel count return what they will use.
    fn negotiate(&self, desc: &AudioContextDesc) -> Result<AudioContextDesc> {
        Ok(desc.clone())
    }

    /// Start pulling blocks from `graph` at the negotiated format.
    fn open_output(
        &self,
        desc: &AudioContextDesc,
        graph: GraphHandle,
    ) -> Result<Box<dyn OutputStream>>;
}

/// Host backed by the default `cpal` output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalHost;

impl CpalHost {
    pub fn new() -> Self {
        Self
    }

    fn device(&self) -> Result<cpal::Device> {
        cpal::default_host().default_output_device().ok_or_else(|| {
            PetalWaveError::UnsupportedEnvironment("No default output device available".into())
        })
    }
}

struct CpalOutput {
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}

impl OutputStream for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

impl AudioHost for CpalHost {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn is_supported(&self) -> bool {
        cpal::default_host().default_output_device().is_some()
    }

    fn negotiate(&self, desc: &AudioContextDesc) -> Result<AudioContextDesc> {
        let device = self.device()?;
        let requested = cpal::SampleRate(desc.sample_rate);

        let supported = device
            .supported_output_configs()
            .map_err(|e| {
                PetalWaveError::AudioDevice(format!("Failed to query output configs: {}", e))
            })?
            .any(|config| {
                config.channels() == desc.channels
                    && config.min_sample_rate() <= requested
                    && config.max_sample_rate() >= requested
            });

        if supported {
            return Ok(desc.clone());
        }

        let default_config = device.default_output_config().map_err(|e| {
            PetalWaveError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;
        log::info!(
            "{} Hz / {} ch not supported by device, using {} Hz / {} ch",
            desc.sample_rate,
            desc.channels,
            default_config.sample_rate().0,
            default_config.channels()
        );
        Ok(AudioContextDesc {
            sample_rate: default_config.sample_rate().0,
            channels: default_config.channels(),
            block_size: desc.block_size,
        })
    }

    fn open_output(
        &self,
        desc: &AudioContextDesc,
        graph: GraphHandle,
    ) -> Result<Box<dyn OutputStream>> {
        let device = self.device()?;
        let default_config = device.default_output_config().map_err(|e| {
            PetalWaveError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let config = cpal::StreamConfig {
            channels: desc.channels,
            sample_rate: cpal::SampleRate(desc.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(desc.block_size as u32),
        };

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, graph)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, graph)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, graph)?,
            other => {
                return Err(PetalWaveError::AudioFormat(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream.play().map_err(|e| {
            PetalWaveError::AudioDevice(format!("Failed to start stream: {}", e))
        })?;

        log::info!(
            "Output stream started on {}: {} Hz, {} ch, {} frames/block",
            device.name().unwrap_or_else(|_| "unknown device".into()),
            desc.sample_rate,
            desc.channels,
            desc.block_size
        );

        Ok(Box::new(CpalOutput {
            _stream: stream,
            sample_rate: desc.sample_rate,
            channels: desc.channels,
        }))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    graph: GraphHandle,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut mix_buffer: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if mix_buffer.len() != data.len() {
                    mix_buffer.resize(data.len(), 0.0);
                }

                if graph.try_render(&mut mix_buffer).is_none() {
                    log::warn!("Failed to acquire graph lock in audio callback");
                    mix_buffer.fill(0.0);
                }

                for (out, sample) in data.iter_mut().zip(&mix_buffer) {
                    *out = T::from_sample(*sample);
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| PetalWaveError::AudioDevice(format!("Failed to build stream: {}", e)))
}

/// Host without a device: the caller pulls frames through a [`ManualDestination`].
///
/// Useful headless and in tests. Clones share the list of opened destinations.
/// The host does not keep a context's graph alive; destinations whose context
/// has been dropped are forgotten.
#[derive(Debug, Clone)]
pub struct ManualHost {
    supported: bool,
    destinations: Arc<Mutex<Vec<OpenedDestination>>>,
}

#[derive(Debug)]
struct OpenedDestination {
    graph: WeakGraphHandle,
    sample_rate: u32,
    channels: u16,
}

impl ManualHost {
    pub fn new() -> Self {
        Self {
            supported: true,
            destinations: Arc::default(),
        }
    }

    /// A host that reports no audio capability.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            destinations: Arc::default(),
        }
    }

    /// The most recently opened destination whose context is still alive.
    pub fn destination(&self) -> Option<ManualDestination> {
        let destinations = self.live_destinations();
        let opened = destinations.last()?;
        Some(ManualDestination {
            graph: opened.graph.upgrade()?,
            sample_rate: opened.sample_rate,
            channels: opened.channels,
        })
    }

    /// Number of destinations whose context is still alive.
    pub fn destination_count(&self) -> usize {
        self.live_destinations().len()
    }

    fn live_destinations(&self) -> MutexGuard<'_, Vec<OpenedDestination>> {
        let mut destinations = self.destinations.lock().unwrap_or_else(|e| e.into_inner());
        destinations.retain(|opened| opened.graph.is_alive());
        destinations
    }
}

impl Default for ManualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHost for ManualHost {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn open_output(
        &self,
        desc: &AudioContextDesc,
        graph: GraphHandle,
    ) -> Result<Box<dyn OutputStream>> {
        if !self.supported {
            return Err(PetalWaveError::UnsupportedEnvironment(
                "Manual host configured without audio support".into(),
            ));
        }

        self.live_destinations().push(OpenedDestination {
            graph: graph.downgrade(),
            sample_rate: desc.sample_rate,
            channels: desc.channels,
        });
        Ok(Box::new(ManualDestination {
            graph,
            sample_rate: desc.sample_rate,
            channels: desc.channels,
        }))
    }
}

/// Pull-driven destination handed out by [`ManualHost`].
#[derive(Debug, Clone)]
pub struct ManualDestination {
    graph: GraphHandle,
    sample_rate: u32,
    channels: u16,
}

impl ManualDestination {
    /// Render the next block into `output` (interleaved). Returns frames produced by sources.
    pub fn render(&self, output: &mut [f32]) -> usize {
        self.graph.render(output)
    }

    /// Render and return `frames` frames.
    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; frames * self.channels as usize];
        self.render(&mut output);
        output
    }
}

impl OutputStream for ManualDestination {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}
