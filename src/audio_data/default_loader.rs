use crate::{
    audio_data::{AudioData, MediaLoader},
    error::{PetalWaveError, Result},
};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use symphonia::{
    core::{
        audio::SampleBuffer,
        codecs::{CODEC_TYPE_NULL, DecoderOptions},
        errors::Error,
        formats::FormatOptions,
        io::{MediaSource, MediaSourceStream},
        meta::MetadataOptions,
        probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Default media loader: fetches the resource and decodes it with Symphonia.
///
/// Accepted URLs:
/// - plain filesystem paths
/// - `file://` URLs
/// - `http://` and `https://` URLs (fetched in full with a blocking client)
///
/// # Examples
///
/// ```ignore
/// use petalwave::audio_data::{DefaultMediaLoader, MediaLoader};
///
/// let audio = DefaultMediaLoader::default().load("https://example.com/track.mp3")?;
/// ```
#[derive(Debug, Clone)]
pub struct DefaultMediaLoader {
    /// Timeout for HTTP requests (None = no timeout)
    pub http_timeout: Option<Duration>,
}

impl Default for DefaultMediaLoader {
    fn default() -> Self {
        Self {
            http_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl DefaultMediaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn http_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.http_timeout = timeout;
        self
    }

    fn open(&self, url: &str) -> Result<Box<dyn MediaSource>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            log::debug!("Fetching {}", url);
            let mut builder = reqwest::blocking::Client::builder();
            if let Some(timeout) = self.http_timeout {
                builder = builder.timeout(timeout);
            }
            let client = builder.build().map_err(|e| {
                PetalWaveError::AudioLoading(format!("Failed to build HTTP client: {}", e))
            })?;
            let bytes = client
                .get(url)
                .send()
                .and_then(|response| response.error_for_status())
                .and_then(|response| response.bytes())
                .map_err(|e| PetalWaveError::AudioLoading(format!("HTTP fetch failed: {}", e)))?;
            log::debug!("Fetched {} bytes from {}", bytes.len(), url);
            return Ok(Box::new(Cursor::new(bytes.to_vec())));
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        Ok(Box::new(File::open(path)?))
    }
}

/// File extension of the last path segment, ignoring any query or fragment.
pub(crate) fn extension_hint(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    Path::new(name).extension().and_then(|e| e.to_str())
}

impl MediaLoader for DefaultMediaLoader {
    fn load(&self, url: &str) -> Result<AudioData> {
        let source = self.open(url)?;
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension_hint(url) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                PetalWaveError::AudioLoading(format!("Failed to probe audio format: {:?}", e))
            })?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| PetalWaveError::AudioLoading("No audio track found".to_string()))?;
        let track_id = track.id;

        let mut sample_rate = track.codec_params.sample_rate;
        let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                PetalWaveError::AudioLoading(format!("Failed to create decoder: {:?}", e))
            })?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => break, // end-of-stream
                Err(Error::ResetRequired) => break,
                Err(e) => {
                    return Err(PetalWaveError::AudioLoading(format!(
                        "Error reading packet: {:?}",
                        e
                    )));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => break,
                Err(Error::DecodeError(e)) => {
                    log::debug!("Skipping corrupt packet in {}: {}", url, e);
                    continue;
                }
                Err(e) => {
                    return Err(PetalWaveError::AudioLoading(format!(
                        "Error decoding packet: {:?}",
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            sample_rate.get_or_insert(spec.rate);
            channels.get_or_insert(spec.channels.count() as u16);

            let mut tmp = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            tmp.copy_interleaved_ref(decoded);
            samples.extend_from_slice(tmp.samples());
        }

        let sample_rate = sample_rate
            .ok_or_else(|| PetalWaveError::AudioLoading("Sample rate not found".to_string()))?;
        let channels = channels
            .ok_or_else(|| PetalWaveError::AudioLoading("Channel count not found".to_string()))?;

        let audio = AudioData::new(samples, sample_rate, channels)?;
        log::info!(
            "Decoded {}: {} frames, {} Hz, {} ch",
            url,
            audio.total_frames(),
            sample_rate,
            channels
        );
        Ok(audio)
    }
}
