use crossbeam_channel::{Receiver, Sender};
use petalwave::audio_data::{AudioData, MediaLoader};
use petalwave::{
    AudioContextDesc, AudioController, AudioEngine, AudioEvent, AudioFilter, ChannelNotifier,
    ControllerDesc, ControllerState, EventKind, FilterNode, ManualHost, Observer,
    PetalWaveError, Result, Routing,
};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const RATE: u32 = 8000;
const WAIT: Duration = Duration::from_secs(10);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A constant mono signal for any URL. URLs containing "slow" block until
/// the gate is released; URLs containing "missing" fail.
struct SyntheticLoader {
    value: f32,
    seconds: f64,
    gate: Receiver<()>,
}

impl SyntheticLoader {
    fn new(value: f32, seconds: f64) -> (Self, Sender<()>) {
        let (release, gate) = crossbeam_channel::bounded(0);
        (
            Self {
                value,
                seconds,
                gate,
            },
            release,
        )
    }
}

impl MediaLoader for SyntheticLoader {
    fn load(&self, url: &str) -> Result<AudioData> {
        if url.contains("missing") {
            return Err(PetalWaveError::AudioLoading(format!("{} not found", url)));
        }
        if url.contains("slow") {
            let _ = self.gate.recv_timeout(WAIT);
        }
        let frames = (self.seconds * RATE as f64) as usize;
        AudioData::new(vec![self.value; frames], RATE, 1)
    }
}

/// One second of silence at `sample_rate` with a single full-scale sample.
struct ImpulseLoader {
    sample_rate: u32,
    at: usize,
}

impl MediaLoader for ImpulseLoader {
    fn load(&self, _url: &str) -> Result<AudioData> {
        let mut samples = vec![0.0; self.sample_rate as usize];
        samples[self.at] = 1.0;
        AudioData::new(samples, self.sample_rate, 1)
    }
}

struct Mute;

impl AudioFilter for Mute {
    fn process(&mut self, block: &mut [f32], _channels: u16, _sample_rate: u32) {
        block.fill(0.0);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn engine(host: &ManualHost) -> AudioEngine {
    AudioEngine::with_desc(
        host.clone(),
        AudioContextDesc::new().sample_rate(RATE).channels(1),
    )
}

fn counter(observer: &Observer, kind: EventKind) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = count.clone();
    observer.on(kind, move |_| {
        handle.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[test]
fn unsupported_environment_fails_before_creating_nodes() {
    init_logger();
    let host = ManualHost::unsupported();
    let engine = AudioEngine::new(host.clone());

    let err = AudioController::init(ControllerDesc::new(), &engine, Arc::new(Observer::new()))
        .unwrap_err();

    assert!(matches!(err, PetalWaveError::UnsupportedEnvironment(_)));
    assert!(!engine.has_context());
    assert_eq!(host.destination_count(), 0);
}

#[test]
fn volume_round_trips() {
    init_logger();
    let host = ManualHost::new();
    let controller =
        AudioController::init(ControllerDesc::new(), &engine(&host), Arc::new(Observer::new()))
            .unwrap();

    controller.set_volume(0.5);
    assert_eq!(controller.volume(), 0.5);
}

#[test]
fn load_fires_ready_once_and_mirrors_element() {
    init_logger();
    let host = ManualHost::new();
    let observer = Arc::new(Observer::new());
    let ready = counter(&observer, EventKind::Ready);
    let (loader, _release) = SyntheticLoader::new(0.5, 20.0);
    let desc = ControllerDesc::new().loader(Arc::new(loader));
    let mut controller = AudioController::init(desc, &engine(&host), observer).unwrap();

    assert!(controller.is_paused());
    controller.load("track.mp3").unwrap();
    controller.wait_ready(WAIT).unwrap();
    controller.wait_decoded(WAIT).unwrap();
    controller.poll_events();

    assert_eq!(ready.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), ControllerState::Ready);
    assert!(controller.is_paused());
    assert_eq!(controller.duration(), Some(20.0));

    controller.play(None).unwrap();
    assert!(!controller.is_paused());
    controller.pause().unwrap();
    assert!(controller.is_paused());
}

#[test]
fn decode_fires_one_decoded_with_full_length() {
    init_logger();
    let host = ManualHost::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    let (loader, _release) = SyntheticLoader::new(0.25, 3.0);
    let desc = ControllerDesc::new().loader(Arc::new(loader));
    let mut controller =
        AudioController::init(desc, &engine(&host), Arc::new(ChannelNotifier::new(tx))).unwrap();

    controller.decode("track.mp3").unwrap();
    let samples = controller.wait_decoded(WAIT).unwrap();
    assert_eq!(samples.len(), 3 * RATE as usize);

    let decoded: Vec<AudioEvent> = rx
        .try_iter()
        .filter(|event| event.kind() == EventKind::Decoded)
        .collect();
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].samples().map(<[f32]>::len), Some(3 * RATE as usize));
    assert!(decoded[0].samples().unwrap().iter().all(|s| *s == 0.25));

    // Decoding alone attaches nothing.
    assert!(controller.is_paused());
    assert!(controller.source().is_none());
}

#[test]
fn play_with_offset_seeks_and_notifies_once() {
    init_logger();
    let host = ManualHost::new();
    let observer = Arc::new(Observer::new());
    let plays = counter(&observer, EventKind::Play);
    let (loader, _release) = SyntheticLoader::new(0.5, 20.0);
    let desc = ControllerDesc::new().loader(Arc::new(loader));
    let mut controller = AudioController::init(desc, &engine(&host), observer).unwrap();

    controller.load("track.mp3").unwrap();
    controller.wait_ready(WAIT).unwrap();
    controller.play(Some(10.0)).unwrap();

    assert_eq!(controller.current_time(), 10.0);
    assert_eq!(controller.played_percents(), 0.5);
    assert_eq!(plays.load(Ordering::SeqCst), 1);
}

#[test]
fn play_past_the_end_renders_silence_and_stops() {
    init_logger();
    let host = ManualHost::new();
    let (loader, _release) = SyntheticLoader::new(0.5, 2.0);
    let desc = ControllerDesc::new().loader(Arc::new(loader));
    let mut controller =
        AudioController::init(desc, &engine(&host), Arc::new(Observer::new())).unwrap();

    controller.load("track.mp3").unwrap();
    controller.wait_ready(WAIT).unwrap();
    controller.play(Some(1e16)).unwrap();
    assert_eq!(controller.current_time(), 2.0);
    assert_eq!(controller.played_percents(), 1.0);

    let destination = host.destination().unwrap();
    let block = destination.render_frames(64);
    assert!(block.iter().all(|s| *s == 0.0));
    assert!(controller.is_paused());
    assert_eq!(controller.state(), ControllerState::Paused);

    // Playing again after the natural end restarts from the top.
    controller.play(None).unwrap();
    let block = destination.render_frames(64);
    assert!(block.iter().all(|s| *s == 0.5));
}

#[test]
fn decode_of_other_rate_keeps_timing() {
    init_logger();
    let host = ManualHost::new();
    let loader = ImpulseLoader {
        sample_rate: RATE / 2,
        at: 1000,
    };
    let desc = ControllerDesc::new().loader(Arc::new(loader));
    let mut controller =
        AudioController::init(desc, &engine(&host), Arc::new(Observer::new())).unwrap();

    controller.decode("click.wav").unwrap();
    let samples = controller.wait_decoded(WAIT).unwrap();
    assert_eq!(samples.len(), RATE as usize);

    let peak = samples
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(i, _)| i)
        .unwrap();
    assert!((1998..=2002).contains(&peak), "peak at {}", peak);
}

#[test]
fn playback_advances_with_rendered_frames() {
    init_logger();
    let host = ManualHost::new();
    let (loader, _release) = SyntheticLoader::new(0.5, 2.0);
    let desc = ControllerDesc::new().loader(Arc::new(loader));
    let mut controller =
        AudioController::init(desc, &engine(&host), Arc::new(Observer::new())).unwrap();

    controller.load("track.mp3").unwrap();
    controller.wait_ready(WAIT).unwrap();
    controller.play(None).unwrap();

    let destination = host.destination().unwrap();
    destination.render_frames(4000);
    assert_eq!(controller.current_time(), 0.5);

    // Past the end the element stops by itself.
    destination.render_frames(20000);
    assert!(controller.is_paused());
    assert_eq!(controller.state(), ControllerState::Paused);
}

#[test]
fn gain_and_filter_apply_to_attached_source() {
    init_logger();
    let host = ManualHost::new();
    let (loader, _release) = SyntheticLoader::new(0.5, 2.0);
    let desc = ControllerDesc::new().loader(Arc::new(loader));
    let mut controller =
        AudioController::init(desc, &engine(&host), Arc::new(Observer::new())).unwrap();

    controller.load("track.mp3").unwrap();
    controller.wait_ready(WAIT).unwrap();
    controller.set_volume(0.5);
    controller.play(None).unwrap();

    let destination = host.destination().unwrap();
    let block = destination.render_frames(64);
    assert!(block.iter().all(|s| *s == 0.25));

    let mute = FilterNode::new(Mute);
    controller.set_filter(Some(mute.clone()));
    assert_eq!(controller.routing(), Routing::Filtered(mute.id()));
    let block = destination.render_frames(64);
    assert!(block.iter().all(|s| *s == 0.0));

    controller.set_filter(None);
    assert_eq!(controller.routing(), Routing::Direct);
    let block = destination.render_frames(64);
    assert!(block.iter().all(|s| *s == 0.25));
}

#[test]
fn superseded_load_never_fires_ready() {
    init_logger();
    let host = ManualHost::new();
    let observer = Arc::new(Observer::new());
    let ready = counter(&observer, EventKind::Ready);
    let (loader, release) = SyntheticLoader::new(0.5, 1.0);
    let desc = ControllerDesc::new().loader(Arc::new(loader));
    let mut controller = AudioController::init(desc, &engine(&host), observer).unwrap();

    controller.load("slow.mp3").unwrap();
    controller.load("fast.mp3").unwrap();
    controller.wait_ready(WAIT).unwrap();
    assert_eq!(controller.source().unwrap().element().url(), "fast.mp3");

    // Let the superseded workers finish; they must not signal.
    drop(release);
    std::thread::sleep(Duration::from_millis(200));
    controller.poll_events();

    assert_eq!(ready.load(Ordering::SeqCst), 1);
    assert_eq!(controller.source().unwrap().element().url(), "fast.mp3");
}

#[test]
fn stalled_load_times_out() {
    init_logger();
    let host = ManualHost::new();
    let (loader, release) = SyntheticLoader::new(0.5, 1.0);
    let desc = ControllerDesc::new().loader(Arc::new(loader));
    let mut controller =
        AudioController::init(desc, &engine(&host), Arc::new(Observer::new())).unwrap();

    controller.load("slow.mp3").unwrap();
    let err = controller.wait_ready(Duration::from_millis(50)).unwrap_err();
    assert!(matches!(err, PetalWaveError::Timeout(_)));
    assert_eq!(controller.state(), ControllerState::Loading);

    drop(release);
    controller.wait_ready(WAIT).unwrap();
    assert_eq!(controller.state(), ControllerState::Ready);
}

#[test]
fn failing_loader_reports_load_failed_without_events() {
    init_logger();
    let host = ManualHost::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    let (loader, _release) = SyntheticLoader::new(0.5, 1.0);
    let desc = ControllerDesc::new().loader(Arc::new(loader));
    let mut controller =
        AudioController::init(desc, &engine(&host), Arc::new(ChannelNotifier::new(tx))).unwrap();

    controller.load("missing.mp3").unwrap();
    let err = controller.wait_ready(WAIT).unwrap_err();
    assert!(matches!(err, PetalWaveError::LoadFailed { ref url, .. } if url == "missing.mp3"));
    assert!(err.is_async_failure());

    let err = controller.wait_decoded(WAIT).unwrap_err();
    assert!(matches!(err, PetalWaveError::LoadFailed { .. }));

    assert!(rx.try_recv().is_err());
    assert_eq!(controller.state(), ControllerState::Loading);
}

#[test]
fn cancel_pending_drops_in_flight_work() {
    init_logger();
    let host = ManualHost::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    let (loader, release) = SyntheticLoader::new(0.5, 1.0);
    let desc = ControllerDesc::new().loader(Arc::new(loader));
    let mut controller =
        AudioController::init(desc, &engine(&host), Arc::new(ChannelNotifier::new(tx))).unwrap();

    controller.load("slow.mp3").unwrap();
    controller.cancel_pending();
    assert_eq!(controller.state(), ControllerState::Initialized);
    assert!(matches!(
        controller.wait_ready(WAIT),
        Err(PetalWaveError::NothingPending(_))
    ));

    drop(release);
    std::thread::sleep(Duration::from_millis(200));
    assert!(controller.poll_events().is_empty());
    assert!(rx.try_recv().is_err());
}

#[test]
fn controllers_share_the_engine_context() {
    init_logger();
    let host = ManualHost::new();
    let engine = engine(&host);
    let first =
        AudioController::init(ControllerDesc::new(), &engine, Arc::new(Observer::new())).unwrap();
    let second =
        AudioController::init(ControllerDesc::new(), &engine, Arc::new(Observer::new())).unwrap();

    assert!(first.context().same_context(second.context()));
    assert_eq!(first.context().connected_buses(), 2);
    assert_eq!(host.destination_count(), 1);

    drop(second);
    assert_eq!(first.context().connected_buses(), 1);
}

#[test]
fn explicit_context_is_used_as_given() {
    init_logger();
    let host = ManualHost::new();
    let engine = engine(&host);
    let other = petalwave::AudioContext::new(
        &host,
        &AudioContextDesc::new().sample_rate(16000).channels(2),
    )
    .unwrap();

    let controller = AudioController::init(
        ControllerDesc::new().audio_context(other.clone()),
        &engine,
        Arc::new(Observer::new()),
    )
    .unwrap();

    assert!(controller.context().same_context(&other));
    assert_eq!(controller.context().sample_rate(), 16000);
    assert!(!engine.has_context());
}
