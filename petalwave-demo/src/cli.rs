use anyhow::{Context, Result, bail};
use petalwave::{
    AudioController, AudioEngine, AudioEvent, BiquadFilter, ControllerDesc, CpalHost, EventKind,
    FilterNode, ManualHost, Observer,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const USAGE: &str =
    "usage: petalwave-demo <url> [--seconds N] [--volume V] [--lowpass HZ] [--manual]";

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub url: String,
    pub seconds: f64,
    pub volume: f32,
    pub lowpass: Option<f32>,
    pub manual: bool,
}

impl Options {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut url = None;
        let mut seconds = 5.0;
        let mut volume = 1.0;
        let mut lowpass = None;
        let mut manual = false;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--seconds" => seconds = value(&mut iter, "--seconds")?,
                "--volume" => volume = value(&mut iter, "--volume")?,
                "--lowpass" => lowpass = Some(value(&mut iter, "--lowpass")?),
                "--manual" => manual = true,
                flag if flag.starts_with("--") => bail!("unknown option {}", flag),
                positional => {
                    if url.replace(positional.to_string()).is_some() {
                        bail!("only one url may be given");
                    }
                }
            }
        }

        Ok(Self {
            url: url.context("missing <url>")?,
            seconds,
            volume,
            lowpass,
            manual,
        })
    }
}

fn value<'a, T>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = iter
        .next()
        .with_context(|| format!("{} needs a value", flag))?;
    raw.parse()
        .with_context(|| format!("invalid value for {}: {}", flag, raw))
}

pub fn run(options: Options) -> Result<()> {
    let manual_host = ManualHost::new();
    let engine = if options.manual {
        AudioEngine::new(manual_host.clone())
    } else {
        AudioEngine::new(CpalHost::new())
    };

    let observer = Arc::new(Observer::new());
    observer.on(EventKind::Ready, |_| log::info!("Source ready"));
    observer.on(EventKind::Play, |_| log::info!("Playing"));
    observer.on(EventKind::Pause, |_| log::info!("Paused"));
    observer.once(EventKind::Decoded, |event| {
        if let AudioEvent::Decoded {
            samples,
            sample_rate,
        } = event
        {
            print_summary(samples, *sample_rate);
        }
    });

    let mut controller = AudioController::init(ControllerDesc::new(), &engine, observer)
        .context("Failed to initialize audio controller")?;
    controller.set_volume(options.volume);

    if let Some(frequency) = options.lowpass {
        log::info!("Low-pass filter at {} Hz", frequency);
        controller.set_filter(Some(FilterNode::new(BiquadFilter::low_pass(frequency))));
    }

    log::info!("Loading {}", options.url);
    controller.load(&options.url)?;
    controller
        .wait_ready(LOAD_TIMEOUT)
        .context("Source did not become ready")?;
    controller
        .wait_decoded(LOAD_TIMEOUT)
        .context("Decoding did not finish")?;

    if let Some(duration) = controller.duration() {
        log::info!("Duration: {:.2} s", duration);
    }

    controller.play(None)?;
    let destination = manual_host.destination();
    let block = Duration::from_millis(20);
    let started = Instant::now();

    while started.elapsed().as_secs_f64() < options.seconds && !controller.is_paused() {
        if let Some(destination) = &destination {
            let frames = controller.context().sample_rate() as usize / 50;
            destination.render_frames(frames);
        }
        controller.poll_events();
        std::thread::sleep(block);
        log::debug!(
            "{:.2} s ({:.0}%)",
            controller.current_time(),
            controller.played_percents() * 100.0
        );
    }

    if !controller.is_paused() {
        controller.pause()?;
    }
    log::info!("Stopped at {:.2} s", controller.current_time());
    Ok(())
}

fn print_summary(samples: &[f32], sample_rate: u32) {
    let peak = samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
    let rms = if samples.is_empty() {
        0.0
    } else {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    };
    println!(
        "decoded {} samples at {} Hz ({:.2} s), peak {:.3}, rms {:.3}",
        samples.len(),
        sample_rate,
        samples.len() as f64 / sample_rate as f64,
        peak,
        rms
    );
}
