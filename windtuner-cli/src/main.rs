//! # Windtuner - Command Line Tuner
//!
//! Runs the analysis pipeline over a WAV file, or over the default input
//! device when built with the `capture` feature, and prints one line per
//! analysis.
//!
//! ## Usage
//! ```text
//! windtuner [--json] [--config FILE] [--method NAME] [--a4 HZ] <file.wav>
//! windtuner [--json] [--config FILE] --live        (capture feature)
//! ```
//!
//! Logging goes to stderr through `env_logger`; set `RUST_LOG=debug` for detail.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use windtuner_core::{AnalysisResult, AnalyzerConfig, NoiseFloorMethod, SharedRingBuffer, SpectrumPipeline};

#[derive(Debug, Default)]
struct Options {
    json: bool,
    live: bool,
    config: Option<PathBuf>,
    method: Option<NoiseFloorMethod>,
    a4_hz: Option<f32>,
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = parse_args(std::env::args().skip(1))?;
    let mut config = load_config(options.config.as_deref())?;
    if let Some(method) = options.method {
        config.noise_floor.method = method;
    }
    if let Some(a4_hz) = options.a4_hz {
        config.a4_hz = a4_hz;
    }

    if options.live {
        return run_live(config, options.json);
    }
    let Some(input) = options.input.as_deref() else {
        bail!("no input file given (see --help)");
    };
    run_file(input, config, options.json)
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Options> {
    let mut options = Options::default();
    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => options.json = true,
            "--live" => options.live = true,
            "--config" => {
                let path = args.next().context("--config needs a file")?;
                options.config = Some(PathBuf::from(path));
            }
            "--method" => {
                let name = args.next().context("--method needs a name")?;
                options.method = Some(parse_method(&name)?);
            }
            "--a4" => {
                let value = args.next().context("--a4 needs a frequency")?;
                options.a4_hz = Some(value.parse().with_context(|| format!("invalid --a4 value {value:?}"))?);
            }
            "-h" | "--help" => {
                println!(
                    "usage: windtuner [--json] [--config FILE] [--method quantile|huber|power-law|whittaker] [--a4 HZ] (<file.wav> | --live)"
                );
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown option {other}"),
            other => options.input = Some(PathBuf::from(other)),
        }
    }
    Ok(options)
}

fn parse_method(name: &str) -> Result<NoiseFloorMethod> {
    Ok(match name {
        "quantile" => NoiseFloorMethod::QuantileRegression,
        "huber" => NoiseFloorMethod::Huber,
        "power-law" => NoiseFloorMethod::PowerLaw,
        "whittaker" => NoiseFloorMethod::Whittaker,
        other => bail!("unknown noise floor method {other:?}"),
    })
}

/// Reads an `AnalyzerConfig` from JSON; missing fields keep their defaults.
fn load_config(path: Option<&Path>) -> Result<AnalyzerConfig> {
    let Some(path) = path else {
        return Ok(AnalyzerConfig::default());
    };
    let file = File::open(path).with_context(|| format!("failed to open config {}", path.display()))?;
    let config = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Loads a WAV file as mono f32 samples.
fn load_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max_value = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_value))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let mono = if channels == 1 {
        samples
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    log::info!(
        "Loaded {}: {} samples at {} Hz ({} channel(s))",
        path.display(),
        mono.len(),
        spec.sample_rate,
        spec.channels
    );
    Ok((mono, spec.sample_rate))
}

/// Streams the file through the ring buffer one hop at a time and runs a cycle per hop.
fn run_file(path: &Path, mut config: AnalyzerConfig, json: bool) -> Result<()> {
    let (samples, sample_rate) = load_wav(path)?;
    config.sample_rate = sample_rate;

    let ring = SharedRingBuffer::new(config.ring_capacity());
    let hop = config.hop_size;
    let mut pipeline = SpectrumPipeline::new(config)?;

    for chunk in samples.chunks(hop) {
        ring.push_samples(chunk);
        if pipeline.run_cycle(&ring) {
            report(&pipeline.result(), sample_rate, json)?;
        }
    }

    if pipeline.cycles() == 0 {
        log::warn!("File is shorter than one analysis window; nothing analysed");
    }
    Ok(())
}

#[cfg(feature = "capture")]
fn run_live(mut config: AnalyzerConfig, json: bool) -> Result<()> {
    use std::sync::Arc;
    use windtuner_core::{AnalysisWorker, audio};

    let ring = Arc::new(SharedRingBuffer::new(config.ring_capacity()));
    let (_stream, sample_rate) = audio::start_audio_capture(Arc::clone(&ring), config.sample_rate)?;
    if sample_rate != config.sample_rate {
        log::info!("Device runs at {} Hz instead of {} Hz", sample_rate, config.sample_rate);
        config.sample_rate = sample_rate;
    }

    let pipeline = SpectrumPipeline::new(config)?;
    let (tx, rx) = crossbeam_channel::bounded::<AnalysisResult>(8);
    let _worker = AnalysisWorker::spawn(pipeline, ring, tx)?;

    log::info!("Listening; press Ctrl+C to stop");
    for result in rx {
        report(&result, sample_rate, json)?;
    }
    Ok(())
}

#[cfg(not(feature = "capture"))]
fn run_live(_config: AnalyzerConfig, _json: bool) -> Result<()> {
    bail!("live input needs the `capture` feature (cargo run --features capture)")
}

fn report(result: &AnalysisResult, sample_rate: u32, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&Summary::from(result))?);
        return Ok(());
    }

    let seconds = result.position as f32 / sample_rate as f32;
    match &result.note {
        Some(note) => println!(
            "{:>8.2}s  {:>8.2} Hz  {:<4} {:+6.1} cents  {} peak(s)",
            seconds,
            result.fundamental.unwrap_or(0.0),
            note.name,
            note.cents,
            result.peaks.len()
        ),
        None => println!("{:>8.2}s  unvoiced  {} peak(s)", seconds, result.peaks.len()),
    }
    Ok(())
}

/// JSON line without the full spectra.
#[derive(serde::Serialize)]
struct Summary<'a> {
    position: u64,
    fundamental: Option<f32>,
    note: Option<&'a windtuner_core::NoteReading>,
    peaks: &'a [windtuner_core::Peak],
}

impl<'a> From<&'a AnalysisResult> for Summary<'a> {
    fn from(result: &'a AnalysisResult) -> Self {
        Self {
            position: result.position,
            fundamental: result.fundamental,
            note: result.note.as_ref(),
            peaks: &result.peaks,
        }
    }
}
