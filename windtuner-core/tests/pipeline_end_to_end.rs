//! End-to-end checks: synthetic signal through the ring buffer and the full pipeline.

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use windtuner_core::{AnalyzerConfig, NoiseFloorMethod, SharedRingBuffer, SpectrumPipeline};

const SAMPLE_RATE: u32 = 44100;

/// `len` samples of a unit sine at `freq` plus uniform noise of amplitude `noise`.
fn noisy_tone(len: usize, freq: f32, noise: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (2.0 * PI * freq * t).sin() + rng.gen_range(-noise..noise)
        })
        .collect()
}

/// Streams `signal` into a ring buffer in hop-sized writes, running a cycle after each.
fn stream(pipeline: &mut SpectrumPipeline, signal: &[f32]) -> usize {
    let ring = SharedRingBuffer::new(pipeline.config().ring_capacity());
    let hop = pipeline.config().hop_size;
    let mut analyses = 0;
    for chunk in signal.chunks(hop) {
        ring.push_samples(chunk);
        if pipeline.run_cycle(&ring) {
            analyses += 1;
        }
    }
    assert_eq!(ring.overrun_samples(), 0);
    analyses
}

#[test]
fn test_a440_with_noise() {
    let config = AnalyzerConfig::default();
    let bin_width = config.bin_width();
    let mut pipeline = SpectrumPipeline::new(config).unwrap();

    let signal = noisy_tone(8192 + 8 * 1024, 440.0, 0.01, 7);
    let analyses = stream(&mut pipeline, &signal);
    assert_eq!(analyses, 9);

    let result = pipeline.result();
    let fundamental = result.fundamental.expect("A440 should be voiced");
    assert!(
        (fundamental - 440.0).abs() <= bin_width,
        "fundamental {fundamental} Hz too far from 440 Hz"
    );

    assert_eq!(result.peaks.len(), 1, "peaks: {:?}", result.peaks);
    let expected_bin = 440.0 / bin_width;
    assert!((result.peaks[0].bin_index as f32 - expected_bin).abs() <= 1.5);

    assert!(result.denoised_db.iter().all(|&v| v >= 0.0));

    let note = result.note.expect("voiced result should name a note");
    assert_eq!(note.name, "A4");
    assert!(note.cents.abs() < 25.0);
}

#[test]
fn test_every_floor_method_finds_a440() {
    for method in [
        NoiseFloorMethod::QuantileRegression,
        NoiseFloorMethod::Huber,
        NoiseFloorMethod::PowerLaw,
        NoiseFloorMethod::Whittaker,
    ] {
        let mut config = AnalyzerConfig::default();
        config.noise_floor.method = method;
        let bin_width = config.bin_width();
        let mut pipeline = SpectrumPipeline::new(config).unwrap();

        stream(&mut pipeline, &noisy_tone(8192 + 4 * 1024, 440.0, 0.01, 11));

        let fundamental = pipeline.fundamental();
        assert!(
            fundamental.is_some_and(|f| (f - 440.0).abs() <= bin_width),
            "{method:?}: fundamental {fundamental:?}"
        );
        assert!(pipeline.denoised_db().iter().all(|&v| v >= 0.0));
    }
}

#[test]
fn test_noise_alone_is_unvoiced() {
    let mut rng = StdRng::seed_from_u64(3);
    let noise: Vec<f32> = (0..8192 + 4 * 1024).map(|_| rng.gen_range(-0.01..0.01)).collect();

    let mut pipeline = SpectrumPipeline::new(AnalyzerConfig::default()).unwrap();
    stream(&mut pipeline, &noise);

    let result = pipeline.result();
    assert!(result.fundamental.is_none());
    assert!(result.note.is_none());
    assert!(result.peaks.is_empty(), "peaks: {:?}", result.peaks);
}

#[test]
fn test_result_region_lengths() {
    let mut pipeline = SpectrumPipeline::new(AnalyzerConfig::default()).unwrap();
    pipeline.analyze(&noisy_tone(8192, 440.0, 0.01, 5));
    let result = pipeline.result();
    assert_eq!(result.magnitude_db.len(), 4096);
    assert_eq!(result.frequencies.len(), 4096);
    assert_eq!(result.hps.len(), 4096 / 5);
    assert_eq!(result.noise_floor_db.len(), 4096);
}
