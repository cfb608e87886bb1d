//! # Analyzer Configuration
//!
//! One explicit configuration value is built per session and threaded through
//! every component. Nothing here is global: a pipeline copies what it needs at
//! construction and the configuration is immutable afterwards.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Noise-floor strategy used by the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoiseFloorMethod {
    /// Pinball-loss subgradient descent with total-variation smoothing (default).
    #[default]
    QuantileRegression,
    /// Asymmetric Huber-loss descent with the same smoothing.
    Huber,
    /// Straight line in dB against log-frequency, i.e. a 1/f power law.
    PowerLaw,
    /// Asymmetric least squares with a first-difference roughness penalty.
    Whittaker,
}

/// Parameters of the noise-floor estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseFloorConfig {
    pub method: NoiseFloorMethod,

    /// Target quantile of the fit, in (0, 1) (default: 0.2).
    pub quantile: f32,

    /// Main musical bandwidth in semitones (default: 5.0).
    /// The final smoothing pass uses half of it.
    pub smoothing_bandwidth: f32,

    /// dB added to the fitted floor before it is published (default: 10.0).
    pub threshold_offset_db: f32,

    /// Upper bound on fit iterations per hop (default: 10).
    pub max_iterations: usize,

    /// Early exit when the largest per-bin change drops below this (default: 1e-4 dB).
    pub convergence_threshold: f32,

    /// Weight of the fresh fit against the previous hop's floor, in [0, 1] (default: 1.0).
    pub temporal_alpha: f32,

    /// Base strength of the total-variation rounds (default: 0.05 dB).
    pub tv_lambda: f32,

    /// Residual at which the Huber loss turns linear (default: 3.0 dB).
    pub huber_delta: f32,

    /// Roughness penalty of the Whittaker smoother (default: 50.0).
    pub whittaker_lambda: f32,
}

impl Default for NoiseFloorConfig {
    fn default() -> Self {
        Self {
            method: NoiseFloorMethod::QuantileRegression,
            quantile: 0.2,
            smoothing_bandwidth: 5.0,
            threshold_offset_db: 10.0,
            max_iterations: 10,
            convergence_threshold: 1e-4,
            temporal_alpha: 1.0,
            tv_lambda: 0.05,
            huber_delta: 3.0,
            whittaker_lambda: 50.0,
        }
    }
}

/// Thresholds for the peak detector. All magnitudes are in dB above the floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    pub min_prominence: f32,
    pub min_distance_bins: usize,
    pub min_height: f32,
    /// How far (in bins) the prominence search walks on each side.
    pub prominence_window: usize,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            min_prominence: 20.0,
            min_distance_bins: 5,
            min_height: 10.0,
            prominence_window: 50,
        }
    }
}

/// Session configuration for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Input sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Analysis window length; must be a power of two (default: 8192).
    pub fft_size: usize,

    /// New samples required between two analyses (default: 1024).
    pub hop_size: usize,

    /// Relative weights of harmonics 1..K used by the harmonic detector.
    pub harmonic_profile: Vec<f32>,

    /// Minimum denoised level (dB) at the chosen bin for a fundamental to count as voiced.
    pub voicing_threshold_db: f32,

    /// Concert pitch used to name notes (default: 440 Hz).
    pub a4_hz: f32,

    /// Per-hop approach rate of the display spectrum towards the latest magnitudes, in (0, 1].
    pub display_smoothing: f32,

    /// Sleep between polls of the analysis worker.
    pub poll_interval_ms: u64,

    /// Extra ring capacity beyond two full windows.
    pub ring_margin: usize,

    pub noise_floor: NoiseFloorConfig,
    pub peaks: PeakConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            fft_size: 8192,
            hop_size: 1024,
            harmonic_profile: vec![1.0, 0.5, 0.33, 0.25, 0.2],
            voicing_threshold_db: 10.0,
            a4_hz: 440.0,
            display_smoothing: 0.3,
            poll_interval_ms: 5,
            ring_margin: 4096,
            noise_floor: NoiseFloorConfig::default(),
            peaks: PeakConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Number of spectrum bins (`fft_size / 2`).
    pub fn half_size(&self) -> usize {
        self.fft_size / 2
    }

    /// Width of one bin in Hz.
    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.fft_size as f32
    }

    /// Length of the harmonic product spectrum.
    pub fn hps_len(&self) -> usize {
        self.half_size() / self.harmonic_profile.len().max(1)
    }

    /// Ring buffer capacity: two windows plus the configured margin.
    pub fn ring_capacity(&self) -> usize {
        2 * self.fft_size + self.ring_margin
    }

    /// Checks every field once, before any buffer is allocated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fft_size < 4 || !self.fft_size.is_power_of_two() {
            return Err(ConfigError::FftSizeNotPowerOfTwo(self.fft_size));
        }
        if self.hop_size == 0 || self.hop_size > self.fft_size {
            return Err(ConfigError::InvalidHopSize {
                hop: self.hop_size,
                fft_size: self.fft_size,
            });
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.harmonic_profile.is_empty() || self.harmonic_profile.iter().any(|w| !w.is_finite()) {
            return Err(ConfigError::EmptyHarmonicProfile);
        }
        if self.hps_len() < 2 {
            return Err(ConfigError::TooManyHarmonics {
                harmonics: self.harmonic_profile.len(),
                bins: self.half_size(),
            });
        }
        check_range("a4_hz", self.a4_hz, self.a4_hz > 0.0, "> 0")?;
        check_range(
            "display_smoothing",
            self.display_smoothing,
            self.display_smoothing > 0.0 && self.display_smoothing <= 1.0,
            "(0, 1]",
        )?;

        let nf = &self.noise_floor;
        check_range("quantile", nf.quantile, nf.quantile > 0.0 && nf.quantile < 1.0, "(0, 1)")?;
        check_range(
            "temporal_alpha",
            nf.temporal_alpha,
            (0.0..=1.0).contains(&nf.temporal_alpha),
            "[0, 1]",
        )?;
        check_range(
            "smoothing_bandwidth",
            nf.smoothing_bandwidth,
            nf.smoothing_bandwidth > 0.0,
            "> 0 semitones",
        )?;
        check_range("tv_lambda", nf.tv_lambda, nf.tv_lambda >= 0.0, ">= 0")?;
        check_range("huber_delta", nf.huber_delta, nf.huber_delta > 0.0, "> 0")?;
        check_range(
            "whittaker_lambda",
            nf.whittaker_lambda,
            nf.whittaker_lambda >= 0.0,
            ">= 0",
        )?;
        check_range(
            "convergence_threshold",
            nf.convergence_threshold,
            nf.convergence_threshold >= 0.0,
            ">= 0",
        )?;
        check_range(
            "threshold_offset_db",
            nf.threshold_offset_db,
            nf.threshold_offset_db.is_finite(),
            "finite",
        )?;
        Ok(())
    }
}

fn check_range(name: &'static str, value: f32, ok: bool, expected: &'static str) -> Result<(), ConfigError> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value, expected })
    }
}
