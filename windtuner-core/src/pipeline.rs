//! # Analysis Pipeline
//!
//! One parameterized pipeline per session:
//!
//! ```text
//! ring buffer ─▶ window/FFT ─▶ noise floor ─▶ denoise ─▶ harmonic detector
//!                                                     └─▶ peak detector
//! ```
//!
//! Every intermediate buffer is an arena region, so [`SpectrumPipeline::run_cycle`]
//! does not allocate. Scheduling is left to the caller: a worker thread (see
//! [`crate::worker`]), a timer, or a test calling `analyze` directly.

use crate::AnalysisResult;
use crate::arena::{Arena, ArenaLayout, RegionId};
use crate::config::AnalyzerConfig;
use crate::denoise::denoise;
use crate::error::ConfigError;
use crate::fft::{SpectrumTransform, bin_frequencies};
use crate::harmonic::{HarmonicDetector, HarmonicEstimate};
use crate::noise_floor::{FloorState, NoiseFloorEstimator};
use crate::peaks::{Peak, find_peaks_into};
use crate::ring_buffer::SharedRingBuffer;
use crate::tuning;

/// The full analysis chain and its pre-allocated state.
#[derive(Debug)]
pub struct SpectrumPipeline {
    config: AnalyzerConfig,
    arena: Arena,
    transform: SpectrumTransform,
    estimator: NoiseFloorEstimator,
    detector: HarmonicDetector,
    frequencies: Vec<f32>,
    peaks: Vec<Peak>,
    estimate: HarmonicEstimate,
    /// Stream position (samples written) of the last analysed window.
    last_position: Option<u64>,
    display_primed: bool,
    cycles: u64,
}

impl SpectrumPipeline {
    /// Validates `config` and allocates everything the session needs.
    ///
    /// # Returns
    /// * `Err(ConfigError)` - invalid configuration; fatal for the session
    pub fn new(config: AnalyzerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let half = config.half_size();
        let transform = SpectrumTransform::new(config.fft_size)?;
        let estimator = NoiseFloorEstimator::new(&config.noise_floor, half, config.bin_width());
        let detector = HarmonicDetector::new(
            &config.harmonic_profile,
            config.sample_rate,
            config.voicing_threshold_db,
        );
        let arena = Arena::new(ArenaLayout::for_config(&config));

        log::debug!(
            "Pipeline ready: {} Hz, {}-point FFT, hop {}, {:.2} Hz/bin",
            config.sample_rate,
            config.fft_size,
            config.hop_size,
            config.bin_width()
        );

        Ok(Self {
            frequencies: bin_frequencies(config.fft_size, config.sample_rate),
            // a strict local maximum needs at least two bins
            peaks: Vec::with_capacity(half / 2 + 1),
            config,
            arena,
            transform,
            estimator,
            detector,
            estimate: HarmonicEstimate::default(),
            last_position: None,
            display_primed: false,
            cycles: 0,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Number of analyses run so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Pulls the latest window from `ring` and analyses it.
    ///
    /// # Returns
    /// * `false` - still warming up, or fewer than `hop_size` new samples since the last analysis
    /// * `true` - a new analysis is available through the accessors and [`result`](Self::result)
    pub fn run_cycle(&mut self, ring: &SharedRingBuffer) -> bool {
        let position = ring.total_written();
        if let Some(last) = self.last_position {
            if position.saturating_sub(last) < self.config.hop_size as u64 {
                return false;
            }
        }

        let frame = self.arena.region_mut(RegionId::Frame);
        let Some(position) = ring.extract_latest(frame) else {
            return false;
        };
        self.last_position = Some(position);
        self.process();
        true
    }

    /// Analyses one window of exactly `fft_size` samples.
    ///
    /// # Panics
    /// * If `samples.len() != fft_size`
    pub fn analyze(&mut self, samples: &[f32]) {
        assert_eq!(
            samples.len(),
            self.config.fft_size,
            "input frame size must equal the FFT size"
        );
        self.arena.region_mut(RegionId::Frame).copy_from_slice(samples);
        self.process();
    }

    /// Restarts temporal state: the next window re-seeds the noise floor.
    pub fn reset(&mut self) {
        self.estimator.reset();
        self.arena.clear();
        self.last_position = None;
        self.display_primed = false;
        self.estimate = HarmonicEstimate::default();
        self.peaks.clear();
    }

    fn process(&mut self) {
        let views = self.arena.views_mut();

        self.transform.apply(
            views.frame,
            views.windowed,
            views.spectrum_re,
            views.spectrum_im,
            views.magnitude_db,
        );

        self.estimator.fit(
            views.magnitude_db,
            FloorState {
                current: views.floor_current,
                previous: views.floor_previous,
                scratch: views.floor_scratch,
            },
            views.noise_floor_db,
        );

        denoise(views.magnitude_db, views.noise_floor_db, views.denoised_db);

        let mut estimate = self.detector.detect(views.denoised_db, views.hps);
        if estimate.voiced {
            self.detector.refine(&mut estimate, views.magnitude_db);
        }
        self.estimate = estimate;

        find_peaks_into(
            views.denoised_db,
            &self.frequencies,
            &self.config.peaks,
            &mut self.peaks,
        );

        views.display_target.copy_from_slice(views.magnitude_db);
        if self.display_primed {
            let rate = self.config.display_smoothing;
            for (current, &target) in views.display_current.iter_mut().zip(views.display_target.iter()) {
                *current += rate * (target - *current);
            }
        } else {
            views.display_current.copy_from_slice(views.display_target);
            self.display_primed = true;
        }

        self.cycles += 1;
        log::trace!(
            "Cycle {}: bin {} ({:.1} Hz, voiced={}), {} peaks, {} floor iterations",
            self.cycles,
            estimate.bin,
            estimate.refined_frequency,
            estimate.voiced,
            self.peaks.len(),
            self.estimator.last_iterations()
        );
    }

    pub fn magnitude_db(&self) -> &[f32] {
        self.arena.region(RegionId::MagnitudeDb)
    }

    pub fn noise_floor_db(&self) -> &[f32] {
        self.arena.region(RegionId::NoiseFloorDb)
    }

    pub fn denoised_db(&self) -> &[f32] {
        self.arena.region(RegionId::DenoisedDb)
    }

    pub fn hps(&self) -> &[f32] {
        self.arena.region(RegionId::Hps)
    }

    pub fn display_db(&self) -> &[f32] {
        self.arena.region(RegionId::DisplayCurrent)
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn estimate(&self) -> HarmonicEstimate {
        self.estimate
    }

    /// Fundamental in Hz when the last analysis was voiced.
    pub fn fundamental(&self) -> Option<f32> {
        self.estimate.voiced.then_some(self.estimate.refined_frequency)
    }

    /// Copies the last analysis out of the arena.
    ///
    /// This is the handoff point to other threads, and it allocates.
    pub fn result(&self) -> AnalysisResult {
        let fundamental = self.fundamental();
        AnalysisResult {
            position: self.last_position.unwrap_or(0),
            magnitude_db: self.magnitude_db().to_vec(),
            noise_floor_db: self.noise_floor_db().to_vec(),
            denoised_db: self.denoised_db().to_vec(),
            frequencies: self.frequencies.clone(),
            hps: self.hps().to_vec(),
            display_db: self.display_db().to_vec(),
            fundamental,
            note: fundamental.and_then(|f| tuning::find_nearest_note(f, self.config.a4_hz)),
            peaks: self.peaks.clone(),
        }
    }
}
