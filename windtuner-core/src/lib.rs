// windtuner-core/src/lib.rs

//! The core logic for the wind instrument tuner.
//! This crate turns a live sample stream into a denoised spectrum, a
//! fundamental estimate and a list of spectral peaks. It is completely
//! headless and contains no presentation code.

#[cfg(feature = "capture")]
pub mod audio;
pub mod arena;
pub mod config;
pub mod denoise;
pub mod error;
pub mod fft;
pub mod harmonic;
pub mod noise_floor;
pub mod peaks;
pub mod pipeline;
pub mod ring_buffer;
pub mod tuning;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use config::{AnalyzerConfig, NoiseFloorConfig, NoiseFloorMethod, PeakConfig};
pub use error::ConfigError;
pub use peaks::Peak;
pub use pipeline::SpectrumPipeline;
pub use ring_buffer::SharedRingBuffer;
pub use tuning::NoteReading;
pub use worker::{AnalysisWorker, LatestResult, ResultSink};

/// Represents the result of a single analysis cycle.
///
/// Owned copy of the arena contents, safe to hand to other threads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Samples written to the ring buffer when the window was taken.
    pub position: u64,
    /// Raw power spectrum in dB.
    pub magnitude_db: Vec<f32>,
    /// Published noise floor in dB.
    pub noise_floor_db: Vec<f32>,
    /// Spectrum minus floor, clipped at zero.
    pub denoised_db: Vec<f32>,
    /// Frequency of each bin in Hz.
    pub frequencies: Vec<f32>,
    /// Harmonic product spectrum.
    pub hps: Vec<f32>,
    /// Exponentially smoothed magnitude spectrum for display.
    pub display_db: Vec<f32>,
    /// The detected fundamental in Hz, when voiced.
    pub fundamental: Option<f32>,
    /// The nearest note to the fundamental.
    pub note: Option<NoteReading>,
    pub peaks: Vec<Peak>,
}
