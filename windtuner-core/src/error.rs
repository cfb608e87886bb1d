//! Error types for the analysis core.
//!
//! Only construction can fail. Once a pipeline exists every stage is
//! infallible: warm-up is reported through boolean returns and numerical
//! edge cases are absorbed with epsilons.

use thiserror::Error;

/// Errors raised while validating a configuration or building a pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The FFT size must be a power of two (and at least 4).
    #[error("FFT size {0} is not a power of two >= 4")]
    FftSizeNotPowerOfTwo(usize),

    /// The hop size must be in `1..=fft_size`.
    #[error("hop size {hop} must be between 1 and the FFT size {fft_size}")]
    InvalidHopSize { hop: usize, fft_size: usize },

    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("harmonic profile must contain at least one finite weight")]
    EmptyHarmonicProfile,

    /// More harmonics than bins to search leaves no fundamental candidates.
    #[error("harmonic profile of {harmonics} entries leaves no candidates in {bins} bins")]
    TooManyHarmonics { harmonics: usize, bins: usize },

    /// A numeric parameter is outside its valid range.
    #[error("{name} = {value} is out of range ({expected})")]
    OutOfRange {
        name: &'static str,
        value: f32,
        expected: &'static str,
    },
}
