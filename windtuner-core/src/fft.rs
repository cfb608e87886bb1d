//! # Fast Fourier Transform (FFT) Module
//!
//! Turns one window of raw samples into a power spectrum in decibels.
//!
//! ## Features
//! - Precomputed 4-term Blackman-Harris window
//! - Real-input FFT through RealFFT (RustFFT underneath)
//! - Power spectrum in dB, clipped away from `log(0)`
//! - Parabolic sub-bin refinement of a spectral peak
//!
//! The transform plans its FFT and allocates its workspace once, at
//! construction. [`SpectrumTransform::apply`] itself never allocates.

use std::f32::consts::PI;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::error::ConfigError;

/// Blackman-Harris coefficients.
const BH_A0: f32 = 0.35875;
const BH_A1: f32 = 0.48829;
const BH_A2: f32 = 0.14128;
const BH_A3: f32 = 0.01168;

/// Smallest power kept before conversion to dB.
pub const POWER_FLOOR: f32 = 1e-10;

/// Builds a Blackman-Harris window of `size` points.
///
/// `w[i] = a0 - a1·cos(2πi/(N-1)) + a2·cos(4πi/(N-1)) - a3·cos(6πi/(N-1))`
pub fn blackman_harris(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f32;
    (0..size)
        .map(|i| {
            let x = 2.0 * PI * i as f32 / denom;
            BH_A0 - BH_A1 * x.cos() + BH_A2 * (2.0 * x).cos() - BH_A3 * (3.0 * x).cos()
        })
        .collect()
}

/// Windowed real-input FFT producing a `size / 2` bin dB power spectrum.
pub struct SpectrumTransform {
    size: usize,
    window: Vec<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
    /// Real input; the transform uses it as workspace.
    input: Vec<f32>,
    /// `size / 2 + 1` bins; the Nyquist bin is dropped on output.
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl std::fmt::Debug for SpectrumTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumTransform").field("size", &self.size).finish()
    }
}

impl SpectrumTransform {
    /// Plans the transform for windows of `size` samples.
    ///
    /// # Returns
    /// * `Err(ConfigError::FftSizeNotPowerOfTwo)` - `size` is not a power of two >= 4
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        if size < 4 || !size.is_power_of_two() {
            return Err(ConfigError::FftSizeNotPowerOfTwo(size));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);

        log::debug!("Planned {}-point real FFT ({} bins)", size, size / 2);
        Ok(Self {
            size,
            window: blackman_harris(size),
            input: fft.make_input_vec(),
            output: fft.make_output_vec(),
            scratch: fft.make_scratch_vec(),
            fft,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn half_size(&self) -> usize {
        self.size / 2
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Windows `frame`, transforms it and writes the dB power spectrum.
    ///
    /// # Arguments
    /// * `frame` - `size` raw samples
    /// * `windowed` - `size` workspace; receives the windowed samples
    /// * `spectrum_re`, `spectrum_im` - `size / 2` each; receive the complex bins
    /// * `magnitude_db` - `size / 2`; receives `10·log10(max(|X|²·2/N, 1e-10))`
    ///
    /// # Panics
    /// * If any slice has the wrong length
    pub fn apply(
        &mut self,
        frame: &[f32],
        windowed: &mut [f32],
        spectrum_re: &mut [f32],
        spectrum_im: &mut [f32],
        magnitude_db: &mut [f32],
    ) {
        let n = self.size;
        let half = n / 2;
        assert_eq!(frame.len(), n, "frame must hold exactly one FFT window");
        assert_eq!(windowed.len(), n);
        assert_eq!(spectrum_re.len(), half);
        assert_eq!(spectrum_im.len(), half);
        assert_eq!(magnitude_db.len(), half);

        for ((w, &x), &c) in windowed.iter_mut().zip(frame).zip(&self.window) {
            *w = x * c;
        }
        self.input.copy_from_slice(windowed);

        if let Err(err) = self
            .fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
        {
            log::error!("Real FFT failed: {}", err);
            spectrum_re.fill(0.0);
            spectrum_im.fill(0.0);
            magnitude_db.fill(10.0 * POWER_FLOOR.log10());
            return;
        }

        let scale = 2.0 / n as f32;
        for (k, x) in self.output[..half].iter().enumerate() {
            spectrum_re[k] = x.re;
            spectrum_im[k] = x.im;
            let power = (x.norm_sqr() * scale).max(POWER_FLOOR);
            magnitude_db[k] = 10.0 * power.log10();
        }
    }
}

/// Frequency of every bin for a transform of `fft_size` points.
pub fn bin_frequencies(fft_size: usize, sample_rate: u32) -> Vec<f32> {
    let width = sample_rate as f32 / fft_size as f32;
    (0..fft_size / 2).map(|i| i as f32 * width).collect()
}

/// Refines a peak bin to sub-bin accuracy.
///
/// Fits a parabola through the dB values of `bin - 1`, `bin`, `bin + 1`.
///
/// # Arguments
/// * `spectrum_db` - dB spectrum
/// * `bin` - index of a local maximum
/// * `bin_width` - Hz per bin
///
/// # Returns
/// * Refined frequency in Hz; the bin centre when refinement is not possible
pub fn refine_peak_frequency(spectrum_db: &[f32], bin: usize, bin_width: f32) -> f32 {
    let centre = bin as f32 * bin_width;
    if bin == 0 || bin + 1 >= spectrum_db.len() {
        return centre;
    }

    let y1 = spectrum_db[bin - 1];
    let y2 = spectrum_db[bin];
    let y3 = spectrum_db[bin + 1];
    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return centre;
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return centre;
    }

    let shift = (0.5 * (y3 - y1) / denominator).clamp(-0.5, 0.5);
    (bin as f32 + shift) * bin_width
}
