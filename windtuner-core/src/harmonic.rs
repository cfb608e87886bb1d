//! # Harmonic Fundamental Detection
//!
//! Finds the fundamental of a harmonic tone in the denoised spectrum with an
//! adaptively weighted harmonic product spectrum (HPS).
//!
//! ## Algorithm
//! For each candidate bin `i` in `1..count / K`:
//! ```text
//! snr_i  = m[i] / (mean(m) + ε)
//! aw_i   = 1 - exp(-snr_i)
//! hps[i] = aw_i · Σ_h profile[h] · m[i · (h + 1)]
//! ```
//! The adaptive weight suppresses candidates whose own bin is weak, which is
//! what keeps sub-harmonics of a strong tone from winning. The argmax of the
//! HPS is the fundamental bin.

use crate::fft::refine_peak_frequency;

const SNR_EPSILON: f32 = 1e-6;

/// Result of one detection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HarmonicEstimate {
    /// Winning bin of the HPS.
    pub bin: usize,
    /// Bin-centre frequency in Hz.
    pub frequency: f32,
    /// Sub-bin refined frequency in Hz (equal to `frequency` until refined).
    pub refined_frequency: f32,
    /// HPS value at `bin`.
    pub strength: f32,
    /// Whether the tone is strong enough to be trusted.
    pub voiced: bool,
}

/// Harmonic product spectrum detector for one session.
#[derive(Debug, Clone)]
pub struct HarmonicDetector {
    profile: Vec<f32>,
    sample_rate: u32,
    voicing_threshold_db: f32,
}

impl HarmonicDetector {
    pub fn new(profile: &[f32], sample_rate: u32, voicing_threshold_db: f32) -> Self {
        Self {
            profile: profile.to_vec(),
            sample_rate,
            voicing_threshold_db,
        }
    }

    pub fn harmonics(&self) -> usize {
        self.profile.len()
    }

    /// Detects the fundamental of `magnitudes` (denoised, `count` bins).
    ///
    /// # Arguments
    /// * `magnitudes` - denoised spectrum
    /// * `hps` - receives the HPS; must hold `count / K` values
    ///
    /// # Returns
    /// * The estimate; `voiced` is false when the winning bin sits under the
    ///   voicing threshold or the HPS is empty
    pub fn detect(&self, magnitudes: &[f32], hps: &mut [f32]) -> HarmonicEstimate {
        let count = magnitudes.len();
        let bin = harmonic_product_spectrum(magnitudes, &self.profile, hps);
        let strength = hps.get(bin).copied().unwrap_or(0.0);
        let frequency = if count == 0 {
            0.0
        } else {
            bin as f32 * self.sample_rate as f32 / (2.0 * count as f32)
        };
        let level = magnitudes.get(bin).copied().unwrap_or(0.0);

        HarmonicEstimate {
            bin,
            frequency,
            refined_frequency: frequency,
            strength,
            voiced: strength > 0.0 && level >= self.voicing_threshold_db,
        }
    }

    /// Refines `estimate` against the magnitude spectrum `spectrum_db`.
    pub fn refine(&self, estimate: &mut HarmonicEstimate, spectrum_db: &[f32]) {
        if spectrum_db.is_empty() {
            return;
        }
        let bin_width = self.sample_rate as f32 / (2.0 * spectrum_db.len() as f32);
        estimate.refined_frequency = refine_peak_frequency(spectrum_db, estimate.bin, bin_width);
    }
}

/// Fills `hps` with the weighted harmonic product spectrum and returns its argmax.
///
/// Bin 0 (DC) is never a candidate. Ties keep the lowest bin.
pub fn harmonic_product_spectrum(magnitudes: &[f32], profile: &[f32], hps: &mut [f32]) -> usize {
    hps.fill(0.0);
    let count = magnitudes.len();
    let candidates = hps.len().min(count / profile.len().max(1));
    if candidates == 0 {
        return 0;
    }

    let mean = magnitudes.iter().sum::<f32>() / count as f32;
    let mut best = 0;
    let mut best_value = 0.0;

    for i in 1..candidates {
        let snr = magnitudes[i] / (mean + SNR_EPSILON);
        let adaptive = 1.0 - (-snr).exp();

        let sum: f32 = profile
            .iter()
            .enumerate()
            .map_while(|(h, &w)| magnitudes.get(i * (h + 1)).map(|&m| w * m))
            .sum();
        let value = adaptive * sum;
        hps[i] = value;

        if value > best_value {
            best_value = value;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: [f32; 5] = [1.0, 0.5, 0.33, 0.25, 0.2];

    /// Denoised spectrum of a tone at `bin` with decaying harmonics.
    fn harmonic_spectrum(count: usize, bin: usize, harmonics: usize) -> Vec<f32> {
        let mut spectrum = vec![0.0; count];
        for h in 1..=harmonics {
            if bin * h < count {
                spectrum[bin * h] = 60.0 / h as f32;
            }
        }
        spectrum
    }

    #[test]
    fn test_finds_fundamental_of_harmonic_tone() {
        let detector = HarmonicDetector::new(&PROFILE, 44100, 10.0);
        let spectrum = harmonic_spectrum(4096, 82, 6);
        let mut hps = vec![0.0; 4096 / 5];
        let estimate = detector.detect(&spectrum, &mut hps);

        assert_eq!(estimate.bin, 82);
        assert!((estimate.frequency - 82.0 * 44100.0 / 8192.0).abs() < 1e-3);
        assert!(estimate.voiced);
        assert_eq!(hps.len(), 819);
    }

    #[test]
    fn test_subharmonic_is_suppressed() {
        // a subharmonic candidate with an empty own bin is weighted to zero
        let detector = HarmonicDetector::new(&PROFILE, 44100, 10.0);
        let spectrum = harmonic_spectrum(2048, 100, 4);
        let mut hps = vec![0.0; 2048 / 5];
        let estimate = detector.detect(&spectrum, &mut hps);
        assert_eq!(estimate.bin, 100);
        assert_eq!(hps[50], 0.0);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let detector = HarmonicDetector::new(&PROFILE, 44100, 10.0);
        let spectrum = vec![0.0; 1024];
        let mut hps = vec![1.0; 1024 / 5];
        let estimate = detector.detect(&spectrum, &mut hps);
        assert!(!estimate.voiced);
        assert_eq!(estimate.strength, 0.0);
        assert!(hps.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_weak_tone_is_unvoiced() {
        let detector = HarmonicDetector::new(&PROFILE, 44100, 10.0);
        let mut spectrum = vec![0.0; 1024];
        spectrum[40] = 4.0;
        let mut hps = vec![0.0; 1024 / 5];
        let estimate = detector.detect(&spectrum, &mut hps);
        assert_eq!(estimate.bin, 40);
        assert!(!estimate.voiced);
    }
}
