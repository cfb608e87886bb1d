//! Smoothing primitives shared by the noise-floor strategies.

/// Below this frequency bins are passed through unsmoothed.
pub const MIN_SMOOTHING_HZ: f32 = 20.0;

const WEIGHT_EPSILON: f32 = 1e-12;

/// Gaussian smoothing over a window of constant width in semitones.
///
/// For the bin at frequency `f` the window spans `[f / √r, f · √r]` with
/// `r = 2^(semitones / 12)`, so it is symmetric in log-frequency and widens
/// with frequency. Weights are Gaussian in bin distance with sigma equal to
/// the window's width in bins.
///
/// The per-bin windows are computed once; [`smooth`](Self::smooth) does not allocate.
#[derive(Debug, Clone)]
pub struct MusicalSmoother {
    bandwidth_semitones: f32,
    /// `(lo, hi, 1 / (2σ²))` per bin; `None` for pass-through bins.
    windows: Vec<Option<(usize, usize, f32)>>,
}

impl MusicalSmoother {
    pub fn new(bins: usize, bin_width: f32, bandwidth_semitones: f32) -> Self {
        let half_ratio = 2.0_f32.powf(bandwidth_semitones / 24.0);
        let last = bins.saturating_sub(1);

        let windows = (0..bins)
            .map(|i| {
                let freq = i as f32 * bin_width;
                if freq < MIN_SMOOTHING_HZ {
                    return None;
                }
                let lo = ((freq / half_ratio) / bin_width).floor().max(0.0) as usize;
                let hi = (((freq * half_ratio) / bin_width).ceil() as usize).min(last);
                let sigma = ((hi - lo) as f32).max(1.0);
                Some((lo, hi, 1.0 / (2.0 * sigma * sigma)))
            })
            .collect();

        Self {
            bandwidth_semitones,
            windows,
        }
    }

    pub fn bandwidth_semitones(&self) -> f32 {
        self.bandwidth_semitones
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Gaussian weight of bin `other` when smoothing bin `bin`; zero outside the window.
    pub fn weight(&self, bin: usize, other: usize) -> f32 {
        match self.windows.get(bin).copied().flatten() {
            Some((lo, hi, inv_two_sigma_sq)) if (lo..=hi).contains(&other) => {
                gaussian(other as f32 - bin as f32, inv_two_sigma_sq)
            }
            _ => 0.0,
        }
    }

    /// Smooths `input` into `output`. Both must have [`len`](Self::len) elements.
    pub fn smooth(&self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), self.windows.len());
        debug_assert_eq!(output.len(), self.windows.len());

        for (i, (out, window)) in output.iter_mut().zip(&self.windows).enumerate() {
            let Some((lo, hi, inv_two_sigma_sq)) = *window else {
                *out = input[i];
                continue;
            };

            let mut weighted = 0.0;
            let mut total = 0.0;
            for (j, &value) in input[lo..=hi].iter().enumerate() {
                let distance = (lo + j) as f32 - i as f32;
                let weight = gaussian(distance, inv_two_sigma_sq);
                weighted += weight * value;
                total += weight;
            }
            *out = weighted / (total + WEIGHT_EPSILON);
        }
    }
}

fn gaussian(distance: f32, inv_two_sigma_sq: f32) -> f32 {
    (-distance * distance * inv_two_sigma_sq).exp()
}

/// Centered moving minimum over `window` bins.
pub fn moving_minimum(input: &[f32], window: usize, output: &mut [f32]) {
    debug_assert_eq!(input.len(), output.len());
    let n = input.len();
    let radius = window / 2;
    for (i, out) in output.iter_mut().enumerate() {
        let lo = i.saturating_sub(radius);
        let hi = (i + radius).min(n - 1);
        *out = input[lo..=hi].iter().copied().fold(f32::INFINITY, f32::min);
    }
}
