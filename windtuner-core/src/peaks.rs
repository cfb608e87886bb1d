//! # Spectral Peak Detection
//!
//! Local maxima with topographic prominence and a minimum-separation filter.
//!
//! ## Algorithm
//! 1. Strict interior local maxima (`s[i] > s[i-1] && s[i] > s[i+1]`) at or
//!    above `min_height`
//! 2. Prominence: walk outward up to `prominence_window` bins on each side,
//!    stopping at the first strictly higher bin, and remember the lowest
//!    value seen; prominence is the height above the higher of the two minima
//! 3. Keep peaks with `prominence >= min_prominence`
//! 4. Separation: visit peaks tallest first and keep one only if no kept peak
//!    lies within `min_distance_bins`
//! 5. Output sorted by bin

use serde::{Deserialize, Serialize};

use crate::config::PeakConfig;

/// One spectral peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub bin_index: usize,
    pub frequency: f32,
    pub magnitude: f32,
    pub prominence: f32,
    pub left_base: usize,
    pub right_base: usize,
}

/// Finds peaks in `spectrum`.
///
/// # Arguments
/// * `spectrum` - values to search (typically the denoised spectrum in dB)
/// * `frequencies` - frequency of each bin in Hz
/// * `config` - detection thresholds
///
/// # Returns
/// * Peaks sorted by ascending bin index
pub fn find_peaks(spectrum: &[f32], frequencies: &[f32], config: &PeakConfig) -> Vec<Peak> {
    let mut peaks = Vec::new();
    find_peaks_into(spectrum, frequencies, config, &mut peaks);
    peaks
}

/// Same as [`find_peaks`], reusing `peaks` as storage.
///
/// Does not allocate once `peaks` has enough capacity for the candidates.
pub fn find_peaks_into(spectrum: &[f32], frequencies: &[f32], config: &PeakConfig, peaks: &mut Vec<Peak>) {
    peaks.clear();
    let n = spectrum.len();
    if n < 3 {
        return;
    }

    for i in 1..n - 1 {
        let height = spectrum[i];
        if !(height > spectrum[i - 1] && height > spectrum[i + 1]) || height <= config.min_height {
            continue;
        }

        let (left_min, left_base) = walk_down(spectrum, i, config.prominence_window, Direction::Left);
        let (right_min, right_base) = walk_down(spectrum, i, config.prominence_window, Direction::Right);
        let prominence = height - left_min.max(right_min);
        if prominence < config.min_prominence {
            continue;
        }

        peaks.push(Peak {
            bin_index: i,
            frequency: frequencies.get(i).copied().unwrap_or(0.0),
            magnitude: height,
            prominence,
            left_base,
            right_base,
        });
    }

    enforce_min_distance(peaks, config.min_distance_bins);
}

#[derive(Clone, Copy)]
enum Direction {
    Left,
    Right,
}

/// Lowest value (and its bin) before a strictly higher bin, within `window` bins.
fn walk_down(spectrum: &[f32], peak: usize, window: usize, direction: Direction) -> (f32, usize) {
    let height = spectrum[peak];
    let mut lowest = (height, peak);

    let mut visit = |j: usize| -> bool {
        let value = spectrum[j];
        if value > height {
            return false;
        }
        if value < lowest.0 {
            lowest = (value, j);
        }
        true
    };

    match direction {
        Direction::Left => {
            let stop = peak.saturating_sub(window);
            for j in (stop..peak).rev() {
                if !visit(j) {
                    break;
                }
            }
        }
        Direction::Right => {
            let stop = (peak + window).min(spectrum.len() - 1);
            for j in peak + 1..=stop {
                if !visit(j) {
                    break;
                }
            }
        }
    }
    lowest
}

/// Greedy tallest-first separation filter; leaves `peaks` sorted by bin.
fn enforce_min_distance(peaks: &mut Vec<Peak>, min_distance: usize) {
    if min_distance > 0 && peaks.len() > 1 {
        peaks.sort_unstable_by(|a, b| {
            b.magnitude
                .total_cmp(&a.magnitude)
                .then(a.bin_index.cmp(&b.bin_index))
        });

        let mut kept = 0;
        for candidate in 0..peaks.len() {
            let bin = peaks[candidate].bin_index;
            let crowded = peaks[..kept]
                .iter()
                .any(|p| p.bin_index.abs_diff(bin) < min_distance);
            if !crowded {
                peaks.swap(kept, candidate);
                kept += 1;
            }
        }
        peaks.truncate(kept);
    }
    peaks.sort_unstable_by_key(|p| p.bin_index);
}
