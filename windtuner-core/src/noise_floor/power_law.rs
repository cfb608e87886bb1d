//! Parametric 1/f floor.
//!
//! A power law `P ∝ f^b` is a straight line in dB against `log10(f)`. The
//! line is fitted by ordinary least squares, then refitted on the points at or
//! below the previous line until it stops moving or too few points remain.
//! The slope comes from that refit; the height is set by the quantile of the
//! residuals, so the line sits at the same quantile as the other strategies.

use linreg::linear_regression;

use super::smoothing::MIN_SMOOTHING_HZ;

/// Least-squares line fitter with reusable point buffers.
#[derive(Debug, Clone)]
pub struct PowerLawFit {
    /// `log10(f)` per bin; `None` below the audible range.
    log_freqs: Vec<Option<f64>>,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl PowerLawFit {
    pub fn new(bins: usize, bin_width: f32) -> Self {
        let log_freqs = (0..bins)
            .map(|i| {
                let freq = i as f64 * bin_width as f64;
                (freq >= MIN_SMOOTHING_HZ as f64).then(|| freq.log10())
            })
            .collect();
        Self {
            log_freqs,
            xs: Vec::with_capacity(bins),
            ys: Vec::with_capacity(bins),
        }
    }

    /// Fits the line and writes `min(line, data)` into `floor`.
    ///
    /// The refit stops before fewer than `quantile` of the usable points
    /// remain under the line. The final line is then shifted so that exactly
    /// `quantile` of the usable points lie below it.
    ///
    /// Bins below 20 Hz take the line's value at the lowest fitted bin.
    /// Returns the number of regressions run; `floor` is left untouched when
    /// fewer than two usable points exist.
    pub fn fit(
        &mut self,
        data: &[f32],
        floor: &mut [f32],
        quantile: f32,
        max_iterations: usize,
        tolerance: f32,
    ) -> usize {
        let mut line: Option<(f64, f64)> = None;
        let mut iterations = 0;

        let (lf_min, lf_max) = self
            .log_freqs
            .iter()
            .flatten()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        let usable = self.log_freqs.iter().zip(data).filter(|(lf, _)| lf.is_some()).count();
        let min_points = ((usable as f32 * quantile).ceil() as usize).max(2);

        for _ in 0..max_iterations.max(1) {
            self.xs.clear();
            self.ys.clear();
            for (lf, &d) in self.log_freqs.iter().zip(data) {
                let Some(x) = *lf else { continue };
                let y = d as f64;
                let keep = match line {
                    Some((slope, intercept)) => y <= intercept + slope * x,
                    None => true,
                };
                if keep {
                    self.xs.push(x);
                    self.ys.push(y);
                }
            }
            if self.xs.len() < min_points {
                break;
            }

            let Ok((slope, intercept)) = linear_regression::<f64, f64, f64>(&self.xs, &self.ys) else {
                break;
            };
            iterations += 1;

            let change = match line {
                Some((old_slope, old_intercept)) => {
                    let ds = slope - old_slope;
                    let di = intercept - old_intercept;
                    (di + ds * lf_min).abs().max((di + ds * lf_max).abs())
                }
                None => f64::INFINITY,
            };
            line = Some((slope, intercept));
            if change < tolerance as f64 {
                break;
            }
        }

        let Some((slope, intercept)) = line else {
            return iterations;
        };

        // residuals of every usable point; the quantile-th one becomes the new zero
        self.ys.clear();
        for (lf, &d) in self.log_freqs.iter().zip(data) {
            if let Some(x) = *lf {
                self.ys.push(d as f64 - (intercept + slope * x));
            }
        }
        let k = ((self.ys.len() - 1) as f64 * quantile.clamp(0.0, 1.0) as f64) as usize;
        let (_, &mut shift, _) = self.ys.select_nth_unstable_by(k, |a, b| a.total_cmp(b));
        let intercept = intercept + shift;

        let low_value = (intercept + slope * lf_min) as f32;
        for ((f, &d), lf) in floor.iter_mut().zip(data).zip(&self.log_freqs) {
            let value = match *lf {
                Some(x) => (intercept + slope * x) as f32,
                None => low_value,
            };
            *f = value.min(d);
        }
        iterations
    }
}
