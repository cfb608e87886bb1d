//! Asymmetric least-squares (Whittaker) floor.
//!
//! Minimises `Σ wᵢ(yᵢ - zᵢ)² + λ Σ (zᵢ₊₁ - zᵢ)²` with weights `q` where the
//! data sits above the fit and `1 - q` where it sits below, re-weighting after
//! every solve. The first-difference penalty makes the normal equations
//! tridiagonal, so each solve is a single Thomas sweep.

use super::quantile::{clamp_to_data, max_change};

/// Tridiagonal solver with reusable workspace.
#[derive(Debug, Clone)]
pub struct WhittakerSmoother {
    weights: Vec<f64>,
    c_prime: Vec<f64>,
    d_prime: Vec<f64>,
}

impl WhittakerSmoother {
    pub fn new(bins: usize) -> Self {
        Self {
            weights: vec![0.0; bins],
            c_prime: vec![0.0; bins],
            d_prime: vec![0.0; bins],
        }
    }

    /// Solves `(W + λDᵀD) z = W y` into `out` with the current weights.
    fn solve(&mut self, data: &[f32], lambda: f64, out: &mut [f32]) {
        let n = data.len();
        if n == 0 {
            return;
        }
        if n == 1 {
            out[0] = data[0];
            return;
        }

        let diag = |i: usize| {
            let degree = if i == 0 || i == n - 1 { 1.0 } else { 2.0 };
            self.weights[i] + lambda * degree
        };
        let off = -lambda;

        let b0 = diag(0);
        let mut c_prev = off / b0;
        let mut d_prev = self.weights[0] * data[0] as f64 / b0;
        self.c_prime[0] = c_prev;
        self.d_prime[0] = d_prev;
        for i in 1..n {
            let m = diag(i) - off * c_prev;
            c_prev = if i < n - 1 { off / m } else { 0.0 };
            d_prev = (self.weights[i] * data[i] as f64 - off * d_prev) / m;
            self.c_prime[i] = c_prev;
            self.d_prime[i] = d_prev;
        }

        let mut next = self.d_prime[n - 1];
        out[n - 1] = next as f32;
        for i in (0..n - 1).rev() {
            next = self.d_prime[i] - self.c_prime[i] * next;
            out[i] = next as f32;
        }
    }

    /// Iteratively re-weighted fit in place on `floor`.
    ///
    /// Returns the number of solves performed.
    pub fn fit(
        &mut self,
        data: &[f32],
        floor: &mut [f32],
        snapshot: &mut [f32],
        quantile: f32,
        lambda: f32,
        max_iterations: usize,
        tolerance: f32,
    ) -> usize {
        let q = quantile as f64;
        for iteration in 0..max_iterations {
            snapshot.copy_from_slice(floor);
            for ((w, &d), &f) in self.weights.iter_mut().zip(data).zip(snapshot.iter()) {
                *w = if d > f { q } else { 1.0 - q };
            }
            self.solve(data, lambda as f64, floor);
            clamp_to_data(floor, data);

            if max_change(floor, snapshot) < tolerance {
                return iteration + 1;
            }
        }
        max_iterations
    }
}
