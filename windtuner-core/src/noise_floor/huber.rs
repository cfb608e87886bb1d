//! Asymmetric Huber-loss fit.
//!
//! Same skeleton as the quantile regression, but residuals smaller than
//! `delta` produce a proportional step. The floor settles onto the data
//! instead of chattering around it by a full step.

use super::quantile::{STEP, TV_ROUNDS, clamp_to_data, max_change, total_variation_round};

/// Gradient of the asymmetric Huber loss, scaled to lie in `[q - 1, q]`.
pub fn huber_gradient(residual: f32, quantile: f32, delta: f32) -> f32 {
    let clipped = residual.clamp(-delta, delta) / delta;
    if residual > 0.0 {
        quantile * clipped
    } else {
        (1.0 - quantile) * clipped
    }
}

#[allow(clippy::too_many_arguments)]
pub fn regress(
    data: &[f32],
    floor: &mut [f32],
    snapshot: &mut [f32],
    weights: &[f32],
    quantile: f32,
    delta: f32,
    max_iterations: usize,
    tolerance: f32,
) -> usize {
    for iteration in 0..max_iterations {
        snapshot.copy_from_slice(floor);

        for (f, &d) in floor.iter_mut().zip(data) {
            *f += STEP * huber_gradient(d - *f, quantile, delta);
        }
        for _ in 0..TV_ROUNDS {
            total_variation_round(floor, weights);
        }
        clamp_to_data(floor, data);

        if max_change(floor, snapshot) < tolerance {
            return iteration + 1;
        }
    }
    max_iterations
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gradient_is_linear_inside_delta() {
        assert_relative_eq!(huber_gradient(1.0, 0.2, 4.0), 0.05);
        assert_relative_eq!(huber_gradient(-2.0, 0.2, 4.0), -0.4);
        assert_relative_eq!(huber_gradient(10.0, 0.2, 4.0), 0.2);
        assert_relative_eq!(huber_gradient(-10.0, 0.2, 4.0), -0.8);
        assert_eq!(huber_gradient(0.0, 0.2, 4.0), 0.0);
    }

    #[test]
    fn test_floor_stays_below_data() {
        let data: Vec<f32> = (0..128).map(|i| -40.0 + ((i * 7) % 11) as f32).collect();
        let weights = vec![0.05; 128];
        let mut floor = vec![-45.0; 128];
        let mut snapshot = vec![0.0; 128];
        regress(&data, &mut floor, &mut snapshot, &weights, 0.2, 3.0, 10, 1e-4);
        assert!(floor.iter().zip(&data).all(|(f, d)| f <= d));
    }
}
