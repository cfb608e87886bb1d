//! Quantile regression of the floor with total-variation smoothing.
//!
//! Each iteration takes one fixed subgradient step of the pinball loss, runs
//! a few total-variation rounds and clamps the floor under the data.

/// Fixed descent step, in dB per unit of subgradient.
pub const STEP: f32 = 0.6;

/// Total-variation rounds per iteration.
pub const TV_ROUNDS: usize = 3;

/// Subgradient of the pinball loss for residual `data - floor`.
pub fn pinball_subgradient(residual: f32, quantile: f32) -> f32 {
    if residual > 0.0 {
        quantile
    } else if residual < 0.0 {
        quantile - 1.0
    } else {
        0.0
    }
}

fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Per-bin TV strength: `lambda · (log10(f / 20) + 1)` above 20 Hz, `lambda` below.
pub fn tv_weights(bins: usize, bin_width: f32, lambda: f32) -> Vec<f32> {
    (0..bins)
        .map(|i| {
            let freq = i as f32 * bin_width;
            let weight = if freq > 20.0 { (freq / 20.0).log10() + 1.0 } else { 1.0 };
            lambda * weight
        })
        .collect()
}

/// One total-variation round over the interior bins.
///
/// Differences are taken against the values from before this round, so the
/// result does not depend on sweep direction.
pub fn total_variation_round(floor: &mut [f32], weights: &[f32]) {
    let n = floor.len();
    if n < 3 {
        return;
    }
    let mut left_value = floor[0];
    for i in 1..n - 1 {
        let here = floor[i];
        let left = here - left_value;
        let right = floor[i + 1] - here;
        floor[i] = here - weights[i] * (sign(left) - sign(right));
        left_value = here;
    }
}

/// `floor[i] = min(floor[i], data[i])`.
pub fn clamp_to_data(floor: &mut [f32], data: &[f32]) {
    for (f, &d) in floor.iter_mut().zip(data) {
        *f = f.min(d);
    }
}

/// Largest absolute per-bin difference.
pub fn max_change(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

/// Runs the regression in place on `floor`.
///
/// `snapshot` is workspace of the same length. Returns the number of
/// iterations performed.
pub fn regress(
    data: &[f32],
    floor: &mut [f32],
    snapshot: &mut [f32],
    weights: &[f32],
    quantile: f32,
    max_iterations: usize,
    tolerance: f32,
) -> usize {
    for iteration in 0..max_iterations {
        snapshot.copy_from_slice(floor);

        for (f, &d) in floor.iter_mut().zip(data) {
            *f += STEP * pinball_subgradient(d - *f, quantile);
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

    #[test]
    fn test_subgradient() {
        assert_eq!(pinball_subgradient(2.0, 0.2), 0.2);
        assert_eq!(pinball_subgradient(-2.0, 0.2), 0.2 - 1.0);
        assert_eq!(pinball_subgradient(0.0, 0.2), 0.0);
    }

    #[test]
    fn test_tv_flattens_spike_and_fills_dip() {
        let weights = vec![0.5; 5];
        let mut floor = vec![0.0, 0.0, 4.0, 0.0, 0.0];
        total_variation_round(&mut floor, &weights);
        assert_eq!(floor[2], 3.0);
        // the neighbours of the spike are local minima and get lifted
        assert_eq!(floor[1], 0.5);
        assert_eq!(floor[3], 0.5);
        // endpoints untouched
        assert_eq!(floor[0], 0.0);
        assert_eq!(floor[4], 0.0);
    }

    #[test]
    fn test_tv_weights_grow_with_frequency() {
        let weights = tv_weights(100, 10.0, 0.1);
        assert_eq!(weights[1], 0.1);
        assert!((weights[2] - 0.1).abs() < 1e-6);
        assert!(weights[99] > weights[10]);
    }

    #[test]
    fn test_floor_stays_below_data() {
        let data: Vec<f32> = (0..200)
            .map(|i| -50.0 + 8.0 * ((i as f32) * 0.7).sin() + if i == 90 { 40.0 } else { 0.0 })
            .collect();
        let weights = tv_weights(200, 5.0, 0.05);
        let mut floor = vec![-70.0; 200];
        let mut snapshot = vec![0.0; 200];

        let iterations = regress(&data, &mut floor, &mut snapshot, &weights, 0.2, 10, 1e-4);
        assert!(iterations >= 1 && iterations <= 10);
        for (f, d) in floor.iter().zip(&data) {
            assert!(f <= d);
        }
        // a floor starting below the data moves up
        assert!(floor.iter().all(|&f| f > -70.0));
    }

    #[test]
    fn test_converges_early_when_floor_sits_on_flat_data() {
        let data = vec![-30.0; 50];
        let weights = vec![0.0; 50];
        let mut floor = data.clone();
        let mut snapshot = vec![0.0; 50];
        assert_eq!(regress(&data, &mut floor, &mut snapshot, &weights, 0.5, 10, 1e-4), 1);
    }
}
