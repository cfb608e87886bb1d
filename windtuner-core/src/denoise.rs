//! Spectral subtraction of the noise floor.

/// `denoised[i] = max(spectrum_db[i] - floor_db[i], 0)`.
pub fn denoise(spectrum_db: &[f32], floor_db: &[f32], denoised: &mut [f32]) {
    debug_assert_eq!(spectrum_db.len(), floor_db.len());
    debug_assert_eq!(spectrum_db.len(), denoised.len());
    for ((out, &s), &f) in denoised.iter_mut().zip(spectrum_db).zip(floor_db) {
        // NaN from a broken input maps to 0 as well
        *out = (s - f).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtracts_and_clips() {
        let spectrum = [-10.0, -50.0, 3.0, -20.0];
        let floor = [-30.0, -40.0, 3.0, -25.0];
        let mut out = [9.0; 4];
        denoise(&spectrum, &floor, &mut out);
        assert_eq!(out, [20.0, 0.0, 0.0, 5.0]);
    }

    #[test]
    fn test_never_negative() {
        let spectrum: Vec<f32> = (0..500).map(|i| ((i * 37) % 101) as f32 - 80.0).collect();
        let floor: Vec<f32> = (0..500).map(|i| ((i * 53) % 89) as f32 - 70.0).collect();
        let mut out = vec![0.0; 500];
        denoise(&spectrum, &floor, &mut out);
        assert!(out.iter().all(|&v| v >= 0.0));
    }
}
