//! Optional spectral tapering of reconstructed grid rows.
//!
//! A row is transformed to the frequency domain, multiplied by a Hamming
//! window whose peak is moved to zero frequency, and transformed back.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustfft::{num_complex::Complex64, Fft, FftPlanner};

use crate::util::{Error, Result};

/// Hamming window of length `n` (`[0.08]` for `n == 1`).
pub fn hamming(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.08],
        _ => (0..n)
            .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
            .collect(),
    }
}

/// Swap the halves of `v` so the centre moves to index 0.
pub fn fftshift<T: Clone>(v: &[T]) -> Vec<T> {
    let nr = v.len() / 2;
    v[nr..].iter().chain(&v[..nr]).cloned().collect()
}

/// Forward and inverse plans with their shared scratch buffer.
struct Transform {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

/// Frequency-domain Hamming filter for rows of one grid size.
///
/// The transform and its scratch buffer are shared by all workers; every
/// call to [`apply`](Self::apply) holds the lock for the whole
/// forward-window-inverse sequence.
pub struct SpectralFilter {
    size: usize,
    window: Vec<f64>,
    transform: Mutex<Transform>,
}

impl fmt::Debug for SpectralFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralFilter")
            .field("size", &self.size)
            .finish()
    }
}

impl SpectralFilter {
    /// Create a filter for rows of `size` bins.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Self {
            size,
            window: fftshift(&hamming(size)),
            transform: Mutex::new(Transform {
                forward,
                inverse,
                scratch: vec![Complex64::new(0.0, 0.0); scratch_len],
            }),
        }
    }

    /// Row length the filter was planned for.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Shifted window applied in the frequency domain.
    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Filter `row` in place.
    pub fn apply(&self, row: &mut [Complex64]) -> Result<()> {
        if row.len() != self.size {
            return Err(Error::validation(format!(
                "row of {} bins given to a filter of {} bins",
                row.len(),
                self.size
            )));
        }

        let mut guard = self.transform.lock();
        let t = &mut *guard;
        t.forward.process_with_scratch(row, &mut t.scratch);
        for (bin, w) in row.iter_mut().zip(&self.window) {
            *bin *= *w;
        }
        t.inverse.process_with_scratch(row, &mut t.scratch);
        drop(guard);

        let scale = 1.0 / self.size as f64;
        for bin in row.iter_mut() {
            *bin *= scale;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming() {
        assert_eq!(hamming(1), vec![0.08]);
        let w = hamming(5);
        assert!((w[0] - 0.08).abs() < 1e-12);
        assert!((w[2] - 1.0).abs() < 1e-12);
        assert!((w[4] - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_fftshift() {
        assert_eq!(fftshift(&[0, 1, 2, 3, 4, 5]), vec![3, 4, 5, 0, 1, 2]);
        assert_eq!(fftshift(&[0, 1, 2, 3, 4]), vec![2, 3, 4, 0, 1]);
        assert_eq!(fftshift::<i32>(&[]), Vec::<i32>::new());
    }

    #[test]
    fn test_dc_passes_odd_length() {
        // odd length: shifted window is exactly 1 at zero frequency
        let filter = SpectralFilter::new(33);
        assert!((filter.window()[0] - 1.0).abs() < 1e-12);

        let mut row = vec![Complex64::new(0.25, -0.5); 33];
        filter.apply(&mut row).unwrap();
        for v in &row {
            assert!((v - Complex64::new(0.25, -0.5)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_nyquist_is_attenuated() {
        let filter = SpectralFilter::new(64);
        let mut row: Vec<Complex64> = (0..64)
            .map(|n| Complex64::new(if n % 2 == 0 { 1.0 } else { -1.0 }, 0.0))
            .collect();
        filter.apply(&mut row).unwrap();
        for (n, v) in row.iter().enumerate() {
            let expected = if n % 2 == 0 { 0.08 } else { -0.08 };
            assert!((v.re - expected).abs() < 1e-12);
            assert!(v.im.abs() < 1e-12);
        }
    }

    #[test]
    fn test_length_mismatch() {
        let filter = SpectralFilter::new(8);
        let mut row = vec![Complex64::new(0.0, 0.0); 7];
        assert!(matches!(filter.apply(&mut row), Err(Error::Validation(_))));
    }
}
