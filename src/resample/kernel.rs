//! Band-limited sinc reconstruction of multipath echoes on a delay grid.

use std::f64::consts::PI;

use super::grid::SamplingGrid;
use crate::model::{Complex64, MultipathComponent};

/// `sin(x) / x` with `sinc(0) = 1`.
///
/// Uses the Taylor expansion near zero.
#[inline]
pub fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-4 {
        1.0 - x * x / 6.0
    } else {
        x.sin() / x
    }
}

/// Ideal low-pass kernel at half the grid sample rate.
#[derive(Clone, Copy, Debug)]
pub struct SincKernel {
    grid: SamplingGrid,
    omega: f64,
    component_type: Option<u16>,
}

impl SincKernel {
    /// Kernel for `grid`, optionally restricted to one component category.
    pub fn new(grid: SamplingGrid, component_type: Option<u16>) -> Self {
        let bandwidth = grid.sample_rate / 2.0;
        Self {
            grid,
            omega: 2.0 * PI * bandwidth,
            component_type,
        }
    }

    pub fn grid(&self) -> &SamplingGrid {
        &self.grid
    }

    /// Angular cut-off, rad/s.
    pub fn omega(&self) -> f64 {
        self.omega
    }

    /// Contribution weight of an echo at `delay` to bin `n`.
    #[inline]
    pub fn weight(&self, n: usize, delay: f64) -> f64 {
        let position = delay - self.grid.delay_min + self.grid.before;
        sinc(self.omega * (n as f64 / self.grid.sample_rate - position))
    }

    /// Accumulate every selected component into `row`.
    pub fn accumulate(&self, components: &[MultipathComponent], row: &mut [Complex64]) {
        for c in components {
            if self.component_type.is_some_and(|t| t != c.kind) {
                continue;
            }
            for (n, bin) in row.iter_mut().enumerate() {
                *bin += c.amplitude * self.weight(n, c.delay);
            }
        }
    }

    /// A fresh grid row holding the accumulated components.
    pub fn row(&self, components: &[MultipathComponent]) -> Vec<Complex64> {
        let mut row = vec![Complex64::new(0.0, 0.0); self.grid.size];
        self.accumulate(components, &mut row);
        row
    }
}
