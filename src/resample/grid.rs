//! Common delay window and sampling grid of a link.

use crate::model::{ContinuousSnapshot, DelayGrid};
use crate::util::{Error, Result};

/// Shift every component delay by its snapshot's reference delay and zero
/// the reference delays.
pub fn subtract_reference_delays(snapshots: &mut [ContinuousSnapshot]) {
    for snapshot in snapshots {
        let reference = snapshot.reference_delay;
        for component in &mut snapshot.components {
            component.delay -= reference;
        }
        snapshot.reference_delay = 0.0;
    }
}

/// Running minimum and maximum over component delays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DelayWindow {
    min: f64,
    max: f64,
    components: usize,
}

impl DelayWindow {
    /// Empty window (`min = +inf`, `max = -inf`).
    pub fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            components: 0,
        }
    }

    /// Scan every component of every snapshot, whatever its category.
    pub fn scan(snapshots: &[ContinuousSnapshot]) -> Self {
        let mut window = Self::new();
        for snapshot in snapshots {
            if let Some((lo, hi)) = snapshot.delay_bounds() {
                window.min = window.min.min(lo);
                window.max = window.max.max(hi);
            }
            window.components += snapshot.components.len();
        }
        window
    }

    #[inline]
    pub fn include(&mut self, delay: f64) {
        self.min = self.min.min(delay);
        self.max = self.max.max(delay);
        self.components += 1;
    }

    /// Number of delays seen.
    pub fn components(&self) -> usize {
        self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components == 0
    }

    /// `(min, max)` of the delays seen, `None` if empty.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        (!self.is_empty()).then_some((self.min, self.max))
    }
}

impl Default for DelayWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform output grid derived from a delay window and margins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingGrid {
    /// Number of bins.
    pub size: usize,
    /// Smallest component delay.
    pub delay_min: f64,
    /// Largest component delay.
    pub delay_max: f64,
    /// Margin before `delay_min`, seconds.
    pub before: f64,
    /// Margin after `delay_max`, seconds.
    pub after: f64,
    pub sample_rate: f64,
}

impl SamplingGrid {
    /// Grid covering `[delay_min - before, delay_max + after]`.
    pub fn from_window(
        link: &str,
        window: &DelayWindow,
        sample_rate: f64,
        before: f64,
        after: f64,
    ) -> Result<Self> {
        let (delay_min, delay_max) = window
            .bounds()
            .ok_or_else(|| Error::validation(format!("no components found for link '{}'", link)))?;

        let length = (delay_max + after) - (delay_min - before);
        let bins = (length * sample_rate).round();
        if !bins.is_finite() || bins < 1.0 {
            return Err(Error::validation(format!(
                "degenerate delay window for link '{}': {} s at {} Hz gives {} bins",
                link, length, sample_rate, bins
            )));
        }

        Ok(Self {
            size: bins as usize,
            delay_min,
            delay_max,
            before,
            after,
            sample_rate,
        })
    }

    /// Delay of bin 0.
    #[inline]
    pub fn min_delay(&self) -> f64 {
        self.delay_min - self.before
    }

    /// Window length, seconds.
    pub fn length(&self) -> f64 {
        (self.delay_max + self.after) - self.min_delay()
    }

    /// Stored form of the grid.
    pub fn delay_grid(&self) -> DelayGrid {
        DelayGrid::new(self.size, self.min_delay(), self.sample_rate)
    }
}
