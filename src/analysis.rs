//! Per-link channel statistics.
//!
//! Time series functions take a window of `length` seconds starting at
//! `start_time`; a `length` of zero runs to the end of the container.

use std::ops::Range;

use tracing::debug;

use crate::file::{ContinuousDelayReader, DiscreteDelayReader};
use crate::model::{Complex64, MultipathComponent};
use crate::util::{Error, Result};

/// Lowest category code counted as multipath by [`los_multipath_power`].
pub const MULTIPATH_TYPE_START: u16 = 256;

/// Values sampled once per snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSeries<T> {
    /// Snapshot times, seconds.
    pub times: Vec<f64>,
    pub values: Vec<T>,
}

impl<T> TimeSeries<T> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &T)> {
        self.times.iter().copied().zip(&self.values)
    }
}

fn times(range: &Range<usize>, snapshot_rate: f64) -> Vec<f64> {
    range.clone().map(|i| i as f64 / snapshot_rate).collect()
}

/// Evaluate `f` on every snapshot of `link` inside the window.
fn continuous_series<T>(
    reader: &ContinuousDelayReader,
    link: &str,
    start_time: f64,
    length: f64,
    mut f: impl FnMut(&[MultipathComponent]) -> T,
) -> Result<TimeSeries<T>> {
    let range = reader.snapshot_range_for_time(start_time, length)?;
    let mut values = Vec::with_capacity(range.len());
    for index in range.clone() {
        values.push(f(&reader.components(link, index)?));
    }
    Ok(TimeSeries {
        times: times(&range, reader.snapshot_rate()),
        values,
    })
}

/// Spread between the earliest and the latest echo of every snapshot.
pub fn multipath_spread(
    reader: &ContinuousDelayReader,
    link: &str,
    start_time: f64,
    length: f64,
) -> Result<TimeSeries<f64>> {
    continuous_series(reader, link, start_time, length, |components| {
        if components.len() < 2 {
            return 0.0;
        }
        let (lo, hi) = components
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                (lo.min(c.delay), hi.max(c.delay))
            });
        hi - lo
    })
}

/// Number of components of every snapshot.
pub fn component_counts(
    reader: &ContinuousDelayReader,
    link: &str,
    start_time: f64,
    length: f64,
) -> Result<TimeSeries<usize>> {
    continuous_series(reader, link, start_time, length, |components| components.len())
}

fn magnitude_sum<'a>(components: impl Iterator<Item = &'a MultipathComponent>) -> f64 {
    components.map(MultipathComponent::magnitude).sum()
}

/// Sum of component magnitudes per snapshot.
pub fn channel_power(
    reader: &ContinuousDelayReader,
    link: &str,
    start_time: f64,
    length: f64,
) -> Result<TimeSeries<f64>> {
    continuous_series(reader, link, start_time, length, |components| {
        magnitude_sum(components.iter())
    })
}

/// Magnitude sums split into line-of-sight and multipath categories.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PowerSplit {
    /// Categories below [`MULTIPATH_TYPE_START`].
    pub line_of_sight: f64,
    pub multipath: f64,
}

/// [`channel_power`] split by component category.
pub fn los_multipath_power(
    reader: &ContinuousDelayReader,
    link: &str,
    start_time: f64,
    length: f64,
) -> Result<TimeSeries<PowerSplit>> {
    continuous_series(reader, link, start_time, length, |components| {
        let (los, mp): (Vec<_>, Vec<_>) = components
            .iter()
            .partition(|c| c.kind < MULTIPATH_TYPE_START);
        PowerSplit {
            line_of_sight: magnitude_sum(los.into_iter()),
            multipath: magnitude_sum(mp.into_iter()),
        }
    })
}

/// Coherent power `|Σ a|²` of every discrete snapshot.
pub fn discrete_channel_power(
    reader: &DiscreteDelayReader,
    link: &str,
    start_time: f64,
    length: f64,
) -> Result<TimeSeries<f64>> {
    let range = reader.snapshot_range_for_time(start_time, length)?;
    let snapshots = reader.snapshot_range(link, range.start, range.len())?;
    let values = snapshots
        .iter()
        .map(|s| s.amplitudes.iter().sum::<Complex64>().norm_sqr())
        .collect();
    Ok(TimeSeries {
        times: times(&range, reader.snapshot_rate()),
        values,
    })
}

/// Binning of a [`PowerDelayProfile`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PdpOptions {
    /// Weakest binned power, dB (negative). The strongest bin is 0 dB.
    pub power_floor_db: f64,
    pub power_step_db: f64,
    /// End of the delay axis, seconds (exclusive).
    pub delay_max: f64,
    pub delay_step: f64,
    /// Initial count of every cell.
    pub lower_prob: f64,
}

impl Default for PdpOptions {
    fn default() -> Self {
        Self {
            power_floor_db: -30.0,
            power_step_db: 1.0,
            delay_max: 500e-9,
            delay_step: 10e-9,
            lower_prob: 1e-6,
        }
    }
}

impl PdpOptions {
    fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !(self.power_floor_db.is_finite() && self.power_floor_db < 0.0) {
            return Err(Error::validation(format!(
                "power floor must be below 0 dB, got {}",
                self.power_floor_db
            )));
        }
        if !positive(self.power_step_db) || !positive(self.delay_step) || !positive(self.delay_max) {
            return Err(Error::validation("profile steps and delay range must be positive"));
        }
        if !(self.lower_prob.is_finite() && self.lower_prob >= 0.0) {
            return Err(Error::validation(format!(
                "initial cell value must be non-negative, got {}",
                self.lower_prob
            )));
        }
        Ok(())
    }

    fn power_bins(&self) -> usize {
        (-self.power_floor_db / self.power_step_db).round() as usize + 1
    }

    fn delay_bins(&self) -> usize {
        (self.delay_max / self.delay_step).round() as usize
    }
}

/// Normalized histogram of component power over delay.
#[derive(Clone, Debug, PartialEq)]
pub struct PowerDelayProfile {
    /// Power of every row, dB, strongest first.
    pub power_axis: Vec<f64>,
    /// Delay of every column, seconds.
    pub delay_axis: Vec<f64>,
    /// Row-major cells, summing to one.
    pub cells: Vec<f64>,
}

impl PowerDelayProfile {
    /// Cell at power row `p` and delay column `d`.
    pub fn get(&self, p: usize, d: usize) -> Option<f64> {
        if p >= self.power_axis.len() || d >= self.delay_axis.len() {
            return None;
        }
        self.cells.get(p * self.delay_axis.len() + d).copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.cells.chunks(self.delay_axis.len().max(1))
    }
}

/// Histogram every component of every snapshot of `link` by delay and power.
///
/// Components outside the axes are skipped; a component whose delay rounds
/// to a negative bin is an error.
pub fn power_delay_profile(
    reader: &ContinuousDelayReader,
    link: &str,
    options: &PdpOptions,
) -> Result<PowerDelayProfile> {
    options.validate()?;
    let n_pwr = options.power_bins();
    let n_del = options.delay_bins();
    let mut cells = vec![options.lower_prob; n_pwr * n_del];
    let mut binned = 0usize;

    for index in 0..reader.snapshot_count() {
        for c in reader.components(link, index)? {
            let magnitude = if c.amplitude == Complex64::new(0.0, 0.0) {
                1e-9
            } else {
                c.magnitude()
            };
            let power_db = 10.0 * magnitude.log10();

            let del_bin = (c.delay / options.delay_step).round();
            if del_bin < 0.0 {
                return Err(Error::validation(format!(
                    "link '{}', snapshot {}: component {} has negative delay {:e} s",
                    link, index, c.id, c.delay
                )));
            }
            let pwr_bin = (power_db / -options.power_step_db).round();
            if pwr_bin < 0.0 || pwr_bin >= n_pwr as f64 || del_bin >= n_del as f64 {
                continue;
            }
            cells[pwr_bin as usize * n_del + del_bin as usize] += 1.0;
            binned += 1;
        }
    }
    debug!("power delay profile of link '{}': {} components binned", link, binned);

    let total: f64 = cells.iter().sum();
    if total > 0.0 {
        cells.iter_mut().for_each(|v| *v /= total);
    }

    Ok(PowerDelayProfile {
        power_axis: (0..n_pwr).map(|p| -(p as f64) * options.power_step_db).collect(),
        delay_axis: (0..n_del).map(|d| d as f64 * options.delay_step).collect(),
        cells,
    })
}
