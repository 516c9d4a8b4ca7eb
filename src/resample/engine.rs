//! Continuous-delay to discrete-delay conversion.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use super::filter::SpectralFilter;
use super::grid::{subtract_reference_delays, DelayWindow, SamplingGrid};
use super::kernel::SincKernel;
use super::scheduler::SnapshotScheduler;
use crate::file::{ContinuousDelayReader, DiscreteDelayWriter, WriterOptions};
use crate::model::{Complex64, ContinuousSnapshot};
use crate::util::{Error, Result};

/// Conversion settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConversionOptions {
    /// Delay grid sample rate of the output, Hz.
    pub sample_rate: f64,
    /// Margin added before the smallest delay, seconds.
    pub delay_before_min: f64,
    /// Margin added after the largest delay, seconds.
    pub delay_after_max: f64,
    /// Apply the frequency-domain Hamming filter to every row.
    pub enable_filtering: bool,
    /// Make component delays relative to their snapshot's reference delay.
    pub subtract_reference_delay: bool,
    /// Only use components of this category.
    pub component_type: Option<u16>,
    /// Worker threads, rayon's default when `None`.
    pub threads: Option<usize>,
    /// Zlib level of the output chunks.
    pub compression_level: i32,
}

impl ConversionOptions {
    /// Options with the given sample rate, no margins and nothing enabled.
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            delay_before_min: 0.0,
            delay_after_max: 0.0,
            enable_filtering: false,
            subtract_reference_delay: false,
            component_type: None,
            threads: None,
            compression_level: 0,
        }
    }

    /// Check the options before any work is done.
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(Error::validation(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        for (name, value) in [
            ("delay before minimum", self.delay_before_min),
            ("delay after maximum", self.delay_after_max),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::validation(format!(
                    "{} must be a non-negative duration, got {}",
                    name, value
                )));
            }
        }
        if self.threads == Some(0) {
            return Err(Error::validation("thread count must be at least 1"));
        }
        Ok(())
    }
}

/// Per-link outcome of a conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkReport {
    pub link: String,
    pub grid_size: usize,
    /// Delay of the first grid bin, seconds.
    pub min_delay: f64,
    pub snapshot_count: usize,
    /// Components accumulated onto the grid.
    pub component_count: usize,
}

/// Outcome of a conversion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversionReport {
    pub links: Vec<LinkReport>,
    pub snapshot_count: usize,
}

/// One link resampled onto its grid.
#[derive(Clone, Debug)]
pub struct ResampledLink {
    pub grid: SamplingGrid,
    /// One row per snapshot, `grid.size` bins each.
    pub rows: Vec<Vec<Complex64>>,
    /// Output reference delays (zero when subtracted).
    pub reference_delays: Vec<f64>,
    /// Components accumulated onto the grid.
    pub component_count: usize,
}

/// Resample the snapshots of one link.
///
/// Grid determination runs on the calling thread; the per-snapshot
/// accumulation and filtering run on the scheduler's workers.
pub fn resample_link(
    link: &str,
    mut snapshots: Vec<ContinuousSnapshot>,
    options: &ConversionOptions,
    scheduler: &SnapshotScheduler,
) -> Result<ResampledLink> {
    if options.subtract_reference_delay {
        subtract_reference_delays(&mut snapshots);
    }

    // the category filter only selects what is accumulated, the grid spans every component
    let window = DelayWindow::scan(&snapshots);
    let grid = SamplingGrid::from_window(
        link,
        &window,
        options.sample_rate,
        options.delay_before_min,
        options.delay_after_max,
    )?;
    debug!(
        "link '{}': delays {:e}..{:e} s, {} bins from {:e} s",
        link,
        grid.delay_min,
        grid.delay_max,
        grid.size,
        grid.min_delay()
    );

    let kernel = SincKernel::new(grid, options.component_type);
    let component_count = match options.component_type {
        Some(kind) => snapshots
            .iter()
            .map(|s| s.components.iter().filter(|c| c.kind == kind).count())
            .sum(),
        None => window.components(),
    };
    let filter = options.enable_filtering.then(|| SpectralFilter::new(grid.size));

    let rows = scheduler.try_run(snapshots.len(), |k| {
        let mut row = kernel.row(&snapshots[k].components);
        if let Some(filter) = &filter {
            filter.apply(&mut row).map_err(|e| {
                Error::validation(format!("link '{}', snapshot {}: {}", link, k, e))
            })?;
        }
        Ok(row)
    })?;

    Ok(ResampledLink {
        grid,
        rows,
        reference_delays: snapshots.iter().map(|s| s.reference_delay).collect(),
        component_count,
    })
}

/// Convert the continuous-delay container at `input` into a discrete-delay
/// container at `output`.
///
/// Every link is resampled before the output is created, so a failed
/// conversion leaves no output file behind.
pub fn convert(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &ConversionOptions,
) -> Result<ConversionReport> {
    options.validate()?;
    let started = Instant::now();

    let reader = ContinuousDelayReader::open(input.as_ref())?;
    let count = reader.snapshot_count();
    info!(
        "converting {} ({} links, {} snapshots) at {} Hz",
        input.as_ref().display(),
        reader.link_count(),
        count,
        options.sample_rate
    );

    let scheduler = SnapshotScheduler::new(options.threads)?;
    let mut resampled = Vec::with_capacity(reader.link_count());
    for link in reader.link_names() {
        let snapshots = reader.snapshots(link, 0..count)?;
        let link_started = Instant::now();
        let result = resample_link(link, snapshots, options, &scheduler)?;
        info!(
            "link '{}': {} bins, {} components in {:.2?}",
            link,
            result.grid.size,
            result.component_count,
            link_started.elapsed()
        );
        resampled.push((link.clone(), result));
    }

    let mut writer = DiscreteDelayWriter::create_with_options(
        output.as_ref(),
        *reader.parameters(),
        options.sample_rate,
        reader.link_names().iter(),
        WriterOptions {
            compression_level: options.compression_level,
        },
    )?;

    let mut report = ConversionReport {
        links: Vec::with_capacity(resampled.len()),
        snapshot_count: count,
    };
    let mut streams = Vec::with_capacity(resampled.len());
    for (link, result) in resampled {
        writer.configure_link(&link, result.grid.size, result.grid.min_delay())?;
        report.links.push(LinkReport {
            link: link.clone(),
            grid_size: result.grid.size,
            min_delay: result.grid.min_delay(),
            snapshot_count: result.rows.len(),
            component_count: result.component_count,
        });
        streams.push((link, result.rows.into_iter(), result.reference_delays));
    }

    for index in 0..count {
        let mut amplitudes = HashMap::with_capacity(streams.len());
        let mut reference_delays = HashMap::with_capacity(streams.len());
        for (link, rows, refs) in &mut streams {
            let row = rows.next().ok_or_else(|| {
                Error::consistency(format!("link '{}' ran out of rows at snapshot {}", link, index))
            })?;
            amplitudes.insert(link.clone(), row);
            reference_delays.insert(link.clone(), refs[index]);
        }
        writer.append_snapshot(&amplitudes, &reference_delays, index)?;
    }
    writer.close()?;

    info!(
        "wrote {} in {:.2?}",
        output.as_ref().display(),
        started.elapsed()
    );
    Ok(report)
}
