//! Discrete-delay containers.
//!
//! Each link stores its amplitudes as two growable planes
//! `[grid_size][snapshot]` (real and imaginary parts), chunked one column per
//! chunk so appending a snapshot touches only the new column.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::path::Path;

use tracing::{debug, info, warn};

use super::{read_parameters, schema_error, time_window, write_parameters, WriterOptions};
use crate::model::schema;
use crate::model::{
    ChannelParameters, Complex64, DelayGrid, DelayRepresentation, DiscreteSnapshot, LinkSet,
};
use crate::store::{Array, ArrayId, ArraySpec, GroupId, StoreReader, StoreWriter};
use crate::util::{Error, Result};

/// Storage of a configured link.
struct LinkPlanes {
    grid: DelayGrid,
    real: ArrayId,
    imag: ArrayId,
}

/// Write-side state of one link.
struct DiscreteLink {
    group: GroupId,
    reference_delays: ArrayId,
    planes: Option<LinkPlanes>,
}

/// Writer for discrete-delay containers.
///
/// Every link must be configured with its grid before the first append.
pub struct DiscreteDelayWriter {
    store: StoreWriter,
    params: ChannelParameters,
    delay_sample_rate: f64,
    links: LinkSet,
    meta: Vec<DiscreteLink>,
    snapshot_count: usize,
}

impl DiscreteDelayWriter {
    /// Create a container whose grids are sampled at `delay_sample_rate` Hz.
    pub fn create<I, S>(
        path: impl AsRef<Path>,
        params: ChannelParameters,
        delay_sample_rate: f64,
        link_names: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::create_with_options(path, params, delay_sample_rate, link_names, WriterOptions::default())
    }

    /// Create a container with explicit writer options.
    pub fn create_with_options<I, S>(
        path: impl AsRef<Path>,
        params: ChannelParameters,
        delay_sample_rate: f64,
        link_names: I,
        options: WriterOptions,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let links = LinkSet::new(link_names)?;
        if !(delay_sample_rate.is_finite() && delay_sample_rate > 0.0) {
            return Err(Error::validation(format!(
                "delay sample rate must be positive, got {}",
                delay_sample_rate
            )));
        }
        params.validate()?;

        let mut store = StoreWriter::create_with_options(path.as_ref(), options.into())?;
        let links_group = write_parameters(&mut store, &params, DelayRepresentation::Discrete)?;
        let root = store.root();
        store.write_scalar(root, schema::DELAY_SAMPLE_RATE, delay_sample_rate)?;

        let mut meta = Vec::with_capacity(links.len());
        for name in &links {
            let group = store.create_group(links_group, name)?;
            let reference_delays = store.create_array::<f64>(
                group,
                schema::REFERENCE_DELAYS,
                ArraySpec::growable(&[0], &[0]),
            )?;
            meta.push(DiscreteLink {
                group,
                reference_delays,
                planes: None,
            });
        }

        info!(
            "created discrete-delay container {} with {} links at {} Hz",
            path.as_ref().display(),
            links.len(),
            delay_sample_rate
        );
        Ok(Self {
            store,
            params,
            delay_sample_rate,
            links,
            meta,
            snapshot_count: 0,
        })
    }

    /// Channel parameters.
    pub fn parameters(&self) -> &ChannelParameters {
        &self.params
    }

    /// Delay grid sample rate, Hz.
    pub fn delay_sample_rate(&self) -> f64 {
        self.delay_sample_rate
    }

    /// Declared links.
    pub fn links(&self) -> &LinkSet {
        &self.links
    }

    /// Number of snapshots appended so far.
    pub fn snapshot_count(&self) -> usize {
        self.snapshot_count
    }

    fn link_index(&self, link: &str) -> Result<usize> {
        self.links
            .iter()
            .position(|n| n == link)
            .ok_or_else(|| Error::validation(format!("unknown link '{}'", link)))
    }

    /// Grid of a configured link.
    pub fn grid(&self, link: &str) -> Result<Option<DelayGrid>> {
        let i = self.link_index(link)?;
        Ok(self.meta[i].planes.as_ref().map(|p| p.grid))
    }

    /// Fix the delay grid of a link: `grid_size` bins from `min_delay`.
    ///
    /// Must be called exactly once per link, before the first append.
    pub fn configure_link(&mut self, link: &str, grid_size: usize, min_delay: f64) -> Result<DelayGrid> {
        let i = self.link_index(link)?;
        if self.meta[i].planes.is_some() {
            return Err(Error::precondition(format!("link '{}' is already configured", link)));
        }
        if self.snapshot_count > 0 {
            return Err(Error::precondition(format!(
                "link '{}' configured after {} snapshots were appended",
                link, self.snapshot_count
            )));
        }
        if grid_size == 0 {
            return Err(Error::validation(format!("grid size of link '{}' must be non-zero", link)));
        }
        if !min_delay.is_finite() {
            return Err(Error::validation(format!(
                "minimum delay of link '{}' must be finite, got {}",
                link, min_delay
            )));
        }

        let grid = DelayGrid::new(grid_size, min_delay, self.delay_sample_rate);
        let group = self.meta[i].group;
        let rows = grid_size as u64;

        self.store.write_array(group, schema::DELAY_AXIS, &grid.axis())?;
        let spec = ArraySpec::growable(&[rows, 0], &[1]).with_chunk(&[rows, 1]);
        let real = self.store.create_array::<f64>(group, schema::AMPLITUDE_REAL, spec.clone())?;
        let imag = self.store.create_array::<f64>(group, schema::AMPLITUDE_IMAG, spec)?;

        debug!(
            "configured link '{}': {} bins from {} s",
            link, grid_size, min_delay
        );
        self.meta[i].planes = Some(LinkPlanes { grid, real, imag });
        Ok(grid)
    }

    /// Append snapshot `snapshot_index` for every link.
    ///
    /// Every vector must match its link's grid size. Nothing is written when
    /// validation fails.
    pub fn append_snapshot(
        &mut self,
        amplitudes: &HashMap<String, Vec<Complex64>>,
        reference_delays: &HashMap<String, f64>,
        snapshot_index: usize,
    ) -> Result<()> {
        self.links.check_keys(amplitudes, "amplitudes")?;
        self.links.check_keys(reference_delays, "reference delays")?;
        if snapshot_index != self.snapshot_count {
            return Err(Error::validation(format!(
                "snapshot index {} out of order, expected {}",
                snapshot_index, self.snapshot_count
            )));
        }
        for (link, meta) in self.links.names().iter().zip(&self.meta) {
            let planes = meta.planes.as_ref().ok_or_else(|| {
                Error::precondition(format!(
                    "link '{}' must be configured before appending snapshot {}",
                    link, snapshot_index
                ))
            })?;
            let len = amplitudes[link.as_str()].len();
            if len != planes.grid.size {
                return Err(Error::validation(format!(
                    "snapshot {} of link '{}' has {} amplitudes, grid has {}",
                    snapshot_index, link, len, planes.grid.size
                )));
            }
        }

        let n = self.snapshot_count as u64;
        for (link, meta) in self.links.names().iter().zip(&self.meta) {
            let Some(planes) = meta.planes.as_ref() else {
                continue;
            };
            let rows = planes.grid.size as u64;
            let vector = &amplitudes[link.as_str()];
            let re: Vec<f64> = vector.iter().map(|a| a.re).collect();
            let im: Vec<f64> = vector.iter().map(|a| a.im).collect();

            let failed = |e| Error::append(link, snapshot_index, e);
            self.store.extend_array(planes.real, &[rows, n + 1]).map_err(failed)?;
            self.store
                .write_slice(planes.real, &[0, n], &[rows, 1], &re)
                .map_err(failed)?;
            self.store.extend_array(planes.imag, &[rows, n + 1]).map_err(failed)?;
            self.store
                .write_slice(planes.imag, &[0, n], &[rows, 1], &im)
                .map_err(failed)?;

            self.store
                .extend_array(meta.reference_delays, &[n + 1])
                .map_err(failed)?;
            self.store
                .write_slice(
                    meta.reference_delays,
                    &[n],
                    &[1],
                    &[reference_delays[link.as_str()]],
                )
                .map_err(failed)?;
        }

        self.snapshot_count += 1;
        Ok(())
    }

    /// Write the time axis of every link and finalize the container.
    pub fn close(mut self) -> Result<()> {
        let rate = self.params.snapshot_rate;
        let time_axis: Vec<f64> = (0..self.snapshot_count).map(|i| i as f64 / rate).collect();

        for (link, meta) in self.links.names().iter().zip(&self.meta) {
            if meta.planes.is_none() {
                warn!("link '{}' was never configured", link);
            }
            self.store.write_array(meta.group, schema::TIME_AXIS, &time_axis)?;
        }

        debug!("closing discrete-delay container after {} snapshots", self.snapshot_count);
        self.store.close()?;
        Ok(())
    }
}

/// Read-side state of one link.
struct LinkEntry {
    grid: Option<DelayGrid>,
    reference_delays: Vec<f64>,
    time_axis: Vec<f64>,
    planes: Option<(Array, Array)>,
}

/// Reader for discrete-delay containers.
pub struct DiscreteDelayReader {
    store: StoreReader,
    params: ChannelParameters,
    delay_sample_rate: f64,
    link_names: Vec<String>,
    links: HashMap<String, LinkEntry>,
    snapshot_count: usize,
}

impl fmt::Debug for DiscreteDelayReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscreteDelayReader")
            .field("path", &self.store.path())
            .field("links", &self.link_names)
            .field("delay_sample_rate", &self.delay_sample_rate)
            .field("snapshot_count", &self.snapshot_count)
            .finish()
    }
}

impl DiscreteDelayReader {
    /// Open a finalized discrete-delay container.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = StoreReader::open(path)?;
        let (params, link_names) = read_parameters(&store, DelayRepresentation::Discrete)?;
        let delay_sample_rate: f64 = store
            .root()
            .scalar(schema::DELAY_SAMPLE_RATE)
            .map_err(schema_error)?;

        let mut links = HashMap::with_capacity(link_names.len());
        let mut counts: Vec<(String, usize)> = Vec::with_capacity(link_names.len());
        for name in &link_names {
            let group = store.group(&schema::link_path(name)).map_err(schema_error)?;
            let reference_delays: Vec<f64> = group
                .array(schema::REFERENCE_DELAYS)
                .and_then(|a| a.read_all())
                .map_err(schema_error)?;
            let time_axis: Vec<f64> = group
                .array(schema::TIME_AXIS)
                .and_then(|a| a.read_all())
                .map_err(schema_error)?;

            let (grid, planes) = if group.has_child(schema::DELAY_AXIS) {
                let axis: Vec<f64> = group
                    .array(schema::DELAY_AXIS)
                    .and_then(|a| a.read_all())
                    .map_err(schema_error)?;
                let real = group.array(schema::AMPLITUDE_REAL).map_err(schema_error)?;
                let imag = group.array(schema::AMPLITUDE_IMAG).map_err(schema_error)?;
                let expected = [axis.len() as u64, reference_delays.len() as u64];
                if real.shape() != expected || imag.shape() != expected {
                    return Err(Error::consistency(format!(
                        "link '{}' amplitude planes {:?} / {:?} do not match {} bins x {} snapshots",
                        name,
                        real.shape(),
                        imag.shape(),
                        expected[0],
                        expected[1]
                    )));
                }
                let min_delay = axis.first().copied().unwrap_or(0.0);
                (
                    Some(DelayGrid::new(axis.len(), min_delay, delay_sample_rate)),
                    Some((real, imag)),
                )
            } else {
                (None, None)
            };

            counts.push((name.clone(), reference_delays.len()));
            links.insert(
                name.clone(),
                LinkEntry {
                    grid,
                    reference_delays,
                    time_axis,
                    planes,
                },
            );
        }

        let snapshot_count = counts.first().map(|(_, c)| *c).unwrap_or(0);
        if let Some((name, count)) = counts.iter().find(|(_, c)| *c != snapshot_count) {
            return Err(Error::consistency(format!(
                "link '{}' has {} snapshots, link '{}' has {}",
                name, count, counts[0].0, snapshot_count
            )));
        }

        Ok(Self {
            store,
            params,
            delay_sample_rate,
            link_names,
            links,
            snapshot_count,
        })
    }

    fn link(&self, name: &str) -> Result<&LinkEntry> {
        self.links
            .get(name)
            .ok_or_else(|| Error::validation(format!("unknown link '{}'", name)))
    }

    fn planes(&self, name: &str) -> Result<&(Array, Array)> {
        self.link(name)?
            .planes
            .as_ref()
            .ok_or_else(|| Error::schema(format!("link '{}' has no delay grid", name)))
    }

    /// Underlying container path.
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Channel parameters.
    pub fn parameters(&self) -> &ChannelParameters {
        &self.params
    }

    pub fn snapshot_rate(&self) -> f64 {
        self.params.snapshot_rate
    }

    /// Delay grid sample rate, Hz.
    pub fn delay_sample_rate(&self) -> f64 {
        self.delay_sample_rate
    }

    pub fn link_names(&self) -> &[String] {
        &self.link_names
    }

    pub fn link_count(&self) -> usize {
        self.link_names.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshot_count
    }

    pub fn duration(&self) -> f64 {
        self.snapshot_count as f64 / self.params.snapshot_rate
    }

    /// Delay grid of a link.
    pub fn grid(&self, link: &str) -> Result<DelayGrid> {
        self.link(link)?
            .grid
            .ok_or_else(|| Error::schema(format!("link '{}' has no delay grid", link)))
    }

    /// Delays of the grid bins.
    pub fn delay_axis(&self, link: &str) -> Result<Vec<f64>> {
        Ok(self.grid(link)?.axis())
    }

    /// Snapshot times written on close.
    pub fn time_axis(&self, link: &str) -> Result<&[f64]> {
        Ok(&self.link(link)?.time_axis)
    }

    pub fn reference_delays(&self, link: &str) -> Result<&[f64]> {
        Ok(&self.link(link)?.reference_delays)
    }

    /// `count` snapshots starting at `start`.
    pub fn snapshot_range(&self, link: &str, start: usize, count: usize) -> Result<Vec<DiscreteSnapshot>> {
        if !matches!(start.checked_add(count), Some(end) if end <= self.snapshot_count) {
            return Err(Error::validation(format!(
                "{} snapshots from {} of link '{}' out of range ({} snapshots)",
                count, start, link, self.snapshot_count
            )));
        }
        let (real, imag) = self.planes(link)?;
        let rows = real.shape()[0];
        let offset = [0, start as u64];
        let extent = [rows, count as u64];
        let re: Vec<f64> = real.read_slice(&offset, &extent).map_err(schema_error)?;
        let im: Vec<f64> = imag.read_slice(&offset, &extent).map_err(schema_error)?;
        let refs = &self.link(link)?.reference_delays;

        // planes are row-major [bin][snapshot]
        Ok((0..count)
            .map(|j| DiscreteSnapshot {
                amplitudes: (0..rows as usize)
                    .map(|k| Complex64::new(re[k * count + j], im[k * count + j]))
                    .collect(),
                reference_delay: refs[start + j],
            })
            .collect())
    }

    /// All snapshots of a link.
    pub fn snapshots(&self, link: &str) -> Result<Vec<DiscreteSnapshot>> {
        self.snapshot_range(link, 0, self.snapshot_count)
    }

    /// One snapshot of a link.
    pub fn snapshot(&self, link: &str, index: usize) -> Result<DiscreteSnapshot> {
        let mut snaps = self.snapshot_range(link, index, 1)?;
        snaps
            .pop()
            .ok_or_else(|| Error::validation(format!("snapshot {} of link '{}' missing", index, link)))
    }

    /// Snapshot index range covering a time window (`length == 0`: to the end).
    pub fn snapshot_range_for_time(&self, start_time: f64, length: f64) -> Result<Range<usize>> {
        time_window(self.snapshot_count, self.params.snapshot_rate, start_time, length)
    }
}
