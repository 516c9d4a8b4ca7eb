//! Channel container files.
//!
//! Two variants share one layout of root parameters and a `links` group:
//!
//! - [`ContinuousDelayWriter`] / [`ContinuousDelayReader`] - sparse
//!   snapshots of multipath components with exact delays
//! - [`DiscreteDelayWriter`] / [`DiscreteDelayReader`] - dense snapshots on
//!   a uniform per-link delay grid
//!
//! Writers follow the append protocol: link names are fixed at creation,
//! snapshots are appended for all links at once with contiguous indices, and
//! the file is only readable after `close`.

mod continuous;
mod discrete;

pub use continuous::*;
pub use discrete::*;

use std::ops::Range;
use std::path::Path;

use tracing::debug;

use crate::model::schema;
use crate::model::{ChannelParameters, DelayRepresentation};
use crate::store::{Group, GroupId, StoreOptions, StoreReader, StoreWriter};
use crate::util::{Error, Result, StoreError};

/// Options for container writers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// Zlib level for array chunks, `0` stores them raw.
    pub compression_level: i32,
}

impl From<WriterOptions> for StoreOptions {
    fn from(o: WriterOptions) -> Self {
        StoreOptions {
            compression_level: o.compression_level,
        }
    }
}

/// Map missing or mistyped nodes to a schema error, keep everything else.
pub(crate) fn schema_error(err: StoreError) -> Error {
    match err {
        StoreError::NotFound(path) => Error::schema(format!("missing {}", path)),
        StoreError::TypeMismatch {
            path,
            expected,
            actual,
        } => Error::schema(format!("{} is {}, expected {}", path, actual, expected)),
        other => Error::Store(other),
    }
}

/// Create the root parameters and the `links` group.
pub(crate) fn write_parameters(
    store: &mut StoreWriter,
    params: &ChannelParameters,
    repr: DelayRepresentation,
) -> Result<GroupId> {
    params.validate()?;
    let root = store.root();
    store.write_scalar(root, schema::SPEED_OF_LIGHT, params.speed_of_light)?;
    store.write_scalar(root, schema::SNAPSHOT_RATE, params.snapshot_rate)?;
    store.write_scalar(root, schema::TRANSMITTER_FREQUENCY, params.transmitter_frequency)?;
    store.write_scalar(root, schema::DELAY_REPRESENTATION, repr.as_str())?;
    store.write_scalar(root, schema::LIBRARY, schema::library_id())?;
    Ok(store.create_group(root, schema::LINKS)?)
}

/// Representation stored in a container.
pub(crate) fn read_representation(root: &Group) -> Result<DelayRepresentation> {
    root.scalar::<String>(schema::DELAY_REPRESENTATION)
        .map_err(schema_error)?
        .parse()
}

/// Load the root parameters and the link names, checking the representation.
pub(crate) fn read_parameters(
    store: &StoreReader,
    expected: DelayRepresentation,
) -> Result<(ChannelParameters, Vec<String>)> {
    let root = store.root();
    let repr = read_representation(root)?;
    if repr != expected {
        return Err(Error::schema(format!(
            "{} holds a {} container, expected {}",
            store.path().display(),
            repr,
            expected
        )));
    }

    let params = ChannelParameters {
        speed_of_light: root.scalar(schema::SPEED_OF_LIGHT).map_err(schema_error)?,
        snapshot_rate: root.scalar(schema::SNAPSHOT_RATE).map_err(schema_error)?,
        transmitter_frequency: root
            .scalar(schema::TRANSMITTER_FREQUENCY)
            .map_err(schema_error)?,
    };
    if !(params.snapshot_rate.is_finite() && params.snapshot_rate > 0.0) {
        return Err(Error::schema(format!(
            "invalid snapshot rate {}",
            params.snapshot_rate
        )));
    }

    let links = root.group(schema::LINKS).map_err(schema_error)?;
    let names: Vec<String> = links.group_names().map(str::to_string).collect();
    debug!(
        "opened {} container {} with {} links",
        repr,
        store.path().display(),
        names.len()
    );
    Ok((params, names))
}

/// Representation of the container at `path`.
pub fn probe(path: impl AsRef<Path>) -> Result<DelayRepresentation> {
    let store = StoreReader::open(path)?;
    read_representation(store.root())
}

/// Snapshot index range covering `length` seconds from `start_time`.
///
/// `length == 0` selects everything up to the end.
pub(crate) fn time_window(
    snapshot_count: usize,
    snapshot_rate: f64,
    start_time: f64,
    length: f64,
) -> Result<Range<usize>> {
    if !(start_time.is_finite() && start_time >= 0.0) || !(length.is_finite() && length >= 0.0) {
        return Err(Error::validation(format!(
            "invalid time window: start {} s, length {} s",
            start_time, length
        )));
    }

    let duration = snapshot_count as f64 / snapshot_rate;
    let end_time = if length == 0.0 { duration } else { start_time + length };
    if start_time > duration || end_time > duration {
        return Err(Error::validation(format!(
            "time window {}..{} s exceeds container duration of {} s",
            start_time, end_time, duration
        )));
    }

    let start = (start_time * snapshot_rate).floor() as usize;
    let end = ((end_time * snapshot_rate).floor() as usize).min(snapshot_count);
    Ok(start..end.max(start))
}
