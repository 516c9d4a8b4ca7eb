//! # CDX
//!
//! Channel impulse response containers for vehicular and satellite
//! propagation simulations.
//!
//! A container stores, per radio link, a time series of channel snapshots in
//! one of two representations:
//!
//! - **continuous-delay** - every snapshot is a sparse list of multipath
//!   components with exact delays and complex amplitudes
//! - **discrete-delay** - every snapshot is a dense row of complex amplitudes
//!   on a uniform delay grid
//!
//! ## Modules
//!
//! - [`util`] - Error types
//! - [`store`] - Append-only block container with typed, chunked arrays
//! - [`model`] - Channel parameters, components, snapshots and link sets
//! - [`file`] - Container writers (append protocol) and readers
//! - [`resample`] - Continuous to discrete conversion engine
//! - [`analysis`] - Per-link channel statistics
//!
//! ## Example
//!
//! ```ignore
//! use cdx::prelude::*;
//!
//! let mut options = ConversionOptions::new(1e9);
//! options.delay_before_min = 20e-9;
//! options.delay_after_max = 200e-9;
//! options.enable_filtering = true;
//! let report = convert("scenario.cdx", "scenario-discrete.cdx", &options)?;
//!
//! let reader = DiscreteDelayReader::open("scenario-discrete.cdx")?;
//! for link in reader.link_names() {
//!     println!("{}: {} bins", link, reader.grid(link)?.size);
//! }
//! ```

pub mod analysis;
pub mod file;
pub mod model;
pub mod resample;
pub mod store;
pub mod util;

// Re-export commonly used types
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::file::{
        probe, ContinuousDelayReader, ContinuousDelayWriter, DiscreteDelayReader,
        DiscreteDelayWriter, WriterOptions,
    };
    pub use crate::model::{
        ChannelParameters, Complex64, ComponentTypes, ContinuousSnapshot, DelayGrid,
        DelayRepresentation, DiscreteSnapshot, LinkSet, MultipathComponent,
    };
    pub use crate::resample::{convert, ConversionOptions, ConversionReport};
    pub use crate::util::{Error, Result};
}
