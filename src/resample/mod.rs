//! Continuous-delay to discrete-delay resampling.
//!
//! Per link:
//!
//! 1. [`grid`] - scan all snapshots for the common delay window and derive
//!    the uniform output grid
//! 2. [`kernel`] - place every echo on the grid with a sinc kernel
//!    band-limited to half the grid sample rate
//! 3. [`filter`] - optionally taper each row with a Hamming window in the
//!    frequency domain
//! 4. [`engine`] - write the rows back through the discrete-delay append
//!    protocol
//!
//! Steps 2 and 3 run per snapshot on the [`scheduler`]'s worker pool.

pub mod engine;
pub mod filter;
pub mod grid;
pub mod kernel;
pub mod scheduler;

pub use engine::{convert, resample_link, ConversionOptions, ConversionReport, LinkReport, ResampledLink};
pub use filter::SpectralFilter;
pub use grid::{DelayWindow, SamplingGrid};
pub use kernel::{sinc, SincKernel};
pub use scheduler::SnapshotScheduler;
