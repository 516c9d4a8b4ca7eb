//! Channel model: parameters, components, snapshots and links.
//!
//! These types are independent of the on-disk layout; [`schema`] names the
//! groups and arrays the [`crate::file`] readers and writers map them to.

mod component;
mod link;
mod params;
pub mod schema;

pub use component::*;
pub use link::*;
pub use params::*;

pub use rustfft::num_complex::Complex64;
