//! Utility types shared by every layer.
//!
//! - [`Error`] / [`Result`] - channel model and engine errors
//! - [`StoreError`] / [`StoreResult`] - container errors

mod error;

pub use error::*;
