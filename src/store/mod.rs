//! Hierarchical typed-array container.
//!
//! Named groups hold scalar attributes, child groups and typed N-d arrays.
//! Arrays may grow along unbounded dimensions; growable arrays are stored in
//! chunks, optionally zlib-compressed.
//!
//! ## File Structure
//!
//! ```text
//! +------------------+
//! | Header           |  16 bytes (magic, frozen flag, version, root pos)
//! +------------------+
//! | Array chunks     |
//! | Node headers     |
//! | Block groups     |  written bottom-up on close
//! +------------------+
//! ```
//!
//! Readers reject files whose frozen flag was never set.

mod cache;
mod compression;
mod element;
mod format;
mod layout;
mod reader;
mod writer;

pub use cache::ChunkCache;
pub use element::*;
pub use format::{CURRENT_VERSION, STORE_MAGIC, UNLIMITED};
pub use layout::{num_elements, ArraySpec, Dims, DEFAULT_CHUNK_LEN};
pub use reader::{Array, Group, IStreams, StoreReader};
pub use writer::{ArrayId, GroupId, StoreOptions, StoreWriter};
