//! Container file format constants and structures.
//!
//! ```text
//! +------------------+
//! | Magic: "CDXst"   |  5 bytes
//! +------------------+
//! | Frozen flag      |  1 byte (0x00 or 0xFF)
//! +------------------+
//! | Version          |  2 bytes (u16 LE)
//! +------------------+
//! | Root Group Pos   |  8 bytes (u64 LE)
//! +------------------+
//! | ... Blocks ...   |
//! +------------------+
//! ```
//!
//! A block is either *data* (`u64` size followed by bytes) or a *block group*
//! (`u64` child count followed by child offsets). The MSB of a child offset
//! tells data from group. Every container node (group or array) is one block
//! group whose first child is a header data block.

/// Magic bytes at the start of a container file.
pub const STORE_MAGIC: &[u8; 5] = b"CDXst";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Offset of the frozen flag in the header.
pub const FROZEN_OFFSET: usize = 5;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 6;

/// Offset of the root group position in the header.
pub const ROOT_POS_OFFSET: usize = 8;

/// Current format version.
pub const CURRENT_VERSION: u16 = 1;

/// Frozen flag value once the writer has finalized the file.
pub const FROZEN_FLAG: u8 = 0xFF;

/// Frozen flag value while the file is still being written.
pub const NOT_FROZEN_FLAG: u8 = 0x00;

/// Bit mask for the type flag in child offsets (set = data).
pub const TYPE_FLAG_MASK: u64 = 1 << 63;

/// Mask to extract the actual offset from a child pointer.
pub const OFFSET_MASK: u64 = !(1 << 63);

/// Header tag of a group node.
pub const NODE_GROUP: u8 = 0;

/// Header tag of an array node.
pub const NODE_ARRAY: u8 = 1;

/// Dimension value meaning "no upper bound" in an array header.
pub const UNLIMITED: u64 = u64::MAX;

/// Check if a child offset represents a block group (MSB clear).
#[inline]
pub const fn is_group_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) == 0
}

/// Check if a child offset represents data (MSB set).
#[inline]
pub const fn is_data_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) != 0
}

/// Extract the actual position from a child offset.
#[inline]
pub const fn extract_offset(offset: u64) -> u64 {
    offset & OFFSET_MASK
}

/// Create a group child offset (MSB clear).
#[inline]
pub const fn make_group_offset(pos: u64) -> u64 {
    pos & OFFSET_MASK
}

/// Create a data child offset (MSB set).
#[inline]
pub const fn make_data_offset(pos: u64) -> u64 {
    pos | TYPE_FLAG_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic() {
        assert_eq!(STORE_MAGIC.len(), 5);
        assert!(HEADER_SIZE >= STORE_MAGIC.len() + 1 + 2 + 8);
    }

    #[test]
    fn test_offsets() {
        let group_offset = make_group_offset(0x1234);
        assert!(is_group_offset(group_offset));
        assert!(!is_data_offset(group_offset));
        assert_eq!(extract_offset(group_offset), 0x1234);

        let data_offset = make_data_offset(0x5678);
        assert!(is_data_offset(data_offset));
        assert!(!is_group_offset(data_offset));
        assert_eq!(extract_offset(data_offset), 0x5678);
        assert_eq!(data_offset, 0x8000000000005678);
    }
}
