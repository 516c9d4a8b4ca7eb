//! Append-only block output behind the container header.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::store::format::*;
use crate::util::{StoreError, StoreResult};

/// Appends data blocks and block groups to a new container file.
///
/// Blocks are never rewritten in place; the only bytes patched after the
/// fact are the root position and the frozen flag in [`BlockSink::finish`].
pub(super) struct BlockSink {
    out: BufWriter<File>,
    end: u64,
}

impl BlockSink {
    /// Truncate `path` and write an unfrozen header without a root.
    pub fn create(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut out = BufWriter::with_capacity(1 << 20, file);

        out.write_all(STORE_MAGIC)?;
        out.write_u8(NOT_FROZEN_FLAG)?;
        out.write_u16::<LittleEndian>(CURRENT_VERSION)?;
        out.write_u64::<LittleEndian>(0)?;

        Ok(Self {
            out,
            end: HEADER_SIZE as u64,
        })
    }

    /// Position of the next block, i.e. bytes appended so far.
    #[inline]
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Append a data block and return its position.
    pub fn data(&mut self, payload: &[u8]) -> StoreResult<u64> {
        let pos = self.end;
        self.out.write_u64::<LittleEndian>(payload.len() as u64)?;
        self.out.write_all(payload)?;
        self.end += 8 + payload.len() as u64;
        Ok(pos)
    }

    /// Append a block group and return its position.
    pub fn group(&mut self, children: &[u64]) -> StoreResult<u64> {
        let pos = self.end;
        self.out.write_u64::<LittleEndian>(children.len() as u64)?;
        for &child in children {
            self.out.write_u64::<LittleEndian>(child)?;
        }
        self.end += 8 * (children.len() as u64 + 1);
        Ok(pos)
    }

    /// Payload of a data block appended earlier.
    pub fn read_data(&mut self, pos: u64) -> StoreResult<Vec<u8>> {
        if pos < HEADER_SIZE as u64 || pos.saturating_add(8) > self.end {
            return Err(StoreError::Truncated(pos));
        }
        self.out.flush()?;
        let end = self.end;
        let file = self.out.get_mut();
        let payload = read_block(file, pos, end);
        // appends continue at the end whatever the read did
        file.seek(SeekFrom::Start(end))?;
        payload
    }

    /// Push buffered blocks to the file.
    pub fn flush(&mut self) -> StoreResult<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Point the header at `root`, then mark the file frozen.
    pub fn finish(mut self, root: u64) -> StoreResult<u64> {
        self.out.seek(SeekFrom::Start(ROOT_POS_OFFSET as u64))?;
        self.out.write_u64::<LittleEndian>(root)?;
        self.out.seek(SeekFrom::Start(FROZEN_OFFSET as u64))?;
        self.out.write_u8(FROZEN_FLAG)?;
        self.out.flush()?;
        self.out.get_ref().sync_data()?;
        Ok(self.end)
    }
}

fn read_block(file: &mut File, pos: u64, end: u64) -> StoreResult<Vec<u8>> {
    file.seek(SeekFrom::Start(pos))?;
    let size = file.read_u64::<LittleEndian>()?;
    if size > end - pos - 8 {
        return Err(StoreError::Truncated(pos + 8 + size));
    }
    let mut payload = vec![0u8; size as usize];
    file.read_exact(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_blocks_and_read_back() -> StoreResult<()> {
        let temp = NamedTempFile::new()?;
        let mut sink = BlockSink::create(temp.path())?;
        assert_eq!(sink.end(), HEADER_SIZE as u64);

        let a = sink.data(b"first")?;
        let g = sink.group(&[make_data_offset(a)])?;
        let b = sink.data(b"second block")?;
        assert_eq!(a, HEADER_SIZE as u64);
        assert_eq!(g, a + 8 + 5);
        assert_eq!(b, g + 16);

        assert_eq!(sink.read_data(a)?, b"first");
        // appending after a read-back continues at the end
        let c = sink.data(b"third")?;
        assert_eq!(c, b + 8 + 12);
        assert_eq!(sink.read_data(b)?, b"second block");
        assert_eq!(sink.read_data(c)?, b"third");
        assert!(sink.read_data(c + 8).is_err());
        assert!(sink.read_data(0).is_err());

        let end = sink.finish(g)?;
        let bytes = std::fs::read(temp.path())?;
        assert_eq!(bytes.len() as u64, end);
        assert_eq!(bytes[FROZEN_OFFSET], FROZEN_FLAG);
        assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), g);
        Ok(())
    }
}
