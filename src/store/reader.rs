//! Container reader.
//!
//! A [`StoreReader`] opens a finalized file (memory-mapped when possible),
//! and hands out [`Group`] and [`Array`] handles. Handles share the input
//! streams and a [`ChunkCache`] of decoded chunks, so they are cheap to clone
//! and can be used from several threads.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use parking_lot::RwLock;
use tracing::debug;

use super::cache::ChunkCache;
use super::compression::decompress;
use super::element::{decode_n, decode_str, Element, ElementType, ScalarType, ScalarValue};
use super::format::*;
use super::layout::{check_region, num_elements, visit_region, Dims};
use super::writer::{LAYOUT_CHUNKED, LAYOUT_ELEMENTS};
use crate::util::{StoreError, StoreResult};

/// Input streams for reading container data.
/// Supports both memory-mapped and buffered I/O modes.
pub struct IStreams {
    inner: StreamsInner,
    version: u16,
    frozen: bool,
    size: u64,
}

enum StreamsInner {
    /// Memory-mapped file (preferred for large files)
    Mmap(Mmap),
    /// Buffered file access (fallback)
    File(RwLock<File>),
}

impl IStreams {
    /// Open a file with optional memory mapping.
    pub fn open(path: &Path, use_mmap: bool) -> StoreResult<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::FileNotFound(path.to_path_buf())
            } else {
                StoreError::Io(e)
            }
        })?;

        let size = file.metadata()?.len();
        if size < HEADER_SIZE as u64 {
            return Err(StoreError::Truncated(size));
        }

        let inner = if use_mmap {
            // Safety: the file is opened read-only and only finalized files are read
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| StoreError::MmapFailed(e.to_string()))?;
            StreamsInner::Mmap(mmap)
        } else {
            StreamsInner::File(RwLock::new(file))
        };

        let mut streams = Self {
            inner,
            version: 0,
            frozen: false,
            size,
        };
        let mut header = [0u8; HEADER_SIZE];
        streams.read_into(0, &mut header)?;
        let (version, frozen) = Self::parse_header(&header)?;
        streams.version = version;
        streams.frozen = frozen;
        Ok(streams)
    }

    /// Parse and validate the header.
    fn parse_header(data: &[u8]) -> StoreResult<(u16, bool)> {
        if data.len() < HEADER_SIZE {
            return Err(StoreError::Truncated(data.len() as u64));
        }
        if &data[0..5] != STORE_MAGIC {
            return Err(StoreError::InvalidMagic);
        }
        let frozen = data[FROZEN_OFFSET] == FROZEN_FLAG;
        let version = u16::from_le_bytes([data[VERSION_OFFSET], data[VERSION_OFFSET + 1]]);
        Ok((version, frozen))
    }

    /// Check if the file was finalized.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Get the format version.
    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Get the total file size.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the root group position from the header.
    pub fn root_pos(&self) -> StoreResult<u64> {
        self.read_u64(ROOT_POS_OFFSET as u64)
    }

    /// Read bytes into an existing buffer.
    pub fn read_into(&self, pos: u64, buf: &mut [u8]) -> StoreResult<()> {
        let end = pos
            .checked_add(buf.len() as u64)
            .ok_or(StoreError::Truncated(pos))?;
        if end > self.size {
            return Err(StoreError::Truncated(end));
        }

        match &self.inner {
            StreamsInner::Mmap(mmap) => {
                buf.copy_from_slice(&mmap[pos as usize..end as usize]);
                Ok(())
            }
            StreamsInner::File(file) => {
                let mut f = file.write();
                f.seek(SeekFrom::Start(pos))?;
                f.read_exact(buf)?;
                Ok(())
            }
        }
    }

    /// Read a u64 value at the given position.
    pub fn read_u64(&self, pos: u64) -> StoreResult<u64> {
        let mut buf = [0u8; 8];
        self.read_into(pos, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read the payload of the data block at `pos`.
    pub fn read_data(&self, pos: u64) -> StoreResult<Vec<u8>> {
        let size = self.read_u64(pos)?;
        if size > self.size {
            return Err(StoreError::Truncated(pos + size));
        }
        let mut buf = vec![0u8; size as usize];
        self.read_into(pos + 8, &mut buf)?;
        Ok(buf)
    }

    /// Read the child offsets of the block group at `pos`.
    pub fn read_block_group(&self, pos: u64) -> StoreResult<Vec<u64>> {
        let count = self.read_u64(pos)?;
        if count.saturating_mul(8) > self.size {
            return Err(StoreError::corrupt(format!(
                "block group at {} claims {} children",
                pos, count
            )));
        }
        (0..count).map(|i| self.read_u64(pos + 8 + i * 8)).collect()
    }
}

#[derive(Clone)]
struct Shared {
    streams: Arc<IStreams>,
    cache: Arc<ChunkCache>,
}

impl Shared {
    /// Read and split a node: header payload plus the positions of its
    /// blocks, which are child nodes when `nested` and data blocks otherwise.
    fn read_node(&self, pos: u64, path: &str, nested: bool) -> StoreResult<(Vec<u8>, Vec<u64>)> {
        let offsets = self.streams.read_block_group(pos)?;
        let (first, rest) = offsets
            .split_first()
            .ok_or_else(|| StoreError::corrupt(format!("node {} has no header", path)))?;
        if !is_data_offset(*first) {
            return Err(StoreError::corrupt(format!("node {} header is not a data block", path)));
        }
        if let Some(i) = rest.iter().position(|&o| is_group_offset(o) != nested) {
            return Err(StoreError::corrupt(format!(
                "node {} block {} is a {} block",
                path,
                i + 1,
                if nested { "data" } else { "group" }
            )));
        }
        let header = self.streams.read_data(extract_offset(*first))?;
        Ok((header, rest.iter().map(|&o| extract_offset(o)).collect()))
    }

    /// Decoded chunk at a block position, through the cache.
    fn chunk(&self, block_pos: u64) -> StoreResult<Arc<Vec<u8>>> {
        if let Some(data) = self.cache.get(block_pos) {
            return Ok(data);
        }
        let decoded = decompress(&self.streams.read_data(block_pos)?)?;
        Ok(self.cache.insert(block_pos, decoded))
    }
}

fn corrupt_header(path: String) -> impl Fn(std::io::Error) -> StoreError {
    move |_| StoreError::corrupt(format!("header of {} truncated", path))
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Reader for a finalized container file.
pub struct StoreReader {
    path: PathBuf,
    streams: Arc<IStreams>,
    root: Group,
}

impl StoreReader {
    /// Open a container for reading with memory mapping.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_opts(path, true)
    }

    /// Open a container with optional memory mapping.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let streams = Arc::new(IStreams::open(&path, use_mmap)?);

        if !streams.is_frozen() {
            return Err(StoreError::NotFinalized(path));
        }
        if streams.version() != CURRENT_VERSION {
            return Err(StoreError::UnsupportedVersion(streams.version()));
        }

        let shared = Shared {
            streams: Arc::clone(&streams),
            cache: Arc::new(ChunkCache::default()),
        };
        let root = Group::load(shared, streams.root_pos()?, "/".to_string())?;

        debug!("opened container {} ({} bytes)", path.display(), streams.size());
        Ok(Self { path, streams, root })
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the format version.
    #[inline]
    pub fn version(&self) -> u16 {
        self.streams.version()
    }

    /// Get the root group.
    #[inline]
    pub fn root(&self) -> &Group {
        &self.root
    }

    /// Resolve a group by absolute path.
    pub fn group(&self, path: &str) -> StoreResult<Group> {
        let mut current = self.root.clone();
        for part in path.split('/').filter(|s| !s.is_empty()) {
            current = current.group(part)?;
        }
        Ok(current)
    }

    /// Resolve an array by absolute path.
    pub fn array(&self, path: &str) -> StoreResult<Array> {
        let (parent, name) = match path.rsplit_once('/') {
            Some((p, n)) => (p, n),
            None => ("", path),
        };
        self.group(parent)?.array(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChildKind {
    Group,
    Array,
}

/// A group handle: named children and scalar attributes.
#[derive(Clone)]
pub struct Group {
    shared: Shared,
    path: String,
    children: Vec<(String, ChildKind, u64)>,
    index: HashMap<String, usize>,
    scalars: Vec<(String, ScalarValue)>,
}

impl Group {
    fn load(shared: Shared, pos: u64, path: String) -> StoreResult<Self> {
        let (header, blocks) = shared.read_node(pos, &path, true)?;
        let mut buf = header.as_slice();
        let bad = corrupt_header(path.clone());

        if buf.read_u8().map_err(&bad)? != NODE_GROUP {
            return Err(StoreError::TypeMismatch {
                path,
                expected: "group".into(),
                actual: "array".into(),
            });
        }

        let count = buf.read_u32::<LittleEndian>().map_err(&bad)? as usize;
        if count != blocks.len() {
            return Err(StoreError::corrupt(format!(
                "group {} lists {} children but has {} blocks",
                path,
                count,
                blocks.len()
            )));
        }
        let mut children = Vec::with_capacity(count);
        for &block in &blocks {
            let kind = match buf.read_u8().map_err(&bad)? {
                NODE_GROUP => ChildKind::Group,
                NODE_ARRAY => ChildKind::Array,
                other => return Err(StoreError::corrupt(format!("unknown node kind {}", other))),
            };
            children.push((decode_str(&mut buf)?, kind, block));
        }

        let n_scalars = buf.read_u32::<LittleEndian>().map_err(&bad)? as usize;
        let mut scalars = Vec::with_capacity(n_scalars);
        for _ in 0..n_scalars {
            let name = decode_str(&mut buf)?;
            scalars.push((name, ScalarValue::decode(&mut buf)?));
        }

        let index = children
            .iter()
            .enumerate()
            .map(|(i, (name, _, _))| (name.clone(), i))
            .collect();

        Ok(Self {
            shared,
            path,
            children,
            index,
            scalars,
        })
    }

    /// Full path of the group.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Names of all children, in creation order.
    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(n, _, _)| n.as_str())
    }

    /// Names of the child groups, in creation order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.children
            .iter()
            .filter(|(_, k, _)| *k == ChildKind::Group)
            .map(|(n, _, _)| n.as_str())
    }

    /// Number of children.
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// Check if a child (group or array) exists.
    pub fn has_child(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn find(&self, name: &str, kind: ChildKind) -> StoreResult<u64> {
        match self.index.get(name).map(|&i| &self.children[i]) {
            Some((_, k, pos)) if *k == kind => Ok(*pos),
            Some((_, k, _)) => Err(StoreError::TypeMismatch {
                path: join_path(&self.path, name),
                expected: format!("{:?}", kind).to_lowercase(),
                actual: format!("{:?}", k).to_lowercase(),
            }),
            None => Err(StoreError::not_found(join_path(&self.path, name))),
        }
    }

    /// Open a child group.
    pub fn group(&self, name: &str) -> StoreResult<Group> {
        let pos = self.find(name, ChildKind::Group)?;
        Group::load(self.shared.clone(), pos, join_path(&self.path, name))
    }

    /// Open a child array.
    pub fn array(&self, name: &str) -> StoreResult<Array> {
        let pos = self.find(name, ChildKind::Array)?;
        Array::load(self.shared.clone(), pos, join_path(&self.path, name))
    }

    /// Check if a scalar attribute exists.
    pub fn has_scalar(&self, name: &str) -> bool {
        self.scalars.iter().any(|(n, _)| n == name)
    }

    /// Read a scalar attribute as `T`.
    pub fn scalar<T: ScalarType>(&self, name: &str) -> StoreResult<T> {
        let value = self
            .scalars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| StoreError::not_found(format!("{}@{}", self.path, name)))?;
        T::from_value(value).ok_or_else(|| StoreError::TypeMismatch {
            path: format!("{}@{}", self.path, name),
            expected: T::NAME.to_string(),
            actual: value.type_name().to_string(),
        })
    }
}

enum ArrayLayout {
    Chunked {
        chunk: Dims,
        chunks: HashMap<Dims, u64>,
    },
    Elements(u64),
}

/// An array handle.
#[derive(Clone)]
pub struct Array {
    shared: Shared,
    path: String,
    element: ElementType,
    shape: Dims,
    max_shape: Dims,
    layout: Arc<ArrayLayout>,
}

impl Array {
    fn load(shared: Shared, pos: u64, path: String) -> StoreResult<Self> {
        let (header, blocks) = shared.read_node(pos, &path, false)?;
        let mut buf = header.as_slice();
        let bad = corrupt_header(path.clone());

        if buf.read_u8().map_err(&bad)? != NODE_ARRAY {
            return Err(StoreError::TypeMismatch {
                path,
                expected: "array".into(),
                actual: "group".into(),
            });
        }
        let tag = buf.read_u8().map_err(&bad)?;
        let element = ElementType::from_u8(tag)
            .ok_or_else(|| StoreError::corrupt(format!("unknown element type {} in {}", tag, path)))?;
        let rank = buf.read_u8().map_err(&bad)? as usize;
        let layout_tag = buf.read_u8().map_err(&bad)?;

        let read_dims = |buf: &mut &[u8]| -> StoreResult<Dims> {
            (0..rank)
                .map(|_| buf.read_u64::<LittleEndian>().map_err(&bad))
                .collect()
        };
        let shape = read_dims(&mut buf)?;
        let max_shape = read_dims(&mut buf)?;
        let chunk = read_dims(&mut buf)?;

        let layout = match layout_tag {
            LAYOUT_CHUNKED => {
                let n = buf.read_u64::<LittleEndian>().map_err(&bad)? as usize;
                if n != blocks.len() {
                    return Err(StoreError::corrupt(format!(
                        "array {} lists {} chunks but has {} blocks",
                        path,
                        n,
                        blocks.len()
                    )));
                }
                let mut chunks = HashMap::with_capacity(n);
                for &block in &blocks {
                    chunks.insert(read_dims(&mut buf)?, block);
                }
                ArrayLayout::Chunked { chunk, chunks }
            }
            LAYOUT_ELEMENTS => match blocks.as_slice() {
                [payload] => ArrayLayout::Elements(*payload),
                _ => return Err(StoreError::corrupt(format!("array {} has no payload", path))),
            },
            other => return Err(StoreError::corrupt(format!("unknown array layout {}", other))),
        };

        Ok(Self {
            shared,
            path,
            element,
            shape,
            max_shape,
            layout: Arc::new(layout),
        })
    }

    /// Full path of the array.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stored element type.
    #[inline]
    pub fn element_type(&self) -> ElementType {
        self.element
    }

    /// Current extent.
    #[inline]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Growth limits, [`UNLIMITED`] for unbounded dimensions.
    #[inline]
    pub fn max_shape(&self) -> &[u64] {
        &self.max_shape
    }

    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        num_elements(&self.shape)
    }

    /// Check if the array holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_type<T: Element>(&self) -> StoreResult<()> {
        if self.element != T::TYPE {
            return Err(StoreError::TypeMismatch {
                path: self.path.clone(),
                expected: T::TYPE.to_string(),
                actual: self.element.to_string(),
            });
        }
        Ok(())
    }

    /// Read the whole array in row-major order.
    pub fn read_all<T: Element>(&self) -> StoreResult<Vec<T>> {
        let offset: Dims = Dims::from_elem(0, self.rank());
        let shape = self.shape.clone();
        self.read_slice(&offset, &shape)
    }

    /// Read the region `offset .. offset + count` in row-major order.
    pub fn read_slice<T: Element>(&self, offset: &[u64], count: &[u64]) -> StoreResult<Vec<T>> {
        self.check_type::<T>()?;
        check_region(&self.path, offset, count, &self.shape)?;

        match self.layout.as_ref() {
            ArrayLayout::Elements(block) => {
                let payload = self.shared.chunk(*block)?;
                let all = decode_n::<T>(&payload, self.len())?;
                let start = offset[0] as usize;
                Ok(all[start..start + count[0] as usize].to_vec())
            }
            ArrayLayout::Chunked { chunk, chunks } => {
                let elem_size = self.element.fixed_size().unwrap_or(0);
                let zero = T::decode(&mut vec![0u8; elem_size].as_slice())?;
                let mut out = Vec::with_capacity(num_elements(count));
                let mut current: Option<(Dims, Option<Arc<Vec<u8>>>)> = None;
                let mut failure = None;

                visit_region(offset, count, chunk, |_, coord, inner| {
                    if failure.is_some() {
                        return;
                    }
                    let cached = matches!(&current, Some((c, _)) if c.as_slice() == coord);
                    if !cached {
                        let data = match chunks.get(coord) {
                            Some(&block) => match self.shared.chunk(block) {
                                Ok(d) => Some(d),
                                Err(e) => {
                                    failure = Some(e);
                                    return;
                                }
                            },
                            // chunk never written: fill value
                            None => None,
                        };
                        current = Some((Dims::from_slice(coord), data));
                    }
                    let value = match current.as_ref().and_then(|(_, d)| d.as_ref()) {
                        Some(data) => {
                            let start = inner * elem_size;
                            match data.get(start..start + elem_size) {
                                Some(mut bytes) => match T::decode(&mut bytes) {
                                    Ok(v) => v,
                                    Err(e) => {
                                        failure = Some(e);
                                        return;
                                    }
                                },
                                None => {
                                    failure = Some(StoreError::corrupt(format!(
                                        "chunk of {} shorter than its extent",
                                        self.path
                                    )));
                                    return;
                                }
                            }
                        }
                        None => zero.clone(),
                    };
                    out.push(value);
                });

                match failure {
                    Some(e) => Err(e),
                    None => Ok(out),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parsing() {
        let mut header = [0u8; 16];
        header[0..5].copy_from_slice(STORE_MAGIC);
        header[FROZEN_OFFSET] = FROZEN_FLAG;
        header[VERSION_OFFSET] = 1;

        let (version, frozen) = IStreams::parse_header(&header).unwrap();
        assert_eq!(version, 1);
        assert!(frozen);
    }

    #[test]
    fn test_invalid_magic() {
        let header = [0u8; 16];
        let result = IStreams::parse_header(&header);
        assert!(matches!(result, Err(StoreError::InvalidMagic)));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "links"), "/links");
        assert_eq!(join_path("/links", "a"), "/links/a");
    }
}
