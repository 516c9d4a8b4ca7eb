//! Container writer.
//!
//! Nodes live in an in-memory arena (groups and arrays addressed by
//! [`GroupId`] / [`ArrayId`]) while the file is open. Array data is split
//! into chunks, so extending along a dimension never relayouts data, and a
//! chunk is appended to the file as soon as every element it can hold has
//! been written. Only partially written chunks stay in memory.
//! [`StoreWriter::close`] writes the remaining chunks and the node tree,
//! then points the header at the root and sets the frozen flag. A file that
//! was never closed keeps the "not frozen" flag and is rejected by the
//! reader.

mod sink;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::compression::{compress, decompress};
use super::element::{encode_all, encode_str, Element, ElementType, ScalarValue};
use super::format::*;
use super::layout::{
    check_extend, check_region, chunk_capacity, num_elements, visit_region, ArraySpec, Dims,
};
use crate::util::{StoreError, StoreResult};
use sink::BlockSink;

/// Handle to a group of an open writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupId(usize);

/// Handle to an array of an open writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArrayId(usize);

/// Writer options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Zlib level for chunks (`<= 0` stores raw chunks).
    pub compression_level: i32,
}

#[derive(Clone, Copy, Debug)]
enum NodeRef {
    Group(usize),
    Array(usize),
}

#[derive(Default)]
struct GroupNode {
    path: String,
    order: Vec<String>,
    children: HashMap<String, NodeRef>,
    scalars: Vec<(String, ScalarValue)>,
}

/// Zero-filled chunk buffer that has not reached the file yet.
struct PendingChunk {
    bytes: Vec<u8>,
    written: Vec<bool>,
    filled: usize,
}

impl PendingChunk {
    fn new(len: usize, elem_size: usize) -> Self {
        Self {
            bytes: vec![0u8; len * elem_size],
            written: vec![false; len],
            filled: 0,
        }
    }

    /// A chunk read back from the file counts as fully written.
    fn reloaded(bytes: Vec<u8>, len: usize) -> Self {
        Self {
            bytes,
            written: vec![true; len],
            filled: len,
        }
    }

    fn set(&mut self, inner: usize, value: &[u8]) {
        let size = value.len();
        self.bytes[inner * size..(inner + 1) * size].copy_from_slice(value);
        if !self.written[inner] {
            self.written[inner] = true;
            self.filled += 1;
        }
    }
}

enum ArrayData {
    /// Fixed-size elements split into chunks.
    Chunked {
        chunk: Dims,
        pending: BTreeMap<Dims, PendingChunk>,
        /// Block position of every chunk already in the file.
        stored: BTreeMap<Dims, u64>,
    },
    /// Variable-size elements of a fixed 1-D array, encoded one by one.
    Elements(Vec<Option<Vec<u8>>>),
}

struct ArrayNode {
    path: String,
    element: ElementType,
    shape: Dims,
    max_shape: Dims,
    data: ArrayData,
}

/// Layout tag of a chunked array header.
pub(crate) const LAYOUT_CHUNKED: u8 = 0;
/// Layout tag of an element-list array header.
pub(crate) const LAYOUT_ELEMENTS: u8 = 1;

/// Container writer.
pub struct StoreWriter {
    path: PathBuf,
    sink: BlockSink,
    options: StoreOptions,
    groups: Vec<GroupNode>,
    arrays: Vec<ArrayNode>,
}

impl StoreWriter {
    /// Create a new container file for writing.
    pub fn create(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::create_with_options(path, StoreOptions::default())
    }

    /// Create a new container file with explicit options.
    pub fn create_with_options(path: impl AsRef<Path>, options: StoreOptions) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let sink = BlockSink::create(&path)?;
        debug!("created container {}", path.display());

        Ok(Self {
            path,
            sink,
            options,
            groups: vec![GroupNode {
                path: "/".to_string(),
                ..GroupNode::default()
            }],
            arrays: Vec::new(),
        })
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the root group.
    #[inline]
    pub fn root(&self) -> GroupId {
        GroupId(0)
    }

    /// Full path of a group.
    pub fn group_path(&self, group: GroupId) -> &str {
        &self.groups[group.0].path
    }

    /// Full path of an array.
    pub fn array_path(&self, array: ArrayId) -> &str {
        &self.arrays[array.0].path
    }

    fn child_path(&self, parent: GroupId, name: &str) -> String {
        let parent_path = &self.groups[parent.0].path;
        if parent_path == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent_path, name)
        }
    }

    fn check_name(&self, parent: GroupId, name: &str) -> StoreResult<()> {
        if name.is_empty() || name.contains('/') {
            return Err(StoreError::corrupt(format!(
                "invalid node name '{}' under {}",
                name,
                self.group_path(parent)
            )));
        }
        if self.groups[parent.0].children.contains_key(name) {
            return Err(StoreError::AlreadyExists(self.child_path(parent, name)));
        }
        Ok(())
    }

    fn attach(&mut self, parent: GroupId, name: &str, node: NodeRef) {
        let group = &mut self.groups[parent.0];
        group.order.push(name.to_string());
        group.children.insert(name.to_string(), node);
    }

    /// Create a child group.
    pub fn create_group(&mut self, parent: GroupId, name: &str) -> StoreResult<GroupId> {
        self.check_name(parent, name)?;
        let path = self.child_path(parent, name);
        trace!("create group {}", path);

        let id = self.groups.len();
        self.groups.push(GroupNode {
            path,
            ..GroupNode::default()
        });
        self.attach(parent, name, NodeRef::Group(id));
        Ok(GroupId(id))
    }

    /// Resolve a group by absolute path (`"/links/a"`).
    pub fn open_group(&self, path: &str) -> StoreResult<GroupId> {
        let mut current = 0usize;
        for part in path.split('/').filter(|s| !s.is_empty()) {
            match self.groups[current].children.get(part) {
                Some(NodeRef::Group(g)) => current = *g,
                _ => return Err(StoreError::not_found(path)),
            }
        }
        Ok(GroupId(current))
    }

    /// Resolve an array by name inside a group.
    pub fn open_array(&self, group: GroupId, name: &str) -> StoreResult<ArrayId> {
        match self.groups[group.0].children.get(name) {
            Some(NodeRef::Array(a)) => Ok(ArrayId(*a)),
            _ => Err(StoreError::not_found(self.child_path(group, name))),
        }
    }

    /// Create an array of element type `T`.
    pub fn create_array<T: Element>(
        &mut self,
        group: GroupId,
        name: &str,
        spec: ArraySpec,
    ) -> StoreResult<ArrayId> {
        self.check_name(group, name)?;
        let path = self.child_path(group, name);
        let chunk = spec.resolve_chunk(&path)?;

        let data = match T::TYPE.fixed_size() {
            Some(_) => ArrayData::Chunked {
                chunk,
                pending: BTreeMap::new(),
                stored: BTreeMap::new(),
            },
            None => {
                if spec.rank() != 1 || spec.is_growable() {
                    return Err(StoreError::shape(
                        &path,
                        "variable-size elements require a fixed 1-D shape",
                    ));
                }
                ArrayData::Elements(vec![None; num_elements(&spec.shape)])
            }
        };

        trace!("create array {} [{}] shape {:?}", path, T::TYPE, spec.shape);

        let id = self.arrays.len();
        self.arrays.push(ArrayNode {
            path,
            element: T::TYPE,
            shape: spec.shape,
            max_shape: spec.max_shape,
            data,
        });
        self.attach(group, name, NodeRef::Array(id));
        Ok(ArrayId(id))
    }

    /// Create a fixed 1-D array and fill it in one step.
    pub fn write_array<T: Element>(&mut self, group: GroupId, name: &str, data: &[T]) -> StoreResult<ArrayId> {
        let len = data.len() as u64;
        let id = self.create_array::<T>(group, name, ArraySpec::fixed(&[len]))?;
        self.write_slice(id, &[0], &[len], data)?;
        Ok(id)
    }

    /// Current extent of an array.
    pub fn shape(&self, array: ArrayId) -> &[u64] {
        &self.arrays[array.0].shape
    }

    /// Grow an array to `new_shape` (only along growable dimensions).
    pub fn extend_array(&mut self, array: ArrayId, new_shape: &[u64]) -> StoreResult<()> {
        let node = &mut self.arrays[array.0];
        check_extend(&node.path, &node.shape, &node.max_shape, new_shape)?;
        node.shape = Dims::from_slice(new_shape);
        Ok(())
    }

    /// Bytes appended to the file so far, header included.
    pub fn bytes_written(&self) -> u64 {
        self.sink.end()
    }

    /// Push every block appended so far to the file.
    pub fn flush(&mut self) -> StoreResult<()> {
        self.sink.flush()
    }

    /// Write `data` (row-major) into the region `offset .. offset + count`.
    ///
    /// Chunks completed by this write are compressed and appended to the
    /// file right away. Writing into a chunk that is already in the file
    /// reads it back and appends the updated chunk as a new block.
    pub fn write_slice<T: Element>(
        &mut self,
        array: ArrayId,
        offset: &[u64],
        count: &[u64],
        data: &[T],
    ) -> StoreResult<()> {
        let node = &mut self.arrays[array.0];
        if node.element != T::TYPE {
            return Err(StoreError::TypeMismatch {
                path: node.path.clone(),
                expected: node.element.to_string(),
                actual: T::TYPE.to_string(),
            });
        }
        if data.len() != num_elements(count) {
            return Err(StoreError::shape(
                &node.path,
                format!("{} values supplied for a region of {}", data.len(), num_elements(count)),
            ));
        }
        check_region(&node.path, offset, count, &node.shape)?;

        let level = self.options.compression_level;
        let sink = &mut self.sink;
        match &mut node.data {
            ArrayData::Chunked { chunk, pending, stored } => {
                let elem_size = node.element.fixed_size().unwrap_or(0);
                let chunk_len = num_elements(chunk);

                let mut touched: BTreeSet<Dims> = BTreeSet::new();
                visit_region(offset, count, chunk, |_, coord, _| {
                    if !touched.contains(coord) {
                        touched.insert(Dims::from_slice(coord));
                    }
                });
                for coord in &touched {
                    if let Some(&pos) = stored.get(coord) {
                        let bytes = decompress(&sink.read_data(pos)?)?;
                        if bytes.len() != chunk_len * elem_size {
                            return Err(StoreError::corrupt(format!(
                                "chunk {:?} of {} holds {} bytes",
                                coord.as_slice(),
                                node.path,
                                bytes.len()
                            )));
                        }
                        pending.insert(coord.clone(), PendingChunk::reloaded(bytes, chunk_len));
                    }
                }

                let encoded = encode_all(data);
                visit_region(offset, count, chunk, |i, coord, inner| {
                    pending
                        .entry(Dims::from_slice(coord))
                        .or_insert_with(|| PendingChunk::new(chunk_len, elem_size))
                        .set(inner, &encoded[i * elem_size..(i + 1) * elem_size]);
                });

                for coord in touched {
                    let capacity = chunk_capacity(&coord, chunk, &node.max_shape);
                    if !pending.get(&coord).is_some_and(|c| c.filled >= capacity) {
                        continue;
                    }
                    if let Some(full) = pending.remove(&coord) {
                        let pos = sink.data(&compress(&full.bytes, level)?)?;
                        trace!("chunk {:?} of {} at {}", coord.as_slice(), node.path, pos);
                        stored.insert(coord, pos);
                    }
                }
            }
            ArrayData::Elements(slots) => {
                let start = offset[0] as usize;
                for (i, item) in data.iter().enumerate() {
                    let mut buf = Vec::new();
                    item.encode(&mut buf);
                    slots[start + i] = Some(buf);
                }
            }
        }
        Ok(())
    }

    /// Attach a scalar attribute to a group.
    pub fn write_scalar(&mut self, group: GroupId, name: &str, value: impl Into<ScalarValue>) -> StoreResult<()> {
        let node = &mut self.groups[group.0];
        if node.scalars.iter().any(|(n, _)| n == name) {
            return Err(StoreError::AlreadyExists(format!("{}@{}", node.path, name)));
        }
        node.scalars.push((name.to_string(), value.into()));
        Ok(())
    }

    /// Serialize the tree, write the root position and freeze the file.
    pub fn close(mut self) -> StoreResult<()> {
        let root_pos = self.write_group_node(0)?;
        let (groups, arrays) = (self.groups.len(), self.arrays.len());
        let size = self.sink.finish(root_pos)?;

        debug!(
            "closed container {} ({} groups, {} arrays, {} bytes)",
            self.path.display(),
            groups,
            arrays,
            size
        );
        Ok(())
    }

    fn write_group_node(&mut self, index: usize) -> StoreResult<u64> {
        let node = std::mem::take(&mut self.groups[index]);

        let mut header = vec![NODE_GROUP];
        header.extend_from_slice(&(node.order.len() as u32).to_le_bytes());
        let mut refs = Vec::with_capacity(node.order.len());
        for name in &node.order {
            let child = node.children[name];
            header.push(match child {
                NodeRef::Group(_) => NODE_GROUP,
                NodeRef::Array(_) => NODE_ARRAY,
            });
            encode_str(name, &mut header);
            refs.push(child);
        }
        header.extend_from_slice(&(node.scalars.len() as u32).to_le_bytes());
        for (name, value) in &node.scalars {
            encode_str(name, &mut header);
            value.encode(&mut header);
        }

        let mut offsets = Vec::with_capacity(refs.len() + 1);
        offsets.push(make_data_offset(self.sink.data(&header)?));
        for child in refs {
            let pos = match child {
                NodeRef::Group(g) => self.write_group_node(g)?,
                NodeRef::Array(a) => self.write_array_node(a)?,
            };
            offsets.push(make_group_offset(pos));
        }
        self.sink.group(&offsets)
    }

    fn write_array_node(&mut self, index: usize) -> StoreResult<u64> {
        let node = &mut self.arrays[index];
        let path = std::mem::take(&mut node.path);
        let element = node.element;
        let shape = node.shape.clone();
        let max_shape = node.max_shape.clone();
        let data = std::mem::replace(&mut node.data, ArrayData::Elements(Vec::new()));
        let level = self.options.compression_level;

        let mut header = vec![NODE_ARRAY, element as u8, shape.len() as u8];
        let mut blocks: Vec<u64> = Vec::new();

        match data {
            ArrayData::Chunked {
                chunk,
                pending,
                mut stored,
            } => {
                for (coord, partial) in pending {
                    stored.insert(coord, self.sink.data(&compress(&partial.bytes, level)?)?);
                }
                header.push(LAYOUT_CHUNKED);
                push_dims(&mut header, &shape);
                push_dims(&mut header, &max_shape);
                push_dims(&mut header, &chunk);
                header.extend_from_slice(&(stored.len() as u64).to_le_bytes());
                for (coord, pos) in stored {
                    push_dims(&mut header, &coord);
                    blocks.push(pos);
                }
            }
            ArrayData::Elements(slots) => {
                header.push(LAYOUT_ELEMENTS);
                push_dims(&mut header, &shape);
                push_dims(&mut header, &max_shape);
                push_dims(&mut header, &shape);
                let mut payload = Vec::new();
                for (i, slot) in slots.into_iter().enumerate() {
                    match slot {
                        Some(bytes) => payload.extend_from_slice(&bytes),
                        None => {
                            return Err(StoreError::shape(
                                &path,
                                format!("element {} was never written", i),
                            ))
                        }
                    }
                }
                blocks.push(self.sink.data(&compress(&payload, level)?)?);
            }
        }

        trace!("write array {} ({} blocks)", path, blocks.len());

        let mut offsets = Vec::with_capacity(blocks.len() + 1);
        offsets.push(make_data_offset(self.sink.data(&header)?));
        offsets.extend(blocks.into_iter().map(make_data_offset));
        self.sink.group(&offsets)
    }
}

fn push_dims(buf: &mut Vec<u8>, dims: &[u64]) {
    for d in dims {
        buf.extend_from_slice(&d.to_le_bytes());
    }
}

#[cfg(test)]
mod tests;
