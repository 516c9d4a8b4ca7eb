//! Array shapes, growth limits and chunk arithmetic.

use smallvec::SmallVec;

use super::format::UNLIMITED;
use crate::util::{StoreError, StoreResult};

/// Array dimensions (rank 1 and 2 stay inline).
pub type Dims = SmallVec<[u64; 2]>;

/// Default chunk length along an unbounded dimension of a 1-D array.
pub const DEFAULT_CHUNK_LEN: u64 = 1024;

/// Creation parameters of an array: current shape, growth limits, chunking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArraySpec {
    /// Initial extent.
    pub shape: Dims,
    /// Upper bound per dimension, [`UNLIMITED`] for growable dimensions.
    pub max_shape: Dims,
    /// Chunk extent, derived from the shape when `None`.
    pub chunk: Option<Dims>,
}

impl ArraySpec {
    /// Fixed-shape array.
    pub fn fixed(shape: &[u64]) -> Self {
        Self {
            shape: Dims::from_slice(shape),
            max_shape: Dims::from_slice(shape),
            chunk: None,
        }
    }

    /// Array whose listed dimensions may grow without bound.
    pub fn growable(shape: &[u64], growable_dims: &[usize]) -> Self {
        let mut max_shape = Dims::from_slice(shape);
        for &d in growable_dims {
            if let Some(m) = max_shape.get_mut(d) {
                *m = UNLIMITED;
            }
        }
        Self {
            shape: Dims::from_slice(shape),
            max_shape,
            chunk: None,
        }
    }

    /// Set an explicit chunk extent.
    pub fn with_chunk(mut self, chunk: &[u64]) -> Self {
        self.chunk = Some(Dims::from_slice(chunk));
        self
    }

    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Check if any dimension can grow.
    pub fn is_growable(&self) -> bool {
        self.shape
            .iter()
            .zip(&self.max_shape)
            .any(|(s, m)| *m == UNLIMITED || m > s)
    }

    /// Validate the shape and resolve the chunk extent.
    pub(crate) fn resolve_chunk(&self, path: &str) -> StoreResult<Dims> {
        if self.rank() == 0 {
            return Err(StoreError::shape(path, "rank must be at least 1"));
        }
        if self.max_shape.len() != self.rank() {
            return Err(StoreError::shape(path, "max shape rank differs from shape rank"));
        }
        if let Some((s, m)) = self.shape.iter().zip(&self.max_shape).find(|(s, m)| s > m) {
            return Err(StoreError::shape(
                path,
                format!("initial extent {} exceeds maximum {}", s, m),
            ));
        }

        match &self.chunk {
            Some(chunk) => {
                if chunk.len() != self.rank() {
                    return Err(StoreError::shape(path, "chunk rank differs from shape rank"));
                }
                if chunk.iter().any(|&c| c == 0) {
                    return Err(StoreError::shape(path, "chunk extents must be non-zero"));
                }
                Ok(chunk.clone())
            }
            None => {
                let rank = self.rank();
                Ok(self
                    .shape
                    .iter()
                    .zip(&self.max_shape)
                    .map(|(&s, &m)| {
                        if m == UNLIMITED {
                            if rank == 1 {
                                DEFAULT_CHUNK_LEN
                            } else {
                                1
                            }
                        } else {
                            s.max(1)
                        }
                    })
                    .collect())
            }
        }
    }
}

/// Number of elements covered by `dims`.
#[inline]
pub fn num_elements(dims: &[u64]) -> usize {
    dims.iter().product::<u64>() as usize
}

/// Check that `offset + count` lies within `shape`.
pub(crate) fn check_region(path: &str, offset: &[u64], count: &[u64], shape: &[u64]) -> StoreResult<()> {
    if offset.len() != shape.len() || count.len() != shape.len() {
        return Err(StoreError::shape(
            path,
            format!(
                "slice rank {} / {} does not match array rank {}",
                offset.len(),
                count.len(),
                shape.len()
            ),
        ));
    }
    let inside = offset
        .iter()
        .zip(count)
        .zip(shape)
        .all(|((&o, &c), &s)| o.checked_add(c).is_some_and(|end| end <= s));
    if !inside {
        return Err(StoreError::OutOfBounds {
            path: path.to_string(),
            offset: offset.to_vec(),
            count: count.to_vec(),
            shape: shape.to_vec(),
        });
    }
    Ok(())
}

/// Check that `new_shape` is a legal extension of `shape` under `max_shape`.
pub(crate) fn check_extend(path: &str, shape: &[u64], max_shape: &[u64], new_shape: &[u64]) -> StoreResult<()> {
    if new_shape.len() != shape.len() {
        return Err(StoreError::shape(path, "extension changes the rank"));
    }
    for (d, ((&old, &max), &new)) in shape.iter().zip(max_shape).zip(new_shape).enumerate() {
        if new < old {
            return Err(StoreError::shape(
                path,
                format!("dimension {} cannot shrink from {} to {}", d, old, new),
            ));
        }
        if max != UNLIMITED && new > max {
            return Err(StoreError::shape(
                path,
                format!("dimension {} cannot grow beyond {} (requested {})", d, max, new),
            ));
        }
    }
    Ok(())
}

/// Number of elements of the chunk at `coord` that lie inside `max_shape`.
///
/// A chunk holding this many written elements can never change again
/// through new writes.
pub(crate) fn chunk_capacity(coord: &[u64], chunk: &[u64], max_shape: &[u64]) -> usize {
    coord
        .iter()
        .zip(chunk)
        .zip(max_shape)
        .map(|((&c, &len), &max)| {
            if max == UNLIMITED {
                len
            } else {
                len.min(max.saturating_sub(c.saturating_mul(len)))
            }
        })
        .product::<u64>() as usize
}

/// Visit every element of a region in row-major order.
///
/// The callback receives the element's position within the region, the
/// coordinate of the chunk holding it, and its linear index inside that chunk.
pub(crate) fn visit_region(
    offset: &[u64],
    count: &[u64],
    chunk: &[u64],
    mut f: impl FnMut(usize, &[u64], usize),
) {
    let total = num_elements(count);
    if total == 0 {
        return;
    }
    let rank = count.len();
    let mut cursor: Dims = SmallVec::from_elem(0, rank);
    let mut chunk_coord: Dims = SmallVec::from_elem(0, rank);

    for i in 0..total {
        let mut inner = 0usize;
        for d in 0..rank {
            let coord = offset[d] + cursor[d];
            chunk_coord[d] = coord / chunk[d];
            inner = inner * chunk[d] as usize + (coord % chunk[d]) as usize;
        }
        f(i, &chunk_coord, inner);

        for d in (0..rank).rev() {
            cursor[d] += 1;
            if cursor[d] < count[d] {
                break;
            }
            cursor[d] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chunks() {
        let spec = ArraySpec::growable(&[0], &[0]);
        assert_eq!(spec.resolve_chunk("/a").unwrap().as_slice(), &[DEFAULT_CHUNK_LEN]);

        let spec = ArraySpec::growable(&[16, 0], &[1]);
        assert_eq!(spec.resolve_chunk("/b").unwrap().as_slice(), &[16, 1]);

        let spec = ArraySpec::fixed(&[0]);
        assert_eq!(spec.resolve_chunk("/c").unwrap().as_slice(), &[1]);
    }

    #[test]
    fn test_check_extend() {
        let max = [8, UNLIMITED];
        assert!(check_extend("/x", &[8, 3], &max, &[8, 4]).is_ok());
        assert!(check_extend("/x", &[8, 3], &max, &[8, 2]).is_err());
        assert!(check_extend("/x", &[8, 3], &max, &[9, 3]).is_err());
        assert!(check_extend("/x", &[8, 3], &max, &[8]).is_err());
    }

    #[test]
    fn test_check_region() {
        assert!(check_region("/x", &[0, 2], &[4, 1], &[4, 3]).is_ok());
        assert!(matches!(
            check_region("/x", &[0, 3], &[4, 1], &[4, 3]),
            Err(StoreError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_visit_region_column() {
        // one column of a 3x4 array, chunked per column
        let mut seen = Vec::new();
        visit_region(&[0, 2], &[3, 1], &[3, 1], |i, c, inner| {
            seen.push((i, c.to_vec(), inner));
        });
        assert_eq!(
            seen,
            vec![(0, vec![0, 2], 0), (1, vec![0, 2], 1), (2, vec![0, 2], 2)]
        );
    }

    #[test]
    fn test_visit_region_crosses_chunks() {
        let mut chunks = Vec::new();
        visit_region(&[3], &[4], &[4], |_, c, inner| chunks.push((c[0], inner)));
        assert_eq!(chunks, vec![(0, 3), (1, 0), (1, 1), (1, 2)]);
    }

    #[test]
    fn test_chunk_capacity() {
        // 10 rows in chunks of 4: the last chunk only holds 2
        assert_eq!(chunk_capacity(&[0], &[4], &[10]), 4);
        assert_eq!(chunk_capacity(&[2], &[4], &[10]), 2);
        assert_eq!(chunk_capacity(&[3], &[4], &[10]), 0);
        // growable columns are always full width
        assert_eq!(chunk_capacity(&[0, 7], &[3, 1], &[3, UNLIMITED]), 3);
        assert_eq!(chunk_capacity(&[5], &[DEFAULT_CHUNK_LEN], &[UNLIMITED]), 1024);
    }
}
