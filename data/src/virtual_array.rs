//! A logical 2-D array concatenated from several on-disk segments.
//!
//! Recordings are frequently split into one file per block of channels.
//! [`VirtualArray`] presents such a set of same-dtype segments as a single
//! array without copying: reads are partitioned at segment boundaries, served
//! from each segment's memory map, and stitched back together in the order
//! they were requested, so callers never observe the seams.

use crate::disk::DiskArray;
use crate::dtype::DType;
use crate::error::{DataError, Result};
use crate::index::{Index, check_index, selection_len};
use crate::store::ArrayStore;
use itertools::Itertools;
use std::path::Path;

/// Read-only concatenation of 2-D segments along `axis`
#[derive(Debug, Clone)]
pub struct VirtualArray {
    segments: Vec<DiskArray>,
    axis: usize,
    shape: Vec<usize>,
    /// Position of each segment's first element along `axis`, plus the total
    bounds: Vec<usize>,
    dtype: DType,
}

impl VirtualArray {
    /// Builds a virtual array from `segments`, concatenated along `axis`
    /// # Errors
    /// Will return `Err` if:
    /// - no segments are given or `axis` is not 0 or 1
    /// - a segment is not 2-D, or the segments disagree on the other axis (`ShapeMismatch`)
    /// - the segments have different dtypes (`TypeMismatch`)
    pub fn new(segments: Vec<DiskArray>, axis: usize) -> Result<Self> {
        let Some(first) = segments.first() else {
            return Err(DataError::invalid_value(
                "segments",
                "at least one array segment",
                "none",
            ));
        };
        if axis > 1 {
            return Err(DataError::invalid_value(
                "axis",
                "0 or 1",
                axis.to_string(),
            ));
        }
        let dtype = first.dtype();
        let other = 1 - axis;
        let extent = first.shape().get(other).copied().unwrap_or_default();

        let mut bounds = Vec::with_capacity(segments.len() + 1);
        let mut total = 0;
        for (k, segment) in segments.iter().enumerate() {
            if segment.shape().len() != 2 {
                return Err(DataError::shape_mismatch(format!(
                    "segment {k} ({}) has shape {:?}, expected a 2-d array",
                    segment.path().display(),
                    segment.shape()
                )));
            }
            if segment.shape()[other] != extent {
                return Err(DataError::shape_mismatch(format!(
                    "segment {k} ({}) has extent {} along axis {other}, expected {extent}",
                    segment.path().display(),
                    segment.shape()[other]
                )));
            }
            if segment.dtype() != dtype {
                return Err(DataError::type_mismatch(
                    format!("segment {k}"),
                    dtype.to_string(),
                    segment.dtype().to_string(),
                ));
            }
            bounds.push(total);
            total += segment.shape()[axis];
        }
        bounds.push(total);

        let mut shape = vec![0; 2];
        shape[axis] = total;
        shape[other] = extent;

        Ok(Self {
            segments,
            axis,
            shape,
            bounds,
            dtype,
        })
    }

    #[must_use]
    pub const fn axis(&self) -> usize {
        self.axis
    }

    #[must_use]
    pub fn segments(&self) -> &[DiskArray] {
        &self.segments
    }

    /// Segment holding logical position `pos` along the concatenation axis
    fn segment_of(&self, pos: usize) -> usize {
        // bounds is ascending; the last segment whose start is <= pos
        self.bounds.partition_point(|&start| start <= pos) - 1
    }
}

impl ArrayStore for VirtualArray {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn paths(&self) -> Vec<&Path> {
        self.segments.iter().map(DiskArray::path).collect()
    }

    fn read(&self, index: &[Index]) -> Result<Vec<u8>> {
        check_index(&self.shape, index)?;
        let item = self.dtype.item_size();
        let axis = self.axis;
        let other = 1 - axis;
        let out_shape: Vec<usize> = index.iter().map(Index::len).collect();
        let mut out = vec![0_u8; selection_len(index) * item];
        if out.is_empty() {
            return Ok(out);
        }

        // Split the requested positions into runs that fall in the same segment
        let picks = index[axis].to_vec();
        let mut placed = 0;
        let chunks = picks.iter().chunk_by(|&&pos| self.segment_of(pos));
        for (seg, chunk) in &chunks {
            let start = self.bounds[seg];
            let local: Vec<usize> = chunk.map(|&pos| pos - start).collect();
            let n = local.len();

            let mut seg_index = vec![Index::List(Vec::new()), Index::List(Vec::new())];
            seg_index[axis] = Index::List(local);
            seg_index[other] = index[other].clone();
            let block = self.segments[seg].read(&seg_index)?;

            if axis == 0 {
                // whole rows: the block lands contiguously
                let from = placed * out_shape[1] * item;
                out[from..from + block.len()].copy_from_slice(&block);
            } else {
                let width = n * item;
                for row in 0..out_shape[0] {
                    let dst = (row * out_shape[1] + placed) * item;
                    out[dst..dst + width].copy_from_slice(&block[row * width..(row + 1) * width]);
                }
            }
            placed += n;
        }
        Ok(out)
    }
}
