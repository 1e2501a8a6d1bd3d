use crate::disk::DiskArray;
use crate::dtype::DType;
use crate::error::{DataError, Result};
use crate::index::{Index, Slice};
use ndarray::{ArrayD, IxDyn};
use std::fmt::Debug;
use std::path::Path;

/// Read access to an N-dimensional array living on disk
///
/// Implementors hand out the selected elements as little-endian bytes laid
/// out row-major in the shape of the selection. Stores are shared between
/// datasets through `Arc`, so they must be safe for concurrent readers.
pub trait ArrayStore: Debug + Send + Sync {
    /// Logical shape of the array
    fn shape(&self) -> &[usize];

    /// Element type of the array
    fn dtype(&self) -> DType;

    /// Files backing the array, in order
    fn paths(&self) -> Vec<&Path>;

    /// Reads the elements selected by `index` (one entry per axis)
    /// # Errors
    /// Will return `Err` if the index does not fit the array or storage is inaccessible
    fn read(&self, index: &[Index]) -> Result<Vec<u8>>;

    /// Writes elements in place; stores are read-only unless they say otherwise
    /// # Errors
    /// Returns `Unsupported` by default
    fn write(&self, _index: &[Index], _bytes: &[u8]) -> Result<()> {
        Err(DataError::unsupported(format!(
            "write to read-only {}-d array",
            self.shape().len()
        )))
    }

    /// The store as a single file-backed array, if it is one
    fn as_disk_array(&self) -> Option<&DiskArray> {
        None
    }

    /// Total number of bytes of the array
    fn nbytes(&self) -> usize {
        self.shape().iter().product::<usize>() * self.dtype().item_size()
    }

    /// Reads a selection and converts it to `f64`
    /// # Errors
    /// Will return `Err` if the underlying read fails
    fn read_f64(&self, index: &[Index]) -> Result<ArrayD<f64>> {
        let bytes = self.read(index)?;
        let shape: Vec<usize> = index.iter().map(Index::len).collect();
        let values = self.dtype().decode_all(&bytes);
        ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|e| DataError::shape_mismatch(e.to_string()))
    }
}

/// Full-axis index for every axis of `shape`
#[must_use]
pub fn full_index(shape: &[usize]) -> Vec<Index> {
    shape.iter().map(|&len| Index::Slice(Slice::full(len))).collect()
}
