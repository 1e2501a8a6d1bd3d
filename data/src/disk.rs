//! Single-file, memory-mapped arrays and the builder that allocates them.
//!
//! ## Memory-Mapping Implications
//!
//! A [`DiskArray`] maps its file read-only and shares the mapping through an
//! `Arc`, so cloning an array (or taking views of it) never opens another
//! file descriptor. New arrays are produced by a [`DiskArrayBuilder`], which
//! owns the output file until every trial has been committed and only then
//! maps it. Each commit opens its own writable handle and drops it before
//! returning, so no writable handle outlives a single trial.

use crate::dtype::{DType, Element, to_le_bytes};
use crate::error::{DataError, Result};
use crate::index::{Index, check_index, gather, selection_len, visit_runs};
use crate::store::ArrayStore;
use memmap3::{Mmap, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A row-major array stored in a single file, starting `offset` bytes in
#[derive(Debug, Clone)]
pub struct DiskArray {
    /// An owned path to the file on disk
    path: PathBuf,
    /// Byte offset of the first element (size of any file header)
    offset: usize,
    shape: Vec<usize>,
    dtype: DType,
    /// The memory-mapped file, shared via Arc for efficient cloning
    ///
    /// # Safety
    /// The mapping stays valid as long as the file is neither truncated nor
    /// modified while mapped. Arrays are only ever mapped after the builder
    /// that wrote them has finished, and are never written through afterwards.
    mmap: Arc<Mmap>,
}

impl DiskArray {
    /// Memory-maps an existing file as an array
    /// # Errors
    /// Will return `Err` if:
    /// - the file cannot be opened or memory-mapped
    /// - the shape describes an empty array
    /// - the file is smaller than `offset` plus the size of the array
    pub fn open(
        path: impl AsRef<Path>,
        offset: usize,
        shape: Vec<usize>,
        dtype: DType,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let nbytes = shape.iter().product::<usize>() * dtype.item_size();
        if nbytes == 0 {
            return Err(DataError::invalid_value(
                path.display().to_string(),
                "non-empty array",
                format!("shape {shape:?}"),
            ));
        }

        let file = File::open(&path)?;
        let file_len = file.metadata()?.len() as usize;
        if file_len < offset + nbytes {
            return Err(DataError::shape_mismatch(format!(
                "{} holds {file_len} bytes; a {dtype} array {shape:?} at offset {offset} needs {}",
                path.display(),
                offset + nbytes
            )));
        }

        // OS-level memory mapping still requires unsafe at creation time; the
        // resulting Mmap is safe to use.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        debug!(
            "Mapped {} ({dtype}, shape {:?}, offset {offset})",
            path.display(),
            shape
        );

        Ok(Self {
            path,
            offset,
            shape,
            dtype,
            mmap: Arc::new(mmap),
        })
    }

    /// Writes `values` to a new headerless file and maps it
    /// # Errors
    /// Will return `Err` if the number of values does not match `shape` or
    /// the file cannot be written
    pub fn create_from<T: Element>(
        path: impl AsRef<Path>,
        shape: Vec<usize>,
        values: &[T],
    ) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(DataError::shape_mismatch(format!(
                "{} values do not fill shape {shape:?}",
                values.len()
            )));
        }
        let mut file = File::create(path.as_ref())?;
        file.write_all(&to_le_bytes(values))?;
        file.sync_all()?;
        drop(file);
        Self::open(path, 0, shape, T::DTYPE)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    fn data(&self) -> &[u8] {
        &self.mmap[self.offset..]
    }
}

impl ArrayStore for DiskArray {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn paths(&self) -> Vec<&Path> {
        vec![self.path.as_path()]
    }

    fn read(&self, index: &[Index]) -> Result<Vec<u8>> {
        gather(self.data(), &self.shape, self.dtype.item_size(), index)
    }

    fn as_disk_array(&self) -> Option<&DiskArray> {
        Some(self)
    }
}

/// Allocates a new array file and fills it trial by trial
///
/// The builder owns the output file for its whole lifecycle: `create` sizes
/// it, `commit_trial` writes one region through a handle that is released
/// before the call returns (also on error), and `finish` maps the completed
/// file. An unfinished output is removed with `abandon`.
#[derive(Debug)]
pub struct DiskArrayBuilder {
    path: PathBuf,
    shape: Vec<usize>,
    dtype: DType,
    committed: Vec<usize>,
}

impl DiskArrayBuilder {
    /// Creates (or truncates) the output file and sizes it for `shape`
    /// # Errors
    /// Will return `Err` if the shape is empty or the file cannot be created
    pub fn create(path: impl AsRef<Path>, shape: Vec<usize>, dtype: DType) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let nbytes = shape.iter().product::<usize>() * dtype.item_size();
        if nbytes == 0 {
            return Err(DataError::invalid_value(
                "target shape",
                "non-empty array",
                format!("{shape:?}"),
            ));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        file.set_len(nbytes as u64)?;
        debug!(
            "Allocated {} ({dtype}, shape {:?}, {nbytes} bytes)",
            path.display(),
            shape
        );
        Ok(Self {
            path,
            shape,
            dtype,
            committed: Vec::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Size of the output in bytes
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.shape.iter().product::<usize>() * self.dtype.item_size()
    }

    /// Trials committed so far, in commit order
    #[must_use]
    pub fn committed(&self) -> &[usize] {
        &self.committed
    }

    /// Writes `bytes` (row-major in the shape of `region`) into `region`
    ///
    /// A writable handle is opened for this call only.
    /// # Errors
    /// Will return `Err` if the region does not fit the array, `bytes` has
    /// the wrong length, or the write fails
    pub fn commit_trial(&mut self, trial: usize, region: &[Index], bytes: &[u8]) -> Result<()> {
        check_index(&self.shape, region)?;
        let item = self.dtype.item_size();
        let expected = selection_len(region) * item;
        if bytes.len() != expected {
            return Err(DataError::shape_mismatch(format!(
                "trial {trial}: {} bytes supplied for a region of {expected} bytes",
                bytes.len()
            )));
        }

        let file = OpenOptions::new().write(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let mut position: Option<usize> = None;
        let mut consumed = 0;
        visit_runs(&self.shape, region, |offset, len| {
            let at = offset * item;
            if position != Some(at) {
                writer.seek(SeekFrom::Start(at as u64))?;
            }
            let run = len * item;
            writer.write_all(&bytes[consumed..consumed + run])?;
            consumed += run;
            position = Some(at + run);
            Ok(())
        })?;
        writer.flush()?;

        self.committed.push(trial);
        debug!("Committed trial {trial} ({expected} bytes) to {}", self.path.display());
        Ok(())
    }

    /// Maps the completed output read-only
    /// # Errors
    /// Will return `Err` if the file cannot be mapped
    pub fn finish(self) -> Result<DiskArray> {
        DiskArray::open(&self.path, 0, self.shape, self.dtype)
    }

    /// Discards a partially written output
    /// # Errors
    /// Will return `Err` if the file cannot be removed
    pub fn abandon(self) -> Result<()> {
        debug!("Abandoning partial output {}", self.path.display());
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}
