//! Concrete index objects for one array axis.
//!
//! Every selector eventually becomes either a [`Slice`] (start, stop, step)
//! or an explicit ascending [`Index::List`]. Stores consume a slice of
//! `Index` values, one per axis, and enumerate the selected elements in
//! row-major order through [`visit_runs`].

use crate::error::{DataError, Result};
use serde::{Deserialize, Serialize};

/// Half-open, positive-step range of positions along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slice {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
}

impl Slice {
    /// Creates a new slice
    /// # Errors
    /// Will return `Err` if `step` is zero
    pub fn new(start: usize, stop: usize, step: usize) -> Result<Self> {
        if step == 0 {
            return Err(DataError::invalid_value("step", "positive slice step", "0"));
        }
        Ok(Self { start, stop, step })
    }

    /// Contiguous `start..stop`
    #[must_use]
    pub const fn range(start: usize, stop: usize) -> Self {
        Self {
            start,
            stop,
            step: 1,
        }
    }

    /// The whole axis of length `len`
    #[must_use]
    pub const fn full(len: usize) -> Self {
        Self::range(0, len)
    }

    /// Number of selected positions
    #[must_use]
    pub const fn len(&self) -> usize {
        if self.stop <= self.start {
            0
        } else {
            (self.stop - self.start).div_ceil(self.step)
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Last selected position plus one, i.e. the tight exclusive bound
    #[must_use]
    pub const fn end(&self) -> usize {
        if self.is_empty() {
            self.start
        } else {
            self.start + (self.len() - 1) * self.step + 1
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + use<> {
        (self.start..self.stop.max(self.start)).step_by(self.step)
    }

    /// Clamps the slice to an axis of length `len`, like Python's `slice.indices`
    #[must_use]
    pub fn clamp(&self, len: usize) -> Self {
        let start = self.start.min(len);
        Self {
            start,
            stop: self.stop.min(len).max(start),
            step: self.step,
        }
    }

    /// Position of the `i`-th selected element
    #[must_use]
    pub const fn at(&self, i: usize) -> usize {
        self.start + i * self.step
    }

    /// Selects the relative slice `inner` inside this one
    #[must_use]
    pub fn narrow(&self, inner: &Self) -> Self {
        let s = inner.clamp(self.len());
        Self {
            start: self.at(s.start),
            stop: if s.is_empty() {
                self.at(s.start)
            } else {
                self.at(s.end() - 1) + 1
            },
            step: self.step * s.step,
        }
    }

    /// Selects `inner` (relative to this slice) and returns absolute positions
    #[must_use]
    pub fn compose(&self, inner: &Index) -> Index {
        match inner {
            Index::Slice(s) => Index::Slice(self.narrow(s)),
            Index::List(list) => Index::List(list.iter().map(|&i| self.at(i)).collect()),
        }
    }
}

/// Resolved index for one axis
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Index {
    Slice(Slice),
    List(Vec<usize>),
}

impl Index {
    #[must_use]
    pub const fn full(len: usize) -> Self {
        Self::Slice(Slice::full(len))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Slice(s) => s.len(),
            Self::List(list) => list.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn is_slice(&self) -> bool {
        matches!(self, Self::Slice(_))
    }

    #[must_use]
    pub fn as_slice(&self) -> Option<&Slice> {
        match self {
            Self::Slice(s) => Some(s),
            Self::List(_) => None,
        }
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<usize> {
        match self {
            Self::Slice(s) => s.iter().collect(),
            Self::List(list) => list.clone(),
        }
    }

    /// Largest selected position, if any
    #[must_use]
    pub fn max(&self) -> Option<usize> {
        match self {
            Self::Slice(s) if !s.is_empty() => Some(s.end() - 1),
            Self::Slice(_) => None,
            Self::List(list) => list.iter().copied().max(),
        }
    }

    /// `(start, len)` when the index is a contiguous run
    fn as_run(&self) -> Option<(usize, usize)> {
        match self {
            Self::Slice(s) if s.step == 1 || s.len() <= 1 => Some((s.start, s.len())),
            _ => None,
        }
    }
}

/// Row-major element strides for `shape`
#[must_use]
pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// Validates `index` against an array of `shape`
/// # Errors
/// Will return `Err` if the rank differs or any position is out of bounds
pub fn check_index(shape: &[usize], index: &[Index]) -> Result<()> {
    if shape.len() != index.len() {
        return Err(DataError::shape_mismatch(format!(
            "index of rank {} for array of rank {}",
            index.len(),
            shape.len()
        )));
    }
    for (axis, (idx, &extent)) in index.iter().zip(shape).enumerate() {
        if let Some(max) = idx.max().filter(|&max| max >= extent) {
            return Err(DataError::invalid_value(
                format!("index along axis {axis}"),
                format!("positions below {extent}"),
                max.to_string(),
            ));
        }
    }
    Ok(())
}

/// Number of elements selected by `index`
#[must_use]
pub fn selection_len(index: &[Index]) -> usize {
    index.iter().map(Index::len).product()
}

/// Enumerates the elements selected by `index` as row-major runs
///
/// `visit(offset, len)` is called with the flat element offset (in the array
/// of `shape`) of each run of consecutive elements, in the order the
/// selection is laid out row-major. Runs are as long as the innermost index
/// allows.
/// # Errors
/// Propagates the first error returned by `visit`
pub fn visit_runs<F>(shape: &[usize], index: &[Index], mut visit: F) -> Result<()>
where
    F: FnMut(usize, usize) -> Result<()>,
{
    if index.is_empty() || index.iter().any(Index::is_empty) {
        return Ok(());
    }
    let strides = strides(shape);
    let last = index.len() - 1;
    let outer: Vec<Vec<usize>> = index[..last].iter().map(Index::to_vec).collect();
    let inner_run = index[last].as_run();
    let inner = if inner_run.is_none() {
        index[last].to_vec()
    } else {
        Vec::new()
    };

    let mut cursor = vec![0_usize; last];
    loop {
        let base: usize = cursor
            .iter()
            .enumerate()
            .map(|(d, &c)| outer[d][c] * strides[d])
            .sum();
        match inner_run {
            Some((start, len)) => visit(base + start, len)?,
            None => {
                for &j in &inner {
                    visit(base + j, 1)?;
                }
            }
        }

        // advance the odometer over the outer axes
        let mut d = last;
        loop {
            if d == 0 {
                return Ok(());
            }
            d -= 1;
            cursor[d] += 1;
            if cursor[d] < outer[d].len() {
                break;
            }
            cursor[d] = 0;
        }
    }
}

/// Copies the selected elements of a row-major buffer into a new buffer
/// # Errors
/// Will return `Err` if `index` does not fit `shape`
pub fn gather(src: &[u8], shape: &[usize], item_size: usize, index: &[Index]) -> Result<Vec<u8>> {
    check_index(shape, index)?;
    let mut out = Vec::with_capacity(selection_len(index) * item_size);
    visit_runs(shape, index, |offset, len| {
        let from = offset * item_size;
        let to = from + len * item_size;
        let bytes = src.get(from..to).ok_or_else(|| {
            DataError::shape_mismatch(format!(
                "buffer of {} bytes is too small for element range {from}..{to}",
                src.len()
            ))
        })?;
        out.extend_from_slice(bytes);
        Ok(())
    })?;
    Ok(out)
}
