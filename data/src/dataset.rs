//! Trial-structured datasets over shared, disk-backed arrays.
//!
//! A [`Dataset`] pairs a [`DataHandle`] with a `dimord`, optional coordinates
//! per dimension, a sampling rate and a [`TrialDefinition`]. Two kinds exist:
//!
//! - **Continuous** data is a dense array with a `time` axis somewhere in its
//!   `dimord`. Trials are windows along that axis.
//! - **Discrete** data is an event table: one row per event, one column per
//!   entry of `dimord`, one of which is `sample`. Every row is assigned to
//!   the trial that contains its sample, if any.
//!
//! Dimension positions are a property of each dataset, so callers resolve
//! names with [`Dataset::dim_index`] rather than assuming an order.

use crate::dtype::DType;
use crate::error::{DataError, Result};
use crate::index::{Index, Slice};
use crate::store::{ArrayStore, full_index};
use crate::trialdef::TrialDefinition;
use itertools::Itertools;
use ndarray::{ArrayD, IxDyn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::Display;
use tracing::debug;

/// Name of the time dimension of continuous data
pub const TIME_DIM: &str = "time";
/// Name of the sample column of discrete data
pub const SAMPLE_DIM: &str = "sample";

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Continuous,
    Discrete,
}

/// Labels or numeric values along one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Coordinates {
    Labels(Vec<String>),
    Values(Vec<f64>),
}

impl Coordinates {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Labels(labels) => labels.len(),
            Self::Values(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The coordinates at `index`, in index order
    #[must_use]
    pub fn select(&self, index: &Index) -> Self {
        let picks = index.to_vec();
        match self {
            Self::Labels(labels) => {
                Self::Labels(picks.iter().map(|&i| labels[i].clone()).collect())
            }
            Self::Values(values) => Self::Values(picks.iter().map(|&i| values[i]).collect()),
        }
    }

    /// `prefix1, prefix2, ...`
    #[must_use]
    pub fn numbered(prefix: &str, n: usize) -> Self {
        Self::Labels((1..=n).map(|i| format!("{prefix}{i}")).collect())
    }
}

/// A shared array store plus a rectangular window into it
///
/// Views of a handle share the same store; only the window changes.
#[derive(Debug, Clone)]
pub struct DataHandle {
    store: Arc<dyn ArrayStore>,
    window: Vec<Slice>,
}

impl DataHandle {
    /// A handle covering the whole store
    pub fn new(store: Arc<dyn ArrayStore>) -> Self {
        let window = store.shape().iter().map(|&len| Slice::full(len)).collect();
        Self { store, window }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArrayStore> {
        &self.store
    }

    #[must_use]
    pub fn window(&self) -> &[Slice] {
        &self.window
    }

    /// Shape of the window
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.window.iter().map(Slice::len).collect()
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.store.dtype()
    }

    /// Size of the window in bytes
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.shape().iter().product::<usize>() * self.dtype().item_size()
    }

    /// Narrows the window; every entry of `index` is relative to the current window
    /// # Errors
    /// Will return `Err` if the rank differs or a slice leaves the window
    pub fn view(&self, index: &[Slice]) -> Result<Self> {
        self.check_rank(index.len())?;
        let mut window = Vec::with_capacity(index.len());
        for (axis, (outer, inner)) in self.window.iter().zip(index).enumerate() {
            if inner.end() > outer.len() {
                return Err(DataError::invalid_value(
                    format!("view along axis {axis}"),
                    format!("positions below {}", outer.len()),
                    format!("{}..{}", inner.start, inner.stop),
                ));
            }
            window.push(outer.narrow(inner));
        }
        Ok(Self {
            store: Arc::clone(&self.store),
            window,
        })
    }

    /// Reads a selection relative to the window
    /// # Errors
    /// Will return `Err` if the index does not fit the window or the read fails
    pub fn read(&self, index: &[Index]) -> Result<Vec<u8>> {
        self.store.read(&self.absolute(index)?)
    }

    /// Reads a selection relative to the window as `f64`
    /// # Errors
    /// Will return `Err` if the index does not fit the window or the read fails
    pub fn read_f64(&self, index: &[Index]) -> Result<ArrayD<f64>> {
        self.store.read_f64(&self.absolute(index)?)
    }

    /// Reads the whole window as `f64`
    /// # Errors
    /// Will return `Err` if the read fails
    pub fn to_array(&self) -> Result<ArrayD<f64>> {
        self.read_f64(&full_index(&self.shape()))
    }

    /// Whether both handles read from the very same store
    #[must_use]
    pub fn shares_storage(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.store), Arc::as_ptr(&other.store))
    }

    fn absolute(&self, index: &[Index]) -> Result<Vec<Index>> {
        self.check_rank(index.len())?;
        crate::index::check_index(&self.shape(), index)?;
        Ok(self
            .window
            .iter()
            .zip(index)
            .map(|(outer, inner)| outer.compose(inner))
            .collect())
    }

    fn check_rank(&self, rank: usize) -> Result<()> {
        if rank != self.window.len() {
            return Err(DataError::shape_mismatch(format!(
                "index of rank {rank} for data of rank {}",
                self.window.len()
            )));
        }
        Ok(())
    }
}

/// A trial-structured dataset, continuous or discrete
#[derive(Debug, Clone)]
pub struct Dataset {
    kind: DataKind,
    data: DataHandle,
    dimord: Vec<String>,
    coords: FxHashMap<String, Coordinates>,
    samplerate: Option<f64>,
    trialdef: TrialDefinition,
    /// Trial of every event row (discrete data only)
    trialid: Vec<Option<usize>>,
}

impl Dataset {
    /// Continuous data spanning a single trial over the whole recording
    /// # Errors
    /// Will return `Err` if `dimord` does not fit the data
    pub fn continuous(
        data: DataHandle,
        dimord: Vec<String>,
        samplerate: Option<f64>,
    ) -> Result<Self> {
        Self::from_parts(
            DataKind::Continuous,
            data,
            dimord,
            FxHashMap::default(),
            samplerate,
            None,
        )
    }

    /// Discrete data spanning a single trial from the first to the last event
    /// # Errors
    /// Will return `Err` if `dimord` does not fit the data
    pub fn discrete(
        data: DataHandle,
        dimord: Vec<String>,
        samplerate: Option<f64>,
    ) -> Result<Self> {
        Self::from_parts(DataKind::Discrete, data, dimord, FxHashMap::default(), samplerate, None)
    }

    /// Assembles and validates a dataset
    ///
    /// Without a trial definition the dataset holds one trial covering the
    /// whole recording.
    /// # Errors
    /// Will return `Err` if:
    /// - `dimord` has duplicates, does not match the data, or lacks `time`/`sample`
    /// - a coordinate does not fit its dimension
    /// - the sampling rate is not positive
    /// - the trial definition does not fit the data
    pub fn from_parts(
        kind: DataKind,
        data: DataHandle,
        dimord: Vec<String>,
        coords: FxHashMap<String, Coordinates>,
        samplerate: Option<f64>,
        trialdef: Option<TrialDefinition>,
    ) -> Result<Self> {
        validate_dimord(kind, &data.shape(), &dimord)?;
        if let Some(rate) = samplerate.filter(|rate| !(*rate > 0.0 && rate.is_finite())) {
            return Err(DataError::invalid_value(
                "samplerate",
                "positive sampling rate",
                rate.to_string(),
            ));
        }
        let mut dataset = Self {
            kind,
            data,
            dimord,
            coords: FxHashMap::default(),
            samplerate,
            trialdef: TrialDefinition::whole(1)?,
            trialid: Vec::new(),
        };
        for (dim, coordinates) in coords {
            dataset.set_coords(&dim, coordinates)?;
        }
        match trialdef {
            Some(def) => dataset.redefine_trials(def)?,
            None => dataset.reset_trials()?,
        }
        Ok(dataset)
    }

    /// Attaches coordinates to a dimension
    /// # Errors
    /// Will return `Err` if the dimension is unknown or the coordinates do not fit it
    pub fn with_coords(mut self, dim: &str, coords: Coordinates) -> Result<Self> {
        self.set_coords(dim, coords)?;
        Ok(self)
    }

    fn set_coords(&mut self, dim: &str, coords: Coordinates) -> Result<()> {
        let axis = self.dim_index(dim)?;
        let required = match self.kind {
            DataKind::Continuous => Some(self.data.shape()[axis]),
            DataKind::Discrete => None,
        };
        match required {
            Some(len) if coords.len() != len => {
                return Err(DataError::invalid_value(
                    format!("coordinates of '{dim}'"),
                    format!("{len} entries"),
                    coords.len().to_string(),
                ));
            }
            None if self.kind == DataKind::Discrete => {
                // label columns hold positions into the coordinates
                let needed = self.column_extent(axis)?;
                if coords.len() < needed {
                    return Err(DataError::invalid_value(
                        format!("coordinates of '{dim}'"),
                        format!("at least {needed} entries"),
                        coords.len().to_string(),
                    ));
                }
            }
            _ => {}
        }
        self.coords.insert(dim.to_string(), coords);
        Ok(())
    }

    /// Replaces the trial definition
    /// # Errors
    /// Will return `Err` if a trial reaches past the end of continuous data
    pub fn redefine_trials(&mut self, trialdef: TrialDefinition) -> Result<()> {
        match self.kind {
            DataKind::Continuous => {
                let n_time = self.data.shape()[self.require_axis(TIME_DIM)?];
                if trialdef.max_stop() > n_time {
                    return Err(DataError::invalid_value(
                        "trialdefinition",
                        format!("trial bounds within {n_time} samples"),
                        format!("stop at {}", trialdef.max_stop()),
                    ));
                }
                self.trialid.clear();
            }
            DataKind::Discrete => {
                let samples = self.samples()?;
                self.trialid = assign_trials(&samples, trialdef.sampleinfo());
            }
        }
        debug!("Defined {} trial(s) on {} data", trialdef.len(), self.kind);
        self.trialdef = trialdef;
        Ok(())
    }

    /// Resets to a single trial over the whole recording
    ///
    /// Continuous data spans `[0, n_time)`, discrete data spans
    /// `[min sample, max sample + 1)`.
    /// # Errors
    /// Will return `Err` if the recording is empty or cannot be read
    pub fn reset_trials(&mut self) -> Result<()> {
        let whole = match self.kind {
            DataKind::Continuous => {
                TrialDefinition::whole(self.data.shape()[self.require_axis(TIME_DIM)?])?
            }
            DataKind::Discrete => {
                let samples = self.samples()?;
                match samples.iter().minmax().into_option() {
                    Some((&lo, &hi)) => TrialDefinition::spanning(lo, hi + 1)?,
                    None => {
                        return Err(DataError::invalid_value(
                            "discrete data",
                            "at least one event",
                            "no events",
                        ));
                    }
                }
            }
        };
        self.redefine_trials(whole)
    }

    #[must_use]
    pub const fn kind(&self) -> DataKind {
        self.kind
    }

    #[must_use]
    pub fn data(&self) -> &DataHandle {
        &self.data
    }

    #[must_use]
    pub fn dimord(&self) -> &[String] {
        &self.dimord
    }

    #[must_use]
    pub const fn samplerate(&self) -> Option<f64> {
        self.samplerate
    }

    #[must_use]
    pub fn trial_definition(&self) -> &TrialDefinition {
        &self.trialdef
    }

    #[must_use]
    pub fn sampleinfo(&self) -> &[(usize, usize)] {
        self.trialdef.sampleinfo()
    }

    #[must_use]
    pub fn ntrials(&self) -> usize {
        self.trialdef.len()
    }

    /// Trial of every event row; empty for continuous data
    #[must_use]
    pub fn trialid(&self) -> &[Option<usize>] {
        &self.trialid
    }

    #[must_use]
    pub fn coords(&self, dim: &str) -> Option<&Coordinates> {
        self.coords.get(dim)
    }

    #[must_use]
    pub fn all_coords(&self) -> &FxHashMap<String, Coordinates> {
        &self.coords
    }

    /// Position of dimension `name` in `dimord`
    /// # Errors
    /// Will return `Err` if the dataset has no such dimension
    pub fn dim_index(&self, name: &str) -> Result<usize> {
        self.dimord.iter().position(|d| d == name).ok_or_else(|| {
            DataError::invalid_value(
                "dimension",
                format!("one of {}", self.dimord.join(", ")),
                name,
            )
        })
    }

    /// Axis of the time dimension (continuous data)
    #[must_use]
    pub fn time_axis(&self) -> Option<usize> {
        match self.kind {
            DataKind::Continuous => self.dim_index(TIME_DIM).ok(),
            DataKind::Discrete => None,
        }
    }

    /// Column holding event samples (discrete data)
    #[must_use]
    pub fn sample_column(&self) -> Option<usize> {
        match self.kind {
            DataKind::Discrete => self.dim_index(SAMPLE_DIM).ok(),
            DataKind::Continuous => None,
        }
    }

    /// Number of selectable positions along a dimension
    ///
    /// For discrete data this is the number of coordinates if any are
    /// attached, else one more than the largest value in the column.
    /// # Errors
    /// Will return `Err` if the dimension is unknown or its column cannot be read
    pub fn dim_len(&self, name: &str) -> Result<usize> {
        let axis = self.dim_index(name)?;
        match self.kind {
            DataKind::Continuous => Ok(self.data.shape()[axis]),
            DataKind::Discrete => match self.coords.get(name) {
                Some(coords) => Ok(coords.len()),
                None => self.column_extent(axis),
            },
        }
    }

    /// Reads one column of discrete data
    /// # Errors
    /// Will return `Err` if the column is out of range or cannot be read
    pub fn column(&self, column: usize) -> Result<Vec<f64>> {
        let rows = self.data.shape()[0];
        let block = self
            .data
            .read_f64(&[Index::full(rows), Index::List(vec![column])])?;
        Ok(block.iter().copied().collect())
    }

    /// Event samples of discrete data as sample positions
    /// # Errors
    /// Will return `Err` if a sample is negative or not integral
    pub fn samples(&self) -> Result<Vec<usize>> {
        let column = self.require_axis(SAMPLE_DIM)?;
        self.column(column)?
            .into_iter()
            .map(|s| {
                if s < 0.0 || s.fract() != 0.0 || !s.is_finite() {
                    Err(DataError::invalid_value(
                        SAMPLE_DIM,
                        "non-negative integral sample",
                        s.to_string(),
                    ))
                } else {
                    Ok(s as usize)
                }
            })
            .collect()
    }

    /// Loads trial `k` into memory
    ///
    /// Continuous trials keep every dimension and are cut along `time`.
    /// Discrete trials are the event rows assigned to trial `k`.
    /// # Errors
    /// Will return `Err` if `k` is out of range or the read fails
    pub fn trial(&self, k: usize) -> Result<ArrayD<f64>> {
        self.trialdef.check_trial(k)?;
        let shape = self.data.shape();
        let mut index = full_index(&shape);
        match self.kind {
            DataKind::Continuous => {
                let (start, stop) = self.trialdef.sampleinfo()[k];
                index[self.require_axis(TIME_DIM)?] = Index::Slice(Slice::range(start, stop));
            }
            DataKind::Discrete => {
                let rows = self.trial_rows(k);
                if rows.is_empty() {
                    return Ok(ArrayD::zeros(IxDyn(&[0, shape[1]])));
                }
                index[0] = Index::List(rows);
            }
        }
        self.data.read_f64(&index)
    }

    /// Rows of discrete data assigned to trial `k`
    #[must_use]
    pub fn trial_rows(&self, k: usize) -> Vec<usize> {
        self.trialid
            .iter()
            .positions(|&id| id == Some(k))
            .collect()
    }

    /// Lazily iterates over all trials, one in memory at a time
    #[must_use]
    pub fn trials(&self) -> TrialIndexer<'_> {
        TrialIndexer {
            dataset: self,
            next: 0,
        }
    }

    /// Relative time axis of trial `k` in seconds
    /// # Errors
    /// Will return `Err` if `k` is out of range or the sampling rate is unknown
    pub fn time(&self, k: usize) -> Result<Vec<f64>> {
        self.trialdef.time_axis(k, self.require_samplerate()?)
    }

    /// The sampling rate, or an error naming the missing rate
    /// # Errors
    /// Will return `Err` if the dataset has no sampling rate
    pub fn require_samplerate(&self) -> Result<f64> {
        self.samplerate.ok_or_else(|| {
            DataError::invalid_value("samplerate", "known sampling rate", "none")
        })
    }

    fn require_axis(&self, name: &str) -> Result<usize> {
        self.dim_index(name)
    }

    fn column_extent(&self, column: usize) -> Result<usize> {
        let values = self.column(column)?;
        Ok(values
            .iter()
            .copied()
            .filter(|v| *v >= 0.0)
            .fold(0.0_f64, f64::max) as usize
            + 1)
    }
}

/// Lazy, bounds-checked access to the trials of a dataset
#[derive(Debug, Clone)]
pub struct TrialIndexer<'a> {
    dataset: &'a Dataset,
    next: usize,
}

impl TrialIndexer<'_> {
    /// Loads trial `k`
    /// # Errors
    /// Will return `Err` if `k` is out of range or the read fails
    pub fn get(&self, k: usize) -> Result<ArrayD<f64>> {
        self.dataset.trial(k)
    }
}

impl Iterator for TrialIndexer<'_> {
    type Item = Result<ArrayD<f64>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.dataset.ntrials() {
            return None;
        }
        let trial = self.dataset.trial(self.next);
        self.next += 1;
        Some(trial)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.dataset.ntrials().saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for TrialIndexer<'_> {}

fn validate_dimord(kind: DataKind, shape: &[usize], dimord: &[String]) -> Result<()> {
    if let Some(dup) = dimord.iter().duplicates().next() {
        return Err(DataError::invalid_value(
            "dimord",
            "unique dimension names",
            format!("'{dup}' repeated"),
        ));
    }
    let (expected, required) = match kind {
        DataKind::Continuous => (shape.len(), TIME_DIM),
        DataKind::Discrete => {
            if shape.len() != 2 {
                return Err(DataError::shape_mismatch(format!(
                    "discrete data must be a 2-d event table, got shape {shape:?}"
                )));
            }
            (shape[1], SAMPLE_DIM)
        }
    };
    if dimord.len() != expected {
        return Err(DataError::invalid_value(
            "dimord",
            format!("{expected} dimension names for {kind} data"),
            dimord.len().to_string(),
        ));
    }
    if !dimord.iter().any(|d| d == required) {
        return Err(DataError::invalid_value(
            "dimord",
            format!("a '{required}' dimension for {kind} data"),
            dimord.join(", "),
        ));
    }
    Ok(())
}

/// Trial of each sample: the last trial starting at or before it, provided
/// the sample lies before that trial's stop
#[must_use]
pub fn assign_trials(samples: &[usize], sampleinfo: &[(usize, usize)]) -> Vec<Option<usize>> {
    let ascending = sampleinfo.is_sorted_by_key(|&(start, _)| start);
    samples
        .iter()
        .map(|&sample| {
            let candidate = if ascending {
                sampleinfo
                    .partition_point(|&(start, _)| start <= sample)
                    .checked_sub(1)
            } else {
                sampleinfo.iter().rposition(|&(start, _)| start <= sample)
            };
            candidate.filter(|&k| sample < sampleinfo[k].1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskArray;
    use ndarray::Array2;

    fn names(dims: &[&str]) -> Vec<String> {
        dims.iter().map(ToString::to_string).collect()
    }

    fn continuous(dir: &std::path::Path) -> anyhow::Result<Dataset> {
        // 10 samples x 3 channels, value = 10 * sample + channel
        let values: Vec<f32> = (0..10)
            .flat_map(|t| (0..3).map(move |c| (10 * t + c) as f32))
            .collect();
        let array = DiskArray::create_from(dir.join("cont.dat"), vec![10, 3], &values)?;
        let data = DataHandle::new(Arc::new(array));
        Ok(Dataset::continuous(data, names(&["time", "channel"]), Some(1000.0))?)
    }

    fn discrete(dir: &std::path::Path) -> anyhow::Result<Dataset> {
        // sample, channel, unit
        let rows: Vec<i64> = vec![2, 0, 0, 4, 1, 1, 9, 0, 2, 15, 1, 0];
        let array = DiskArray::create_from(dir.join("spk.dat"), vec![4, 3], &rows)?;
        let data = DataHandle::new(Arc::new(array));
        Ok(Dataset::discrete(data, names(&["sample", "channel", "unit"]), Some(1000.0))?)
    }

    #[test]
    fn default_trial_spans_recording() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(continuous(dir.path())?.sampleinfo(), &[(0, 10)]);
        let spikes = discrete(dir.path())?;
        assert_eq!(spikes.sampleinfo(), &[(2, 16)]);
        assert!(spikes.trialid().iter().all(|id| *id == Some(0)));
        Ok(())
    }

    #[test]
    fn dimord_is_validated() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let data = continuous(dir.path())?.data().clone();
        assert!(Dataset::continuous(data.clone(), names(&["time", "time"]), None).is_err());
        assert!(Dataset::continuous(data.clone(), names(&["channel", "freq"]), None).is_err());
        assert!(Dataset::continuous(data, names(&["time"]), None).is_err());
        Ok(())
    }

    #[test]
    fn dimension_order_is_per_instance() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let data = continuous(dir.path())?.data().clone();
        let flipped = Dataset::continuous(data, names(&["channel", "time"]), None)?;
        assert_eq!(flipped.dim_index("time")?, 1);
        assert_eq!(flipped.sampleinfo(), &[(0, 3)]);
        Ok(())
    }

    #[test]
    fn continuous_trials_cut_along_time() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut dataset = continuous(dir.path())?;
        let def =
            TrialDefinition::from_table(&ndarray::array![[0.0, 4.0, -1.0], [6.0, 10.0, 0.0]])?;
        dataset.redefine_trials(def)?;

        let second = dataset.trial(1)?;
        assert_eq!(second.shape(), &[4, 3]);
        assert_eq!(second[[0, 2]], 62.0);
        assert_eq!(dataset.trials().len(), 2);
        assert_eq!(dataset.trials().collect::<Result<Vec<_>>>()?.len(), 2);
        assert_eq!(dataset.time(0)?, vec![-0.001, 0.0, 0.001, 0.002]);
        assert!(dataset.trial(2).is_err());
        Ok(())
    }

    #[test]
    fn trials_must_fit_the_recording() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut dataset = continuous(dir.path())?;
        let def = TrialDefinition::spanning(5, 11)?;
        assert!(dataset.redefine_trials(def).is_err());
        Ok(())
    }

    #[test]
    fn events_are_assigned_to_trials() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut spikes = discrete(dir.path())?;
        let def = TrialDefinition::new(vec![(0, 5), (8, 12)], vec![0, 0], Array2::zeros((2, 0)))?;
        spikes.redefine_trials(def)?;
        assert_eq!(spikes.trialid(), &[Some(0), Some(0), Some(1), None]);
        let first = spikes.trial(0)?;
        assert_eq!(first.shape(), &[2, 3]);
        assert_eq!(first[[1, 0]], 4.0);
        Ok(())
    }

    #[test]
    fn discrete_extent_comes_from_columns() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let spikes = discrete(dir.path())?;
        assert_eq!(spikes.dim_len("unit")?, 3);
        let spikes = spikes.with_coords("unit", Coordinates::numbered("unit", 4))?;
        assert_eq!(spikes.dim_len("unit")?, 4);
        assert!(spikes.with_coords("channel", Coordinates::numbered("channel", 1)).is_err());
        Ok(())
    }

    #[test]
    fn views_share_storage() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let data = continuous(dir.path())?.data().clone();
        let view = data.view(&[Slice::range(2, 8), Slice::range(1, 3)])?;
        assert!(view.shares_storage(&data));
        assert_eq!(view.shape(), vec![6, 2]);
        let block = view.read_f64(&[Index::Slice(Slice::range(0, 1)), Index::full(2)])?;
        assert_eq!(block.iter().copied().collect::<Vec<_>>(), vec![21.0, 22.0]);
        assert!(data.view(&[Slice::range(0, 11), Slice::full(3)]).is_err());
        Ok(())
    }

    #[test]
    fn assignment_ignores_gaps_between_trials() {
        let ids = assign_trials(&[0, 3, 5, 7, 9], &[(1, 4), (6, 8)]);
        assert_eq!(ids, vec![None, Some(0), None, Some(1), None]);
    }
}
