use crate::error::{Result, SelectError};
use crate::resolve::SelectorResolver;
use crate::selector::Selector;
use crate::time::TimeSelector;
use derive_builder::Builder;
use ephys_data::{DataKind, Dataset, Index, Slice, TIME_DIM};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which trials a selection keeps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialFilter {
    #[default]
    All,
    /// Trials `start..stop`; `None` runs to the last trial
    Range { start: usize, stop: Option<usize> },
    /// Explicit trials, kept in the given order
    List(Vec<usize>),
}

impl TrialFilter {
    /// Trial numbers selected among `ntrials` trials
    /// # Errors
    /// Will return `Err` if the filter is empty, out of range or repeats a trial
    pub fn resolve(&self, ntrials: usize) -> Result<Vec<usize>> {
        let trials: Vec<usize> = match self {
            Self::All => (0..ntrials).collect(),
            Self::Range { start, stop } => {
                let stop = stop.unwrap_or(ntrials);
                if stop > ntrials {
                    return Err(SelectError::invalid_value(
                        "trials",
                        format!("range within {ntrials} trials"),
                        format!("{start}..{stop}"),
                    ));
                }
                (*start..stop).collect()
            }
            Self::List(list) => {
                if let Some(&bad) = list.iter().find(|&&k| k >= ntrials) {
                    return Err(SelectError::invalid_value(
                        "trials",
                        format!("trial numbers below {ntrials}"),
                        bad.to_string(),
                    ));
                }
                if let Some(dup) = list.iter().duplicates().next() {
                    return Err(SelectError::invalid_value(
                        "trials",
                        "distinct trial numbers",
                        format!("trial {dup} repeated"),
                    ));
                }
                list.clone()
            }
        };
        if trials.is_empty() {
            return Err(SelectError::invalid_value(
                "trials",
                "at least one trial",
                format!("{self:?}"),
            ));
        }
        Ok(trials)
    }
}

impl From<Vec<usize>> for TrialFilter {
    fn from(list: Vec<usize>) -> Self {
        Self::List(list)
    }
}

/// A selection as requested by the caller, before resolution
///
/// # Example
///
/// ```rust,no_run
/// use ephys_select::{Selector, SelectionRequest};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let request = SelectionRequest::builder()
///     .select("channel", Selector::IndexList(vec![0, 2]))
///     .select("time", Selector::between(-0.1, 0.5))
///     .trials(vec![1, 3])
///     .deepcopy(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Builder, Clone, Debug, Default, PartialEq)]
#[builder(default)]
pub struct SelectionRequest {
    /// Selectors by dimension name; `time` selects on trial-relative time
    #[builder(setter(custom))]
    pub selectors: Vec<(String, Selector)>,

    #[builder(setter(into))]
    pub trials: TrialFilter,

    /// Always copy, even where a view would do
    pub deepcopy: bool,

    /// Values must match coordinates exactly instead of snapping to the nearest
    pub exact_match: bool,
}

impl SelectionRequestBuilder {
    /// Adds a selector for dimension `dim`
    pub fn select(&mut self, dim: impl Into<String>, selector: Selector) -> &mut Self {
        self.selectors
            .get_or_insert_with(Vec::new)
            .push((dim.into(), selector));
        self
    }
}

impl SelectionRequest {
    /// Create a new builder for SelectionRequest
    #[must_use]
    pub fn builder() -> SelectionRequestBuilder {
        SelectionRequestBuilder::default()
    }

    /// Resolves every selector against `dataset`
    ///
    /// Nothing is read or written besides the coordinates needed for
    /// matching; all validation happens here.
    /// # Errors
    /// Will return `Err` if:
    /// - a dimension is unknown, selected twice, or is the sample column of discrete data
    /// - the trial filter or any selector does not resolve
    pub fn resolve(&self, dataset: &Dataset) -> Result<Selection> {
        let trials = self.trials.resolve(dataset.ntrials())?;

        if let Some(dup) = self.selectors.iter().map(|(dim, _)| dim).duplicates().next() {
            return Err(SelectError::invalid_value(
                "selection",
                "one selector per dimension",
                format!("'{dup}' selected twice"),
            ));
        }

        let mut indices: Vec<Option<Index>> = vec![None; dataset.dimord().len()];
        let mut time = None;
        for (dim, selector) in &self.selectors {
            if dim == TIME_DIM {
                let reference = TimeSelector::for_trial(dataset, trials[0], self.exact_match)?;
                time = Some(reference.resolve(selector)?);
                continue;
            }
            let axis = dataset.dim_index(dim)?;
            if dataset.sample_column() == Some(axis) {
                return Err(SelectError::invalid_value(
                    dim.as_str(),
                    "a selectable dimension",
                    "the sample column of discrete data",
                ));
            }
            let resolver = SelectorResolver::for_dataset(dataset, dim, self.exact_match)?;
            indices[axis] = Some(resolver.resolve(selector)?);
        }

        let selection = Selection {
            kind: dataset.kind(),
            indices,
            time,
            trials,
            deepcopy: self.deepcopy,
        };
        debug!("Resolved selection: {selection:?}");
        Ok(selection)
    }
}

/// A fully resolved selection
///
/// Indices are stored per axis in `dimord` order; `None` keeps the whole
/// axis. The time axis of continuous data (and the sample column of discrete
/// data) is never indexed directly: the `time` slice applies to every
/// selected trial instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    kind: DataKind,
    indices: Vec<Option<Index>>,
    time: Option<Slice>,
    trials: Vec<usize>,
    deepcopy: bool,
}

impl Selection {
    #[must_use]
    pub const fn kind(&self) -> DataKind {
        self.kind
    }

    #[must_use]
    pub fn indices(&self) -> &[Option<Index>] {
        &self.indices
    }

    /// Index along `axis`, `None` if the whole axis is kept
    #[must_use]
    pub fn index(&self, axis: usize) -> Option<&Index> {
        self.indices.get(axis).and_then(Option::as_ref)
    }

    /// Slice of trial-relative samples kept in every trial
    #[must_use]
    pub const fn time(&self) -> Option<&Slice> {
        self.time.as_ref()
    }

    #[must_use]
    pub fn trials(&self) -> &[usize] {
        &self.trials
    }

    #[must_use]
    pub const fn deepcopy(&self) -> bool {
        self.deepcopy
    }

    /// Whether a view cannot express this selection
    ///
    /// True for discrete data, for any explicit index list, and for a
    /// stepped time slice.
    #[must_use]
    pub fn requires_copy(&self) -> bool {
        self.kind == DataKind::Discrete
            || self.indices.iter().flatten().any(|index| !index.is_slice())
            || self.time.is_some_and(|t| t.step != 1)
    }
}
