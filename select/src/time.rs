//! Time selection on trial-relative time axes.
//!
//! Each trial carries its own time axis, offset by its `t0`, so a time
//! selection is resolved once against the axis of the first selected trial
//! and the resulting slice is applied to every selected trial alike.

use crate::error::{Result, SelectError};
use crate::resolve::SelectorResolver;
use crate::selector::{Selector, Value};
use ephys_data::{Coordinates, Dataset, Index, Slice, TIME_DIM};

/// Resolves time selectors into one slice of trial-relative samples
#[derive(Debug, Clone)]
pub struct TimeSelector {
    time: Coordinates,
    exact_match: bool,
}

impl TimeSelector {
    /// A selector over a reference time axis in seconds
    #[must_use]
    pub fn new(time: Vec<f64>, exact_match: bool) -> Self {
        Self {
            time: Coordinates::Values(time),
            exact_match,
        }
    }

    /// A selector over the time axis of trial `k`
    /// # Errors
    /// Will return `Err` if the trial does not exist or the sampling rate is unknown
    pub fn for_trial(dataset: &Dataset, k: usize, exact_match: bool) -> Result<Self> {
        Ok(Self::new(dataset.time(k)?, exact_match))
    }

    /// Number of samples on the reference axis
    #[must_use]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Resolves a time selector
    ///
    /// Value ranges are in seconds and include their upper bound. Index lists
    /// must be equidistant once sorted.
    /// # Errors
    /// Will return `Err` if:
    /// - the selector is a single value or single index, or a range bound is
    ///   not a number (`TypeMismatch`)
    /// - the list is not equidistant or the range is empty (`InvalidValue`)
    pub fn resolve(&self, selector: &Selector) -> Result<Slice> {
        let resolver =
            SelectorResolver::new(TIME_DIM, self.len(), Some(&self.time), self.exact_match);
        match selector {
            Selector::ValueRange(lo, hi) => {
                if let Some(bound) = [lo, hi]
                    .into_iter()
                    .flatten()
                    .find(|v| !matches!(v, Value::Number(_)))
                {
                    return Err(SelectError::type_mismatch(
                        TIME_DIM,
                        "time range bounds in seconds",
                        bound.kind(),
                    ));
                }
                as_slice(resolver.resolve(selector)?)
            }
            Selector::IndexRange { .. } | Selector::IndexList(_) => {
                as_slice(resolver.resolve(selector)?)
            }
            Selector::SingleValue(_) | Selector::SingleIndex(_) => Err(SelectError::type_mismatch(
                TIME_DIM,
                "value range, index range or equidistant index list",
                selector.kind(),
            )),
        }
    }
}

fn as_slice(index: Index) -> Result<Slice> {
    match index {
        Index::Slice(slice) => Ok(slice),
        Index::List(list) => Err(SelectError::invalid_value(
            TIME_DIM,
            "equidistant time selection or slice",
            format!("{list:?}"),
        )),
    }
}
