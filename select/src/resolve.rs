//! Resolution of selectors into concrete indices along one dimension.
//!
//! Every [`Selector`] resolves to an [`Index`]: a [`Slice`] wherever the
//! selection is an arithmetic progression, an ascending list otherwise.
//! Single values and single indices become length-1 slices so a selection
//! never drops a dimension.
//!
//! Value matching follows one rule everywhere: with `exact_match` a value
//! must equal a coordinate, otherwise it snaps to the coordinate at minimum
//! absolute distance (the first one on ties). Labels always match exactly.

use crate::error::{Result, SelectError};
use crate::selector::{Selector, Value};
use ephys_data::{Coordinates, Dataset, Index, Slice};
use itertools::Itertools;
use tracing::{debug, warn};

/// Resolves selectors against one dimension
#[derive(Debug, Clone, Copy)]
pub struct SelectorResolver<'a> {
    dim: &'a str,
    len: usize,
    coords: Option<&'a Coordinates>,
    exact_match: bool,
}

impl<'a> SelectorResolver<'a> {
    /// A resolver for a dimension of `len` positions with optional coordinates
    #[must_use]
    pub const fn new(
        dim: &'a str,
        len: usize,
        coords: Option<&'a Coordinates>,
        exact_match: bool,
    ) -> Self {
        Self {
            dim,
            len,
            coords,
            exact_match,
        }
    }

    /// A resolver for dimension `dim` of `dataset`
    /// # Errors
    /// Will return `Err` if the dataset has no such dimension
    pub fn for_dataset(dataset: &'a Dataset, dim: &'a str, exact_match: bool) -> Result<Self> {
        Ok(Self::new(
            dim,
            dataset.dim_len(dim)?,
            dataset.coords(dim),
            exact_match,
        ))
    }

    /// Resolves `selector` into an index along the dimension
    /// # Errors
    /// Will return `Err` if:
    /// - a value selector is used without matching coordinates (`TypeMismatch`)
    /// - a position is out of range, a value is unmatched, or the result is empty (`InvalidValue`)
    pub fn resolve(&self, selector: &Selector) -> Result<Index> {
        let index = match selector {
            Selector::ValueRange(lo, hi) => self.value_range(lo.as_ref(), hi.as_ref())?,
            Selector::IndexRange { start, stop, step } => self.index_range(*start, *stop, *step)?,
            Selector::IndexList(list) => {
                if list.is_empty() {
                    return Err(self.invalid("non-empty index list", "[]"));
                }
                if let Some(&bad) = list.iter().find(|&&i| i >= self.len) {
                    return Err(self.invalid(
                        format!("indices below {}", self.len),
                        bad.to_string(),
                    ));
                }
                normalize_list(self.dim, list.clone())
            }
            Selector::SingleValue(value) => {
                let i = self.match_value(value)?;
                Index::Slice(Slice::range(i, i + 1))
            }
            Selector::SingleIndex(i) => {
                if *i >= self.len {
                    return Err(self.invalid(format!("index below {}", self.len), i.to_string()));
                }
                Index::Slice(Slice::range(*i, i + 1))
            }
        };
        debug!("Resolved {} on '{}' to {index:?}", selector.kind(), self.dim);
        Ok(index)
    }

    /// Position of `value` among the coordinates
    /// # Errors
    /// Will return `Err` if the value kind does not match the coordinates or
    /// the value is unmatched
    pub fn match_value(&self, value: &Value) -> Result<usize> {
        let Some(coords) = self.coords else {
            return Err(SelectError::type_mismatch(
                self.dim,
                "index selector for a dimension without coordinates",
                value.kind(),
            ));
        };
        match (value, coords) {
            (Value::Number(x), Coordinates::Values(values)) => {
                if x.is_nan() {
                    return Err(self.invalid("a number", "NaN"));
                }
                if self.exact_match {
                    values
                        .iter()
                        .position(|v| v == x)
                        .ok_or_else(|| {
                            self.invalid("a value present in the coordinates", x.to_string())
                        })
                } else {
                    values
                        .iter()
                        .position_min_by(|a, b| (*a - x).abs().total_cmp(&(*b - x).abs()))
                        .ok_or_else(|| self.invalid("non-empty coordinates", "none"))
                }
            }
            (Value::Label(label), Coordinates::Labels(labels)) => labels
                .iter()
                .position(|l| l == label)
                .ok_or_else(|| self.invalid("an existing label", format!("'{label}'"))),
            (value, Coordinates::Values(_)) => Err(SelectError::type_mismatch(
                self.dim,
                "number",
                value.kind(),
            )),
            (value, Coordinates::Labels(_)) => Err(SelectError::type_mismatch(
                self.dim,
                "label",
                value.kind(),
            )),
        }
    }

    fn value_range(&self, lo: Option<&Value>, hi: Option<&Value>) -> Result<Index> {
        if self.coords.is_none() {
            return Err(SelectError::type_mismatch(
                self.dim,
                "index selector for a dimension without coordinates",
                "value range",
            ));
        }
        if self.len == 0 {
            return Err(self.invalid("non-empty coordinates", "none"));
        }
        if let (Some(Value::Number(a)), Some(Value::Number(b))) = (lo, hi) {
            if a > b {
                return Err(self.invalid("lower bound <= upper bound", format!("[{a}, {b}]")));
            }
        }
        let start = lo.map(|v| self.match_value(v)).transpose()?.unwrap_or(0);
        let last = hi
            .map(|v| self.match_value(v))
            .transpose()?
            .unwrap_or(self.len - 1);
        if start > last {
            return Err(self.invalid(
                "range of ascending coordinates",
                format!("positions {start} to {last}"),
            ));
        }
        Ok(Index::Slice(Slice::range(start, last + 1)))
    }

    fn index_range(&self, start: Option<usize>, stop: Option<usize>, step: usize) -> Result<Index> {
        let slice = Slice::new(start.unwrap_or(0), stop.unwrap_or(self.len), step)
            .map_err(|_| self.invalid("positive step", "0"))?
            .clamp(self.len);
        if slice.is_empty() {
            return Err(self.invalid(
                format!("non-empty range within {} positions", self.len),
                format!(
                    "{}..{}",
                    start.map_or(String::new(), |s| s.to_string()),
                    stop.map_or(String::new(), |s| s.to_string())
                ),
            ));
        }
        Ok(Index::Slice(slice))
    }

    fn invalid(&self, legal: impl Into<String>, actual: impl Into<String>) -> SelectError {
        SelectError::invalid_value(self.dim, legal, actual)
    }
}

/// Sorts and de-duplicates an index list, then downgrades arithmetic
/// progressions (including single positions) to a slice
///
/// Lists that had to be reordered are reported with a warning.
#[must_use]
pub fn normalize_list(dim: &str, mut list: Vec<usize>) -> Index {
    if !list.iter().tuple_windows().all(|(a, b)| a < b) {
        warn!("Index list for '{dim}' is not strictly ascending; sorting and removing duplicates");
        list.sort_unstable();
        list.dedup();
    }
    match list.as_slice() {
        [] => Index::List(list),
        [only] => Index::Slice(Slice::range(*only, only + 1)),
        [first, .., last] => {
            let steps: Vec<usize> = list.iter().tuple_windows().map(|(a, b)| b - a).collect();
            if steps.iter().all_equal() {
                Index::Slice(Slice {
                    start: *first,
                    stop: last + 1,
                    step: steps[0],
                })
            } else {
                Index::List(list)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freqs() -> Coordinates {
        Coordinates::Values(vec![1.0, 2.0, 4.0, 8.0, 16.0])
    }

    #[test]
    fn value_range_snaps_to_nearest() {
        let coords = freqs();
        let resolver = SelectorResolver::new("freq", 5, Some(&coords), false);
        let index = resolver.resolve(&Selector::between(1.8, 9.0)).unwrap();
        assert_eq!(index, Index::Slice(Slice::range(1, 4)));
    }

    #[test]
    fn value_range_open_ends() {
        let coords = freqs();
        let resolver = SelectorResolver::new("freq", 5, Some(&coords), false);
        let upper = resolver
            .resolve(&Selector::ValueRange(Some(Value::Number(5.0)), None))
            .unwrap();
        assert_eq!(upper, Index::Slice(Slice::range(2, 5)));
        let lower = resolver
            .resolve(&Selector::ValueRange(None, Some(Value::Number(2.0))))
            .unwrap();
        assert_eq!(lower, Index::Slice(Slice::range(0, 2)));
    }

    #[test]
    fn ties_pick_the_first_minimum() {
        let coords = freqs();
        let resolver = SelectorResolver::new("freq", 5, Some(&coords), false);
        assert_eq!(resolver.match_value(&Value::Number(3.0)).unwrap(), 1);
    }

    #[test]
    fn exact_match_rejects_unmatched_values() {
        let coords = freqs();
        let resolver = SelectorResolver::new("freq", 5, Some(&coords), true);
        assert!(resolver.resolve(&Selector::SingleValue(Value::Number(4.0))).is_ok());
        let err = resolver.resolve(&Selector::SingleValue(Value::Number(5.0))).unwrap_err();
        assert!(matches!(err, SelectError::InvalidValue { .. }));
    }

    #[test]
    fn reversed_value_range_is_invalid() {
        let coords = freqs();
        let resolver = SelectorResolver::new("freq", 5, Some(&coords), false);
        let err = resolver.resolve(&Selector::between(8.0, 2.0)).unwrap_err();
        assert!(matches!(err, SelectError::InvalidValue { .. }));
    }

    #[test]
    fn labels_match_exactly() {
        let coords = Coordinates::numbered("channel", 4);
        let resolver = SelectorResolver::new("channel", 4, Some(&coords), false);
        let index = resolver
            .resolve(&Selector::between("channel2", "channel3"))
            .unwrap();
        assert_eq!(index, Index::Slice(Slice::range(1, 3)));
        assert!(resolver.resolve(&Selector::SingleValue("channel9".into())).is_err());
    }

    #[test]
    fn value_kind_must_match_coordinates() {
        let coords = Coordinates::numbered("channel", 4);
        let resolver = SelectorResolver::new("channel", 4, Some(&coords), false);
        let err = resolver.resolve(&Selector::SingleValue(Value::Number(1.0))).unwrap_err();
        assert!(matches!(err, SelectError::TypeMismatch { .. }));

        let bare = SelectorResolver::new("unit", 4, None, false);
        let err = bare.resolve(&Selector::between(0.0, 1.0)).unwrap_err();
        assert!(matches!(err, SelectError::TypeMismatch { .. }));
    }

    #[test]
    fn index_range_is_clamped_and_must_not_be_empty() {
        let resolver = SelectorResolver::new("channel", 4, None, false);
        let index = resolver.resolve(&Selector::range(2, 10)).unwrap();
        assert_eq!(index, Index::Slice(Slice::range(2, 4)));
        assert!(resolver.resolve(&Selector::range(4, 10)).is_err());
        let zero_step = Selector::IndexRange {
            start: None,
            stop: None,
            step: 0,
        };
        assert!(resolver.resolve(&zero_step).is_err());
    }

    #[test]
    fn lists_downgrade_to_slices() {
        assert_eq!(normalize_list("x", vec![2, 3, 4]), Index::Slice(Slice::range(2, 5)));
        assert_eq!(
            normalize_list("x", vec![1, 3, 5]),
            Index::Slice(Slice { start: 1, stop: 6, step: 2 })
        );
        assert_eq!(normalize_list("x", vec![7]), Index::Slice(Slice::range(7, 8)));
        assert_eq!(normalize_list("x", vec![0, 1, 3]), Index::List(vec![0, 1, 3]));
    }

    #[test]
    fn unsorted_lists_are_sorted_and_deduplicated() {
        assert_eq!(normalize_list("x", vec![3, 1, 1, 0]), Index::List(vec![0, 1, 3]));
        assert_eq!(normalize_list("x", vec![2, 1, 2]), Index::Slice(Slice::range(1, 3)));
    }

    #[test]
    fn list_bounds_are_checked() {
        let resolver = SelectorResolver::new("channel", 4, None, false);
        assert!(resolver.resolve(&Selector::IndexList(vec![0, 4])).is_err());
        assert!(resolver.resolve(&Selector::IndexList(vec![])).is_err());
        assert!(resolver.resolve(&Selector::SingleIndex(4)).is_err());
        assert_eq!(
            resolver.resolve(&Selector::SingleIndex(3)).unwrap(),
            Index::Slice(Slice::range(3, 4))
        );
    }
}
