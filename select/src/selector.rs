use serde::{Deserialize, Serialize};
use std::fmt;

/// A coordinate value: a number (frequency, time, ...) or a label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Label(String),
}

impl Value {
    /// Human-readable kind, used in error messages
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Label(_) => "label",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(x) => write!(f, "{x}"),
            Self::Label(label) => write!(f, "'{label}'"),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Number(x)
    }
}

impl From<&str> for Value {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl From<String> for Value {
    fn from(label: String) -> Self {
        Self::Label(label)
    }
}

/// Selection along one dimension
///
/// Value-based selectors match against the dimension's coordinates,
/// index-based selectors address positions directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selector {
    /// Inclusive `[lo, hi]` in coordinate values; `None` is open-ended
    ValueRange(Option<Value>, Option<Value>),
    /// Positions `start..stop` by `step`; `None` bounds cover the axis
    IndexRange {
        start: Option<usize>,
        stop: Option<usize>,
        step: usize,
    },
    /// Explicit positions
    IndexList(Vec<usize>),
    /// The position of one coordinate value
    SingleValue(Value),
    /// One position
    SingleIndex(usize),
}

impl Selector {
    /// Values between `lo` and `hi`, both inclusive
    pub fn between(lo: impl Into<Value>, hi: impl Into<Value>) -> Self {
        Self::ValueRange(Some(lo.into()), Some(hi.into()))
    }

    /// Contiguous positions `start..stop`
    #[must_use]
    pub const fn range(start: usize, stop: usize) -> Self {
        Self::IndexRange {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    /// Every position of the axis
    #[must_use]
    pub const fn all() -> Self {
        Self::IndexRange {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// Human-readable kind, used in error messages
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ValueRange(..) => "value range",
            Self::IndexRange { .. } => "index range",
            Self::IndexList(_) => "index list",
            Self::SingleValue(_) => "single value",
            Self::SingleIndex(_) => "single index",
        }
    }
}
