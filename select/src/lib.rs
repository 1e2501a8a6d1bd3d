//! # ephys-select
//!
//! Selection and trial definition on top of [`ephys_data`].
//!
//! A selection runs in two phases:
//!
//! 1. **Resolve**: a [`SelectionRequest`] is checked against a dataset and
//!    turned into a [`Selection`] of per-axis indices, a trial-relative time
//!    slice and a list of trials. Nothing is read except coordinates.
//! 2. **Materialize**: the [`TrialMaterializer`] returns a view sharing the
//!    source storage when slices suffice, and otherwise copies the selected
//!    trials into a new file one trial at a time.
//!
//! Trials themselves are cut from event data by the [`TrialBoundaryDeriver`]
//! (see [`define_trials`] and [`define_trials_from`]).
//!
//! ```rust,no_run
//! use ephys_data::{StorageConfig, load_container};
//! use ephys_select::{SelectionRequest, Selector, select};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dataset = load_container("/data/session1.dat.info")?;
//! let request = SelectionRequest::builder()
//!     .select("channel", Selector::IndexList(vec![3, 0, 7]))
//!     .select("time", Selector::between(0.0, 0.5))
//!     .build()?;
//! let subset = select(&dataset, &request, &StorageConfig::from_env())?;
//! println!("{} trials", subset.ntrials());
//! # Ok(())
//! # }
//! ```

pub mod boundary;
pub mod error;
pub mod materialize;
pub mod request;
pub mod resolve;
pub mod selector;
pub mod time;

pub use boundary::{
    DerivedTrials, EVENT_ID_DIM, EventCodes, TrialBoundaryDeriver, TrialBounds, TrialSpec,
    define_trials, define_trials_from, event_dimord,
};
pub use error::{Result, SelectError};
pub use materialize::{Placement, TrialMaterializer, renumber_trials};
pub use request::{Selection, SelectionRequest, SelectionRequestBuilder, TrialFilter};
pub use resolve::{SelectorResolver, normalize_list};
pub use selector::{Selector, Value};
pub use time::TimeSelector;

use ephys_data::{Dataset, StorageConfig};

/// Resolves `request` against `dataset` and materializes the result
/// # Errors
/// Will return `Err` if the request does not resolve or the copy fails
pub fn select(
    dataset: &Dataset,
    request: &SelectionRequest,
    config: &StorageConfig,
) -> Result<Dataset> {
    let selection = request.resolve(dataset)?;
    TrialMaterializer::new(config.clone()).materialize(dataset, &selection)
}
