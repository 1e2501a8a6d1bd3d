//! # ephys-data
//!
//! Disk-backed, trial-structured electrophysiology data.
//!
//! Recordings are too large to load at once and are often split across
//! several files, so everything here reads straight from memory-mapped
//! arrays:
//!
//! - [`DiskArray`]: one memory-mapped file, optionally behind a header
//! - [`VirtualArray`]: several same-dtype 2-D files concatenated along an axis
//! - [`DiskArrayBuilder`]: allocates a new array file and fills it trial by trial
//! - [`Dataset`]: a continuous or discrete dataset with a `dimord`,
//!   coordinates, a sampling rate and a [`TrialDefinition`]
//!
//! Raw binary recordings are loaded with [`load_binary_esi`]; datasets
//! backed by a single file can be described by a JSON sidecar with
//! [`save_info`] and reopened with [`load_container`].

pub mod container;
pub mod dataset;
pub mod disk;
pub mod dtype;
pub mod error;
pub mod esi;
pub mod index;
pub mod storage;
pub mod store;
pub mod trialdef;
pub mod virtual_array;

pub use container::{ContainerInfo, load_container, save_info};
pub use dataset::{
    Coordinates, DataHandle, DataKind, Dataset, SAMPLE_DIM, TIME_DIM, TrialIndexer,
};
pub use disk::{DiskArray, DiskArrayBuilder};
pub use dtype::{DType, Element};
pub use error::{DataError, Result};
pub use esi::{EsiFamily, EsiHeader, load_binary_esi};
pub use index::{Index, Slice};
pub use storage::{COPY_WARNING_BYTES, StorageConfig};
pub use store::ArrayStore;
pub use trialdef::TrialDefinition;
pub use virtual_array::VirtualArray;
