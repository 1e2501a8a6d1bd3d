//! JSON sidecars describing datasets stored in a single array file.
//!
//! A container is an array file plus a `.info` file next to it holding
//! everything needed to reopen the dataset: kind, dimord, shape, dtype,
//! header offset, sampling rate, coordinates and trial definition.

use crate::dataset::{Coordinates, DataHandle, DataKind, Dataset};
use crate::disk::DiskArray;
use crate::dtype::DType;
use crate::error::{DataError, Result};
use crate::trialdef::TrialDefinition;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Extension of container sidecar files
pub const INFO_EXTENSION: &str = "info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub kind: DataKind,
    /// Name of the array file, relative to the sidecar's directory
    pub data_file: PathBuf,
    pub dimord: Vec<String>,
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub offset: usize,
    pub samplerate: Option<f64>,
    pub coords: FxHashMap<String, Coordinates>,
    pub trialdefinition: TrialDefinition,
}

impl ContainerInfo {
    /// Describes a dataset that covers the whole of a single array file
    /// # Errors
    /// Will return `Err` if the dataset is backed by several files or by a
    /// window into its file
    pub fn describe(dataset: &Dataset) -> Result<Self> {
        let store = dataset.data().store();
        let disk = store.as_disk_array().ok_or_else(|| {
            DataError::unsupported(format!(
                "container for data spread over {} files",
                store.paths().len()
            ))
        })?;
        if dataset.data().shape() != store.shape() {
            return Err(DataError::unsupported(
                "container for a view into a larger array",
            ));
        }
        let data_file = disk
            .path()
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| {
                DataError::invalid_value(
                    "data file",
                    "path to a file",
                    disk.path().display().to_string(),
                )
            })?;
        Ok(Self {
            kind: dataset.kind(),
            data_file,
            dimord: dataset.dimord().to_vec(),
            shape: store.shape().to_vec(),
            dtype: store.dtype(),
            offset: disk.offset(),
            samplerate: dataset.samplerate(),
            coords: dataset.all_coords().clone(),
            trialdefinition: dataset.trial_definition().clone(),
        })
    }
}

/// Sidecar path belonging to an array file
#[must_use]
pub fn info_path(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_owned();
    name.push(".");
    name.push(INFO_EXTENSION);
    PathBuf::from(name)
}

/// Writes the sidecar of a single-file dataset and returns its path
/// # Errors
/// Will return `Err` if the dataset cannot be described or the file cannot be written
pub fn save_info(dataset: &Dataset) -> Result<PathBuf> {
    let info = ContainerInfo::describe(dataset)?;
    let data_path = dataset
        .data()
        .store()
        .as_disk_array()
        .map(|disk| disk.path().to_path_buf())
        .unwrap_or_else(|| info.data_file.clone());
    let path = info_path(&data_path);
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, &info)?;
    writer.flush()?;
    debug!("Wrote container info {}", path.display());
    Ok(path)
}

/// Reopens a dataset from its sidecar
/// # Errors
/// Will return `Err` if the sidecar cannot be parsed or the array does not
/// match it
pub fn load_container(info: impl AsRef<Path>) -> Result<Dataset> {
    let info_file = info.as_ref();
    let reader = BufReader::new(File::open(info_file)?);
    let info: ContainerInfo = serde_json::from_reader(reader)?;
    let dir = info_file.parent().unwrap_or_else(|| Path::new("."));
    let array = DiskArray::open(dir.join(&info.data_file), info.offset, info.shape, info.dtype)?;
    Dataset::from_parts(
        info.kind,
        DataHandle::new(Arc::new(array)),
        info.dimord,
        info.coords,
        info.samplerate,
        Some(info.trialdefinition),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn sidecar_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let values: Vec<f64> = (0..12).map(f64::from).collect();
        let array = DiskArray::create_from(dir.path().join("x.dat"), vec![6, 2], &values)?;
        let mut dataset = Dataset::continuous(
            DataHandle::new(Arc::new(array)),
            vec!["time".into(), "channel".into()],
            Some(250.0),
        )?
        .with_coords("channel", Coordinates::Labels(vec!["a".into(), "b".into()]))?;
        dataset.redefine_trials(TrialDefinition::from_table(&array![
            [0.0, 3.0, -1.0, 4.0],
            [3.0, 6.0, 0.0, 5.0]
        ])?)?;

        let path = save_info(&dataset)?;
        assert!(path.to_string_lossy().ends_with("x.dat.info"));
        let back = load_container(&path)?;
        assert_eq!(back.trial_definition(), dataset.trial_definition());
        assert_eq!(back.coords("channel"), dataset.coords("channel"));
        assert_eq!(back.samplerate(), Some(250.0));
        assert_eq!(back.data().store().dtype(), DType::Float64);
        assert_eq!(back.trial(1)?, dataset.trial(1)?);
        Ok(())
    }

    #[test]
    fn views_cannot_be_described() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let array = DiskArray::create_from(dir.path().join("y.dat"), vec![4, 2], &[0_u8; 8])?;
        let handle = DataHandle::new(Arc::new(array)).view(&[
            crate::index::Slice::range(1, 3),
            crate::index::Slice::full(2),
        ])?;
        let dataset = Dataset::continuous(handle, vec!["time".into(), "channel".into()], None)?;
        assert!(matches!(
            ContainerInfo::describe(&dataset),
            Err(DataError::Unsupported { .. })
        ));
        Ok(())
    }
}
