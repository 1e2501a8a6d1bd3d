//! Raw binary recordings: a small fixed header followed by a row-major array.
//!
//! ## Header layout (little-endian)
//!
//! | field     | type  | meaning                                     |
//! |-----------|-------|---------------------------------------------|
//! | `version` | `u8`  | header version                              |
//! | `length`  | `u16` | header length, i.e. byte offset of the data |
//! | `dtype`   | `u8`  | element type code, see [`DType::from_code`] |
//! | `N`, `M`  | `u64` | `.lfp`/`.mua`: `N` first, all others: `M`   |
//! | `tSample` | `u64` | sampling interval in nanoseconds            |
//!
//! The array has shape `(M, N)`: samples by channels for field potentials,
//! events by columns for spike tables.

use crate::dataset::{Coordinates, DataHandle, Dataset, SAMPLE_DIM, TIME_DIM};
use crate::disk::DiskArray;
use crate::dtype::{DType, Element, to_le_bytes};
use crate::error::{DataError, Result};
use crate::trialdef::TrialDefinition;
use crate::virtual_array::VirtualArray;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use itertools::Itertools;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use tracing::{debug, info};

/// Size of the fixed header fields
pub const HEADER_SIZE: u16 = 28;

/// File families, named after their extension
#[derive(Display, EnumString, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum EsiFamily {
    Lfp,
    Mua,
    Evt,
    Dpd,
    Apd,
    Eye,
    Pup,
    Spk,
}

impl EsiFamily {
    /// Family of a file, from its extension
    /// # Errors
    /// Will return `Err` if the extension is missing or unknown
    pub fn of_path(path: &Path) -> Result<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Self::from_str(ext).map_err(|_| {
            DataError::invalid_value(
                path.display().to_string(),
                "one of .lfp, .mua, .evt, .dpd, .apd, .eye, .pup, .spk",
                format!(".{ext}"),
            )
        })
    }

    /// Continuous field-potential families, stored with `N` before `M`
    #[must_use]
    pub const fn is_analog(self) -> bool {
        matches!(self, Self::Lfp | Self::Mua)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EsiHeader {
    pub family: EsiFamily,
    pub version: u8,
    /// Byte offset of the first element
    pub length: u16,
    pub dtype: DType,
    /// Rows: samples or events
    pub m: u64,
    /// Columns: channels or event fields
    pub n: u64,
    /// Sampling interval in nanoseconds
    pub t_sample: u64,
}

impl EsiHeader {
    /// A version-1 header with the data directly after the fixed fields
    #[must_use]
    pub const fn new(family: EsiFamily, dtype: DType, shape: [u64; 2], t_sample: u64) -> Self {
        Self {
            family,
            version: 1,
            length: HEADER_SIZE,
            dtype,
            m: shape[0],
            n: shape[1],
            t_sample,
        }
    }

    /// Reads the header of `path`
    /// # Errors
    /// Will return `Err` if the extension is unknown, the file cannot be read
    /// or the dtype code is invalid
    pub fn read(path: &Path) -> Result<Self> {
        let family = EsiFamily::of_path(path)?;
        let mut reader = BufReader::new(File::open(path)?);
        let version = reader.read_u8()?;
        let length = reader.read_u16::<LittleEndian>()?;
        let dtype = DType::from_code(reader.read_u8()?)?;
        let first = reader.read_u64::<LittleEndian>()?;
        let second = reader.read_u64::<LittleEndian>()?;
        let (m, n) = if family.is_analog() {
            (second, first)
        } else {
            (first, second)
        };
        let t_sample = reader.read_u64::<LittleEndian>()?;
        if t_sample == 0 {
            return Err(DataError::invalid_value(
                format!("tSample of {}", path.display()),
                "positive sampling interval",
                "0",
            ));
        }
        Ok(Self {
            family,
            version,
            length,
            dtype,
            m,
            n,
            t_sample,
        })
    }

    /// Writes the header, padded with zeros up to `length`
    /// # Errors
    /// Will return `Err` if writing fails or `length` is shorter than the fixed fields
    pub fn write_to(&self, writer: &mut impl Write) -> Result<()> {
        if self.length < HEADER_SIZE {
            return Err(DataError::invalid_value(
                "header length",
                format!("at least {HEADER_SIZE} bytes"),
                self.length.to_string(),
            ));
        }
        let (first, second) = if self.family.is_analog() {
            (self.n, self.m)
        } else {
            (self.m, self.n)
        };
        writer.write_u8(self.version)?;
        writer.write_u16::<LittleEndian>(self.length)?;
        writer.write_u8(self.dtype.code())?;
        writer.write_u64::<LittleEndian>(first)?;
        writer.write_u64::<LittleEndian>(second)?;
        writer.write_u64::<LittleEndian>(self.t_sample)?;
        writer.write_all(&vec![0; usize::from(self.length - HEADER_SIZE)])?;
        Ok(())
    }

    /// Writes a complete file: this header followed by `values`
    /// # Errors
    /// Will return `Err` if `values` does not match the header or writing fails
    pub fn write_file<T: Element>(&self, path: &Path, values: &[T]) -> Result<()> {
        if T::DTYPE != self.dtype || values.len() as u64 != self.m * self.n {
            return Err(DataError::shape_mismatch(format!(
                "{} {} values for a {} header of shape ({}, {})",
                values.len(),
                T::DTYPE,
                self.dtype,
                self.m,
                self.n
            )));
        }
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.write_all(&to_le_bytes(values))?;
        writer.flush()?;
        Ok(())
    }

    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        vec![self.m as usize, self.n as usize]
    }

    /// Sampling rate in Hz
    #[must_use]
    pub fn samplerate(&self) -> f64 {
        1e9 / self.t_sample as f64
    }

    fn open(&self, path: &Path) -> Result<DiskArray> {
        DiskArray::open(path, usize::from(self.length), self.shape(), self.dtype)
    }
}

/// Loads raw binary recordings as a dataset
///
/// `.lfp` and `.mua` files (any mix) become one continuous dataset with
/// dimord `[time, channel]`, channels concatenated across files. A single
/// `.spk` file becomes a discrete dataset with dimord `[sample, channel, unit]`.
/// # Errors
/// Will return `Err` if:
/// - no files are given, families are mixed, or several `.spk` files are given
/// - the files do not share one sampling interval
/// - the family cannot be loaded
/// - a header or array is malformed, or the trial definition does not fit
pub fn load_binary_esi<P: AsRef<Path>>(
    paths: &[P],
    trialdefinition: Option<TrialDefinition>,
) -> Result<Dataset> {
    if paths.is_empty() {
        return Err(DataError::invalid_value("filename", "at least one file", "none"));
    }
    let headers = paths
        .iter()
        .map(|p| EsiHeader::read(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let first = headers[0];

    let analog = headers.iter().all(|h| h.family.is_analog());
    if !analog && !headers.iter().map(|h| h.family).all_equal() {
        return Err(DataError::invalid_value(
            "filename",
            "files of identical type",
            headers.iter().map(|h| format!(".{}", h.family)).join(", "),
        ));
    }
    if !headers.iter().map(|h| h.t_sample).all_equal() {
        return Err(DataError::invalid_value(
            "filename",
            "identical sampling interval per file",
            headers.iter().map(|h| h.t_sample.to_string()).join(", "),
        ));
    }
    let samplerate = Some(first.samplerate());

    let mut dataset = if analog {
        let segments = paths
            .iter()
            .zip(&headers)
            .map(|(p, h)| h.open(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let array = VirtualArray::new(segments, 1)?;
        let data = DataHandle::new(Arc::new(array));
        let nchan = data.shape()[1];
        Dataset::continuous(data, vec![TIME_DIM.into(), "channel".into()], samplerate)?
            .with_coords("channel", Coordinates::numbered("channel", nchan))?
    } else if first.family == EsiFamily::Spk {
        if paths.len() > 1 {
            return Err(DataError::invalid_value(
                "filename",
                "single .spk file",
                format!("{} .spk files", paths.len()),
            ));
        }
        let array = first.open(paths[0].as_ref())?;
        let data = DataHandle::new(Arc::new(array));
        let dataset = Dataset::discrete(
            data,
            vec![SAMPLE_DIM.into(), "channel".into(), "unit".into()],
            samplerate,
        )?;
        let nchan = dataset.dim_len("channel")?;
        let nunit = dataset.dim_len("unit")?;
        dataset
            .with_coords("channel", Coordinates::numbered("channel", nchan))?
            .with_coords("unit", Coordinates::numbered("unit", nunit))?
    } else {
        return Err(DataError::invalid_value(
            "filename",
            "loadable .lfp, .mua or .spk files",
            format!(".{} files", first.family),
        ));
    };

    if let Some(def) = trialdefinition {
        dataset.redefine_trials(def)?;
    }
    for (path, header) in paths.iter().zip(&headers) {
        debug!("Loaded {} ({header:?})", path.as_ref().display());
    }
    info!(
        "Loaded {} {} file(s) at {:.1} Hz",
        paths.len(),
        first.family,
        first.samplerate()
    );
    Ok(dataset)
}
