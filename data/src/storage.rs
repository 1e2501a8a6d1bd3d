//! Where newly allocated arrays live.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Environment variable overriding the storage directory
pub const STORAGE_ENV: &str = "EPHYS_TMPDIR";

/// Copies larger than this are reported with a warning (100 MB)
pub const COPY_WARNING_BYTES: usize = 100 * 1024 * 1024;

/// Extension of array files written to storage
pub const DATA_EXTENSION: &str = "dat";

/// Configuration of the on-disk storage for materialized selections
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Directory receiving new array files
    pub dir: PathBuf,

    /// Size of `dir` above which `setup` warns, in GB
    pub limit_gb: f64,

    /// Copies whose footprint exceeds this many bytes are reported
    pub copy_warning_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("ephys").join("tmp_storage"),
            limit_gb: 10.0,
            copy_warning_bytes: COPY_WARNING_BYTES,
        }
    }
}

impl StorageConfig {
    /// Default configuration, with `dir` taken from `EPHYS_TMPDIR` if set
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var_os(STORAGE_ENV) {
            Some(dir) if !dir.is_empty() => Self {
                dir: PathBuf::from(dir),
                ..Default::default()
            },
            _ => Self::default(),
        }
    }

    /// Configuration storing into `dir`
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Creates the storage directory and reports its size in GB and file count
    /// # Errors
    /// Will return `Err` if the directory cannot be created or listed
    pub fn setup(&self) -> Result<(f64, usize)> {
        std::fs::create_dir_all(&self.dir)?;
        let mut bytes = 0_u64;
        let mut files = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let metadata = entry?.metadata()?;
            if metadata.is_file() {
                bytes += metadata.len();
                files += 1;
            }
        }
        let size_gb = bytes as f64 / 1024_f64.powi(3);
        if size_gb > self.limit_gb {
            warn!(
                "Storage directory {} holds {size_gb:.2} GB in {files} files, above {} GB",
                self.dir.display(),
                self.limit_gb
            );
        } else {
            info!(
                "Storage directory {} holds {size_gb:.2} GB in {files} files",
                self.dir.display()
            );
        }
        Ok((size_gb, files))
    }

    /// Whether a copy of `nbytes` is large enough to be reported
    #[must_use]
    pub fn exceeds_copy_threshold(&self, nbytes: usize) -> bool {
        nbytes > self.copy_warning_bytes
    }

    /// A fresh, uniquely named file path inside the storage directory
    #[must_use]
    pub fn new_data_path(&self) -> PathBuf {
        self.dir
            .join(format!("ephys_{}", Uuid::new_v4().simple()))
            .with_extension(DATA_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let config = StorageConfig::default();
        assert_eq!(config.limit_gb, 10.0);
        assert_eq!(config.copy_warning_bytes, 100 * 1024 * 1024);
        assert!(config.dir.ends_with("ephys/tmp_storage"));
    }

    #[test]
    fn copy_threshold_is_exclusive() {
        let config = StorageConfig {
            copy_warning_bytes: 64,
            ..StorageConfig::in_dir("/tmp/storage")
        };
        assert!(!config.exceeds_copy_threshold(0));
        assert!(!config.exceeds_copy_threshold(64));
        assert!(config.exceeds_copy_threshold(65));
        assert!(!StorageConfig::default().exceeds_copy_threshold(COPY_WARNING_BYTES));
    }

    #[test]
    fn data_paths_are_unique() {
        let config = StorageConfig::in_dir("/tmp/storage");
        let a = config.new_data_path();
        let b = config.new_data_path();
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/tmp/storage")));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("dat"));
    }

    #[test]
    fn setup_counts_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = StorageConfig::in_dir(dir.path().join("store"));
        assert_eq!(config.setup()?.1, 0);
        std::fs::write(config.new_data_path(), [0_u8; 16])?;
        let (size, files) = config.setup()?;
        assert_eq!(files, 1);
        assert!(size > 0.0);
        Ok(())
    }
}
