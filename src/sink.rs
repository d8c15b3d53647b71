//! Raw file artifact writer.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write raw file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize raw file: {0}")]
    Csv(#[from] csv::Error),
}

/// Writes each run's rows to a timestamped CSV under a fixed directory.
#[derive(Debug, Clone)]
pub struct SinkWriter {
    output_dir: PathBuf,
}

impl SinkWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write `records` to `{base_name}_{YYYYmmdd_HHMMSS}.csv`.
    ///
    /// Returns `Ok(None)` without touching the filesystem when there is
    /// nothing to write.
    pub fn write<T: Serialize>(
        &self,
        records: &[T],
        base_name: &str,
    ) -> Result<Option<PathBuf>, SinkError> {
        if records.is_empty() {
            warn!("No records to write, skipping raw file");
            return Ok(None);
        }

        fs::create_dir_all(&self.output_dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let (path, file) = self.create_unique(base_name, &stamp)?;

        // Never leave a partial file behind.
        if let Err(e) = write_rows(file, records) {
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!("Could not remove partial raw file {}: {}", path.display(), remove_err);
            }
            return Err(e);
        }

        info!("Saved {} records to {}", records.len(), path.display());
        Ok(Some(path))
    }

    /// Two writes within the same second get a numeric suffix instead of
    /// overwriting each other.
    fn create_unique(&self, base_name: &str, stamp: &str) -> io::Result<(PathBuf, File)> {
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("{}_{}.csv", base_name, stamp)
            } else {
                format!("{}_{}_{}.csv", base_name, stamp, suffix)
            };
            let path = self.output_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

fn write_rows<T: Serialize>(file: File, records: &[T]) -> Result<(), SinkError> {
    let mut writer = csv::Writer::from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
