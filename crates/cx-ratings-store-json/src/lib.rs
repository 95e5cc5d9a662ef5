//! JSON document store for the ratings dataset.
//!
//! Saves go through a temporary file in the target directory that is renamed
//! over the dataset, so readers only ever see the previous or the new
//! document.

use std::io::Write;
use std::path::{Path, PathBuf};

use cx_ratings_core::{today_utc, Dataset, DatasetDocument, RatingError};
use tempfile::NamedTempFile;
use time::Date;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to read dataset {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode dataset {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },
    #[error("invalid dataset {}: {source}", .path.display())]
    Schema { path: PathBuf, source: RatingError },
    #[error("failed to encode dataset: {0}")]
    Encode(String),
    #[error("failed to write dataset {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl PersistenceError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

#[derive(Debug, Clone)]
pub struct JsonDatasetStore {
    path: PathBuf,
}

impl JsonDatasetStore {
    #[must_use]
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates the full document.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] when the file cannot be read, is not a
    /// dataset document, or holds invalid or duplicate records.
    pub fn load_document(&self) -> Result<DatasetDocument, PersistenceError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| PersistenceError::Read {
            path: self.path.clone(),
            source,
        })?;

        let document: DatasetDocument =
            serde_json::from_str(&raw).map_err(|err| PersistenceError::Decode {
                path: self.path.clone(),
                message: err.to_string(),
            })?;

        // Validate eagerly so a bad record never reaches a merge.
        document
            .clone()
            .into_dataset()
            .map_err(|source| PersistenceError::Schema {
                path: self.path.clone(),
                source,
            })?;

        Ok(document)
    }

    /// # Errors
    /// Returns [`PersistenceError`] when the store is unreadable or corrupt.
    pub fn load(&self) -> Result<Dataset, PersistenceError> {
        let dataset = self
            .load_document()?
            .into_dataset()
            .map_err(|source| PersistenceError::Schema {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!(path = %self.path.display(), entries = dataset.len(), "loaded dataset");
        Ok(dataset)
    }

    /// Like [`Self::load`], but a missing file yields an empty dataset.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] when the file exists but is unreadable
    /// or corrupt.
    pub fn load_or_empty(&self) -> Result<Dataset, PersistenceError> {
        match self.load() {
            Err(err) if err.is_not_found() => {
                tracing::info!(path = %self.path.display(), "no dataset yet; starting empty");
                Ok(Dataset::new())
            }
            other => other,
        }
    }

    /// Saves the dataset stamped with today's UTC date.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] when encoding or the atomic write fails.
    pub fn save(&self, dataset: &Dataset) -> Result<(), PersistenceError> {
        self.save_as_of(dataset, today_utc())
    }

    /// Atomically replaces the stored document.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] when encoding or the atomic write fails.
    /// The previous document is left intact on failure.
    pub fn save_as_of(&self, dataset: &Dataset, last_updated: Date) -> Result<(), PersistenceError> {
        let document = DatasetDocument::from_dataset(dataset, last_updated);
        let mut body = serde_json::to_vec_pretty(&document)
            .map_err(|err| PersistenceError::Encode(err.to_string()))?;
        body.push(b'\n');

        let write_error = |source: std::io::Error| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir).map_err(write_error)?;
        temp.write_all(&body).map_err(write_error)?;
        temp.as_file().sync_all().map_err(write_error)?;
        temp.persist(&self.path)
            .map_err(|err| write_error(err.error))?;

        tracing::info!(
            path = %self.path.display(),
            entries = dataset.len(),
            "saved dataset"
        );
        Ok(())
    }
}
