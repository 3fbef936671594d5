//! Error types for the storage module.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while allocating a bucket directory.
#[derive(Debug, Error)]
pub enum AllocateError {
    /// The bucket directory could not be created.
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        /// Directory that failed to be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The existing directory could not be scanned for its size.
    #[error("cannot scan directory {path}: {source}")]
    Scan {
        /// Directory being scanned.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl AllocateError {
    /// Creates a directory creation error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Creates a directory scan error.
    pub fn scan(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Scan {
            path: path.into(),
            source,
        }
    }
}
