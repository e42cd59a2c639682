//! Error taxonomy for the import pipeline.
//!
//! Only structural failures surface as [`ImportError`]. Unresolved headers,
//! short rows and per-row storage rejections are counted on the batch
//! outcome instead of being raised.

use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Unknown encoding '{label}'")]
    Encoding { label: String },

    #[error("Header spelling '{spelling}' is listed under both '{first}' and '{second}'")]
    AmbiguousSynonym {
        spelling: String,
        first: String,
        second: String,
    },

    #[error("Mapping profile '{id}' not found")]
    ProfileNotFound { id: String },

    #[error("Mapping profile '{id}': {message}")]
    Profile { id: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ImportError {
    /// Maps an `io::Error` raised while opening `path`, promoting `NotFound`
    /// to [`ImportError::FileNotFound`].
    pub fn from_open(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            ImportError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ImportError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn from_csv(path: &std::path::Path, source: csv::Error) -> Self {
        if let csv::ErrorKind::Io(io) = source.kind()
            && io.kind() == std::io::ErrorKind::NotFound
        {
            return ImportError::FileNotFound {
                path: path.to_path_buf(),
            };
        }
        ImportError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_file_not_found(&self) -> bool {
        matches!(self, ImportError::FileNotFound { .. })
    }
}
