use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading the source file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be opened or read at all.
    #[error("Data unavailable at {path}: {source}")]
    DataUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row failed strict parsing. Only seen inside the loader, which
    /// retries in tolerant mode.
    #[error("Malformed row at line {line}: {message}")]
    MalformedRow { line: u64, message: String },
}

/// Top-level failures of a report run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Write error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON write error: {0}")]
    Json(#[from] serde_json::Error),
}
