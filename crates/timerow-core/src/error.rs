use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classes reported back to whoever triggered a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No raw export was waiting in the intake location.
    NoInput,
    /// The raw export could not be parsed; the file is kept for resubmission.
    MalformedInput,
    /// Reading or writing the canonical dataset failed.
    PersistError,
    /// An external version-control call exited unsuccessfully.
    PublishError,
    /// Credentials or settings are missing or invalid.
    ConfigError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NoInput => "NoInput",
            ErrorKind::MalformedInput => "MalformedInput",
            ErrorKind::PersistError => "PersistError",
            ErrorKind::PublishError => "PublishError",
            ErrorKind::ConfigError => "ConfigError",
        };
        f.write_str(name)
    }
}

/// All errors produced by timerow.
#[derive(Error, Debug)]
pub enum TimerowError {
    /// The intake directory holds no raw export.
    #[error("No raw export found in {0}")]
    NoInput(PathBuf),

    /// A raw export could not be opened.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row of the raw export is unusable. `line` is 1-based.
    #[error("Malformed input at line {line}: {reason}")]
    MalformedInput { line: usize, reason: String },

    /// A measurement value is negative or not finite.
    #[error("Invalid reading value: {0}")]
    InvalidValue(f64),

    /// The persisted canonical dataset cannot be interpreted.
    #[error("Corrupted dataset {path} at line {line}: {reason}")]
    CorruptDataset {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The canonical dataset exists but could not be read.
    #[error("Failed to read dataset {path}: {source}")]
    DatasetRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the canonical dataset failed.
    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A version-control command could not be started or exited non-zero.
    #[error("git {command} failed: {detail}")]
    VersionControl { command: String, detail: String },

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A JSON document could not be parsed or produced.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TimerowError {
    /// Classify the error for the run outcome.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TimerowError::NoInput(_) => ErrorKind::NoInput,
            TimerowError::FileRead { .. }
            | TimerowError::MalformedInput { .. }
            | TimerowError::InvalidValue(_) => ErrorKind::MalformedInput,
            TimerowError::CorruptDataset { .. }
            | TimerowError::DatasetRead { .. }
            | TimerowError::Persist { .. }
            | TimerowError::Io(_) => ErrorKind::PersistError,
            TimerowError::VersionControl { .. } => ErrorKind::PublishError,
            TimerowError::Config(_) | TimerowError::JsonParse(_) => ErrorKind::ConfigError,
        }
    }

    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        TimerowError::MalformedInput {
            line,
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the timerow crates.
pub type Result<T> = std::result::Result<T, TimerowError>;
