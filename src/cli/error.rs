//! CLI-level errors (wraps tree errors)

use std::path::PathBuf;

use thiserror::Error;

use crate::errors::TreeError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Tree(#[from] TreeError),

    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("node not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) => crate::exitcode::USAGE,
            CliError::NotFound(_) => crate::exitcode::NOT_FOUND,
            CliError::Json { .. } => crate::exitcode::DATAERR,
            CliError::Io { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => crate::exitcode::NOINPUT,
                _ => crate::exitcode::IOERR,
            },
            CliError::Tree(e) => match e {
                TreeError::Config(_) => crate::exitcode::CONFIG,
                TreeError::InvalidInput { .. } | TreeError::DuplicateId(_) => {
                    crate::exitcode::DATAERR
                }
                TreeError::InvalidHandle(_) | TreeError::CycleDetected { .. } => {
                    crate::exitcode::SOFTWARE
                }
            },
        }
    }
}
