//! Centralized error types for mergemail.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mergemail library.
#[derive(Error, Debug)]
pub enum MergeError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The template references a field that the current record does not supply.
    ///
    /// This aborts the run: it signals a template/database mismatch that
    /// likely affects every record.
    #[error("undefined template field: {0}")]
    UndefinedField(String),

    /// The template itself is malformed (syntax error, bad expression).
    #[error("template error: {0}")]
    Template(String),

    /// The rendered header block is malformed or missing a required header.
    #[error("header error: {0}")]
    HeaderParse(String),

    /// An attachment path does not resolve to an existing regular file.
    #[error("attachment not found: {0}")]
    AttachmentNotFound(PathBuf),

    /// The CSV database could not be read or parsed.
    #[error("database error in '{path}': {reason}")]
    Database { path: PathBuf, reason: String },

    /// The server configuration file is invalid.
    #[error("config error in '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    /// Could not open the SMTP connection or transmit a message.
    #[error("{host}:{port} failed to send message: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    /// The SMTP server rejected our credentials.
    #[error("{host}:{port} failed to authenticate user '{username}': {reason}")]
    Authentication {
        host: String,
        port: u16,
        username: String,
        reason: String,
    },
}

/// Convenience alias for `Result<T, MergeError>`.
pub type Result<T> = std::result::Result<T, MergeError>;

impl MergeError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
