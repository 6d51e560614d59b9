//! Error types for passverify.

use std::path::PathBuf;

/// Top-level error type for a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("Credential image error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Mailbox protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Authentication failed for {user}: {reason}")]
    AuthFailed { user: String, reason: String },

    #[error("Could not select mailbox {mailbox}: {reason}")]
    SelectFailed { mailbox: String, reason: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Message {seq} could not be parsed as MIME")]
    MalformedMessage { seq: u32 },

    #[error("IMAP connection closed by server")]
    ConnectionClosed,

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local staging storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Failed to write staged file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read staging directory {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Attachment name {0:?} is not a plain file name")]
    InvalidName(String),
}

/// Attachment decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{filename} is not a readable workbook: {reason}")]
    Workbook { filename: String, reason: String },

    #[error("{filename} has no worksheets")]
    NoWorksheet { filename: String },
}

/// Remote spreadsheet errors.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Sheets API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid service account credentials in {path}: {reason}")]
    Credentials { path: PathBuf, reason: String },

    #[error("Spreadsheet {0:?} not found")]
    SpreadsheetNotFound(String),

    #[error("Worksheet index {index} out of range ({count} worksheets)")]
    WorksheetNotFound { index: usize, count: usize },

    #[error("Write to {position} still over quota after {attempts} attempts")]
    RetriesExhausted { position: String, attempts: u32 },
}

impl SheetError {
    /// Whether the error is a rate-limit rejection worth retrying.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, SheetError::QuotaExceeded(_))
    }
}

/// Credential image errors.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Payload {payload:?} cannot be encoded: {reason}")]
    Encode { payload: String, reason: String },

    #[error("Failed to write image {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// Result type alias for passverify.
pub type Result<T> = std::result::Result<T, Error>;
