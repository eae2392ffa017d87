use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the transfer engine.
///
/// Every variant names the offending local or remote path together with the
/// underlying cause. None of these are retried internally; retry policy
/// belongs to the caller.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The local source is missing or not a directory. Raised before any
    /// remote I/O is attempted.
    #[error("invalid local source {}: {reason}", .path.display())]
    Path { path: PathBuf, reason: String },

    /// Authentication or network failure while establishing the session.
    #[error("connection to {host}:{port} failed: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    /// The session was ready but the SFTP sub-channel could not be opened.
    #[error("could not open transfer channel: {reason}")]
    Channel { reason: String },

    /// Remote mkdir failed for a reason other than "already exists".
    #[error("could not create remote directory {path}: {reason}")]
    DirectoryCreate { path: String, reason: String },

    /// Read or write stream failure for a single file.
    #[error("upload of {} to {remote} failed: {reason}", .local.display())]
    FileTransfer {
        local: PathBuf,
        remote: String,
        reason: String,
    },

    /// The caller cancelled the transfer while this path was being processed.
    #[error("transfer cancelled at {path}")]
    Cancelled { path: String },
}
