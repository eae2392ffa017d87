use std::path::Path;
use tokio::fs;

use crate::error::TransferError;

/// Remote paths always use forward slashes, whatever the local platform uses.
pub(crate) fn normalize_remote(path: &str) -> String {
    path.replace('\\', "/")
}

/// Joins a child entry onto a remote directory path.
pub(crate) fn remote_join(base: &str, name: &str) -> String {
    let name = normalize_remote(name);
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Verifies the local source exists and is a directory before any remote I/O.
pub(crate) async fn ensure_local_source(path: &Path) -> Result<(), TransferError> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|err| TransferError::Path {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    if !metadata.is_dir() {
        return Err(TransferError::Path {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    Ok(())
}
