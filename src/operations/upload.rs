use std::path::Path;
use std::time::Instant;

use tokio::fs;
use tokio::io::{self, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::channel::TransferChannel;
use crate::error::TransferError;

/// Uploads a single local file to the remote server.
///
/// Opens a paired local read / remote write stream and pipes bytes from
/// source to sink. The upload settles when the sink finishes (success) or
/// errors (failure); cancellation drops both streams mid-flight.
///
/// # Returns
///
/// The number of bytes transferred on success.
///
/// # Errors
///
/// Returns `TransferError::FileTransfer` if:
/// - The local file cannot be opened or read
/// - The remote file cannot be created or written to
///
/// Returns `TransferError::Cancelled` if the token fires before the sink
/// finishes.
pub(crate) async fn put_file<C: TransferChannel>(
    channel: &C,
    local: &Path,
    remote: &str,
    cancel: &CancellationToken,
) -> Result<u64, TransferError> {
    let upload_time = Instant::now();
    let mut source = fs::File::open(local)
        .await
        .map_err(|err| TransferError::FileTransfer {
            local: local.to_path_buf(),
            remote: remote.to_string(),
            reason: format!("cannot open local file: {err}"),
        })?;
    let mut sink =
        channel
            .open_write_stream(remote)
            .await
            .map_err(|err| TransferError::FileTransfer {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                reason: err.to_string(),
            })?;
    debug!(file = %local.display(), remote, "uploading");

    let pipe = async {
        let bytes = io::copy(&mut source, &mut sink).await?;
        sink.shutdown().await?;
        Ok::<u64, std::io::Error>(bytes)
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            info!(file = %local.display(), "upload cancelled by caller");
            Err(TransferError::Cancelled {
                path: remote.to_string(),
            })
        }
        piped = pipe => {
            let bytes = piped.map_err(|err| TransferError::FileTransfer {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                reason: err.to_string(),
            })?;
            info!(
                file = %local.display(),
                bytes,
                elapsed = ?upload_time.elapsed(),
                "file uploaded"
            );
            Ok(bytes)
        }
    }
}
