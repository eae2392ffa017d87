use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ConnectionConfig;
use crate::error::TransferError;
use crate::operations::mirror::MirrorEngine;
use crate::session::Session;
use crate::types::MirrorReport;
use crate::utils::{ensure_local_source, normalize_remote};

/// Drives one full directory upload over one SSH session.
///
/// Each [`Transfer::transfer`] call constructs a fresh [`Session`], mirrors
/// the tree through it and releases the session exactly once before the
/// result is surfaced, on success and on every failure path alike.
/// Calling `transfer` twice runs two independent sessions in
/// sequence; concurrent calls on one instance are unsupported.
pub struct Transfer {
    config: ConnectionConfig,
}

impl Transfer {
    /// Creates a facade for one deployment target.
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Uploads the local directory tree under the remote root.
    ///
    /// # Arguments
    ///
    /// * `local_path` - Local directory to mirror; must exist and be a directory
    /// * `remote_path` - Remote root the tree is recreated under
    /// * `cancel` - Token that aborts in-flight uploads when fired
    ///
    /// # Errors
    ///
    /// `TransferError::Path` when the local source is invalid (checked before
    /// any connection is attempted), `TransferError::Connection` /
    /// `TransferError::Channel` when the session cannot be established.
    /// Failures scoped to individual files or directories do not abort the
    /// rest of the tree; they are reported through the returned
    /// [`MirrorReport`].
    pub async fn transfer(
        &self,
        local_path: &Path,
        remote_path: &str,
        cancel: CancellationToken,
    ) -> Result<MirrorReport, TransferError> {
        ensure_local_source(local_path).await?;
        let remote_root = normalize_remote(remote_path);
        info!(
            local = %local_path.display(),
            remote = %remote_root,
            host = %self.config.host,
            "starting transfer"
        );

        let mut session = Session::new(self.config.clone());
        let outcome = run_mirror(&mut session, local_path, &remote_root, cancel).await;
        // The session is released on every exit path, before the outcome is
        // surfaced to the caller.
        session.close().await;

        match &outcome {
            Ok(report) if report.is_success() => {
                info!(files = report.uploaded_count(), "transfer complete");
            }
            Ok(report) => {
                warn!(
                    uploaded = report.uploaded_count(),
                    failed = report.failed_count(),
                    "transfer finished with failures"
                );
            }
            Err(err) => error!(error = %err, "transfer aborted"),
        }
        outcome
    }
}

async fn run_mirror(
    session: &mut Session,
    local_path: &Path,
    remote_root: &str,
    cancel: CancellationToken,
) -> Result<MirrorReport, TransferError> {
    session.connect().await?;
    let channel = session.open_transfer_channel().await?;
    let engine = MirrorEngine::new(&channel, cancel);
    engine.mirror(local_path, remote_root).await
}
