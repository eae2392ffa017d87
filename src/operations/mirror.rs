use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::channel::TransferChannel;
use crate::error::TransferError;
use crate::operations::upload;
use crate::progress::ProgressTracker;
use crate::types::{FileOutcome, LeafOutcome, MirrorReport};
use crate::utils::{ensure_local_source, remote_join};

/// Recursively mirrors a local directory tree to a remote destination.
///
/// The engine borrows the transfer channel for the duration of one `mirror`
/// call and owns nothing else: all per-level bookkeeping lives in the
/// recursion frames. Children of one directory are initiated together and
/// settle in any order; one [`ProgressTracker`] per level counts them in and
/// fires the level's completion exactly once, when the last child settles.
pub struct MirrorEngine<'c, C> {
    channel: &'c C,
    cancel: CancellationToken,
}

/// One immediate child of a directory, classified at listing time.
struct ChildEntry {
    name: OsString,
    is_dir: bool,
}

/// How one concurrently-initiated child of a level settled.
enum Settled {
    Leaf {
        outcome: FileOutcome,
        failure: Option<TransferError>,
    },
    Subtree(MirrorReport),
}

impl<'c, C: TransferChannel + Sync> MirrorEngine<'c, C> {
    pub fn new(channel: &'c C, cancel: CancellationToken) -> Self {
        Self { channel, cancel }
    }

    /// Mirrors `local_root` under `remote_root`.
    ///
    /// The local root must exist and be a directory; violation fails with
    /// `TransferError::Path` before any remote I/O. Remote mkdir failures,
    /// per-file stream failures and cancellation are recorded in the
    /// returned [`MirrorReport`] instead: already-initiated siblings keep
    /// running to completion and the first failure becomes the tree's
    /// failure cause.
    pub async fn mirror(
        &self,
        local_root: &Path,
        remote_root: &str,
    ) -> Result<MirrorReport, TransferError> {
        ensure_local_source(local_root).await?;
        info!(
            local = %local_root.display(),
            remote = remote_root,
            "mirroring directory tree"
        );
        let report = self
            .mirror_level(local_root.to_path_buf(), remote_root.to_string())
            .await;
        match &report.failure {
            None => info!(
                files = report.uploaded_count(),
                directories = report.directories,
                "directory tree mirrored"
            ),
            Some(cause) => error!(
                uploaded = report.uploaded_count(),
                failed = report.failed_count(),
                error = %cause,
                "directory tree mirrored with failures"
            ),
        }
        Ok(report)
    }

    /// Mirrors the immediate children of one directory, recursing into
    /// subdirectories. The sibling-group total is fixed from the local
    /// listing before any child is initiated, so the level's progress can
    /// never overshoot; the group settles only once every child has.
    fn mirror_level(&self, local_dir: PathBuf, remote_dir: String) -> BoxFuture<'_, MirrorReport> {
        async move {
            let mut report = MirrorReport::default();

            if self.cancel.is_cancelled() {
                report.failure = Some(TransferError::Cancelled { path: remote_dir });
                return report;
            }

            let children = match list_children(&local_dir).await {
                Ok(children) => children,
                Err(err) => {
                    report.failure = Some(err);
                    return report;
                }
            };

            // The remote directory is ensured even when there is nothing to
            // upload into it, so an empty local tree still mirrors.
            if let Err(err) = self.channel.make_directory(&remote_dir).await {
                report.failure = Some(TransferError::DirectoryCreate {
                    path: remote_dir,
                    reason: err.to_string(),
                });
                return report;
            }
            report.directories += 1;

            if children.is_empty() {
                debug!(dir = %local_dir.display(), "local directory is empty, nothing to upload");
                return report;
            }
            info!(
                dir = %local_dir.display(),
                entries = children.len(),
                "uploading directory level"
            );

            let mut progress = ProgressTracker::new(children.len());
            let mut in_flight: FuturesUnordered<BoxFuture<'_, Settled>> = FuturesUnordered::new();
            for child in children {
                let child_local = local_dir.join(&child.name);
                let child_remote = remote_join(&remote_dir, &child.name.to_string_lossy());
                if child.is_dir {
                    in_flight.push(
                        async move { Settled::Subtree(self.mirror_level(child_local, child_remote).await) }
                            .boxed(),
                    );
                } else {
                    in_flight.push(
                        async move { self.upload_child(child_local, child_remote).await }.boxed(),
                    );
                }
            }

            while let Some(settled) = in_flight.next().await {
                match settled {
                    Settled::Leaf { outcome, failure } => {
                        if report.failure.is_none() {
                            report.failure = failure;
                        }
                        report.files.push(outcome);
                    }
                    Settled::Subtree(child_report) => report.absorb(child_report),
                }
                let snapshot = progress.child_settled();
                info!(dir = %remote_dir, "transfer progress {snapshot}");
                if snapshot.is_complete() {
                    debug!(dir = %remote_dir, "directory level settled");
                }
            }
            debug_assert!(progress.is_complete());
            report
        }
        .boxed()
    }

    async fn upload_child(&self, local: PathBuf, remote: String) -> Settled {
        match upload::put_file(self.channel, &local, &remote, &self.cancel).await {
            Ok(bytes) => Settled::Leaf {
                outcome: FileOutcome {
                    local_path: local,
                    remote_path: remote,
                    outcome: LeafOutcome::Uploaded { bytes },
                },
                failure: None,
            },
            Err(err) => {
                error!(file = %local.display(), error = %err, "file upload failed");
                Settled::Leaf {
                    outcome: FileOutcome {
                        local_path: local,
                        remote_path: remote,
                        outcome: LeafOutcome::Failed {
                            error: err.to_string(),
                        },
                    },
                    failure: Some(err),
                }
            }
        }
    }
}

/// Non-recursive listing of a directory's immediate children. Metadata
/// follows symlinks, so a link to a directory recurses and anything else
/// uploads as a regular file.
async fn list_children(dir: &Path) -> Result<Vec<ChildEntry>, TransferError> {
    let as_path_error = |err: std::io::Error| TransferError::Path {
        path: dir.to_path_buf(),
        reason: err.to_string(),
    };
    let mut entries = fs::read_dir(dir).await.map_err(as_path_error)?;
    let mut children = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(as_path_error)? {
        let metadata = fs::metadata(entry.path()).await.map_err(as_path_error)?;
        children.push(ChildEntry {
            name: entry.file_name(),
            is_dir: metadata.is_dir(),
        });
    }
    Ok(children)
}
