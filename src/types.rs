use std::path::PathBuf;

use crate::error::TransferError;

/// Terminal outcome of one file upload within a mirror operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafOutcome {
    /// The remote write stream finished; `bytes` were transferred.
    Uploaded { bytes: u64 },
    /// The upload failed; the rendered cause is kept for reporting.
    Failed { error: String },
}

/// Manifest entry for one file the engine attempted to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    /// Source file on the local machine
    pub local_path: PathBuf,
    /// Destination path on the remote host
    pub remote_path: String,
    /// How the upload settled
    pub outcome: LeafOutcome,
}

/// Result of mirroring one local tree to the remote host.
///
/// The report carries an outcome for every file the engine attempted, so a
/// caller can see exactly which uploads succeeded before a sibling failed.
/// `failure` holds the first failure in settlement order; when it is `None`
/// the whole tree mirrored cleanly.
#[derive(Debug, Default)]
pub struct MirrorReport {
    /// Per-file manifest, in settlement order
    pub files: Vec<FileOutcome>,
    /// Number of remote directories ensured to exist
    pub directories: usize,
    /// First failure observed, if any; the whole tree counts as failed
    pub failure: Option<TransferError>,
}

impl MirrorReport {
    /// True when every directory was created and every file upload finished.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Number of files whose upload completed.
    pub fn uploaded_count(&self) -> usize {
        self.files
            .iter()
            .filter(|file| matches!(file.outcome, LeafOutcome::Uploaded { .. }))
            .count()
    }

    /// Number of files whose upload failed.
    pub fn failed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|file| matches!(file.outcome, LeafOutcome::Failed { .. }))
            .count()
    }

    /// Folds a settled subtree into this level's report. The first failure
    /// seen at this level wins; later ones are already recorded per file.
    pub(crate) fn absorb(&mut self, child: MirrorReport) {
        self.directories += child.directories;
        self.files.extend(child.files);
        if self.failure.is_none() {
            self.failure = child.failure;
        }
    }
}
