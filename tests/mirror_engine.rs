use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

use buildferry::{
    CancellationToken, LeafOutcome, MirrorEngine, TransferChannel, TransferError,
};

/// What the fake remote has seen so far.
#[derive(Default)]
struct RemoteState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    mkdir_calls: Vec<String>,
    opened: Vec<String>,
}

/// In-memory [`TransferChannel`] with per-path fault injection.
#[derive(Default)]
struct MemoryChannel {
    state: Arc<Mutex<RemoteState>>,
    fail_writes: HashSet<String>,
    fail_mkdir: HashSet<String>,
}

impl MemoryChannel {
    fn with_existing_dir(self, dir: &str) -> Self {
        self.state.lock().unwrap().dirs.insert(dir.to_string());
        self
    }

    fn failing_write(mut self, remote: &str) -> Self {
        self.fail_writes.insert(remote.to_string());
        self
    }

    fn failing_mkdir(mut self, remote: &str) -> Self {
        self.fail_mkdir.insert(remote.to_string());
        self
    }
}

impl TransferChannel for MemoryChannel {
    type Sink = MemorySink;

    async fn make_directory(&self, remote: &str) -> io::Result<()> {
        if self.fail_mkdir.contains(remote) {
            return Err(io::Error::other("injected mkdir failure"));
        }
        let mut state = self.state.lock().unwrap();
        state.mkdir_calls.push(remote.to_string());
        // Creating a directory that already exists is success, per the
        // channel contract.
        state.dirs.insert(remote.to_string());
        Ok(())
    }

    async fn open_write_stream(&self, remote: &str) -> io::Result<MemorySink> {
        self.state.lock().unwrap().opened.push(remote.to_string());
        Ok(MemorySink {
            path: remote.to_string(),
            buffer: Vec::new(),
            state: Arc::clone(&self.state),
            fail: self.fail_writes.contains(remote),
        })
    }
}

/// Write sink that commits its buffer to the fake remote on shutdown,
/// mirroring a real stream's finish event.
struct MemorySink {
    path: String,
    buffer: Vec<u8>,
    state: Arc<Mutex<RemoteState>>,
    fail: bool,
}

impl AsyncWrite for MemorySink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.fail {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }
        self.buffer.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.fail {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }
        let buffer = std::mem::take(&mut self.buffer);
        let path = self.path.clone();
        self.state.lock().unwrap().files.insert(path, buffer);
        Poll::Ready(Ok(()))
    }
}

fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

#[tokio::test]
async fn mirrors_nested_tree() {
    let local = tempfile::tempdir().unwrap();
    write_file(local.path(), "a.txt", "alpha");
    write_file(local.path(), "sub/b.txt", "bravo");

    let channel = MemoryChannel::default();
    let engine = MirrorEngine::new(&channel, CancellationToken::new());
    let report = engine.mirror(local.path(), "/dst").await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.directories, 2);
    assert_eq!(report.uploaded_count(), 2);

    let state = channel.state.lock().unwrap();
    assert!(state.dirs.contains("/dst"));
    assert!(state.dirs.contains("/dst/sub"));
    assert_eq!(state.mkdir_calls.len(), 2);
    assert_eq!(state.files.get("/dst/a.txt").unwrap(), b"alpha");
    assert_eq!(state.files.get("/dst/sub/b.txt").unwrap(), b"bravo");
}

#[tokio::test]
async fn reports_transferred_byte_counts() {
    let local = tempfile::tempdir().unwrap();
    write_file(local.path(), "a.txt", "alpha");

    let channel = MemoryChannel::default();
    let engine = MirrorEngine::new(&channel, CancellationToken::new());
    let report = engine.mirror(local.path(), "/dst").await.unwrap();

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].remote_path, "/dst/a.txt");
    assert_eq!(
        report.files[0].outcome,
        LeafOutcome::Uploaded { bytes: 5 }
    );
}

#[tokio::test]
async fn empty_directory_mirrors_to_empty_remote() {
    let local = tempfile::tempdir().unwrap();

    let channel = MemoryChannel::default();
    let engine = MirrorEngine::new(&channel, CancellationToken::new());
    let report = engine.mirror(local.path(), "/dst").await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.directories, 1);
    assert!(report.files.is_empty());

    let state = channel.state.lock().unwrap();
    assert!(state.dirs.contains("/dst"));
    assert!(state.files.is_empty());
    assert!(state.opened.is_empty(), "no file upload tasks were expected");
}

#[tokio::test]
async fn missing_local_root_fails_before_any_remote_io() {
    let channel = MemoryChannel::default();
    let engine = MirrorEngine::new(&channel, CancellationToken::new());
    let err = engine
        .mirror(Path::new("/definitely/not/here"), "/dst")
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Path { .. }));
    let state = channel.state.lock().unwrap();
    assert!(state.mkdir_calls.is_empty());
    assert!(state.opened.is_empty());
}

#[tokio::test]
async fn local_root_must_be_a_directory() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let channel = MemoryChannel::default();
    let engine = MirrorEngine::new(&channel, CancellationToken::new());
    let err = engine.mirror(file.path(), "/dst").await.unwrap_err();
    assert!(matches!(err, TransferError::Path { .. }));
}

#[tokio::test]
async fn existing_remote_directory_is_not_an_error() {
    let local = tempfile::tempdir().unwrap();
    write_file(local.path(), "a.txt", "alpha");

    let channel = MemoryChannel::default().with_existing_dir("/dst");
    let engine = MirrorEngine::new(&channel, CancellationToken::new());
    let report = engine.mirror(local.path(), "/dst").await.unwrap();

    assert!(report.is_success());
    let state = channel.state.lock().unwrap();
    assert_eq!(state.files.get("/dst/a.txt").unwrap(), b"alpha");
}

#[tokio::test]
async fn sibling_failure_leaves_others_running_to_completion() {
    let local = tempfile::tempdir().unwrap();
    write_file(local.path(), "a.txt", "alpha");
    write_file(local.path(), "b.txt", "bravo");

    let channel = MemoryChannel::default().failing_write("/dst/a.txt");
    let engine = MirrorEngine::new(&channel, CancellationToken::new());
    let report = engine.mirror(local.path(), "/dst").await.unwrap();

    // The level still settles completely: both children are accounted for.
    assert_eq!(report.files.len(), 2);
    assert_eq!(report.uploaded_count(), 1);
    assert_eq!(report.failed_count(), 1);
    assert!(!report.is_success());
    match report.failure {
        Some(TransferError::FileTransfer { ref remote, .. }) => {
            assert_eq!(remote, "/dst/a.txt");
        }
        ref other => panic!("expected a file transfer failure, got {other:?}"),
    }

    // The sibling upload finished despite the failure.
    let state = channel.state.lock().unwrap();
    assert_eq!(state.files.get("/dst/b.txt").unwrap(), b"bravo");
    assert!(!state.files.contains_key("/dst/a.txt"));
}

#[tokio::test]
async fn mkdir_failure_is_scoped_to_its_subtree() {
    let local = tempfile::tempdir().unwrap();
    write_file(local.path(), "top.txt", "top");
    write_file(local.path(), "sub/inner.txt", "inner");

    let channel = MemoryChannel::default().failing_mkdir("/dst/sub");
    let engine = MirrorEngine::new(&channel, CancellationToken::new());
    let report = engine.mirror(local.path(), "/dst").await.unwrap();

    assert!(!report.is_success());
    match report.failure {
        Some(TransferError::DirectoryCreate { ref path, .. }) => assert_eq!(path, "/dst/sub"),
        ref other => panic!("expected a directory create failure, got {other:?}"),
    }

    // The failed subtree never dispatched its children, but the sibling file
    // at the root level still uploaded.
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.uploaded_count(), 1);
    assert_eq!(report.directories, 1);
    let state = channel.state.lock().unwrap();
    assert_eq!(state.files.get("/dst/top.txt").unwrap(), b"top");
    assert!(!state.files.contains_key("/dst/sub/inner.txt"));
}

#[tokio::test]
async fn cancelled_token_stops_before_remote_io() {
    let local = tempfile::tempdir().unwrap();
    write_file(local.path(), "a.txt", "alpha");

    let cancel = CancellationToken::new();
    cancel.cancel();

    let channel = MemoryChannel::default();
    let engine = MirrorEngine::new(&channel, cancel);
    let report = engine.mirror(local.path(), "/dst").await.unwrap();

    assert!(matches!(
        report.failure,
        Some(TransferError::Cancelled { .. })
    ));
    assert!(report.files.is_empty());
    let state = channel.state.lock().unwrap();
    assert!(state.mkdir_calls.is_empty());
    assert!(state.opened.is_empty());
}

#[tokio::test]
async fn mirrors_deeply_nested_paths_with_forward_slashes() {
    let local = tempfile::tempdir().unwrap();
    write_file(local.path(), "x/y/c.txt", "deep");

    let channel = MemoryChannel::default();
    let engine = MirrorEngine::new(&channel, CancellationToken::new());
    let report = engine.mirror(local.path(), "/dst").await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.directories, 3);
    let state = channel.state.lock().unwrap();
    assert!(state.dirs.contains("/dst/x/y"));
    assert_eq!(state.files.get("/dst/x/y/c.txt").unwrap(), b"deep");
}
