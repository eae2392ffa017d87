use std::io;

use russh_sftp::client::SftpSession;
use russh_sftp::client::fs::File as RemoteFile;
use tokio::io::AsyncWrite;
use tracing::debug;

/// Protocol handle used by the upload engine to create remote directories and
/// open remote write streams.
///
/// The channel holds no per-file state; which file is in flight and what
/// happens when it settles is tracked by the caller. The trait exists so the
/// engine can run against an in-memory remote in tests.
pub trait TransferChannel {
    /// Writable byte sink for one remote file.
    type Sink: AsyncWrite + Send + Unpin;

    /// Requests creation of a remote directory. An already-existing directory
    /// is success; any other failure is propagated.
    fn make_directory(&self, remote: &str) -> impl Future<Output = io::Result<()>> + Send;

    /// Opens a write stream for a remote file, truncating any existing file.
    fn open_write_stream(&self, remote: &str) -> impl Future<Output = io::Result<Self::Sink>> + Send;
}

/// [`TransferChannel`] backed by one SFTP subsystem channel of an SSH session.
pub struct SftpChannel {
    sftp: SftpSession,
}

impl std::fmt::Debug for SftpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpChannel").finish_non_exhaustive()
    }
}

impl SftpChannel {
    pub(crate) fn new(sftp: SftpSession) -> Self {
        Self { sftp }
    }
}

impl TransferChannel for SftpChannel {
    type Sink = RemoteFile;

    async fn make_directory(&self, remote: &str) -> io::Result<()> {
        match self.sftp.create_dir(remote).await {
            Ok(()) => {
                debug!(dir = remote, "remote directory created");
                Ok(())
            }
            // Servers report mkdir on an existing path as a plain failure
            // status; a follow-up stat disambiguates it from a real error.
            Err(create_err) => match self.sftp.metadata(remote).await {
                Ok(attrs) if attrs.is_dir() => {
                    debug!(dir = remote, "remote directory already exists");
                    Ok(())
                }
                _ => Err(io::Error::other(format!(
                    "SFTP mkdir failed: {create_err}"
                ))),
            },
        }
    }

    async fn open_write_stream(&self, remote: &str) -> io::Result<RemoteFile> {
        self.sftp
            .create(remote)
            .await
            .map_err(|err| io::Error::other(format!("SFTP open for write failed: {err}")))
    }
}
