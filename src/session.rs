use std::sync::Arc;
use std::time::Duration;

use russh::Disconnect;
use russh::client::{self, Handle};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, decode_secret_key, load_secret_key};
use russh_sftp::client::SftpSession;
use tracing::{debug, info, warn};

use crate::channel::SftpChannel;
use crate::config::{ConnectionConfig, Credential};
use crate::error::TransferError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle of one SSH connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, `connect` not yet called
    Idle,
    /// Authentication in progress
    Connecting,
    /// Authenticated and accepting channel requests
    Ready,
    /// Torn down, by explicit close or after a terminal error
    Closed,
    /// Authentication or transport setup failed
    Failed,
}

/// Accepts the server host key; trust is pinned by the deployment config
/// naming the host, not by a known-hosts database.
#[derive(Debug)]
struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One authenticated SSH connection and the factory for its transfer channel.
///
/// A session is created per transfer and never reused: `connect` moves it to
/// `Ready` or `Failed` exactly once, and `close` is idempotent: closing an
/// already-closed or never-opened session is a no-op, never an error.
///
/// # Example
///
/// ```ignore
/// let mut session = Session::new(config);
/// session.connect().await?;
/// let channel = session.open_transfer_channel().await?;
/// // ... upload through the channel ...
/// session.close().await;
/// ```
pub struct Session {
    config: ConnectionConfig,
    handle: Option<Handle<ClientHandler>>,
    state: SessionState,
}

impl Session {
    /// Creates an idle session from connection parameters. No I/O happens
    /// until [`Session::connect`] is called.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            handle: None,
            state: SessionState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Establishes and authenticates the connection.
    ///
    /// Transitions to `Ready` on success and `Failed` on any authentication,
    /// network or transport error. Nothing is retried internally; retry
    /// policy belongs to the caller.
    pub async fn connect(&mut self) -> Result<(), TransferError> {
        info!(
            host = %self.config.host,
            port = self.config.port,
            username = %self.config.username,
            "establishing ssh connection"
        );
        self.state = SessionState::Connecting;
        match self.authenticate().await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = SessionState::Ready;
                info!("ssh connection ready");
                Ok(())
            }
            Err(reason) => {
                self.state = SessionState::Failed;
                Err(TransferError::Connection {
                    host: self.config.host.clone(),
                    port: self.config.port,
                    reason,
                })
            }
        }
    }

    async fn authenticate(&self) -> Result<Handle<ClientHandler>, String> {
        let ssh_config = Arc::new(client::Config::default());
        let address = (self.config.host.as_str(), self.config.port);
        let mut handle = tokio::time::timeout(
            CONNECT_TIMEOUT,
            client::connect(ssh_config, address, ClientHandler),
        )
        .await
        .map_err(|_| format!("connect timed out after {CONNECT_TIMEOUT:?}"))?
        .map_err(|err| err.to_string())?;

        let authenticated = match &self.config.credential {
            Credential::Password(password) => handle
                .authenticate_password(&self.config.username, password)
                .await
                .map_err(|err| err.to_string())?
                .success(),
            Credential::PrivateKey(pem) => {
                let key = decode_secret_key(pem, None)
                    .map_err(|err| format!("unusable private key: {err}"))?;
                self.publickey_auth(&mut handle, key).await?
            }
            Credential::PrivateKeyFile(path) => {
                let key = load_secret_key(path, None).map_err(|err| {
                    format!("unusable private key file {}: {err}", path.display())
                })?;
                self.publickey_auth(&mut handle, key).await?
            }
        };

        if authenticated {
            Ok(handle)
        } else {
            Err(format!(
                "authentication rejected for user {}",
                self.config.username
            ))
        }
    }

    async fn publickey_auth(
        &self,
        handle: &mut Handle<ClientHandler>,
        key: russh::keys::PrivateKey,
    ) -> Result<bool, String> {
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .map_err(|err| err.to_string())?
            .flatten();
        handle
            .authenticate_publickey(
                &self.config.username,
                PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
            )
            .await
            .map(|result| result.success())
            .map_err(|err| err.to_string())
    }

    /// Opens the SFTP subsystem channel used for directory creation and file
    /// writes. The session must be `Ready`.
    pub async fn open_transfer_channel(&self) -> Result<SftpChannel, TransferError> {
        let handle = match (&self.handle, self.state) {
            (Some(handle), SessionState::Ready) => handle,
            _ => {
                return Err(TransferError::Channel {
                    reason: format!("session is {:?}, not ready", self.state),
                });
            }
        };
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|err| TransferError::Channel {
                reason: err.to_string(),
            })?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|err| TransferError::Channel {
                reason: err.to_string(),
            })?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|err| TransferError::Channel {
                reason: err.to_string(),
            })?;
        debug!("sftp subsystem channel open");
        Ok(SftpChannel::new(sftp))
    }

    /// Releases the connection. Safe to call any number of times, on any
    /// state; the closed transition is logged exactly once.
    pub async fn close(&mut self) {
        match self.handle.take() {
            Some(handle) => {
                if let Err(err) = handle
                    .disconnect(Disconnect::ByApplication, "transfer finished", "en")
                    .await
                {
                    warn!(error = %err, "ssh disconnect reported an error, transport is gone either way");
                }
                self.state = SessionState::Closed;
                info!("ssh session closed");
            }
            None => {
                if self.state != SessionState::Closed {
                    debug!("close on a session without a live transport");
                    self.state = SessionState::Closed;
                }
            }
        }
    }
}
