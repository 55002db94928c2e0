//! Per-call SSH channel
//!
//! Opens a fresh authenticated session for every command or upload. Call
//! volume is a few dozen per test run, so connection reuse is not worth the
//! extra state.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::KeyPair;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use vdut_core::config::ConnectionParams;
use vdut_core::{RemoteChannel, RemoteError};

use super::handler::ClientHandler;

/// Command and SFTP transfer channel to one device
pub struct SshChannel {
    /// Connection parameters
    params: ConnectionParams,
    /// Private key for authentication
    key: Arc<KeyPair>,
}

impl SshChannel {
    /// Create a channel, loading the private key up front
    pub fn new(params: ConnectionParams) -> Result<Self, RemoteError> {
        if !params.private_key_path.exists() {
            return Err(RemoteError::KeyNotFound {
                path: params.private_key_path.clone(),
                reason: "File does not exist".to_string(),
            });
        }

        let key = russh_keys::load_secret_key(&params.private_key_path, None).map_err(|e| {
            RemoteError::KeyNotFound {
                path: params.private_key_path.clone(),
                reason: format!("Failed to load key: {}", e),
            }
        })?;

        Ok(Self {
            params,
            key: Arc::new(key),
        })
    }

    /// Get the connection parameters
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Open and authenticate a new session
    async fn connect(&self) -> Result<Handle<ClientHandler>, RemoteError> {
        let address = self.params.address();
        let ssh_config = Arc::new(Config::default());
        let handler = ClientHandler::new(address.clone());

        tracing::trace!("Connecting to {}", address);
        let mut session = client::connect(ssh_config, address.as_str(), handler)
            .await
            .map_err(|e| RemoteError::Connect {
                address: address.clone(),
                reason: e.to_string(),
            })?;

        let authenticated = session
            .authenticate_publickey(&self.params.username, Arc::clone(&self.key))
            .await
            .map_err(|e| RemoteError::Ssh(format!("Authentication error: {}", e)))?;

        if !authenticated {
            return Err(RemoteError::AuthRejected(self.params.username.clone()));
        }

        Ok(session)
    }

    async fn run(&self, command: &str) -> Result<String, RemoteError> {
        let session = self.connect().await?;
        let result = run_on_session(&session, command).await;
        close(session).await;
        result
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, RemoteError> {
        let transfer_err = |reason: String| RemoteError::Transfer {
            local: local_path.to_path_buf(),
            remote: remote_path.to_string(),
            reason,
        };

        let expected = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| transfer_err(format!("cannot stat local file: {}", e)))?
            .len();
        let mut source = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| transfer_err(format!("cannot open local file: {}", e)))?;

        let session = self.connect().await?;
        let result = async {
            let channel = session
                .channel_open_session()
                .await
                .map_err(|e| RemoteError::Ssh(format!("Failed to open session channel: {}", e)))?;
            channel
                .request_subsystem(true, "sftp")
                .await
                .map_err(|e| RemoteError::Ssh(format!("Failed to start sftp subsystem: {}", e)))?;
            let sftp = SftpSession::new(channel.into_stream())
                .await
                .map_err(|e| transfer_err(format!("sftp handshake failed: {}", e)))?;

            let mut dest = sftp
                .create(remote_path)
                .await
                .map_err(|e| transfer_err(format!("cannot create remote file: {}", e)))?;
            let written =
                write_verified(&mut source, &mut dest, expected, local_path, remote_path).await?;

            let remote_size = sftp
                .metadata(remote_path)
                .await
                .map_err(|e| transfer_err(format!("cannot stat remote file: {}", e)))?
                .size;
            verify_remote_size(remote_path, expected, remote_size)?;

            if let Err(e) = sftp.close().await {
                tracing::debug!("sftp close failed: {}", e);
            }
            Ok(written)
        }
        .await;
        close(session).await;
        result
    }
}

/// Copy `source` into `dest`, close it and check that `expected` bytes went through
async fn write_verified<R, W>(
    source: &mut R,
    dest: &mut W,
    expected: u64,
    local: &Path,
    remote: &str,
) -> Result<u64, RemoteError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let transfer_err = |reason: String| RemoteError::Transfer {
        local: local.to_path_buf(),
        remote: remote.to_string(),
        reason,
    };

    let written = tokio::io::copy(source, dest)
        .await
        .map_err(|e| transfer_err(e.to_string()))?;
    dest.shutdown()
        .await
        .map_err(|e| transfer_err(format!("close failed: {}", e)))?;

    if written != expected {
        return Err(RemoteError::ShortWrite {
            remote: remote.to_string(),
            expected,
            written,
        });
    }
    Ok(written)
}

/// Compare the size the server reports with the local size
///
/// Servers that omit the size attribute are trusted.
fn verify_remote_size(remote: &str, expected: u64, size: Option<u64>) -> Result<(), RemoteError> {
    match size {
        Some(size) if size != expected => Err(RemoteError::ShortWrite {
            remote: remote.to_string(),
            expected,
            written: size,
        }),
        _ => Ok(()),
    }
}

/// Run one command on an open session and collect its output
async fn run_on_session(
    session: &Handle<ClientHandler>,
    command: &str,
) -> Result<String, RemoteError> {
    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| RemoteError::Ssh(format!("Failed to open session channel: {}", e)))?;
    channel
        .exec(true, command)
        .await
        .map_err(|e| RemoteError::Ssh(format!("Failed to exec: {}", e)))?;

    let mut output = Vec::new();
    let mut exit_status = None;
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => output.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, .. } => output.extend_from_slice(data),
            ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
            _ => {}
        }
    }

    let output = String::from_utf8_lossy(&output).into_owned();
    match exit_status {
        Some(0) => Ok(output),
        Some(status) => Err(RemoteError::ExitStatus {
            command: command.to_string(),
            status,
            output,
        }),
        None => Err(RemoteError::Ssh(format!(
            "`{}` ended without an exit status",
            command
        ))),
    }
}

async fn close(session: Handle<ClientHandler>) {
    if let Err(e) = session
        .disconnect(Disconnect::ByApplication, "", "en")
        .await
    {
        tracing::debug!("Disconnect failed: {}", e);
    }
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn exec(&self, command: &str) -> Result<String, RemoteError> {
        tracing::debug!("[{}] exec: {}", self.target(), command);
        tokio::time::timeout(self.params.timeout, self.run(command))
            .await
            .map_err(|_| RemoteError::Timeout(self.params.timeout))?
    }

    async fn transfer(&self, local_path: &Path, remote_path: &str) -> Result<u64, RemoteError> {
        tracing::debug!(
            "[{}] transfer: {} -> {}",
            self.target(),
            local_path.display(),
            remote_path
        );
        tokio::time::timeout(
            self.params.transfer_timeout,
            self.upload(local_path, remote_path),
        )
        .await
        .map_err(|_| RemoteError::Timeout(self.params.transfer_timeout))?
    }

    fn target(&self) -> String {
        format!("{}@{}", self.params.username, self.params.address())
    }
}
