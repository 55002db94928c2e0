//! Remote channel trait

use async_trait::async_trait;
use std::path::Path;

use crate::error::RemoteError;

/// Command and file-transfer access to a remote device
///
/// Implementations open a fresh connection per call and close it before
/// returning. Every call is bounded by the implementation's own timeout.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Run one command to completion and return its combined stdout/stderr
    ///
    /// A non-zero exit status yields [`RemoteError::ExitStatus`], which still
    /// carries the captured output.
    async fn exec(&self, command: &str) -> Result<String, RemoteError>;

    /// Copy a local file to `remote_path`, returning the number of bytes written
    ///
    /// Fails with [`RemoteError::ShortWrite`] if the byte count does not match
    /// the local file size.
    async fn transfer(&self, local_path: &Path, remote_path: &str) -> Result<u64, RemoteError>;

    /// Human-readable target, used in log lines
    fn target(&self) -> String;
}
