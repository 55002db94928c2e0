//! russh client handler

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;

/// Client handler for short-lived device connections
///
/// Accepts any host key. Devices are recreated for every run behind a
/// loopback port forward, so there is no stable key to pin.
pub(crate) struct ClientHandler {
    target: String,
}

impl ClientHandler {
    pub(crate) fn new(target: String) -> Self {
        Self { target }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::trace!(
            "Accepting host key {} from {}",
            server_public_key.fingerprint(),
            self.target
        );
        Ok(true)
    }
}
