//! Per-operation session lifecycle.
//!
//! `Closed -> (trust registered) -> Open -> Closed -> (trust removed)`.
//! Sessions never outlive the operation that opened them.

use crate::config::PsRemoteTarget;
use crate::error::{PsRemoteError, PsRemoteResult};
use crate::provider::RemoteSessionProvider;
use crate::trusted_hosts::TrustedPeerRegistry;
use crate::types::SessionHandle;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;

/// Opens and closes sessions to one target.
#[derive(Clone)]
pub struct PsSessionLifecycle {
    target: Arc<PsRemoteTarget>,
    provider: Arc<dyn RemoteSessionProvider>,
    registry: TrustedPeerRegistry,
}

impl PsSessionLifecycle {
    pub fn new(
        target: Arc<PsRemoteTarget>,
        provider: Arc<dyn RemoteSessionProvider>,
        registry: TrustedPeerRegistry,
    ) -> Self {
        Self {
            target,
            provider,
            registry,
        }
    }

    pub fn target(&self) -> &PsRemoteTarget {
        &self.target
    }

    /// Register trust if managed, require it, then open a session.
    ///
    /// On failure nothing stays registered or open.
    pub async fn begin(&self) -> PsRemoteResult<SessionHandle> {
        let address = &self.target.address;
        let managed = self.target.manage_trusted_hosts;

        if !self.registry.admit(address, managed).await? {
            return Err(PsRemoteError::trusted_host_missing(address));
        }

        match self
            .provider
            .open(&self.target, &self.target.session_options)
            .await
        {
            Ok(session) => {
                info!("Opened session {} to {}", session.id, address);
                Ok(SessionHandle::Remote(session))
            }
            Err(e) => {
                if managed {
                    if let Err(cleanup) = self.registry.remove(address).await {
                        warn!(
                            "Failed to remove '{}' from trusted hosts after open failure: {}",
                            address, cleanup
                        );
                    }
                }
                Err(PsRemoteError::remote_failure(
                    address.as_str(),
                    format!("Failed to open session: {}", e),
                ))
            }
        }
    }

    /// Close the session, then drop managed trust.
    ///
    /// A failed close is logged only; the shell idles out on the server.
    pub async fn end(&self, handle: SessionHandle) -> PsRemoteResult<()> {
        let SessionHandle::Remote(session) = handle else {
            return Ok(());
        };
        match self.provider.close(&session).await {
            Ok(()) => debug!("Closed session {} to {}", session.id, self.target.address),
            Err(e) => warn!(
                "Failed to close session {} to {}: {}",
                session.id, self.target.address, e
            ),
        }
        if self.target.manage_trusted_hosts {
            self.registry.remove(&self.target.address).await?;
        }
        Ok(())
    }

    /// Run `op` inside a fresh session, closing it whatever `op` returns.
    ///
    /// When `op` fails its error wins and cleanup errors are only logged.
    pub async fn run<T, F, Fut>(&self, op: F) -> PsRemoteResult<T>
    where
        F: FnOnce(SessionHandle) -> Fut,
        Fut: Future<Output = PsRemoteResult<T>>,
    {
        let handle = self.begin().await?;
        let result = op(handle.clone()).await;
        let cleanup = self.end(handle).await;
        match (result, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                warn!("Session cleanup also failed: {}", cleanup);
                Err(e)
            }
        }
    }
}
