//! Capabilities the core calls through to actually run PowerShell.

use crate::config::{PsRemoteTarget, PsSessionOptions};
use crate::types::{InvocationOutcome, PsValue, RemoteSession};
use async_trait::async_trait;

/// Opens, drives and closes remote shells on one kind of transport.
///
/// Errors are transport-level text; the caller decides how to classify them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteSessionProvider: Send + Sync {
    /// Authenticate against `target` and open a shell with `options`.
    async fn open(
        &self,
        target: &PsRemoteTarget,
        options: &PsSessionOptions,
    ) -> Result<RemoteSession, String>;

    /// Run `script` with positional `args`, collecting output and error records.
    async fn invoke(
        &self,
        session: &RemoteSession,
        script: &str,
        args: &[PsValue],
    ) -> Result<InvocationOutcome, String>;

    async fn close(&self, session: &RemoteSession) -> Result<(), String>;
}

/// Runs PowerShell on the caller's own host.
#[async_trait]
pub trait LocalScriptHost: Send + Sync {
    async fn invoke(&self, script: &str, args: &[PsValue]) -> Result<InvocationOutcome, String>;
}
