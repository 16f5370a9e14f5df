//! Process-level entry points for the PowerShell remoting core.

pub use sorng_psremote;
pub use sorng_psremote::{
    add_trusted_peer, list_trusted_peers, remove_trusted_peer, PsRemoteError, PsRemoteErrorKind,
    PsRemoteHost, PsRemoteResult, PsRemoteTarget, PsTransferReport, PsValue, TrustedPeerRegistry,
};

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber; `log` records are forwarded to it.
///
/// `RUST_LOG` overrides `default_filter`. Returns `false` if a subscriber
/// was already installed.
pub fn init_logging(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("Logging initialised (default filter '{}')", default_filter);
    }
    installed
}

/// Load a JSON target description and connect it over WinRM.
pub async fn connect_from_file(path: impl AsRef<Path>) -> PsRemoteResult<PsRemoteHost> {
    let target = PsRemoteTarget::load(path).await?;
    log::info!(
        "Loaded target {} ({})",
        target.address,
        target.endpoint_url()?
    );
    PsRemoteHost::connect(target)
}
