//! # SortOfRemote NG – PowerShell Remoting Core
//!
//! Runs PowerShell on remote Windows hosts over WinRM (or on this machine)
//! and moves files there. Provides:
//!
//! - **Trusted hosts** – process-wide, lock-serialised edits of the WinRM
//!   client's TrustedHosts list, with optional per-operation auto-trust
//! - **Sessions** – one fresh session per operation, always closed again
//! - **Script execution** – positional arguments, structured output values,
//!   error-stream records promoted to failures
//! - **File transfer** – single or chunked writes followed by a SHA-256
//!   comparison of the remote file
//! - **Operations** – reboot, send file, run script and run command, remote
//!   or local

pub mod types;
pub mod error;
pub mod config;
pub mod checksum;
pub mod scripts;
pub mod marshal;
pub mod provider;
pub mod local;
pub mod transport;
pub mod trusted_hosts;
pub mod execution;
pub mod session;
pub mod transfer;
pub mod service;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{PsRemoteTarget, PsSessionOptions, PsTransportProtocol};
pub use error::{PsRemoteError, PsRemoteErrorKind, PsRemoteResult};
pub use service::PsRemoteHost;
pub use trusted_hosts::{add_trusted_peer, list_trusted_peers, remove_trusted_peer, TrustedPeerRegistry};
pub use types::{PsTransferReport, PsValue};
