//! Error types for the PowerShell remoting core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest script excerpt carried inside an error.
const SCRIPT_EXCERPT_LEN: usize = 200;

/// Error kinds surfaced by remoting operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PsRemoteErrorKind {
    /// The target address is not in the host's trusted-peer list.
    TrustedHostMissing,
    /// A script, command, verification step or session negotiation
    /// reported a diagnostic.
    RemoteExecutionFailed,
    /// Contradictory flags or malformed parameters, detected before any
    /// remote interaction.
    InvalidArgument,
}

/// PowerShell remoting error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsRemoteError {
    pub kind: PsRemoteErrorKind,
    pub message: String,
    /// Address the failing operation was aimed at (`localhost` for local runs).
    #[serde(default)]
    pub target: Option<String>,
    /// Excerpt of the script or command that was being attempted.
    #[serde(default)]
    pub script: Option<String>,
}

impl fmt::Display for PsRemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(ref target) = self.target {
            write!(f, " (target: {})", target)?;
        }
        if let Some(ref script) = self.script {
            write!(f, " (script: {})", script)?;
        }
        Ok(())
    }
}

impl std::error::Error for PsRemoteError {}

impl PsRemoteError {
    pub fn new(kind: PsRemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            target: None,
            script: None,
        }
    }

    pub fn trusted_host_missing(address: &str) -> Self {
        Self {
            target: Some(address.to_string()),
            ..Self::new(
                PsRemoteErrorKind::TrustedHostMissing,
                format!(
                    "'{}' is not in the trusted hosts list; add it or enable trusted host management",
                    address
                ),
            )
        }
    }

    /// A failed invocation, naming the target and the attempted script.
    pub fn remote_execution(
        target: impl Into<String>,
        script: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target: Some(target.into()),
            script: Some(excerpt(script)),
            ..Self::new(PsRemoteErrorKind::RemoteExecutionFailed, message)
        }
    }

    /// A failure that happened outside any particular script, such as
    /// session negotiation.
    pub fn remote_failure(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::new(PsRemoteErrorKind::RemoteExecutionFailed, message)
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(PsRemoteErrorKind::InvalidArgument, message)
    }

    pub fn is_trusted_host_missing(&self) -> bool {
        self.kind == PsRemoteErrorKind::TrustedHostMissing
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.kind == PsRemoteErrorKind::InvalidArgument
    }

    pub fn is_remote_execution_failed(&self) -> bool {
        self.kind == PsRemoteErrorKind::RemoteExecutionFailed
    }
}

fn excerpt(script: &str) -> String {
    let trimmed = script.trim();
    if trimmed.chars().count() <= SCRIPT_EXCERPT_LEN {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(SCRIPT_EXCERPT_LEN).collect();
    cut.push_str("...");
    cut
}

/// Convert a `PsRemoteError` into a plain `String` for command returns.
impl From<PsRemoteError> for String {
    fn from(e: PsRemoteError) -> String {
        e.to_string()
    }
}

/// Convenience alias.
pub type PsRemoteResult<T> = Result<T, PsRemoteError>;
