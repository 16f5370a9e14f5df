//! Target endpoint configuration.

use crate::error::{PsRemoteError, PsRemoteResult};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

// ─── Transport Protocol ──────────────────────────────────────────────────────

/// Transport used to reach the WinRM listener.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PsTransportProtocol {
    /// WinRM over HTTP (port 5985)
    #[default]
    Http,
    /// WinRM over HTTPS (port 5986)
    Https,
}

impl PsTransportProtocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 5985,
            Self::Https => 5986,
        }
    }

    fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

// ─── Session Options ─────────────────────────────────────────────────────────

/// Options negotiated for every remote session.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PsSessionOptions {
    /// Per-invocation timeout in seconds (0 = none)
    #[serde(default)]
    pub operation_timeout_sec: u32,
    /// Remote shell idle timeout in seconds (default: 1200, i.e. 20 minutes)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_sec: u32,
    /// Connection open timeout in seconds
    #[serde(default = "default_open_timeout")]
    pub open_timeout_sec: u32,
    /// Locale sent with every WS-Man request
    #[serde(default = "default_culture")]
    pub culture: String,
}

fn default_idle_timeout() -> u32 {
    1200
}
fn default_open_timeout() -> u32 {
    180
}
fn default_culture() -> String {
    "en-US".to_string()
}

impl Default for PsSessionOptions {
    fn default() -> Self {
        Self {
            operation_timeout_sec: 0,
            idle_timeout_sec: default_idle_timeout(),
            open_timeout_sec: default_open_timeout(),
            culture: default_culture(),
        }
    }
}

impl PsSessionOptions {
    /// Longest a single invocation may block: the operation timeout when
    /// set, otherwise the idle timeout.
    pub fn invocation_deadline(&self) -> std::time::Duration {
        let secs = if self.operation_timeout_sec > 0 {
            self.operation_timeout_sec
        } else {
            self.idle_timeout_sec
        };
        std::time::Duration::from_secs(u64::from(secs))
    }
}

// ─── Target Endpoint ─────────────────────────────────────────────────────────

/// A single managed host plus everything needed to reach it.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsRemoteTarget {
    /// Hostname or IP address, as listed in TrustedHosts
    pub address: String,
    pub username: String,
    pub password: SecretString,
    /// Add the address to TrustedHosts for each operation and remove it afterwards
    #[serde(default)]
    pub manage_trusted_hosts: bool,
    /// Payloads above this size are sent in chunks
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub transport: PsTransportProtocol,
    /// Listener port (defaults based on transport)
    #[serde(default)]
    pub port: Option<u16>,
    /// Accept self-signed certificates on HTTPS listeners
    #[serde(default)]
    pub skip_ca_check: bool,
    #[serde(default)]
    pub session_options: PsSessionOptions,
}

fn default_chunk_threshold() -> usize {
    150_000
}
fn default_chunk_size() -> usize {
    100_000
}

impl fmt::Debug for PsRemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PsRemoteTarget")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("manage_trusted_hosts", &self.manage_trusted_hosts)
            .field("chunk_threshold", &self.chunk_threshold)
            .field("chunk_size", &self.chunk_size)
            .field("transport", &self.transport)
            .field("port", &self.port)
            .finish()
    }
}

impl PsRemoteTarget {
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password: SecretString::new(password.into()),
            manage_trusted_hosts: false,
            chunk_threshold: default_chunk_threshold(),
            chunk_size: default_chunk_size(),
            transport: PsTransportProtocol::default(),
            port: None,
            skip_ca_check: false,
            session_options: PsSessionOptions::default(),
        }
    }

    pub fn with_trusted_host_management(mut self, enabled: bool) -> Self {
        self.manage_trusted_hosts = enabled;
        self
    }

    pub fn with_chunking(mut self, threshold: usize, chunk_size: usize) -> Self {
        self.chunk_threshold = threshold;
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_transport(mut self, transport: PsTransportProtocol, port: Option<u16>) -> Self {
        self.transport = transport;
        self.port = port;
        self
    }

    /// Parse and validate a JSON target description.
    pub fn from_json_str(json: &str) -> PsRemoteResult<Self> {
        let target: Self = serde_json::from_str(json).map_err(|e| {
            PsRemoteError::invalid_argument(format!("Invalid target configuration: {}", e))
        })?;
        target.validate()?;
        Ok(target)
    }

    /// Read a JSON target description from disk.
    pub async fn load(path: impl AsRef<Path>) -> PsRemoteResult<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            PsRemoteError::invalid_argument(format!(
                "Failed to read target configuration '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> PsRemoteResult<()> {
        if self.address.trim().is_empty() {
            return Err(PsRemoteError::invalid_argument("Target address is empty"));
        }
        if self.chunk_size == 0 {
            return Err(PsRemoteError::invalid_argument(
                "Chunk size must be greater than zero",
            ));
        }
        self.endpoint_url()?;
        Ok(())
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.transport.default_port())
    }

    /// Full WinRM endpoint, e.g. `http://srv01:5985/wsman`.
    pub fn endpoint_url(&self) -> PsRemoteResult<url::Url> {
        let host = if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        };
        let raw = format!(
            "{}://{}:{}/wsman",
            self.transport.scheme(),
            host,
            self.effective_port()
        );
        url::Url::parse(&raw).map_err(|e| {
            PsRemoteError::invalid_argument(format!("Invalid endpoint '{}': {}", raw, e))
        })
    }

    pub(crate) fn password(&self) -> &str {
        self.password.expose_secret()
    }
}
