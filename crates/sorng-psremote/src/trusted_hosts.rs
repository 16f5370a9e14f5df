//! Trusted-peer registry.
//!
//! The WinRM client only opens sessions to hosts listed in
//! `WSMan:\localhost\Client\TrustedHosts`, a comma-joined string shared by
//! every process on the machine. [`TrustedPeerRegistry`] serialises each
//! read-modify-write of that list behind one async lock; all registries
//! obtained through [`TrustedPeerRegistry::shared`] share the same lock.

use crate::error::{PsRemoteError, PsRemoteResult};
use crate::execution;
use crate::local::LocalPowerShell;
use crate::provider::LocalScriptHost;
use crate::scripts::PsScriptTemplates;
use crate::types::{PsErrorRecord, PsValue, LOCALHOST};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, info};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

lazy_static! {
    /// Process-wide registry backed by the machine's WSMan configuration.
    static ref SHARED_REGISTRY: TrustedPeerRegistry = TrustedPeerRegistry::new(
        WsManTrustedHostsStore::new(Arc::new(LocalPowerShell::default()))
    );
}

// ─── Stores ──────────────────────────────────────────────────────────────────

/// Backing storage for the raw TrustedHosts value.
#[async_trait]
pub trait TrustedHostsStore: Send + Sync {
    /// The raw comma-joined value, or `None` when the setting does not exist.
    async fn read(&self) -> PsRemoteResult<Option<String>>;

    /// Replace the value. An empty set is written as an explicit `""`.
    async fn write(&self, value: &str) -> PsRemoteResult<()>;
}

/// Reads and writes `WSMan:\localhost\Client\TrustedHosts` through local PowerShell.
pub struct WsManTrustedHostsStore {
    host: Arc<dyn LocalScriptHost>,
}

impl WsManTrustedHostsStore {
    pub fn new(host: Arc<dyn LocalScriptHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl TrustedHostsStore for WsManTrustedHostsStore {
    async fn read(&self) -> PsRemoteResult<Option<String>> {
        let script = PsScriptTemplates::GET_TRUSTED_HOSTS;
        let outcome = self
            .host
            .invoke(script, &[])
            .await
            .map_err(|e| PsRemoteError::remote_execution(LOCALHOST, script, e))?;

        if outcome.errors.iter().any(PsErrorRecord::is_path_not_found) {
            debug!("TrustedHosts setting does not exist; treating as empty");
            return Ok(None);
        }

        let output = execution::into_result(outcome, script, LOCALHOST)?;
        Ok(Some(
            output.first().map(PsValue::to_line).unwrap_or_default(),
        ))
    }

    async fn write(&self, value: &str) -> PsRemoteResult<()> {
        let script = PsScriptTemplates::SET_TRUSTED_HOSTS;
        let outcome = self
            .host
            .invoke(script, &[PsValue::String(value.to_string())])
            .await
            .map_err(|e| PsRemoteError::remote_execution(LOCALHOST, script, e))?;
        execution::into_result(outcome, script, LOCALHOST)?;
        Ok(())
    }
}

/// In-process store, for tests and for callers that manage trust elsewhere.
#[derive(Debug, Default)]
pub struct MemoryTrustedHostsStore {
    value: StdMutex<Option<String>>,
    writes: StdMutex<Vec<String>>,
}

impl MemoryTrustedHostsStore {
    /// A store whose setting does not exist yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: StdMutex::new(Some(value.into())),
            writes: StdMutex::new(Vec::new()),
        }
    }

    /// Every value written so far, oldest first.
    pub fn writes(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl TrustedHostsStore for MemoryTrustedHostsStore {
    async fn read(&self) -> PsRemoteResult<Option<String>> {
        Ok(self.value.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn write(&self, value: &str) -> PsRemoteResult<()> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(value.to_string());
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(value.to_string());
        Ok(())
    }
}

#[async_trait]
impl<S: TrustedHostsStore + ?Sized> TrustedHostsStore for Arc<S> {
    async fn read(&self) -> PsRemoteResult<Option<String>> {
        (**self).read().await
    }

    async fn write(&self, value: &str) -> PsRemoteResult<()> {
        (**self).write(value).await
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

struct RegistryInner {
    store: Box<dyn TrustedHostsStore>,
    guard: Mutex<()>,
}

/// Ordered, de-duplicated set of trusted peer addresses.
///
/// Cloning shares the underlying store and lock.
#[derive(Clone)]
pub struct TrustedPeerRegistry {
    inner: Arc<RegistryInner>,
}

impl TrustedPeerRegistry {
    pub fn new(store: impl TrustedHostsStore + 'static) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store: Box::new(store),
                guard: Mutex::new(()),
            }),
        }
    }

    /// Registry over an empty [`MemoryTrustedHostsStore`].
    pub fn in_memory() -> Self {
        Self::new(MemoryTrustedHostsStore::new())
    }

    /// The process-wide registry backed by WSMan.
    pub fn shared() -> Self {
        SHARED_REGISTRY.clone()
    }

    pub async fn list(&self) -> PsRemoteResult<Vec<String>> {
        let _guard = self.inner.guard.lock().await;
        self.read_locked().await
    }

    pub async fn contains(&self, address: &str) -> PsRemoteResult<bool> {
        Ok(contains(&self.list().await?, address))
    }

    /// Add `address`; returns `false` if it was already present.
    pub async fn add(&self, address: &str) -> PsRemoteResult<bool> {
        let _guard = self.inner.guard.lock().await;
        self.add_locked(address).await
    }

    /// Remove `address`; returns `false` if it was absent.
    pub async fn remove(&self, address: &str) -> PsRemoteResult<bool> {
        let address = address.trim();
        let _guard = self.inner.guard.lock().await;
        let mut peers = self.read_locked().await?;
        if !contains(&peers, address) {
            debug!("'{}' not in trusted hosts; nothing to remove", address);
            return Ok(false);
        }
        peers.retain(|p| !p.eq_ignore_ascii_case(address));
        self.inner.store.write(&join_peers(&peers)).await?;
        info!("Removed '{}' from trusted hosts", address);
        Ok(true)
    }

    /// Optionally add `address`, then report whether it is trusted, all
    /// under one hold of the lock.
    pub async fn admit(&self, address: &str, auto_add: bool) -> PsRemoteResult<bool> {
        let _guard = self.inner.guard.lock().await;
        if auto_add {
            self.add_locked(address).await?;
        }
        Ok(contains(&self.read_locked().await?, address))
    }

    async fn read_locked(&self) -> PsRemoteResult<Vec<String>> {
        Ok(self
            .inner
            .store
            .read()
            .await?
            .map(|raw| parse_peers(&raw))
            .unwrap_or_default())
    }

    async fn add_locked(&self, address: &str) -> PsRemoteResult<bool> {
        let address = address.trim();
        if address.is_empty() || address.contains(',') {
            return Err(PsRemoteError::invalid_argument(format!(
                "'{}' is not a valid trusted host entry",
                address
            )));
        }
        let mut peers = self.read_locked().await?;
        if contains(&peers, address) {
            debug!("'{}' already in trusted hosts", address);
            return Ok(false);
        }
        peers.push(address.to_string());
        self.inner.store.write(&join_peers(&peers)).await?;
        info!("Added '{}' to trusted hosts", address);
        Ok(true)
    }
}

fn contains(peers: &[String], address: &str) -> bool {
    let address = address.trim();
    peers.iter().any(|p| p.eq_ignore_ascii_case(address))
}

/// Split a raw TrustedHosts value, keeping first occurrences in order.
pub fn parse_peers(raw: &str) -> Vec<String> {
    let mut peers: Vec<String> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if !contains(&peers, entry) {
            peers.push(entry.to_string());
        }
    }
    peers
}

pub fn join_peers(peers: &[String]) -> String {
    peers.join(",")
}

// ─── Process-wide operations ─────────────────────────────────────────────────

pub async fn add_trusted_peer(address: &str) -> PsRemoteResult<()> {
    TrustedPeerRegistry::shared().add(address).await.map(|_| ())
}

pub async fn remove_trusted_peer(address: &str) -> PsRemoteResult<()> {
    TrustedPeerRegistry::shared().remove(address).await.map(|_| ())
}

pub async fn list_trusted_peers() -> PsRemoteResult<Vec<String>> {
    TrustedPeerRegistry::shared().list().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InvocationOutcome;

    fn registry_with(store: Arc<MemoryTrustedHostsStore>) -> TrustedPeerRegistry {
        TrustedPeerRegistry::new(store)
    }

    #[test]
    fn parse_trims_and_dedups() {
        assert_eq!(
            parse_peers(" srv01 ,10.0.0.5,, SRV01,host.corp "),
            vec!["srv01", "10.0.0.5", "host.corp"]
        );
        assert!(parse_peers("").is_empty());
    }

    #[tokio::test]
    async fn missing_setting_lists_empty() {
        let registry = TrustedPeerRegistry::in_memory();
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let store = Arc::new(MemoryTrustedHostsStore::with_value("existing"));
        let registry = registry_with(store.clone());

        assert!(registry.add("srv01").await.unwrap());
        assert!(!registry.add("srv01").await.unwrap());
        assert!(!registry.add("SRV01").await.unwrap());

        assert_eq!(registry.list().await.unwrap(), vec!["existing", "srv01"]);
        assert_eq!(store.writes(), vec!["existing,srv01"]);
    }

    #[tokio::test]
    async fn remove_absent_is_noop() {
        let store = Arc::new(MemoryTrustedHostsStore::with_value("a,b"));
        let registry = registry_with(store.clone());
        assert!(!registry.remove("c").await.unwrap());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn padded_address_is_removed_like_it_was_added() {
        let store = Arc::new(MemoryTrustedHostsStore::with_value("other"));
        let registry = registry_with(store.clone());
        assert!(registry.add(" srv01 ").await.unwrap());
        assert!(registry.remove(" srv01 ").await.unwrap());
        assert_eq!(registry.list().await.unwrap(), vec!["other".to_string()]);
        assert_eq!(
            store.writes(),
            vec!["other,srv01".to_string(), "other".to_string()]
        );
    }

    #[tokio::test]
    async fn removing_last_peer_writes_explicit_empty() {
        let store = Arc::new(MemoryTrustedHostsStore::with_value("srv01"));
        let registry = registry_with(store.clone());
        assert!(registry.remove("srv01").await.unwrap());
        assert_eq!(store.writes(), vec![String::new()]);
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn admit_without_auto_add_only_checks() {
        let store = Arc::new(MemoryTrustedHostsStore::new());
        let registry = registry_with(store.clone());
        assert!(!registry.admit("srv01", false).await.unwrap());
        assert!(store.writes().is_empty());
        assert!(registry.admit("srv01", true).await.unwrap());
        assert!(registry.contains("srv01").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_comma_entries() {
        let registry = TrustedPeerRegistry::in_memory();
        let err = registry.add("a,b").await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn concurrent_adds_all_land() {
        let store = Arc::new(MemoryTrustedHostsStore::new());
        let registry = registry_with(store.clone());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.add(&format!("host{}", i)).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.list().await.unwrap().len(), 16);
    }

    struct ScriptedHost {
        read: InvocationOutcome,
        seen: StdMutex<Vec<(String, Vec<PsValue>)>>,
    }

    #[async_trait]
    impl LocalScriptHost for ScriptedHost {
        async fn invoke(&self, script: &str, args: &[PsValue]) -> Result<InvocationOutcome, String> {
            self.seen
                .lock()
                .unwrap()
                .push((script.to_string(), args.to_vec()));
            if script == PsScriptTemplates::GET_TRUSTED_HOSTS {
                Ok(self.read.clone())
            } else {
                Ok(InvocationOutcome::default())
            }
        }
    }

    #[tokio::test]
    async fn wsman_store_maps_path_not_found_to_none() {
        let host = Arc::new(ScriptedHost {
            read: InvocationOutcome {
                output: vec![],
                errors: vec![PsErrorRecord {
                    error_id: Some("PathNotFound,Microsoft.PowerShell.Commands.GetItemCommand".into()),
                    ..Default::default()
                }],
            },
            seen: StdMutex::new(Vec::new()),
        });
        let store = WsManTrustedHostsStore::new(host);
        assert_eq!(store.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn wsman_store_surfaces_other_errors() {
        let host = Arc::new(ScriptedHost {
            read: InvocationOutcome {
                output: vec![],
                errors: vec![PsErrorRecord::from_exception("Access is denied.")],
            },
            seen: StdMutex::new(Vec::new()),
        });
        let store = WsManTrustedHostsStore::new(host);
        let err = store.read().await.unwrap_err();
        assert!(err.is_remote_execution_failed());
        assert_eq!(err.message, "Access is denied.");
        assert_eq!(err.target.as_deref(), Some(LOCALHOST));
    }

    #[tokio::test]
    async fn wsman_store_writes_explicit_string() {
        let host = Arc::new(ScriptedHost {
            read: InvocationOutcome {
                output: vec![PsValue::from("srv01")],
                errors: vec![],
            },
            seen: StdMutex::new(Vec::new()),
        });
        let registry = TrustedPeerRegistry::new(WsManTrustedHostsStore::new(host.clone()));
        registry.remove("srv01").await.unwrap();

        let seen = host.seen.lock().unwrap();
        let (script, args) = seen.last().unwrap();
        assert_eq!(script, PsScriptTemplates::SET_TRUSTED_HOSTS);
        assert_eq!(args, &vec![PsValue::String(String::new())]);
    }
}
