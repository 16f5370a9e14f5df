use psremote_app::sorng_psremote::checksum;
use psremote_app::sorng_psremote::scripts::PsScriptTemplates;
use psremote_app::sorng_psremote::testing::FakeRemoteHost;
use psremote_app::sorng_psremote::trusted_hosts::{MemoryTrustedHostsStore, WsManTrustedHostsStore};
use psremote_app::*;
use rand::RngCore;
use std::io::Write;
use std::sync::Arc;

fn host(
    target: PsRemoteTarget,
    fake: &Arc<FakeRemoteHost>,
    registry: TrustedPeerRegistry,
) -> PsRemoteHost {
    PsRemoteHost::new(target, fake.clone(), fake.clone(), registry).unwrap()
}

fn trusted_registry(address: &str) -> TrustedPeerRegistry {
    TrustedPeerRegistry::new(MemoryTrustedHostsStore::with_value(address))
}

#[tokio::test]
async fn test_chunked_send_of_random_payload() {
    let fake = Arc::new(FakeRemoteHost::new());
    let target = PsRemoteTarget::new("srv01", "admin", "secret");
    assert_eq!(target.chunk_threshold, 150_000);
    assert_eq!(target.chunk_size, 100_000);
    let host = host(target, &fake, trusted_registry("srv01"));

    let mut payload = vec![0u8; 180_000];
    rand::thread_rng().fill_bytes(&mut payload);

    let report = host
        .send_file(r"C:\Temp\payload.bin", &payload, false, false)
        .await
        .unwrap();

    assert_eq!(fake.calls_to(PsScriptTemplates::ASSERT_PATH_ABSENT).len(), 1);
    let writes = fake.calls_to(PsScriptTemplates::WRITE_FILE);
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].args[1].as_bytes().unwrap().len(), 100_000);
    assert_eq!(writes[1].args[1].as_bytes().unwrap().len(), 80_000);
    assert_eq!(writes[0].args[2], PsValue::Bool(true));
    assert_eq!(writes[0].args[3], PsValue::Bool(false));
    assert_eq!(writes[1].args[2], PsValue::Bool(true));
    assert_eq!(writes[1].args[3], PsValue::Bool(false));

    let remote = fake.file(r"C:\Temp\payload.bin").unwrap();
    assert_eq!(checksum::digest(&remote), checksum::digest(&payload));
    assert_eq!(report.checksum, checksum::digest(&payload));
    assert_eq!(report.chunk_count, 2);
    assert_eq!(fake.open_sessions(), 0);
}

#[tokio::test]
async fn test_small_payload_round_trips() {
    let fake = Arc::new(FakeRemoteHost::new());
    let host = host(
        PsRemoteTarget::new("srv01", "admin", "secret"),
        &fake,
        trusted_registry("srv01"),
    );

    let payload = b"hello from the other side\r\n".to_vec();
    let report = host
        .send_file(r"C:\Temp\hello.txt", &payload, false, false)
        .await
        .unwrap();
    assert!(!report.chunked);
    assert_eq!(fake.file(r"C:\Temp\hello.txt").unwrap(), payload);
}

#[tokio::test]
async fn test_append_and_overwrite_rejected_before_session() {
    let fake = Arc::new(FakeRemoteHost::new());
    let host = host(
        PsRemoteTarget::new("srv01", "admin", "secret"),
        &fake,
        trusted_registry("srv01"),
    );

    let err = host
        .send_file(r"C:\Temp\x.bin", b"x", true, true)
        .await
        .unwrap_err();
    assert_eq!(err.kind, PsRemoteErrorKind::InvalidArgument);
    assert_eq!(fake.opened(), 0);
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_untrusted_target_fails_before_negotiation() {
    let fake = Arc::new(FakeRemoteHost::new());
    let host = host(
        PsRemoteTarget::new("srv02", "admin", "secret"),
        &fake,
        trusted_registry("srv01"),
    );

    let err = host.run_script("Get-Date", Vec::new()).await.unwrap_err();
    assert_eq!(err.kind, PsRemoteErrorKind::TrustedHostMissing);
    assert_eq!(fake.opened(), 0);
}

#[tokio::test]
async fn test_interactive_output_is_rerouted() {
    let fake = Arc::new(FakeRemoteHost::new());
    let host = host(
        PsRemoteTarget::new("srv01", "admin", "secret"),
        &fake,
        trusted_registry("srv01"),
    );

    host.run_script("Write-Host 'status: ok'", Vec::new())
        .await
        .unwrap();

    let calls = fake.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].script, "Write-Output 'status: ok'");
}

#[tokio::test]
async fn test_failed_open_leaves_nothing_behind() {
    let fake = Arc::new(FakeRemoteHost::new());
    fake.fail_open(true);
    let store = Arc::new(MemoryTrustedHostsStore::with_value("jump01"));
    let host = host(
        PsRemoteTarget::new("srv01", "admin", "secret").with_trusted_host_management(true),
        &fake,
        TrustedPeerRegistry::new(store.clone()),
    );

    let err = host.reboot(true).await.unwrap_err();
    assert_eq!(err.kind, PsRemoteErrorKind::RemoteExecutionFailed);
    assert!(err.message.contains("401"));
    assert!(fake.reboots().is_empty());
    assert_eq!(store.writes().last().map(String::as_str), Some("jump01"));
}

#[tokio::test]
async fn test_registry_add_is_idempotent_and_remove_tolerates_absent() {
    let fake = Arc::new(FakeRemoteHost::new());
    let registry = TrustedPeerRegistry::new(WsManTrustedHostsStore::new(fake.clone()));

    assert!(registry.list().await.unwrap().is_empty());
    assert!(registry.add("srv01").await.unwrap());
    assert!(!registry.add("srv01").await.unwrap());
    assert!(!registry.add("SRV01").await.unwrap());
    assert_eq!(registry.list().await.unwrap(), vec!["srv01".to_string()]);
    assert_eq!(fake.trusted_hosts().as_deref(), Some("srv01"));

    assert!(!registry.remove("never-added").await.unwrap());
    assert!(registry.remove("srv01").await.unwrap());
    assert_eq!(fake.trusted_hosts().as_deref(), Some(""));
    assert!(registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_registry_keeps_existing_entries_in_order() {
    let fake = Arc::new(FakeRemoteHost::new().with_trusted_hosts("jump01, SRV01 ,jump01"));
    let registry = TrustedPeerRegistry::new(WsManTrustedHostsStore::new(fake.clone()));

    assert_eq!(
        registry.list().await.unwrap(),
        vec!["jump01".to_string(), "SRV01".to_string()]
    );
    assert!(!registry.add("srv01").await.unwrap());
    assert!(registry.add("srv02").await.unwrap());
    assert_eq!(fake.trusted_hosts().as_deref(), Some("jump01,SRV01,srv02"));

    assert!(registry.remove(" srv01 ").await.unwrap());
    assert_eq!(fake.trusted_hosts().as_deref(), Some("jump01,srv02"));
}

#[tokio::test]
async fn test_concurrent_additions_are_all_kept() {
    let registry = TrustedPeerRegistry::in_memory();
    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.add(&format!("host{:02}", i)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(registry.list().await.unwrap().len(), 16);
}

#[tokio::test]
async fn test_connect_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"address":"srv01.corp","username":"admin","password":"secret","chunkSize":50000}}"#
    )
    .unwrap();

    let host = connect_from_file(file.path()).await.unwrap();
    assert_eq!(host.target().address, "srv01.corp");
    assert_eq!(host.target().chunk_size, 50_000);
    assert_eq!(host.target().chunk_threshold, 150_000);
    assert!(!host.target().manage_trusted_hosts);
}

#[tokio::test]
async fn test_connect_rejects_zero_chunk_size() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"address":"srv01","username":"admin","password":"secret","chunkSize":0}}"#
    )
    .unwrap();

    let err = connect_from_file(file.path()).await.err().unwrap();
    assert_eq!(err.kind, PsRemoteErrorKind::InvalidArgument);
}

#[test]
fn test_logging_installs_once() {
    assert!(init_logging("debug"));
    assert!(!init_logging("debug"));
}
