//! In-memory PowerShell host for tests.
//!
//! [`FakeRemoteHost`] plays both the remote session provider and the local
//! script host. It recognises the built-in script templates and applies them
//! to a simulated file system; any other script echoes its arguments back.

use crate::checksum;
use crate::config::{PsRemoteTarget, PsSessionOptions};
use crate::provider::{LocalScriptHost, RemoteSessionProvider};
use crate::scripts::PsScriptTemplates;
use crate::types::{InvocationOutcome, PsErrorRecord, PsValue, RemoteSession, LOCALHOST};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// One script invocation seen by the fake.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// `localhost` for local runs, the session's computer name otherwise.
    pub target: String,
    pub script: String,
    pub args: Vec<PsValue>,
}

#[derive(Debug, Default)]
struct FakeState {
    files: HashMap<String, Vec<u8>>,
    calls: Vec<RecordedCall>,
    open_sessions: HashSet<String>,
    command_output: Vec<String>,
    reboots: Vec<bool>,
    trusted_hosts: Option<String>,
}

/// Simulated Windows host.
#[derive(Debug, Default)]
pub struct FakeRemoteHost {
    state: Mutex<FakeState>,
    fail_open: AtomicBool,
    corrupt_writes: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

fn ok(output: Vec<PsValue>) -> Result<InvocationOutcome, String> {
    Ok(InvocationOutcome {
        output,
        errors: Vec::new(),
    })
}

fn failed(message: impl Into<String>) -> Result<InvocationOutcome, String> {
    Ok(InvocationOutcome {
        output: Vec::new(),
        errors: vec![PsErrorRecord::from_exception(message)],
    })
}

fn arg_str(args: &[PsValue], index: usize) -> String {
    args.get(index).map(PsValue::to_line).unwrap_or_default()
}

fn arg_bool(args: &[PsValue], index: usize) -> bool {
    matches!(args.get(index), Some(PsValue::Bool(true)))
}

impl FakeRemoteHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file before the test runs.
    pub fn with_file(self, path: &str, contents: &[u8]) -> Self {
        self.lock().files.insert(path.to_string(), contents.to_vec());
        self
    }

    /// Lines printed by any command run through `cmd.exe`.
    pub fn with_command_output(self, lines: &[&str]) -> Self {
        self.lock().command_output = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_trusted_hosts(self, value: &str) -> Self {
        self.lock().trusted_hosts = Some(value.to_string());
        self
    }

    /// Make every `open` fail with an authentication error.
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Flip the first byte of every non-empty write.
    pub fn corrupt_writes(&self, corrupt: bool) {
        self.corrupt_writes.store(corrupt, Ordering::SeqCst);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, script: &str) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.script == script)
            .cloned()
            .collect()
    }

    /// Force flag of every reboot requested so far.
    pub fn reboots(&self) -> Vec<bool> {
        self.lock().reboots.clone()
    }

    pub fn trusted_hosts(&self) -> Option<String> {
        self.lock().trusted_hosts.clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(&self, target: &str, script: &str, args: &[PsValue]) -> Result<InvocationOutcome, String> {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            target: target.to_string(),
            script: script.to_string(),
            args: args.to_vec(),
        });

        match script {
            PsScriptTemplates::ASSERT_PATH_ABSENT => {
                let path = arg_str(args, 0);
                if state.files.contains_key(&path) {
                    return failed(format!(
                        "Destination '{}' already exists; pass overwrite or append to replace or extend it",
                        path
                    ));
                }
                ok(Vec::new())
            }
            PsScriptTemplates::WRITE_FILE => {
                let path = arg_str(args, 0);
                let mut bytes = args
                    .get(1)
                    .and_then(PsValue::as_bytes)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default();
                let (append, overwrite) = (arg_bool(args, 2), arg_bool(args, 3));
                if self.corrupt_writes.load(Ordering::SeqCst) {
                    if let Some(first) = bytes.first_mut() {
                        *first ^= 0xff;
                    }
                }
                if !overwrite && !append && state.files.contains_key(&path) {
                    return failed(format!("The file '{}' already exists.", path));
                }
                let file = state.files.entry(path).or_default();
                if overwrite {
                    file.clear();
                }
                // Mirrors the template's length guard: only an empty block skips the write.
                if !bytes.is_empty() {
                    file.extend_from_slice(&bytes);
                }
                ok(Vec::new())
            }
            PsScriptTemplates::VERIFY_CHECKSUM => {
                let path = arg_str(args, 0);
                let expected = arg_str(args, 1);
                let Some(contents) = state.files.get(&path) else {
                    return Ok(InvocationOutcome {
                        output: Vec::new(),
                        errors: vec![PsErrorRecord {
                            detail: None,
                            exception: Some(format!("Cannot find path '{}' because it does not exist.", path)),
                            error_id: Some("PathNotFound,Get-FileHash".into()),
                        }],
                    });
                };
                if !checksum::matches(contents, &expected) {
                    return failed(format!(
                        "Checksum mismatch for '{}': expected {}, found {}",
                        path,
                        expected,
                        checksum::digest(contents)
                    ));
                }
                ok(Vec::new())
            }
            PsScriptTemplates::RESTART_COMPUTER => {
                state.reboots.push(arg_bool(args, 0));
                ok(Vec::new())
            }
            PsScriptTemplates::RUN_COMMAND_LINE => {
                let output = state
                    .command_output
                    .iter()
                    .map(|l| PsValue::String(l.clone()))
                    .collect();
                ok(output)
            }
            PsScriptTemplates::GET_TRUSTED_HOSTS => match &state.trusted_hosts {
                Some(value) => ok(vec![PsValue::String(value.clone())]),
                None => Ok(InvocationOutcome {
                    output: Vec::new(),
                    errors: vec![PsErrorRecord {
                        detail: None,
                        exception: Some("Cannot find path 'WSMan:\\localhost\\Client\\TrustedHosts' because it does not exist.".into()),
                        error_id: Some("PathNotFound,Microsoft.PowerShell.Commands.GetItemCommand".into()),
                    }],
                }),
            },
            PsScriptTemplates::SET_TRUSTED_HOSTS => {
                state.trusted_hosts = Some(arg_str(args, 0));
                ok(Vec::new())
            }
            _ if script.to_ascii_lowercase().contains("write-host") => {
                failed("Write-Host output is not captured by this host")
            }
            _ => ok(args.to_vec()),
        }
    }
}

#[async_trait]
impl RemoteSessionProvider for FakeRemoteHost {
    async fn open(
        &self,
        target: &PsRemoteTarget,
        _options: &PsSessionOptions,
    ) -> Result<RemoteSession, String> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err("WinRM error (HTTP 401 Unauthorized): Access is denied.".to_string());
        }
        let session = RemoteSession {
            id: uuid::Uuid::new_v4().to_string(),
            computer_name: target.address.clone(),
            opened_at: Utc::now(),
        };
        self.lock().open_sessions.insert(session.id.clone());
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(session)
    }

    async fn invoke(
        &self,
        session: &RemoteSession,
        script: &str,
        args: &[PsValue],
    ) -> Result<InvocationOutcome, String> {
        if !self.lock().open_sessions.contains(&session.id) {
            return Err(format!("Shell {} is not open", session.id));
        }
        self.run(&session.computer_name, script, args)
    }

    async fn close(&self, session: &RemoteSession) -> Result<(), String> {
        if !self.lock().open_sessions.remove(&session.id) {
            return Err(format!("Shell {} is not open", session.id));
        }
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl LocalScriptHost for FakeRemoteHost {
    async fn invoke(&self, script: &str, args: &[PsValue]) -> Result<InvocationOutcome, String> {
        self.run(LOCALHOST, script, args)
    }
}
