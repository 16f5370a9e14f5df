//! Operations bound to one remote target.

use crate::config::PsRemoteTarget;
use crate::error::PsRemoteResult;
use crate::execution::PsScriptExecutor;
use crate::local::LocalPowerShell;
use crate::provider::{LocalScriptHost, RemoteSessionProvider};
use crate::scripts::PsScriptTemplates;
use crate::session::PsSessionLifecycle;
use crate::transfer::{self, PsFileTransfer};
use crate::transport::WinRmSessionProvider;
use crate::trusted_hosts::TrustedPeerRegistry;
use crate::types::{PsScriptInvocation, PsTransferReport, PsTransferRequest, PsValue, SessionHandle};
use log::info;
use std::sync::Arc;

/// Separator used when folding command output into one string.
pub const LINE_SEPARATOR: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// Remote (and local) PowerShell operations against a single target.
///
/// Every remote call negotiates its own session and tears it down before
/// returning; nothing is pooled between calls.
#[derive(Clone)]
pub struct PsRemoteHost {
    target: Arc<PsRemoteTarget>,
    lifecycle: PsSessionLifecycle,
    executor: PsScriptExecutor,
}

impl PsRemoteHost {
    pub fn new(
        target: PsRemoteTarget,
        provider: Arc<dyn RemoteSessionProvider>,
        local: Arc<dyn LocalScriptHost>,
        registry: TrustedPeerRegistry,
    ) -> PsRemoteResult<Self> {
        target.validate()?;
        let deadline = target.session_options.invocation_deadline();
        let target = Arc::new(target);
        Ok(Self {
            lifecycle: PsSessionLifecycle::new(target.clone(), provider.clone(), registry),
            executor: PsScriptExecutor::new(provider, local).with_deadline(deadline),
            target,
        })
    }

    /// WinRM transport, local `powershell.exe`/`pwsh`, and the process-wide
    /// trusted-host registry.
    pub fn connect(target: PsRemoteTarget) -> PsRemoteResult<Self> {
        Self::new(
            target,
            Arc::new(WinRmSessionProvider::new()),
            Arc::new(LocalPowerShell::default()),
            TrustedPeerRegistry::shared(),
        )
    }

    pub fn target(&self) -> &PsRemoteTarget {
        &self.target
    }

    /// Restart the remote computer.
    pub async fn reboot(&self, force: bool) -> PsRemoteResult<()> {
        info!("Rebooting {} (force={})", self.target.address, force);
        let executor = &self.executor;
        self.lifecycle
            .run(move |handle| async move {
                executor
                    .execute(
                        &PsScriptInvocation::new(&handle, PsScriptTemplates::RESTART_COMPUTER)
                            .arg(force),
                    )
                    .await
                    .map(|_| ())
            })
            .await
    }

    /// Write `contents` to `remote_path`, chunking large payloads, and
    /// verify the result by checksum.
    pub async fn send_file(
        &self,
        remote_path: &str,
        contents: &[u8],
        appended: bool,
        overwrite: bool,
    ) -> PsRemoteResult<PsTransferReport> {
        let request = PsTransferRequest {
            remote_path,
            contents,
            append: appended,
            overwrite,
            chunk_threshold: self.target.chunk_threshold,
            chunk_size: self.target.chunk_size,
        };
        transfer::validate(&request)?;

        let executor = &self.executor;
        self.lifecycle
            .run(move |handle| async move {
                PsFileTransfer::new(executor).send(&request, &handle).await
            })
            .await
    }

    /// Run a script body remotely with positional parameters.
    pub async fn run_script(
        &self,
        script: &str,
        parameters: Vec<PsValue>,
    ) -> PsRemoteResult<Vec<PsValue>> {
        let executor = &self.executor;
        self.lifecycle
            .run(move |handle| async move {
                executor
                    .execute(&PsScriptInvocation::new(&handle, script).args(parameters))
                    .await
            })
            .await
    }

    /// Run a script body on this machine.
    pub async fn run_script_local(
        &self,
        script: &str,
        parameters: Vec<PsValue>,
    ) -> PsRemoteResult<Vec<PsValue>> {
        self.executor
            .execute(&PsScriptInvocation::new(&SessionHandle::Local, script).args(parameters))
            .await
    }

    /// Run `command` through `cmd.exe` remotely and return its output lines
    /// joined into one string.
    pub async fn run_command(&self, command: &str, parameters: &[String]) -> PsRemoteResult<String> {
        let line = PsScriptTemplates::command_line(command, parameters);
        let executor = &self.executor;
        self.lifecycle
            .run(move |handle| async move {
                let output = executor
                    .execute(
                        &PsScriptInvocation::new(&handle, PsScriptTemplates::RUN_COMMAND_LINE)
                            .arg(line),
                    )
                    .await?;
                Ok(join_lines(&output))
            })
            .await
    }

    pub async fn run_command_local(
        &self,
        command: &str,
        parameters: &[String],
    ) -> PsRemoteResult<String> {
        let line = PsScriptTemplates::command_line(command, parameters);
        let output = self
            .executor
            .execute(
                &PsScriptInvocation::new(&SessionHandle::Local, PsScriptTemplates::RUN_COMMAND_LINE)
                    .arg(line),
            )
            .await?;
        Ok(join_lines(&output))
    }
}

fn join_lines(output: &[PsValue]) -> String {
    output
        .iter()
        .map(PsValue::to_line)
        .collect::<Vec<_>>()
        .join(LINE_SEPARATOR)
}
