//! Local PowerShell host.
//!
//! Spawns `powershell.exe` (Windows) or `pwsh` with the bootstrap from
//! [`crate::marshal`] and feeds the wrapped script through standard input, so
//! local runs decode exactly like remote ones.

use crate::marshal;
use crate::provider::LocalScriptHost;
use crate::types::{InvocationOutcome, PsErrorRecord, PsValue};
use async_trait::async_trait;
use log::{debug, trace, warn};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Raw result of one PowerShell process.
#[derive(Debug, Clone)]
pub struct PsOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl PsOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Decode the tagged streams; a failing exit with an empty error stream
    /// still yields one error record.
    pub fn into_outcome(self) -> InvocationOutcome {
        let mut outcome = marshal::parse_streams(&self.stdout, &self.stderr);
        if !self.success() && outcome.errors.is_empty() {
            outcome.errors.push(PsErrorRecord::from_exception(format!(
                "PowerShell exited with code {}",
                self.exit_code
            )));
        }
        outcome
    }
}

/// Runs scripts in a child PowerShell process on this machine.
#[derive(Debug, Clone)]
pub struct LocalPowerShell {
    powershell_path: String,
}

impl Default for LocalPowerShell {
    fn default() -> Self {
        let path = if cfg!(windows) { "powershell.exe" } else { "pwsh" };
        Self::new(path)
    }
}

impl LocalPowerShell {
    pub fn new(powershell_path: impl Into<String>) -> Self {
        Self {
            powershell_path: powershell_path.into(),
        }
    }

    pub fn powershell_path(&self) -> &str {
        &self.powershell_path
    }

    /// Run the wrapper for `script` and collect the raw streams.
    pub async fn run(&self, script: &str, args: &[PsValue]) -> Result<PsOutput, String> {
        let wrapper = marshal::build_wrapper(script, args);
        let stdin_payload = marshal::encode_stdin(&wrapper);
        debug!(
            "Local PS exec via {} ({} chars, {} arg(s))",
            self.powershell_path,
            script.len(),
            args.len()
        );

        let mut child = Command::new(&self.powershell_path)
            .args(marshal::powershell_arguments())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                format!(
                    "Failed to spawn PowerShell process '{}': {}",
                    self.powershell_path, e
                )
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(stdin_payload.as_bytes())
                .await
                .map_err(|e| format!("Failed to write script to PowerShell: {}", e))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| format!("Failed to close PowerShell input: {}", e))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("PowerShell process failed: {}", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        trace!(
            "PS stdout ({} bytes): {}",
            stdout.len(),
            stdout.chars().take(300).collect::<String>()
        );
        if !stderr.is_empty() {
            warn!("PS stderr: {}", stderr.chars().take(500).collect::<String>());
        }

        Ok(PsOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

#[async_trait]
impl LocalScriptHost for LocalPowerShell {
    async fn invoke(&self, script: &str, args: &[PsValue]) -> Result<InvocationOutcome, String> {
        Ok(self.run(script, args).await?.into_outcome())
    }
}
