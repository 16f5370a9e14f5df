//! Script execution engine.
//!
//! Routes an invocation to the local host or the open remote session, bounds
//! it with a deadline, and turns any error-stream content into
//! [`PsRemoteErrorKind::RemoteExecutionFailed`](crate::error::PsRemoteErrorKind).

use crate::error::{PsRemoteError, PsRemoteResult};
use crate::provider::{LocalScriptHost, RemoteSessionProvider};
use crate::types::{InvocationOutcome, PsErrorRecord, PsScriptInvocation, PsValue, SessionHandle};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    static ref WRITE_HOST: Regex = Regex::new(r"(?i)write-host").expect("valid regex");
}

/// Replace the first `Write-Host` (any casing) with `Write-Output`.
///
/// Only the first occurrence is rewritten; later ones are left as written.
pub fn rewrite_interactive_output(script: &str) -> Cow<'_, str> {
    WRITE_HOST.replacen(script, 1, "Write-Output")
}

/// Fail with every error record joined by newlines, or pass the output through.
pub fn into_result(
    outcome: InvocationOutcome,
    script: &str,
    target: &str,
) -> PsRemoteResult<Vec<PsValue>> {
    if outcome.errors.is_empty() {
        return Ok(outcome.output);
    }
    let message = outcome
        .errors
        .iter()
        .map(PsErrorRecord::message)
        .collect::<Vec<_>>()
        .join("\n");
    Err(PsRemoteError::remote_execution(target, script, message))
}

/// Runs script invocations against local or remote sessions.
#[derive(Clone)]
pub struct PsScriptExecutor {
    provider: Arc<dyn RemoteSessionProvider>,
    local: Arc<dyn LocalScriptHost>,
    deadline: Option<Duration>,
}

impl PsScriptExecutor {
    pub fn new(provider: Arc<dyn RemoteSessionProvider>, local: Arc<dyn LocalScriptHost>) -> Self {
        Self {
            provider,
            local,
            deadline: None,
        }
    }

    /// Abandon any single invocation that runs longer than `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Run one invocation and return its output objects in emission order.
    pub async fn execute(&self, invocation: &PsScriptInvocation<'_>) -> PsRemoteResult<Vec<PsValue>> {
        let script = rewrite_interactive_output(invocation.script);
        let target = invocation.session.target_name();
        debug!(
            "Executing script on {} ({} chars, {} arg(s))",
            target,
            script.len(),
            invocation.arguments.len()
        );

        let call = async {
            match invocation.session {
                SessionHandle::Local => self.local.invoke(&script, &invocation.arguments).await,
                SessionHandle::Remote(session) => {
                    self.provider
                        .invoke(session, &script, &invocation.arguments)
                        .await
                }
            }
        };

        let result = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, call).await.map_err(|_| {
                PsRemoteError::remote_execution(
                    target,
                    invocation.script,
                    format!("Invocation timed out after {}s", deadline.as_secs()),
                )
            })?,
            None => call.await,
        };

        let outcome =
            result.map_err(|e| PsRemoteError::remote_execution(target, invocation.script, e))?;
        into_result(outcome, invocation.script, target)
    }
}
