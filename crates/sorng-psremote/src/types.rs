//! Data model shared by the remoting core: values, sessions, invocations and
//! file transfer requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder used when a diagnostic carries neither detail nor exception text.
pub const NO_ERROR_MESSAGE: &str = "No error message available";

/// Target name reported for invocations that run on the caller's own host.
pub const LOCALHOST: &str = "localhost";

// ─── Values ──────────────────────────────────────────────────────────────────

/// A structured value passed to, or produced by, a PowerShell script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum PsValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Raw bytes; crosses the wire as `[byte[]]`.
    Bytes(Vec<u8>),
    List(Vec<PsValue>),
    /// Hashtable / PSCustomObject, keyed by property name.
    Record(BTreeMap<String, PsValue>),
}

impl PsValue {
    /// Map a JSON document (as produced by `ConvertTo-Json`) to a value.
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Record(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Text rendering used when output objects are joined into lines.
    pub fn to_line(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Bytes(b) => b.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(" "),
            Self::List(items) => items
                .iter()
                .map(|v| v.to_line())
                .collect::<Vec<_>>()
                .join(" "),
            Self::Record(map) => serde_json::to_string(map).unwrap_or_default(),
        }
    }
}

impl From<&str> for PsValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PsValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for PsValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for PsValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for PsValue {
    fn from(i: i32) -> Self {
        Self::Int(i as i64)
    }
}

impl From<f64> for PsValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<Vec<u8>> for PsValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for PsValue {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

/// An established remote shell, as handed out by a session provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSession {
    /// Provider-assigned identifier (the WinRM shell id for the WinRM provider).
    pub id: String,
    pub computer_name: String,
    pub opened_at: DateTime<Utc>,
}

/// Where a script invocation runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionHandle {
    /// The caller's own host, no session indirection.
    Local,
    Remote(RemoteSession),
}

impl SessionHandle {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }

    /// Address named in errors for this handle.
    pub fn target_name(&self) -> &str {
        match self {
            Self::Local => LOCALHOST,
            Self::Remote(session) => &session.computer_name,
        }
    }
}

// ─── Invocation ──────────────────────────────────────────────────────────────

/// A single entry from the error stream of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsErrorRecord {
    /// `ErrorRecord.ErrorDetails.Message`
    #[serde(default)]
    pub detail: Option<String>,
    /// `ErrorRecord.Exception.Message`
    #[serde(default)]
    pub exception: Option<String>,
    /// `ErrorRecord.FullyQualifiedErrorId`
    #[serde(default)]
    pub error_id: Option<String>,
}

impl PsErrorRecord {
    pub fn from_exception(message: impl Into<String>) -> Self {
        Self {
            exception: Some(message.into()),
            ..Default::default()
        }
    }

    /// Detail if present, else the exception text, else a fixed placeholder.
    pub fn message(&self) -> &str {
        fn non_empty(s: &Option<String>) -> Option<&str> {
            s.as_deref().filter(|m| !m.trim().is_empty())
        }
        non_empty(&self.detail)
            .or_else(|| non_empty(&self.exception))
            .unwrap_or(NO_ERROR_MESSAGE)
    }

    pub fn is_path_not_found(&self) -> bool {
        let id_match = self
            .error_id
            .as_deref()
            .map(|id| id.starts_with("PathNotFound"))
            .unwrap_or(false);
        id_match || self.message().contains("does not exist")
    }
}

/// Everything a provider collected from one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationOutcome {
    /// Output objects in emission order.
    pub output: Vec<PsValue>,
    /// Error stream entries in emission order.
    pub errors: Vec<PsErrorRecord>,
}

/// A script body, its positional arguments and the session to run it in.
#[derive(Debug, Clone)]
pub struct PsScriptInvocation<'a> {
    pub script: &'a str,
    pub arguments: Vec<PsValue>,
    pub session: &'a SessionHandle,
}

impl<'a> PsScriptInvocation<'a> {
    pub fn new(session: &'a SessionHandle, script: &'a str) -> Self {
        Self {
            script,
            arguments: Vec::new(),
            session,
        }
    }

    pub fn arg(mut self, value: impl Into<PsValue>) -> Self {
        self.arguments.push(value.into());
        self
    }

    pub fn args(mut self, values: impl IntoIterator<Item = PsValue>) -> Self {
        self.arguments.extend(values);
        self
    }
}

// ─── File Transfer ───────────────────────────────────────────────────────────

/// Parameters of a single file delivery.
#[derive(Clone, Copy)]
pub struct PsTransferRequest<'a> {
    pub remote_path: &'a str,
    pub contents: &'a [u8],
    /// Append to an existing file instead of creating it.
    pub append: bool,
    /// Replace an existing file.
    pub overwrite: bool,
    /// Payloads larger than this are sent in chunks.
    pub chunk_threshold: usize,
    pub chunk_size: usize,
}

impl std::fmt::Debug for PsTransferRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PsTransferRequest")
            .field("remote_path", &self.remote_path)
            .field("contents_len", &self.contents.len())
            .field("append", &self.append)
            .field("overwrite", &self.overwrite)
            .field("chunk_threshold", &self.chunk_threshold)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

/// Summary of a completed delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsTransferReport {
    pub remote_path: String,
    pub total_bytes: u64,
    pub chunk_count: usize,
    pub chunked: bool,
    /// Lowercase hex SHA-256 of the whole payload.
    pub checksum: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_keep_integer_precision() {
        assert_eq!(PsValue::from_json(json!(42)), PsValue::Int(42));
        assert_eq!(PsValue::from_json(json!(1.5)), PsValue::Float(1.5));
    }

    #[test]
    fn json_objects_become_records() {
        let value = PsValue::from_json(json!({"Name": "svc", "Running": true, "Ids": [1, 2]}));
        let PsValue::Record(map) = value else {
            panic!("expected record");
        };
        assert_eq!(map["Name"], PsValue::from("svc"));
        assert_eq!(map["Running"], PsValue::Bool(true));
        assert_eq!(map["Ids"], PsValue::List(vec![PsValue::Int(1), PsValue::Int(2)]));
    }

    #[test]
    fn error_message_prefers_detail_then_exception() {
        let both = PsErrorRecord {
            detail: Some("detail".into()),
            exception: Some("exception".into()),
            error_id: None,
        };
        assert_eq!(both.message(), "detail");

        let blank_detail = PsErrorRecord {
            detail: Some("  ".into()),
            exception: Some("exception".into()),
            error_id: None,
        };
        assert_eq!(blank_detail.message(), "exception");

        assert_eq!(PsErrorRecord::default().message(), NO_ERROR_MESSAGE);
    }

    #[test]
    fn path_not_found_detection() {
        let by_id = PsErrorRecord {
            error_id: Some("PathNotFound,Microsoft.PowerShell.Commands.GetItemCommand".into()),
            ..Default::default()
        };
        assert!(by_id.is_path_not_found());
        assert!(PsErrorRecord::from_exception("Path WSMan:\\x does not exist.").is_path_not_found());
        assert!(!PsErrorRecord::from_exception("Access is denied.").is_path_not_found());
    }

    #[test]
    fn local_handle_reports_localhost() {
        assert_eq!(SessionHandle::Local.target_name(), LOCALHOST);
        let remote = SessionHandle::Remote(RemoteSession {
            id: "abc".into(),
            computer_name: "srv01".into(),
            opened_at: Utc::now(),
        });
        assert_eq!(remote.target_name(), "srv01");
        assert!(!remote.is_local());
    }
}
