//! Script marshalling shared by the local and WinRM hosts.
//!
//! A script invocation travels as two pieces:
//!
//! - a short bootstrap passed with `-EncodedCommand` that reads standard input,
//! - the wrapper script, base64-encoded UTF-8 on standard input.
//!
//! The wrapper runs the caller's body as a script block with positional
//! arguments and tags every pipeline object on the way out:
//! `J:<json>` / `B:<base64>` lines on stdout for output objects and
//! `E:<json>` lines on stderr for error records. [`parse_streams`] turns those
//! streams back into an [`InvocationOutcome`].

use crate::types::{InvocationOutcome, PsErrorRecord, PsValue};
use base64::Engine;
use log::{debug, trace};
use serde::Deserialize;

const OUTPUT_TAG: &str = "J:";
const BYTES_TAG: &str = "B:";
const ERROR_TAG: &str = "E:";

pub const CLIXML_HEADER: &str = "#< CLIXML";

/// Reads the wrapper from stdin and runs it.
const BOOTSTRAP: &str = "$ProgressPreference = 'SilentlyContinue'; \
$__in = [Console]::In.ReadToEnd(); \
$__text = [System.Text.Encoding]::UTF8.GetString([System.Convert]::FromBase64String($__in.Trim())); \
& ([ScriptBlock]::Create($__text))";

const WRAPPER_PRELUDE: &str = r#"$ErrorActionPreference = 'Continue'
$ProgressPreference = 'SilentlyContinue'
[Console]::OutputEncoding = New-Object System.Text.UTF8Encoding $false
function __Emit-Error($record) {
    $detail = $null
    if ($record.ErrorDetails) { $detail = $record.ErrorDetails.Message }
    $exception = $null
    if ($record.Exception) { $exception = $record.Exception.Message } else { $exception = "$record" }
    $entry = @{ detail = $detail; exception = $exception; errorId = $record.FullyQualifiedErrorId }
    [Console]::Error.WriteLine('E:' + (ConvertTo-Json -InputObject $entry -Compress))
}
function __Emit-Output($item) {
    if ($item -is [System.Management.Automation.ErrorRecord]) {
        __Emit-Error $item
    } elseif ($item -is [byte[]]) {
        [Console]::Out.WriteLine('B:' + [System.Convert]::ToBase64String($item))
    } else {
        [Console]::Out.WriteLine('J:' + (ConvertTo-Json -InputObject $item -Compress -Depth 4))
    }
}
"#;

// ─── Script construction ─────────────────────────────────────────────────────

/// Quote a string as a PowerShell single-quoted literal.
pub fn ps_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        // PowerShell also treats the typographic single quotes as delimiters.
        if matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
            out.push(c);
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Render a value as a PowerShell expression.
pub fn ps_literal(value: &PsValue) -> String {
    match value {
        PsValue::Null => "$null".to_string(),
        PsValue::Bool(true) => "$true".to_string(),
        PsValue::Bool(false) => "$false".to_string(),
        PsValue::Int(i) => i.to_string(),
        PsValue::Float(f) if f.is_nan() => "[double]::NaN".to_string(),
        PsValue::Float(f) if f.is_infinite() && *f > 0.0 => {
            "[double]::PositiveInfinity".to_string()
        }
        PsValue::Float(f) if f.is_infinite() => "[double]::NegativeInfinity".to_string(),
        PsValue::Float(f) => format!("{:?}", f),
        PsValue::String(s) => ps_quote(s),
        PsValue::Bytes(bytes) => format!(
            "([byte[]][System.Convert]::FromBase64String('{}'))",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ),
        PsValue::List(items) => {
            let items: Vec<String> = items.iter().map(ps_literal).collect();
            format!("@({})", items.join(", "))
        }
        PsValue::Record(map) => {
            let items: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{} = {}", ps_quote(k), ps_literal(v)))
                .collect();
            format!("@{{{}}}", items.join("; "))
        }
    }
}

/// Build the wrapper that runs `body` with `args` bound positionally.
pub fn build_wrapper(body: &str, args: &[PsValue]) -> String {
    let mut script = String::from(WRAPPER_PRELUDE);
    script.push_str("try {\n    $__sb = [ScriptBlock]::Create(");
    script.push_str(&ps_quote(body));
    script.push_str(")\n    & $__sb");
    for arg in args {
        script.push_str(" (");
        script.push_str(&ps_literal(arg));
        script.push(')');
    }
    script.push_str(" 2>&1 | ForEach-Object { __Emit-Output $_ }\n} catch {\n    __Emit-Error $_\n}\n");
    script
}

/// Standard-input payload for a wrapper script.
pub fn encode_stdin(wrapper: &str) -> String {
    let mut encoded = base64::engine::general_purpose::STANDARD.encode(wrapper.as_bytes());
    encoded.push_str("\r\n");
    encoded
}

/// UTF-16LE base64, as `-EncodedCommand` expects.
pub fn encode_command(script: &str) -> String {
    let utf16: Vec<u8> = script
        .encode_utf16()
        .flat_map(|c| c.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(utf16)
}

/// Command-line arguments for `powershell.exe` / `pwsh` running the bootstrap.
pub fn powershell_arguments() -> Vec<String> {
    vec![
        "-NoLogo".to_string(),
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-EncodedCommand".to_string(),
        encode_command(BOOTSTRAP),
    ]
}

// ─── Stream decoding ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaggedError {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    exception: Option<String>,
    #[serde(default)]
    error_id: Option<String>,
}

/// Decode the stdout/stderr of a wrapper run.
pub fn parse_streams(stdout: &str, stderr: &str) -> InvocationOutcome {
    trace!("stdout: {}", stdout);
    trace!("stderr: {}", stderr);

    let mut outcome = InvocationOutcome::default();

    for line in lines(stdout) {
        if let Some(json) = line.strip_prefix(OUTPUT_TAG) {
            match serde_json::from_str::<serde_json::Value>(json) {
                Ok(value) => outcome.output.push(PsValue::from_json(value)),
                Err(_) => outcome.output.push(PsValue::String(json.to_string())),
            }
        } else if let Some(encoded) = line.strip_prefix(BYTES_TAG) {
            match base64::engine::general_purpose::STANDARD.decode(encoded) {
                Ok(bytes) => outcome.output.push(PsValue::Bytes(bytes)),
                Err(e) => outcome.errors.push(PsErrorRecord::from_exception(format!(
                    "Undecodable byte output: {}",
                    e
                ))),
            }
        } else {
            // Host output that bypassed the pipeline (Write-Host and friends).
            outcome.output.push(PsValue::String(line.to_string()));
        }
    }

    for line in lines(stderr) {
        if let Some(json) = line.strip_prefix(ERROR_TAG) {
            match serde_json::from_str::<TaggedError>(json) {
                Ok(e) => outcome.errors.push(PsErrorRecord {
                    detail: e.detail,
                    exception: e.exception,
                    error_id: e.error_id,
                }),
                Err(_) => outcome.errors.push(PsErrorRecord::from_exception(json)),
            }
        } else if line.starts_with(CLIXML_HEADER) {
            continue;
        } else if line.starts_with("<Objs") {
            if let Some(message) = clixml_error_text(line) {
                outcome.errors.push(PsErrorRecord::from_exception(message));
            }
        } else {
            outcome.errors.push(PsErrorRecord::from_exception(line));
        }
    }

    debug!(
        "Decoded {} output object(s), {} error record(s)",
        outcome.output.len(),
        outcome.errors.len()
    );
    outcome
}

fn lines(stream: &str) -> impl Iterator<Item = &str> {
    stream
        .trim_start_matches('\u{feff}')
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
}

/// Join the `<S S="Error">` segments of a CLIXML document; progress records
/// and other streams are dropped.
fn clixml_error_text(xml: &str) -> Option<String> {
    const OPEN: &str = "<S S=\"Error\">";
    let mut message = String::new();
    let mut pos = 0;
    while let Some(start) = xml[pos..].find(OPEN) {
        let body_start = pos + start + OPEN.len();
        let Some(len) = xml[body_start..].find("</S>") else {
            break;
        };
        message.push_str(&clixml_unescape(&xml[body_start..body_start + len]));
        pos = body_start + len;
    }
    let message = message.trim().to_string();
    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}

fn clixml_unescape(s: &str) -> String {
    s.replace("_x000D__x000A_", "\n")
        .replace("_x000A_", "\n")
        .replace("_x000D_", "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
