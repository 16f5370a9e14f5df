//! Script bodies run by the composite operations.
//!
//! Every template takes its inputs as positional `param(...)` arguments so
//! nothing caller-supplied is spliced into script text.

/// Pre-built script templates.
pub struct PsScriptTemplates;

impl PsScriptTemplates {
    /// `($Path)`: fails when the destination already exists.
    pub const ASSERT_PATH_ABSENT: &'static str = r#"param([string]$Path)
if (Test-Path -LiteralPath $Path) {
    throw "Destination '$Path' already exists; pass overwrite or append to replace or extend it"
}"#;

    /// `($Path, $Bytes, $Append, $Overwrite)`: writes one block.
    ///
    /// Overwrite truncates before writing (also in append mode, so the first
    /// chunk of an overwriting transfer starts from an empty file). Append
    /// opens for append and creates the file if needed. Otherwise the file
    /// must not exist yet.
    pub const WRITE_FILE: &'static str = r#"param([string]$Path, [byte[]]$Bytes, [bool]$Append, [bool]$Overwrite)
$ErrorActionPreference = 'Stop'
$Path = $ExecutionContext.SessionState.Path.GetUnresolvedProviderPathFromPSPath($Path)
$parent = [System.IO.Path]::GetDirectoryName($Path)
if ($parent -and -not (Test-Path -LiteralPath $parent)) {
    New-Item -ItemType Directory -Path $parent -Force | Out-Null
}
if ($Overwrite) {
    $mode = [System.IO.FileMode]::Create
} elseif ($Append) {
    $mode = [System.IO.FileMode]::Append
} else {
    $mode = [System.IO.FileMode]::CreateNew
}
$stream = [System.IO.File]::Open($Path, $mode, [System.IO.FileAccess]::Write)
try {
    if ($null -ne $Bytes -and $Bytes.Length -gt 0) { $stream.Write($Bytes, 0, $Bytes.Length) }
} finally {
    $stream.Dispose()
}"#;

    /// `($Path, $Expected)`: re-hashes the file and reports a mismatch on
    /// the error stream.
    pub const VERIFY_CHECKSUM: &'static str = r#"param([string]$Path, [string]$Expected)
$actual = (Get-FileHash -LiteralPath $Path -Algorithm SHA256).Hash.ToLowerInvariant()
if ($actual -ne $Expected) {
    Write-Error "Checksum mismatch for '$Path': expected $Expected, found $actual"
}"#;

    /// `($Force)`
    pub const RESTART_COMPUTER: &'static str = r#"param([bool]$Force)
if ($Force) { Restart-Computer -Force } else { Restart-Computer }"#;

    /// `($CommandLine)`: runs a pre-quoted line through `cmd.exe`.
    ///
    /// The line travels in an environment variable so PowerShell never
    /// re-parses it.
    pub const RUN_COMMAND_LINE: &'static str = r#"param([string]$CommandLine)
$env:PSREMOTE_COMMAND_LINE = $CommandLine
cmd.exe /d /s /c --% "%PSREMOTE_COMMAND_LINE%""#;

    /// `()`: current TrustedHosts value.
    pub const GET_TRUSTED_HOSTS: &'static str =
        r#"(Get-Item -Path WSMan:\localhost\Client\TrustedHosts -ErrorAction Stop).Value"#;

    /// `($Value)`: replaces TrustedHosts; an empty string clears it.
    pub const SET_TRUSTED_HOSTS: &'static str = r#"param([string]$Value)
Set-Item -Path WSMan:\localhost\Client\TrustedHosts -Value $Value -Force -ErrorAction Stop"#;

    /// Quote `command` and each parameter as separate `cmd.exe` tokens.
    pub fn command_line(command: &str, parameters: &[String]) -> String {
        std::iter::once(command)
            .chain(parameters.iter().map(String::as_str))
            .map(cmd_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn cmd_quote(token: &str) -> String {
    format!("\"{}\"", token.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_quoted_independently() {
        let line = PsScriptTemplates::command_line(
            "ipconfig",
            &["/all".to_string(), "with space".to_string()],
        );
        assert_eq!(line, r#""ipconfig" "/all" "with space""#);
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        let line = PsScriptTemplates::command_line("echo", &["say \"hi\"".to_string()]);
        assert_eq!(line, r#""echo" "say ""hi""""#);
    }

    #[test]
    fn write_guard_checks_length_not_truthiness() {
        // A one-element array is falsy when its only byte is zero.
        assert!(PsScriptTemplates::WRITE_FILE.contains("$Bytes.Length -gt 0"));
        assert!(!PsScriptTemplates::WRITE_FILE.contains("if ($Bytes)"));
    }

    #[test]
    fn templates_take_positional_parameters() {
        for template in [
            PsScriptTemplates::ASSERT_PATH_ABSENT,
            PsScriptTemplates::WRITE_FILE,
            PsScriptTemplates::VERIFY_CHECKSUM,
            PsScriptTemplates::RESTART_COMPUTER,
            PsScriptTemplates::RUN_COMMAND_LINE,
            PsScriptTemplates::SET_TRUSTED_HOSTS,
        ] {
            assert!(template.starts_with("param("));
        }
    }
}
