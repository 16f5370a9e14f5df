//! WinRM SOAP/HTTP transport and the session provider built on it.
//!
//! Each remote session is one WinRM `cmd` shell. An invocation starts
//! `powershell.exe` with the encoded bootstrap inside that shell, streams the
//! wrapped script through stdin, polls Receive until the command reports
//! `Done`, then terminates the command.

use crate::config::{PsRemoteTarget, PsSessionOptions};
use crate::marshal;
use crate::provider::RemoteSessionProvider;
use crate::types::{InvocationOutcome, PsValue, RemoteSession};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use log::{debug, error, info, trace, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// WS-Man OperationTimeout for every request; Receive long-polls this long.
const WSMAN_OPERATION_TIMEOUT_SEC: u64 = 60;

/// Raw stdin bytes per Send message, kept well under the default 500 KB envelope.
const STDIN_PIECE_BYTES: usize = 120_000;

const SHELL_RESOURCE_URI: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";
const SIGNAL_TERMINATE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate";
const COMMAND_STATE_DONE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done";

/// WinRM SOAP actions used by the shell protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WsManAction {
    Create,
    Delete,
    Command,
    Receive,
    Send,
    Signal,
}

impl WsManAction {
    fn uri(&self) -> &'static str {
        match self {
            Self::Create => "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create",
            Self::Delete => "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete",
            Self::Command => "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command",
            Self::Receive => "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive",
            Self::Send => "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Send",
            Self::Signal => "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal",
        }
    }
}

/// WinRM SOAP namespaces.
struct WsManNamespace;

impl WsManNamespace {
    const SOAP: &'static str = "http://www.w3.org/2003/05/soap-envelope";
    const ADDRESSING: &'static str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
    const WSMAN: &'static str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
    const SHELL: &'static str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell";
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// One authenticated HTTP channel to a WinRM listener.
pub struct WinRmTransport {
    client: reqwest::Client,
    endpoint: String,
    auth_header: String,
    /// ISO 8601 duration
    operation_timeout: String,
    locale: String,
    request_counter: u64,
}

/// Result of a single Receive poll.
#[derive(Debug, Default, PartialEq)]
pub struct ReceiveChunk {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub done: bool,
}

impl WinRmTransport {
    pub fn new(target: &PsRemoteTarget) -> Result<Self, String> {
        let endpoint = target.endpoint_url().map_err(String::from)?.to_string();

        let mut client_builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(WSMAN_OPERATION_TIMEOUT_SEC + 30))
            .connect_timeout(Duration::from_secs(u64::from(
                target.session_options.open_timeout_sec,
            )));
        if target.skip_ca_check {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }
        let client = client_builder
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint,
            auth_header: basic_auth_header(&target.username, target.password()),
            operation_timeout: format!("PT{}S", WSMAN_OPERATION_TIMEOUT_SEC),
            locale: target.session_options.culture.clone(),
            request_counter: 0,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST an envelope, returning the status and body without judging either.
    async fn post(&mut self, soap_body: String) -> Result<(reqwest::StatusCode, String), String> {
        self.request_counter += 1;
        let req_id = self.request_counter;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/soap+xml;charset=UTF-8"),
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&self.auth_header)
                .map_err(|e| format!("Invalid auth header: {}", e))?,
        );

        debug!(
            "WinRM request #{} to {} ({} bytes)",
            req_id,
            self.endpoint,
            soap_body.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .body(soap_body)
            .send()
            .await
            .map_err(|e| format!("WinRM HTTP request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read WinRM response body: {}", e))?;
        trace!("WinRM response #{}: status={}, body:\n{}", req_id, status, body);
        Ok((status, body))
    }

    /// POST an envelope and fail on any non-success status.
    async fn send_message(&mut self, soap_body: String) -> Result<String, String> {
        let (status, body) = self.post(soap_body).await?;
        if !status.is_success() {
            let fault = parse_soap_fault(&body).unwrap_or_else(|| body.clone());
            error!("WinRM request failed: {} - {}", status, fault);
            return Err(format!("WinRM error (HTTP {}): {}", status, fault));
        }
        Ok(body)
    }

    fn header(&self, action: WsManAction, shell_id: Option<&str>) -> String {
        build_soap_header(
            action,
            &self.endpoint,
            &Uuid::new_v4().to_string(),
            shell_id,
            &self.operation_timeout,
            &self.locale,
        )
    }

    // ─── Shell Management ────────────────────────────────────────────────

    /// Create a `cmd` shell that the server reaps after `idle_timeout_sec`.
    pub async fn create_shell(&mut self, idle_timeout_sec: u32) -> Result<String, String> {
        let header = self.header(WsManAction::Create, None);
        let envelope = wrap_envelope(&header, &build_shell_body(idle_timeout_sec));
        let response = self.send_message(envelope).await?;
        let shell_id = extract_shell_id(&response)
            .ok_or_else(|| "WinRM Create response carried no ShellId".to_string())?;
        debug!("Created WinRM shell: {}", shell_id);
        Ok(shell_id)
    }

    pub async fn delete_shell(&mut self, shell_id: &str) -> Result<(), String> {
        let header = self.header(WsManAction::Delete, Some(shell_id));
        self.send_message(wrap_envelope(&header, "")).await?;
        debug!("Deleted WinRM shell: {}", shell_id);
        Ok(())
    }

    /// Start a command within a shell and return the command ID.
    pub async fn execute_command(
        &mut self,
        shell_id: &str,
        command: &str,
        arguments: &[String],
    ) -> Result<String, String> {
        let header = self.header(WsManAction::Command, Some(shell_id));
        let envelope = wrap_envelope(&header, &build_command_body(command, arguments));
        let response = self.send_message(envelope).await?;
        let command_id = extract_command_id(&response)
            .ok_or_else(|| "WinRM Command response carried no CommandId".to_string())?;
        debug!("Started command {} in shell {}", command_id, shell_id);
        Ok(command_id)
    }

    /// Feed stdin to a running command.
    pub async fn send_input(
        &mut self,
        shell_id: &str,
        command_id: &str,
        data: &[u8],
        end_of_stream: bool,
    ) -> Result<(), String> {
        let header = self.header(WsManAction::Send, Some(shell_id));
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        let envelope = wrap_envelope(
            &header,
            &build_send_body(command_id, &encoded, end_of_stream),
        );
        self.send_message(envelope).await?;
        Ok(())
    }

    /// One Receive poll. A WS-Man `TimedOut` fault means "nothing yet".
    pub async fn receive_output(
        &mut self,
        shell_id: &str,
        command_id: &str,
    ) -> Result<ReceiveChunk, String> {
        let header = self.header(WsManAction::Receive, Some(shell_id));
        let envelope = wrap_envelope(&header, &build_receive_body(command_id));
        let (status, body) = self.post(envelope).await?;
        if status.is_success() {
            return Ok(parse_receive_response(&body));
        }
        if is_timed_out_fault(&body) {
            trace!("Receive poll timed out for command {}", command_id);
            return Ok(ReceiveChunk::default());
        }
        let fault = parse_soap_fault(&body).unwrap_or(body);
        Err(format!("WinRM error (HTTP {}): {}", status, fault))
    }

    /// Poll until the command completes, returning (stdout, stderr).
    pub async fn receive_all_output(
        &mut self,
        shell_id: &str,
        command_id: &str,
    ) -> Result<(String, String), String> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        loop {
            let chunk = self.receive_output(shell_id, command_id).await?;
            stdout.extend_from_slice(&chunk.stdout);
            stderr.extend_from_slice(&chunk.stderr);
            if chunk.done {
                break;
            }
        }
        Ok((
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }

    pub async fn signal_command(
        &mut self,
        shell_id: &str,
        command_id: &str,
        signal_code: &str,
    ) -> Result<(), String> {
        let header = self.header(WsManAction::Signal, Some(shell_id));
        let envelope = wrap_envelope(&header, &build_signal_body(command_id, signal_code));
        self.send_message(envelope).await?;
        debug!(
            "Sent signal {} to command {} in shell {}",
            signal_code, command_id, shell_id
        );
        Ok(())
    }
}

fn basic_auth_header(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}

// ─── Session Provider ────────────────────────────────────────────────────────

/// [`RemoteSessionProvider`] over WinRM shells.
#[derive(Default)]
pub struct WinRmSessionProvider {
    sessions: Mutex<HashMap<String, Arc<Mutex<WinRmTransport>>>>,
}

impl WinRmSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    async fn transport_for(&self, session: &RemoteSession) -> Result<Arc<Mutex<WinRmTransport>>, String> {
        self.sessions
            .lock()
            .await
            .get(&session.id)
            .cloned()
            .ok_or_else(|| format!("Session '{}' is not open", session.id))
    }
}

#[async_trait]
impl RemoteSessionProvider for WinRmSessionProvider {
    async fn open(
        &self,
        target: &PsRemoteTarget,
        options: &PsSessionOptions,
    ) -> Result<RemoteSession, String> {
        let mut transport = WinRmTransport::new(target)?;
        info!("Opening WinRM shell on {}", transport.endpoint());
        let shell_id = transport.create_shell(options.idle_timeout_sec).await?;

        self.sessions
            .lock()
            .await
            .insert(shell_id.clone(), Arc::new(Mutex::new(transport)));

        Ok(RemoteSession {
            id: shell_id,
            computer_name: target.address.clone(),
            opened_at: Utc::now(),
        })
    }

    async fn invoke(
        &self,
        session: &RemoteSession,
        script: &str,
        args: &[PsValue],
    ) -> Result<InvocationOutcome, String> {
        let transport = self.transport_for(session).await?;
        let stdin = marshal::encode_stdin(&marshal::build_wrapper(script, args));
        let mut t = transport.lock().await;

        let command_id = t
            .execute_command(&session.id, "powershell.exe", &marshal::powershell_arguments())
            .await?;

        let pieces: Vec<&[u8]> = stdin.as_bytes().chunks(STDIN_PIECE_BYTES).collect();
        let last = pieces.len().saturating_sub(1);
        for (i, piece) in pieces.iter().enumerate() {
            t.send_input(&session.id, &command_id, piece, i == last).await?;
        }

        let (stdout, stderr) = t.receive_all_output(&session.id, &command_id).await?;
        if let Err(e) = t
            .signal_command(&session.id, &command_id, SIGNAL_TERMINATE)
            .await
        {
            warn!("Failed to terminate command {}: {}", command_id, e);
        }

        Ok(marshal::parse_streams(&stdout, &stderr))
    }

    async fn close(&self, session: &RemoteSession) -> Result<(), String> {
        let transport = self
            .sessions
            .lock()
            .await
            .remove(&session.id)
            .ok_or_else(|| format!("Session '{}' is not open", session.id))?;
        let mut t = transport.lock().await;
        t.delete_shell(&session.id).await
    }
}

// ─── SOAP Envelope Builders ──────────────────────────────────────────────────

fn build_soap_header(
    action: WsManAction,
    endpoint: &str,
    message_id: &str,
    shell_id: Option<&str>,
    timeout: &str,
    locale: &str,
) -> String {
    let mut header = format!(
        r#"<s:Header>
      <a:To>{endpoint}</a:To>
      <a:Action s:mustUnderstand="true">{action}</a:Action>
      <w:ResourceURI s:mustUnderstand="true">{resource}</w:ResourceURI>
      <a:MessageID>uuid:{message_id}</a:MessageID>
      <a:ReplyTo>
        <a:Address s:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address>
      </a:ReplyTo>
      <w:MaxEnvelopeSize s:mustUnderstand="true">512000</w:MaxEnvelopeSize>
      <w:Locale xml:lang="{locale}" s:mustUnderstand="false"/>
      <w:OperationTimeout>{timeout}</w:OperationTimeout>"#,
        endpoint = xml_escape(endpoint),
        action = action.uri(),
        resource = SHELL_RESOURCE_URI,
        message_id = message_id,
        locale = xml_escape(locale),
        timeout = timeout,
    );
    if let Some(sid) = shell_id {
        header.push_str(&format!(
            r#"
      <w:SelectorSet>
        <w:Selector Name="ShellId">{}</w:Selector>
      </w:SelectorSet>"#,
            xml_escape(sid)
        ));
    }
    header.push_str("\n    </s:Header>");
    header
}

fn wrap_envelope(header: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{soap}" xmlns:a="{addr}" xmlns:w="{wsman}" xmlns:rsp="{shell}">
    {header}
    <s:Body>
      {body}
    </s:Body>
</s:Envelope>"#,
        soap = WsManNamespace::SOAP,
        addr = WsManNamespace::ADDRESSING,
        wsman = WsManNamespace::WSMAN,
        shell = WsManNamespace::SHELL,
        header = header,
        body = body,
    )
}

fn build_shell_body(idle_timeout_sec: u32) -> String {
    format!(
        r#"<rsp:Shell>
        <rsp:InputStreams>stdin</rsp:InputStreams>
        <rsp:OutputStreams>stdout stderr</rsp:OutputStreams>
        <rsp:IdleTimeOut>PT{idle}S</rsp:IdleTimeOut>
      </rsp:Shell>"#,
        idle = idle_timeout_sec,
    )
}

fn build_command_body(command: &str, arguments: &[String]) -> String {
    let args_xml: String = arguments
        .iter()
        .map(|a| format!("<rsp:Arguments>{}</rsp:Arguments>", xml_escape(a)))
        .collect::<Vec<_>>()
        .join("\n        ");
    format!(
        r#"<rsp:CommandLine>
        <rsp:Command>{command}</rsp:Command>
        {args}
      </rsp:CommandLine>"#,
        command = xml_escape(command),
        args = args_xml,
    )
}

fn build_receive_body(command_id: &str) -> String {
    format!(
        r#"<rsp:Receive>
        <rsp:DesiredStream CommandId="{}">stdout stderr</rsp:DesiredStream>
      </rsp:Receive>"#,
        xml_escape(command_id),
    )
}

fn build_send_body(command_id: &str, encoded_data: &str, end_of_stream: bool) -> String {
    let end_attr = if end_of_stream { r#" End="true""# } else { "" };
    format!(
        r#"<rsp:Send>
        <rsp:Stream Name="stdin" CommandId="{command_id}"{end}>{data}</rsp:Stream>
      </rsp:Send>"#,
        command_id = xml_escape(command_id),
        end = end_attr,
        data = encoded_data,
    )
}

fn build_signal_body(command_id: &str, signal_code: &str) -> String {
    format!(
        r#"<rsp:Signal CommandId="{command_id}">
        <rsp:Code>{signal}</rsp:Code>
      </rsp:Signal>"#,
        command_id = xml_escape(command_id),
        signal = signal_code,
    )
}

// ─── Response Parsers ────────────────────────────────────────────────────────

/// Text of the first `<name>` / `<prefix:name>` element.
fn element_text<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    let mut from = 0;
    while let Some(pos) = response[from..].find(name) {
        let at = from + pos;
        from = at + name.len();
        let Some(lt) = response[..at].rfind('<') else {
            continue;
        };
        let prefix = &response[lt + 1..at];
        let is_open_tag = (prefix.is_empty() || prefix.ends_with(':'))
            && !prefix.contains(|c: char| c.is_whitespace() || c == '/' || c == '>');
        let rest = &response[from..];
        if !is_open_tag || !(rest.starts_with('>') || rest.starts_with(' ')) {
            continue;
        }
        let open_end = from + rest.find('>')?;
        if response[..open_end].ends_with('/') {
            return Some("");
        }
        let text_start = open_end + 1;
        let text_end = text_start + response[text_start..].find('<')?;
        return Some(response[text_start..text_end].trim());
    }
    None
}

fn attribute_value<'a>(response: &'a str, attribute: &str) -> Option<&'a str> {
    let pattern = format!("{}=\"", attribute);
    let start = response.find(&pattern)? + pattern.len();
    let end = start + response[start..].find('"')?;
    Some(&response[start..end])
}

fn extract_shell_id(response: &str) -> Option<String> {
    element_text(response, "ShellId")
        .or_else(|| attribute_value(response, "ShellId"))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn extract_command_id(response: &str) -> Option<String> {
    element_text(response, "CommandId")
        .or_else(|| attribute_value(response, "CommandId"))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Decode the stdout/stderr streams and the completion flag of a Receive response.
pub fn parse_receive_response(response: &str) -> ReceiveChunk {
    let mut chunk = ReceiveChunk::default();
    extract_stream_data(response, "stdout", &mut chunk.stdout);
    extract_stream_data(response, "stderr", &mut chunk.stderr);
    chunk.done = response.contains(&format!("State=\"{}\"", COMMAND_STATE_DONE));
    chunk
}

fn extract_stream_data(response: &str, stream_name: &str, output: &mut Vec<u8>) {
    let pattern = format!("Name=\"{}\"", stream_name);
    let mut search_from = 0;
    while let Some(attr_pos) = response[search_from..].find(&pattern) {
        let abs_pos = search_from + attr_pos;
        let Some(gt_pos) = response[abs_pos..].find('>') else {
            break;
        };
        // Self-closing stream elements (End="true" with no data).
        if response[..abs_pos + gt_pos].ends_with('/') {
            search_from = abs_pos + gt_pos;
            continue;
        }
        let data_start = abs_pos + gt_pos + 1;
        let Some(end_pos) = response[data_start..].find("</") else {
            break;
        };
        let encoded = response[data_start..data_start + end_pos].trim();
        if !encoded.is_empty() {
            match base64::engine::general_purpose::STANDARD.decode(encoded) {
                Ok(decoded) => output.extend_from_slice(&decoded),
                Err(e) => warn!("Dropping undecodable {} block: {}", stream_name, e),
            }
        }
        search_from = data_start + end_pos;
    }
}

fn is_timed_out_fault(response: &str) -> bool {
    response.contains("w:TimedOut") || response.contains("Code=\"2150858793\"")
}

/// Human-readable text of a SOAP fault.
pub fn parse_soap_fault(response: &str) -> Option<String> {
    if let Some(message) = element_text(response, "Message") {
        if !message.is_empty() {
            return Some(message.to_string());
        }
    }
    if let Some(text) = element_text(response, "Text") {
        return Some(text.to_string());
    }
    element_text(response, "faultstring").map(str::to_string)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    #[test]
    fn shell_id_from_create_response() {
        let response = r#"<s:Envelope><s:Body><rsp:Shell><rsp:ShellId>9A153F8A-4D4D-4A2E-A1C8-2E3A9A4C6D12</rsp:ShellId><rsp:ResourceUri>x</rsp:ResourceUri></rsp:Shell></s:Body></s:Envelope>"#;
        assert_eq!(
            extract_shell_id(response).as_deref(),
            Some("9A153F8A-4D4D-4A2E-A1C8-2E3A9A4C6D12")
        );
    }

    #[test]
    fn command_id_from_command_response() {
        let response = r#"<s:Body><rsp:CommandResponse><rsp:CommandId>77D1B8F2-1111-2222-3333-444455556666</rsp:CommandId></rsp:CommandResponse></s:Body>"#;
        assert_eq!(
            extract_command_id(response).as_deref(),
            Some("77D1B8F2-1111-2222-3333-444455556666")
        );
    }

    #[test]
    fn receive_response_concatenates_blocks() {
        let response = format!(
            r#"<rsp:ReceiveResponse>
<rsp:Stream Name="stdout" CommandId="C1">{}</rsp:Stream>
<rsp:Stream Name="stdout" CommandId="C1">{}</rsp:Stream>
<rsp:Stream Name="stderr" CommandId="C1">{}</rsp:Stream>
<rsp:Stream Name="stdout" CommandId="C1" End="true"/>
<rsp:CommandState CommandId="C1" State="{}"><rsp:ExitCode>0</rsp:ExitCode></rsp:CommandState>
</rsp:ReceiveResponse>"#,
            b64("J:1\r\n"),
            b64("J:2\r\n"),
            b64("E:{}\r\n"),
            COMMAND_STATE_DONE
        );
        let chunk = parse_receive_response(&response);
        assert_eq!(chunk.stdout, b"J:1\r\nJ:2\r\n");
        assert_eq!(chunk.stderr, b"E:{}\r\n");
        assert!(chunk.done);
    }

    #[test]
    fn running_command_is_not_done() {
        let response = r#"<rsp:CommandState CommandId="C1" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Running"/>"#;
        assert!(!parse_receive_response(response).done);
    }

    #[test]
    fn soap_fault_message() {
        let fault = r#"<s:Fault><s:Code><s:Value>s:Receiver</s:Value></s:Code><s:Reason><s:Text xml:lang="en-US">The request failed.</s:Text></s:Reason><s:Detail><f:WSManFault Code="5" Machine="srv"><f:Message>Access is denied. </f:Message></f:WSManFault></s:Detail></s:Fault>"#;
        assert_eq!(parse_soap_fault(fault).as_deref(), Some("Access is denied."));
        assert!(!is_timed_out_fault(fault));

        let timed_out = r#"<s:Subcode><s:Value>w:TimedOut</s:Value></s:Subcode>"#;
        assert!(is_timed_out_fault(timed_out));
    }

    #[test]
    fn send_body_marks_end_of_stream() {
        let body = build_send_body("C1", "QUJD", true);
        assert!(body.contains(r#"CommandId="C1" End="true">QUJD</rsp:Stream>"#));
        assert!(!build_send_body("C1", "QUJD", false).contains("End="));
    }

    #[test]
    fn command_arguments_are_escaped() {
        let body = build_command_body("powershell.exe", &["-X".into(), "a<b".into()]);
        assert!(body.contains("<rsp:Arguments>a&lt;b</rsp:Arguments>"));
    }

    #[test]
    fn header_selects_shell_and_timeout() {
        let header = build_soap_header(
            WsManAction::Receive,
            "http://srv:5985/wsman",
            "m-1",
            Some("S1"),
            "PT60S",
            "en-US",
        );
        assert!(header.contains(WsManAction::Receive.uri()));
        assert!(header.contains(r#"<w:Selector Name="ShellId">S1</w:Selector>"#));
        assert!(header.contains("<w:OperationTimeout>PT60S</w:OperationTimeout>"));
        assert!(header.contains(SHELL_RESOURCE_URI));
    }

    #[test]
    fn shell_body_carries_idle_timeout() {
        assert!(build_shell_body(1200).contains("PT1200S"));
    }

    #[test]
    fn basic_header_encodes_credentials() {
        assert_eq!(basic_auth_header("user", "pass"), "Basic dXNlcjpwYXNz");
    }
}
