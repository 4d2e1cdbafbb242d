//! Gateway-HTTP adapter: one stdin line becomes one HTTP POST.
//!
//! Requests are handled strictly one at a time. Every request that carries
//! an id gets exactly one line back on stdout: the gateway's JSON-RPC
//! response, or a synthetic error echoing the id. Raw HTTP failure text is
//! logged to stderr only.

use std::sync::Arc;
use std::time::Duration;

use mcpbridge_core::StreamDirection;
use mcpbridge_core::config::{BridgeSettings, ConfigError, ServerProfile};
use mcpbridge_core::error::{BridgeErrorKind, error_response_line};
use mcpbridge_core::filter::{LineDisposition, classify_line};
use mcpbridge_core::jsonrpc::{JsonRpcId, JsonRpcMessageKind, classify_jsonrpc, parse_id};
use serde_json::Value;
use tokio::io::{AsyncWriteExt, BufReader};

use crate::bridge::governor::{bounded_read_line, skip_line};
use crate::bridge::lifecycle::termination_signal;
use crate::client_io::{ClientIo, Diagnostics};
use crate::error::{BridgeError, FramingError};
use crate::monitor::Monitor;

/// Upper bound on TCP connect time, independent of the per-call timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Request-scoped failure: becomes one JSON-RPC error line.
type CallFailure = (BridgeErrorKind, String);

/// HTTP client bound to one gateway endpoint.
pub struct GatewayAdapter {
    server: String,
    endpoint: String,
    timeout: Duration,
    max_line_bytes: usize,
    client: reqwest::Client,
    monitor: Option<Arc<Monitor>>,
}

impl GatewayAdapter {
    /// Build the adapter for a `gateway-http` profile.
    ///
    /// # Errors
    ///
    /// `ConfigError::MissingGatewayUrl` when no base URL is configured, and
    /// `BridgeError::Gateway` when the HTTP client cannot be built.
    pub fn new(profile: &ServerProfile, settings: &BridgeSettings) -> Result<Self, BridgeError> {
        let base = settings
            .gateway_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingGatewayUrl {
                server: profile.name.clone(),
            })?;
        let endpoint = gateway_endpoint(base, &profile.name, &profile.gateway_path).map_err(
            |reason| BridgeError::Gateway {
                server: profile.name.clone(),
                reason,
            },
        )?;

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(settings.gateway_timeout))
            .build()
            .map_err(|e| BridgeError::Gateway {
                server: profile.name.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            server: profile.name.clone(),
            endpoint,
            timeout: settings.gateway_timeout,
            max_line_bytes: settings.stream_limit.bytes(),
            client,
            monitor: Monitor::start(&profile.name, &settings.monitor),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Serve the client until stdin EOF or a termination signal.
    ///
    /// Returns 0 on a clean end and 1 when the client's streams fail.
    pub async fn run(&self, io: ClientIo) -> i32 {
        let server = self.server.as_str();
        let ClientIo {
            input,
            mut output,
            diagnostics,
        } = io;
        let diagnostics = Diagnostics::new(diagnostics);
        let mut reader = BufReader::new(input);
        let mut line = Vec::new();
        let mut code = 0;

        let signal = termination_signal();
        tokio::pin!(signal);

        tracing::info!(server, endpoint = %self.endpoint, "gateway session started");

        loop {
            line.clear();
            let read = tokio::select! {
                biased;
                _ = &mut signal => break,
                result = bounded_read_line(&mut reader, &mut line, self.max_line_bytes) => result,
            };

            match read {
                Ok(0) => {
                    tracing::info!(server, "client closed stdin");
                    break;
                }
                Ok(_) => {}
                Err(FramingError::MessageTooLarge { max_bytes, .. }) => {
                    skip_line(&mut reader).await;
                    diagnostics
                        .tagged(server, &format!("request over {max_bytes} bytes skipped"))
                        .await;
                    continue;
                }
                Err(FramingError::Io(e)) => {
                    tracing::error!(server, error = %e, "reading client stdin failed");
                    code = 1;
                    break;
                }
            }

            let text = String::from_utf8_lossy(&line);
            let request = text.trim();
            if request.is_empty() {
                continue;
            }

            let Some(reply) = self.call(request).await else {
                continue;
            };
            let written = async {
                output.write_all(reply.as_bytes()).await?;
                output.flush().await
            }
            .await;
            if let Err(e) = written {
                tracing::error!(server, error = %e, "writing client stdout failed");
                code = 1;
                break;
            }
        }

        if let Some(ref m) = self.monitor {
            let snapshot = m.finish().await;
            if m.summary_on_exit() {
                diagnostics.tagged(server, &snapshot.summary_line()).await;
            }
        }
        code
    }

    /// Forward one request and produce the line (newline included) to
    /// write back, if any.
    ///
    /// Notifications and empty gateway bodies produce nothing.
    pub async fn call(&self, request: &str) -> Option<String> {
        let server = self.server.as_str();
        let value: Value = match serde_json::from_str(request) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(server, error = %e, "client sent a line that is not JSON");
                return Some(self.error_line(
                    JsonRpcId::Null,
                    BridgeErrorKind::InvalidRequest,
                    "request is not valid JSON",
                ));
            }
        };

        let id = value.get("id").and_then(parse_id);
        if let Some(ref m) = self.monitor {
            let kind = classify_jsonrpc(&value).ok();
            m.record_kind(StreamDirection::ClientToServer, kind.as_ref(), false);
        }

        match self.post(request).await {
            Ok(reply) => reply,
            Err((kind, message)) => id.map(|id| self.error_line(id, kind, &message)),
        }
    }

    async fn post(&self, request: &str) -> Result<Option<String>, CallFailure> {
        let server = self.server.as_str();
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.to_owned())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_failure(&e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(server, status = status.as_u16(), "gateway returned an error status");
            return Err((
                BridgeErrorKind::GatewayStatus,
                format!("gateway returned HTTP {}", status.as_u16()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_failure(&e))?;
        if body.trim().is_empty() {
            tracing::debug!(server, "gateway returned an empty body");
            return Ok(None);
        }

        match classify_line(&body) {
            LineDisposition::Protocol(frame) => {
                if let Some(ref m) = self.monitor {
                    m.record(StreamDirection::ServerToClient, &frame);
                }
                // Pretty-printed bodies are re-serialized onto one line.
                let mut line = if frame.line.contains(|c: char| c == '\n' || c == '\r') {
                    frame.value.to_string()
                } else {
                    frame.line
                };
                line.push('\n');
                Ok(Some(line))
            }
            _ => {
                tracing::warn!(server, "gateway returned a body that is not JSON-RPC");
                Err((
                    BridgeErrorKind::GatewayInvalidResponse,
                    "gateway returned an invalid JSON-RPC response".to_string(),
                ))
            }
        }
    }

    fn transport_failure(&self, e: &reqwest::Error) -> CallFailure {
        tracing::warn!(server = %self.server, endpoint = %self.endpoint, error = %e, "gateway call failed");
        if e.is_timeout() {
            (
                BridgeErrorKind::GatewayTimeout,
                format!("gateway did not respond within {}s", self.timeout.as_secs()),
            )
        } else {
            (
                BridgeErrorKind::GatewayUnreachable,
                "gateway unreachable".to_string(),
            )
        }
    }

    fn error_line(&self, id: JsonRpcId, kind: BridgeErrorKind, message: &str) -> String {
        let line = error_response_line(&id, &self.server, kind, message);
        if let Some(ref m) = self.monitor {
            m.record_kind(
                StreamDirection::ServerToClient,
                Some(&JsonRpcMessageKind::Response { id }),
                true,
            );
        }
        line
    }
}

/// `{base}/api/mcp-gateway/{server}{path}`, with every segment
/// percent-encoded.
fn gateway_endpoint(base: &str, server: &str, path: &str) -> Result<String, String> {
    let mut url =
        url::Url::parse(base).map_err(|e| format!("invalid gateway URL '{base}': {e}"))?;
    url.path_segments_mut()
        .map_err(|()| format!("gateway URL '{base}' cannot take a path"))?
        .pop_if_empty()
        .extend(["api", "mcp-gateway", server])
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(url.into())
}

/// Run a gateway session for `profile`.
pub async fn run_gateway(
    profile: &ServerProfile,
    settings: &BridgeSettings,
    io: ClientIo,
) -> Result<i32, BridgeError> {
    let adapter = GatewayAdapter::new(profile, settings)?;
    Ok(adapter.run(io).await)
}
