//! Opt-in monitoring recorder.
//!
//! Counts relayed messages per direction and method, and optionally appends
//! one JSON line per message to an event log. Recording never blocks a
//! relay: events go through a bounded queue and are dropped (and counted)
//! when the writer falls behind. Only metadata is recorded; params,
//! results and error payloads never reach the log.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mcpbridge_core::StreamDirection;
use mcpbridge_core::config::MonitorSettings;
use mcpbridge_core::filter::ProtocolFrame;
use mcpbridge_core::jsonrpc::{JsonRpcId, JsonRpcMessageKind};
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Counter key for frames whose shape could not be classified.
const UNKNOWN_METHOD: &str = "unknown";

/// One line of the JSONL event log.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringEvent {
    pub timestamp: DateTime<Utc>,
    pub server: String,
    pub direction: StreamDirection,
    /// `request`, `response`, `notification` or `unknown`.
    pub kind: &'static str,
    /// Set for requests and notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    /// Set for responses that carry an `error` member.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MethodCount {
    pub messages: u64,
    pub errors: u64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MonitorSnapshot {
    pub counts: BTreeMap<(StreamDirection, String), MethodCount>,
    pub errors: u64,
    pub dropped: u64,
}

impl MonitorSnapshot {
    pub fn count(&self, direction: StreamDirection, method: &str) -> MethodCount {
        self.counts
            .get(&(direction, method.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// One-line aggregate, e.g.
    /// `monitor summary: client_to_server tools/list=1; server_to_client response=1; errors=0 dropped=0`
    pub fn summary_line(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        for direction in [
            StreamDirection::ClientToServer,
            StreamDirection::ServerToClient,
        ] {
            let methods: Vec<String> = self
                .counts
                .iter()
                .filter(|((d, _), _)| *d == direction)
                .map(|((_, method), count)| {
                    if count.errors > 0 {
                        format!("{method}={} (errors={})", count.messages, count.errors)
                    } else {
                        format!("{method}={}", count.messages)
                    }
                })
                .collect();
            if !methods.is_empty() {
                parts.push(format!("{direction} {}", methods.join(" ")));
            }
        }
        parts.push(format!("errors={} dropped={}", self.errors, self.dropped));
        format!("monitor summary: {}", parts.join("; "))
    }
}

/// Counters plus the handle to the background log writer.
pub struct Monitor {
    server: String,
    counts: DashMap<(StreamDirection, String), MethodCount>,
    errors: AtomicU64,
    dropped: AtomicU64,
    summary_on_exit: bool,
    log_disabled: Arc<AtomicBool>,
    sender: Option<mpsc::Sender<MonitoringEvent>>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /// Start recording for `server`, or `None` when monitoring is disabled.
    ///
    /// Must be called inside a Tokio runtime when a log path is set: the
    /// log writer runs as its own task.
    pub fn start(server: &str, settings: &MonitorSettings) -> Option<Arc<Self>> {
        if !settings.enabled {
            return None;
        }

        let log_disabled = Arc::new(AtomicBool::new(false));
        let (sender, stop, writer) = match settings.log_path {
            Some(ref path) => {
                let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
                let (stop_tx, stop_rx) = oneshot::channel();
                let handle = tokio::spawn(write_events(
                    path.clone(),
                    rx,
                    stop_rx,
                    log_disabled.clone(),
                ));
                (Some(tx), Some(stop_tx), Some(handle))
            }
            None => (None, None, None),
        };

        tracing::debug!(
            server,
            log = ?settings.log_path,
            queue = settings.queue_capacity,
            "monitoring enabled"
        );

        Some(Arc::new(Self {
            server: server.to_string(),
            counts: DashMap::new(),
            errors: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            summary_on_exit: settings.summary_on_exit,
            log_disabled,
            sender,
            stop: Mutex::new(stop),
            writer: Mutex::new(writer),
        }))
    }

    /// Record a frame admitted to the protocol stream.
    pub fn record(&self, direction: StreamDirection, frame: &ProtocolFrame) {
        self.record_kind(direction, frame.kind.as_ref(), frame.has_error());
    }

    /// Record one message by its classification.
    ///
    /// `is_error` marks responses that carry an `error` member (relayed or
    /// fabricated by the bridge).
    pub fn record_kind(
        &self,
        direction: StreamDirection,
        kind: Option<&JsonRpcMessageKind>,
        is_error: bool,
    ) {
        let method = kind.map_or(UNKNOWN_METHOD, JsonRpcMessageKind::method);
        let is_error = is_error && matches!(kind, Some(JsonRpcMessageKind::Response { .. }));
        {
            let mut entry = self
                .counts
                .entry((direction, method.to_string()))
                .or_default();
            entry.messages += 1;
            if is_error {
                entry.errors += 1;
            }
        }
        if is_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }

        let Some(ref sender) = self.sender else {
            return;
        };
        if self.log_disabled.load(Ordering::Relaxed) {
            return;
        }

        let event = MonitoringEvent {
            timestamp: Utc::now(),
            server: self.server.clone(),
            direction,
            kind: kind.map_or(UNKNOWN_METHOD, JsonRpcMessageKind::label),
            method: match kind {
                Some(JsonRpcMessageKind::Request { method, .. })
                | Some(JsonRpcMessageKind::Notification { method }) => Some(method.clone()),
                _ => None,
            },
            id: kind.and_then(JsonRpcMessageKind::id).cloned(),
            error: is_error,
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // Writer gave up on the log; counters keep working.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            counts: self
                .counts
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            errors: self.errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Whether the summary line should be printed on shutdown.
    pub fn summary_on_exit(&self) -> bool {
        self.summary_on_exit
    }

    /// Flush queued events, stop the writer and return the final counters.
    pub async fn finish(&self) -> MonitorSnapshot {
        if let Some(stop) = self.stop.lock().await.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.writer.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::warn!(server = %self.server, error = %e, "monitoring writer task failed");
            }
        }
        self.snapshot()
    }
}

/// Background task appending events to the JSONL log.
///
/// Any open or write failure produces one warning and disables the log
/// for the rest of the session.
async fn write_events(
    path: PathBuf,
    mut rx: mpsc::Receiver<MonitoringEvent>,
    mut stop: oneshot::Receiver<()>,
    disabled: Arc<AtomicBool>,
) {
    let file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "monitoring log unavailable, continuing without it"
            );
            disabled.store(true, Ordering::Relaxed);
            return;
        }
    };
    let mut writer = BufWriter::new(file);

    loop {
        let event = tokio::select! {
            biased;
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = &mut stop => break,
        };

        let mut line = match serde_json::to_vec(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(error = %e, "failed to serialize monitoring event");
                continue;
            }
        };
        line.push(b'\n');

        let result = async {
            writer.write_all(&line).await?;
            if rx.is_empty() {
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "monitoring log write failed, disabling it"
            );
            disabled.store(true, Ordering::Relaxed);
            return;
        }
    }

    if let Err(e) = writer.flush().await {
        tracing::warn!(path = %path.display(), error = %e, "monitoring log flush failed");
    }
}

#[cfg(test)]
mod tests {
    use mcpbridge_core::filter::{LineDisposition, classify_line};

    use super::*;

    fn frame(line: &str) -> ProtocolFrame {
        match classify_line(line) {
            LineDisposition::Protocol(frame) => frame,
            other => panic!("expected protocol frame, got {other:?}"),
        }
    }

    fn settings(log_path: Option<PathBuf>) -> MonitorSettings {
        MonitorSettings {
            enabled: true,
            log_path,
            ..MonitorSettings::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_monitor_is_none() {
        assert!(Monitor::start("fs", &MonitorSettings::default()).is_none());
    }

    #[tokio::test]
    async fn test_counts_by_direction_and_method() {
        let monitor = Monitor::start("fs", &settings(None)).unwrap();
        let request = frame(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#);
        monitor.record(StreamDirection::ClientToServer, &request);
        monitor.record(StreamDirection::ClientToServer, &request);
        monitor.record(
            StreamDirection::ServerToClient,
            &frame(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-1,"message":"x"}}"#),
        );
        monitor.record(
            StreamDirection::ServerToClient,
            &frame(r#"{"jsonrpc":"2.0","result":{}}"#),
        );

        let snap = monitor.finish().await;
        assert_eq!(
            snap.count(StreamDirection::ClientToServer, "tools/list").messages,
            2
        );
        let responses = snap.count(StreamDirection::ServerToClient, "response");
        assert_eq!(responses, MethodCount { messages: 1, errors: 1 });
        assert_eq!(snap.count(StreamDirection::ServerToClient, "unknown").messages, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.dropped, 0);
    }

    #[tokio::test]
    async fn test_log_lines_carry_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let monitor = Monitor::start("fs", &settings(Some(path.clone()))).unwrap();

        monitor.record(
            StreamDirection::ClientToServer,
            &frame(r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"secret":"s3cr3t"}}"#),
        );
        monitor.record(
            StreamDirection::ServerToClient,
            &frame(r#"{"jsonrpc":"2.0","id":"a","result":{"content":"private"}}"#),
        );
        monitor.finish().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(!contents.contains("s3cr3t"));
        assert!(!contents.contains("private"));

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["direction"], "client_to_server");
        assert_eq!(first["kind"], "request");
        assert_eq!(first["method"], "tools/call");
        assert_eq!(first["id"], "a");
        assert_eq!(first["server"], "fs");
        assert!(first.get("params").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["direction"], "server_to_client");
        assert_eq!(second["kind"], "response");
        assert!(second.get("method").is_none());
        assert!(second.get("result").is_none());
    }

    #[tokio::test]
    async fn test_unwritable_log_keeps_counting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("events.jsonl");
        let monitor = Monitor::start("fs", &settings(Some(path.clone()))).unwrap();

        let note = frame(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
        for _ in 0..5 {
            monitor.record(StreamDirection::ClientToServer, &note);
        }
        let snap = monitor.finish().await;
        assert_eq!(
            snap.count(StreamDirection::ClientToServer, "notifications/initialized")
                .messages,
            5
        );
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_full_queue_counts_drops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let monitor = Monitor::start(
            "fs",
            &MonitorSettings {
                enabled: true,
                log_path: Some(path),
                queue_capacity: 1,
                summary_on_exit: true,
            },
        )
        .unwrap();

        // The current-thread runtime does not run the writer between these
        // calls, so the single-slot queue overflows.
        let note = frame(r#"{"jsonrpc":"2.0","method":"ping"}"#);
        for _ in 0..10 {
            monitor.record(StreamDirection::ServerToClient, &note);
        }
        let snap = monitor.finish().await;
        assert_eq!(snap.count(StreamDirection::ServerToClient, "ping").messages, 10);
        assert!(snap.dropped >= 8, "dropped = {}", snap.dropped);
        assert!(monitor.summary_on_exit());
    }

    #[test]
    fn test_summary_line_format() {
        let mut snap = MonitorSnapshot::default();
        snap.counts.insert(
            (StreamDirection::ClientToServer, "tools/list".to_string()),
            MethodCount { messages: 2, errors: 0 },
        );
        snap.counts.insert(
            (StreamDirection::ServerToClient, "response".to_string()),
            MethodCount { messages: 2, errors: 1 },
        );
        snap.errors = 1;
        assert_eq!(
            snap.summary_line(),
            "monitor summary: client_to_server tools/list=2; \
             server_to_client response=2 (errors=1); errors=1 dropped=0"
        );
    }
}
