//! Client for mpv's JSON IPC protocol.
//!
//! Commands are sent as one JSON object per line with a `request_id`; mpv
//! answers with the same id. Lines with an `event` field are asynchronous
//! events and are broadcast to subscribers.

use crate::error::MpvError;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tracing::trace;

/// How long mpv gets to answer a command
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered events per subscriber
const EVENT_CAPACITY: usize = 32;

type Reply = Result<Value, String>;
type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// An asynchronous mpv event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpvEvent {
    pub name: String,
    /// `reason` of `end-file` events
    pub reason: Option<String>,
    /// `file_error` of failed `end-file` events
    pub file_error: Option<String>,
}

/// One line received from mpv
#[derive(Debug, PartialEq)]
pub enum IpcMessage {
    Reply { request_id: u64, result: Reply },
    Event(MpvEvent),
}

/// Serialize a command line
#[must_use]
pub fn encode_command(request_id: u64, args: &[Value]) -> String {
    let mut line = json!({ "command": args, "request_id": request_id }).to_string();
    line.push('\n');
    line
}

/// Parse a line received from mpv. Unknown or malformed lines yield `None`.
#[must_use]
pub fn parse_message(line: &str) -> Option<IpcMessage> {
    let value: Value = serde_json::from_str(line).ok()?;
    let field = |name: &str| value.get(name).and_then(Value::as_str).map(String::from);

    if let Some(name) = field("event") {
        return Some(IpcMessage::Event(MpvEvent {
            name,
            reason: field("reason"),
            file_error: field("file_error"),
        }));
    }

    let request_id = value.get("request_id").and_then(Value::as_u64)?;
    let result = match value.get("error").and_then(Value::as_str) {
        None | Some("success") => Ok(value.get("data").cloned().unwrap_or(Value::Null)),
        Some(error) => Err(error.to_string()),
    };
    Some(IpcMessage::Reply { request_id, result })
}

/// A connection to a running mpv instance
pub struct MpvIpc {
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingReplies,
    events: broadcast::Sender<MpvEvent>,
    next_id: AtomicU64,
    reader: tokio::task::JoinHandle<()>,
}

impl MpvIpc {
    /// Connect to mpv's IPC socket
    ///
    /// # Errors
    ///
    /// Returns an error if the socket can't be connected.
    pub async fn connect(path: &Path) -> Result<Self, MpvError> {
        Ok(Self::from_stream(UnixStream::connect(path).await?))
    }

    /// Wrap an already connected stream
    #[must_use]
    pub fn from_stream(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending = PendingReplies::default();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&pending), events.clone()));

        Self {
            writer: Mutex::new(write_half),
            pending,
            events,
            next_id: AtomicU64::new(1),
            reader,
        }
    }

    /// Subscribe to mpv events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MpvEvent> {
        self.events.subscribe()
    }

    /// Whether mpv closed the connection
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.reader.is_finished()
    }

    /// Send a command and wait for its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed, mpv rejects the command
    /// or doesn't answer in time.
    pub async fn command(&self, args: Vec<Value>) -> Result<Value, MpvError> {
        let name = args
            .first()
            .and_then(Value::as_str)
            .unwrap_or("command")
            .to_string();
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            // The reader clears pending replies once, on exit
            if self.is_closed() {
                return Err(MpvError::Closed);
            }
            pending.insert(request_id, tx);
        }

        let line = encode_command(request_id, &args);
        trace!("mpv <- {}", line.trim_end());
        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(RESPONSE_TIMEOUT, rx).await {
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(MpvError::Timeout {
                    command: name,
                    secs: RESPONSE_TIMEOUT.as_secs(),
                })
            }
            Ok(Err(_)) => Err(MpvError::Closed),
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(reason))) => Err(MpvError::Command {
                command: name,
                reason,
            }),
        }
    }

    async fn write_line(&self, line: &str) -> Result<(), MpvError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for MpvIpc {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    read_half: OwnedReadHalf,
    pending: PendingReplies,
    events: broadcast::Sender<MpvEvent>,
) {
    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        trace!("mpv -> {}", line);
        match parse_message(&line) {
            Some(IpcMessage::Reply { request_id, result }) => {
                if let Some(tx) = pending.lock().await.remove(&request_id) {
                    let _ = tx.send(result);
                }
            }
            Some(IpcMessage::Event(event)) => {
                let _ = events.send(event);
            }
            None => {}
        }
    }
    // Dropping the senders fails every outstanding command
    pending.lock().await.clear();
}
