//! Minimal DevTools protocol client.
//!
//! One websocket connection to the browser endpoint carries every command.
//! Commands are JSON-RPC style (`id`/`method`/`params`, plus `sessionId` for
//! page-scoped calls); everything without an `id` is an event and is fanned
//! out to subscribers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{DriverError, DriverResult};

const EVENT_BUFFER: usize = 256;

/// A protocol event (a frame without an `id`).
#[derive(Debug, Clone)]
pub(crate) struct CdpEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

pub(crate) struct CdpClient {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>,
    outbound: mpsc::UnboundedSender<Message>,
    events: broadcast::Sender<CdpEvent>,
    command_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CdpClient {
    pub async fn connect(ws_url: &str, command_timeout: Duration) -> DriverResult<Self> {
        let (stream, _) = connect_async(ws_url).await?;
        let (mut sink, mut source) = stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(error) = sink.send(message).await {
                    warn!(%error, "DevTools websocket send failed");
                    break;
                }
            }
        });

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let reader_pending = pending.clone();
        let reader_events = events.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(error) => {
                        warn!(%error, "DevTools websocket read failed");
                        break;
                    }
                };
                let Ok(value) = serde_json::from_str::<Value>(&text) else {
                    trace!("discarding non-JSON DevTools frame");
                    continue;
                };
                if let Some(id) = value.get("id").and_then(Value::as_u64) {
                    let sender = reader_pending
                        .lock()
                        .ok()
                        .and_then(|mut map| map.remove(&id));
                    if let Some(sender) = sender {
                        let _ = sender.send(value);
                    }
                } else if let Some(method) = value.get("method").and_then(Value::as_str) {
                    // Nobody subscribed is fine; downloads subscribe lazily.
                    let _ = reader_events.send(CdpEvent {
                        method: method.to_string(),
                        params: value.get("params").cloned().unwrap_or(Value::Null),
                        session_id: value
                            .get("sessionId")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    });
                }
            }
            debug!("DevTools websocket reader finished");
        });

        Ok(Self {
            next_id: AtomicU64::new(0),
            pending,
            outbound,
            events,
            command_timeout,
            reader,
            writer,
        })
    }

    /// Issue one command and wait for its response. `session_id` scopes the
    /// command to an attached page target; `None` addresses the browser.
    pub async fn call(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> DriverResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = oneshot::channel();
        if let Ok(mut map) = self.pending.lock() {
            map.insert(id, sender);
        }

        let mut frame = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            frame["sessionId"] = Value::String(session_id.to_string());
        }
        self.outbound
            .send(Message::text(frame.to_string()))
            .map_err(|_| DriverError::Closed)?;

        let response = match tokio::time::timeout(self.command_timeout, receiver).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(DriverError::Closed),
            Err(_) => {
                if let Ok(mut map) = self.pending.lock() {
                    map.remove(&id);
                }
                return Err(DriverError::CommandTimeout {
                    method: method.to_string(),
                    timeout: self.command_timeout,
                });
            }
        };

        if let Some(error) = response.get("error") {
            return Err(DriverError::Protocol {
                method: method.to_string(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown protocol error")
                    .to_string(),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    pub fn shutdown(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
