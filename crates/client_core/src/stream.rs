use std::{
    pin::Pin,
    task::{Context as TaskContext, Poll},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use shared::protocol::{RequestRecord, StreamEvent};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

pub const SUBSCRIPTION_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

fn malformed(kind: &str, reason: impl Into<String>) -> SyncError {
    SyncError::MalformedEvent {
        kind: kind.to_string(),
        reason: reason.into(),
    }
}

/// Decodes one text frame from the event channel.
///
/// Returns `Ok(None)` for event kinds this core does not follow. Frames that
/// claim to be `created`/`updated` but do not carry a valid record are
/// reported as [`SyncError::MalformedEvent`] and must not reach reconciliation.
pub fn normalize_frame(text: &str) -> SyncResult<Option<StreamEvent>> {
    let RawFrame { kind, payload } =
        serde_json::from_str(text).map_err(|err| malformed("unknown", err.to_string()))?;

    let created = match kind.as_str() {
        StreamEvent::CREATED | "new_request" => true,
        StreamEvent::UPDATED | "request_update" => false,
        _ => return Ok(None),
    };

    let record: RequestRecord =
        serde_json::from_value(payload).map_err(|err| malformed(&kind, err.to_string()))?;
    record.validate().map_err(|reason| malformed(&kind, reason))?;

    Ok(Some(if created {
        StreamEvent::Created(record)
    } else {
        StreamEvent::Updated(record)
    }))
}

/// Owned handle on a live event subscription.
///
/// The sequence ends when the channel closes and cannot be restarted; a new
/// activation subscribes again. Dropping the handle stops the reader and
/// frees the connection.
pub struct EventSubscription {
    events: ReceiverStream<StreamEvent>,
    reader: Option<JoinHandle<()>>,
}

impl EventSubscription {
    pub fn new(events: mpsc::Receiver<StreamEvent>, reader: JoinHandle<()>) -> Self {
        Self {
            events: ReceiverStream::new(events),
            reader: Some(reader),
        }
    }

    /// Subscription fed directly by an in-process sender.
    pub fn from_receiver(events: mpsc::Receiver<StreamEvent>) -> Self {
        Self {
            events: ReceiverStream::new(events),
            reader: None,
        }
    }
}

impl Stream for EventSubscription {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_next_unpin(cx)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.events.close();
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self) -> Result<EventSubscription>;
}

pub struct WebSocketEventSource {
    url: String,
}

impl WebSocketEventSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl EventSource for WebSocketEventSource {
    async fn subscribe(&self) -> Result<EventSubscription> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {}", self.url))?;
        let (_, mut ws_reader) = ws_stream.split();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let url = self.url.clone();

        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match normalize_frame(&text) {
                        Ok(Some(event)) => {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => debug!("stream: ignoring unrelated event"),
                        Err(err) => warn!(error = %err, "stream: dropping event"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "stream: websocket receive failed");
                        break;
                    }
                }
            }
            info!(url = %url, "stream: event channel closed");
        });

        info!(url = %self.url, "stream: subscribed");
        Ok(EventSubscription::new(rx, reader))
    }
}

#[cfg(test)]
#[path = "tests/stream_tests.rs"]
mod tests;
