//! Live feed connection to the backend's request-event stream

use crate::log::RequestLog;
use crate::session::SessionEvent;
use futures_util::StreamExt;
use hooklens_common::{decode_event, endpoints};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, tungstenite};

/// Live feed failures
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to connect to event feed: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("event feed faulted: {0}")]
    Transport(#[source] tungstenite::Error),

    #[error("event feed closed by backend")]
    Closed,
}

/// A single open subscription to the backend's live request feed
///
/// Scoped 1:1 to a running session; the session controller opens it on a
/// successful start and closes it before stopping. Decoded records are
/// prepended to the request log in arrival order. Malformed payloads are
/// dropped without disturbing the stream or the log. The connection never
/// reconnects itself: a transport fault or a backend-initiated close is
/// surfaced as [`SessionEvent::FeedFailed`] and left to the controller.
pub struct FeedConnection {
    task: Option<JoinHandle<()>>,
}

impl FeedConnection {
    /// Open the feed for the capture port and start delivering records
    pub async fn open(
        port: u16,
        log: Arc<RequestLog>,
        events_tx: broadcast::Sender<SessionEvent>,
    ) -> Result<Self, FeedError> {
        let url = format!("ws://127.0.0.1:{}{}", port, endpoints::EVENTS);
        let (ws_stream, _) = connect_async(&url).await.map_err(FeedError::Connect)?;
        tracing::debug!("Event feed connected on {}", url);

        let task = tokio::spawn(async move {
            let mut read = ws_stream;
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(payload))) => match decode_event(payload.as_str()) {
                        Ok(record) => log.append(record).await,
                        Err(e) => {
                            tracing::warn!("Dropping malformed event: {}", e);
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = events_tx
                            .send(SessionEvent::FeedFailed(FeedError::Closed.to_string()));
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong and stray binary frames carry no events
                    }
                    Some(Err(e)) => {
                        let _ = events_tx.send(SessionEvent::FeedFailed(
                            FeedError::Transport(e).to_string(),
                        ));
                        break;
                    }
                }
            }
        });

        Ok(Self { task: Some(task) })
    }

    /// Close the feed
    ///
    /// Safe to call repeatedly; once it returns, no further records reach
    /// the log.
    pub async fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}
