//! Ordered request log with selection tracking and change broadcast

use hooklens_common::RequestRecord;
use std::collections::VecDeque;
use tokio::sync::{broadcast, RwLock};

/// Change events broadcast to log subscribers
#[derive(Debug, Clone)]
pub enum LogEvent {
    /// A record was prepended to the log
    Added(RequestRecord),
    /// The log was emptied
    Cleared,
}

/// Ordered collection of received requests, newest first
///
/// Appends never de-duplicate: if the backend emits the same id twice, both
/// entries appear. The selection is a lookup key into the current sequence,
/// not a stored reference; clearing the log invalidates it.
pub struct RequestLog {
    inner: RwLock<LogInner>,
    broadcast_tx: broadcast::Sender<LogEvent>,
}

struct LogInner {
    records: VecDeque<RequestRecord>,
    selected: Option<String>,
}

impl RequestLog {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        Self {
            inner: RwLock::new(LogInner {
                records: VecDeque::new(),
                selected: None,
            }),
            broadcast_tx,
        }
    }

    /// Prepend a record and notify subscribers
    pub async fn append(&self, record: RequestRecord) {
        {
            let mut inner = self.inner.write().await;
            inner.records.push_front(record.clone());
        }

        // Broadcast to subscribers (ignore if no receivers)
        let _ = self.broadcast_tx.send(LogEvent::Added(record));
    }

    /// Empty the log and drop the selection
    pub async fn clear(&self) {
        {
            let mut inner = self.inner.write().await;
            inner.records.clear();
            inner.selected = None;
        }

        let _ = self.broadcast_tx.send(LogEvent::Cleared);
    }

    /// Mark a record id as selected
    pub async fn select(&self, id: impl Into<String>) {
        self.inner.write().await.selected = Some(id.into());
    }

    /// Resolve the current selection against the log
    ///
    /// Returns `None` when nothing is selected or the selected id is gone,
    /// e.g. after a clear.
    pub async fn selected(&self) -> Option<RequestRecord> {
        let inner = self.inner.read().await;
        let id = inner.selected.as_deref()?;
        inner.records.iter().find(|r| r.id == id).cloned()
    }

    /// Newest-first snapshot of all records
    pub async fn records(&self) -> Vec<RequestRecord> {
        self.inner.read().await.records.iter().cloned().collect()
    }

    /// Number of records currently held
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Subscribe to log change events
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.broadcast_tx.subscribe()
    }
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new()
    }
}
