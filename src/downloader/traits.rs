// Event sink seam between the download core and whatever displays progress

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::models::DownloadEvent;

/// Receives classified events in arrival order, one call at a time.
///
/// The session read loop awaits each delivery, so a sink should hand the
/// event off quickly (post to a queue, write a line) rather than do work.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: DownloadEvent);
}

/// Bounded queue sink: the orchestrator publishes, the UI drains.
/// A full queue applies backpressure instead of dropping events.
#[async_trait]
impl EventSink for mpsc::Sender<DownloadEvent> {
    async fn deliver(&self, event: DownloadEvent) {
        if self.send(event).await.is_err() {
            tracing::debug!("event receiver dropped; discarding event");
        }
    }
}

#[async_trait]
impl EventSink for mpsc::UnboundedSender<DownloadEvent> {
    async fn deliver(&self, event: DownloadEvent) {
        if self.send(event).is_err() {
            tracing::debug!("event receiver dropped; discarding event");
        }
    }
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn deliver(&self, event: DownloadEvent) {
        if event.kind.is_item_failure() {
            tracing::warn!(kind = ?event.kind, "{}", event);
        } else {
            tracing::info!(kind = ?event.kind, "{}", event);
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<DownloadEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DownloadEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn deliver(&self, event: DownloadEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
