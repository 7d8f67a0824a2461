//! Outbound notification ports: lifecycle events and product telemetry.
//!
//! Both are fire-and-forget. Nothing sent here can fail the operation that
//! triggered it.

use crate::models::file::SanitizedMedia;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaEventKind {
    #[serde(rename = "media.create")]
    Create,
    #[serde(rename = "media.update")]
    Update,
    #[serde(rename = "media.delete")]
    Delete,
}

impl MediaEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "media.create",
            Self::Update => "media.update",
            Self::Delete => "media.delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaEvent {
    pub event: MediaEventKind,
    pub media: SanitizedMedia,
}

/// Process-wide lifecycle event bus.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<MediaEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: MediaEventKind, media: SanitizedMedia) {
        let id = media.id;
        if self.tx.send(MediaEvent { event, media }).is_err() {
            debug!(event = event.as_str(), %id, "no event subscribers");
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Log every lifecycle event until the hub is dropped.
pub async fn log_events(mut rx: broadcast::Receiver<MediaEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => info!(
                event = event.event.as_str(),
                id = %event.media.id,
                key = %event.media.key,
                "media lifecycle event"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "event logger lagged")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Product telemetry signals.
pub trait Telemetry: Send + Sync {
    fn send(&self, event: &'static str);
}

/// Telemetry backed by `metrics` counters. With no recorder installed the
/// counters are no-ops.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsTelemetry;

impl Telemetry for MetricsTelemetry {
    fn send(&self, event: &'static str) {
        metrics::counter!("upload.telemetry", "event" => event).increment(1);
    }
}
