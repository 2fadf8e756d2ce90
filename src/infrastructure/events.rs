use crate::domain::events::LedgerEvent;
use crate::domain::ports::EventSink;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Writes each notification to the log as structured JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: LedgerEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        info!(event = event.name(), seller = %event.seller(), payload = %payload, "notification");
    }
}

/// Keeps every notification in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<LedgerEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().await.clone()
    }

    pub async fn names(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(LedgerEvent::name).collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: LedgerEvent) {
        self.events.lock().await.push(event);
    }
}
