use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event_type: String,
    pub path: String,
    pub timestamp_ms: i64,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record_event(&self, event: TelemetryEvent);
}

/// Sink that emits widget events through tracing; a collector picks them up
/// from the log stream.
#[derive(Clone, Default)]
pub struct TracingTelemetrySink;

#[async_trait]
impl TelemetrySink for TracingTelemetrySink {
    async fn record_event(&self, event: TelemetryEvent) {
        tracing::info!(
            target: "zakaut_gui.telemetry",
            event_type = %event.event_type,
            path = %event.path,
            timestamp_ms = event.timestamp_ms,
            metadata = %event.metadata,
            "widget telemetry event"
        );
    }
}

impl TelemetryEvent {
    pub fn now(event_type: impl Into<String>, path: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            path: path.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            metadata,
        }
    }
}
