use std::sync::Mutex;

use rescaler_core::{TelemetryEvent, TelemetryEventType, TelemetrySink};
use serde::Serialize;

/// Picks a sink by name (`tracing`, `stdout`, `memory`); unknown names yield `None`.
pub fn sink_from_name(name: &str) -> Option<Box<dyn TelemetrySink>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "tracing" => Some(Box::new(TracingSink)),
        "stdout" => Some(Box::new(StdoutSink)),
        "memory" => Some(Box::new(MemorySink::default())),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TelemetryEnvelope {
    event_type: String,
    original: Option<String>,
    rescaled: Option<String>,
    duration_us: Option<u64>,
    detail: Option<String>,
}

impl From<&TelemetryEvent> for TelemetryEnvelope {
    fn from(event: &TelemetryEvent) -> Self {
        Self {
            event_type: format!("{:?}", event.event_type),
            original: event.original.map(|dims| dims.to_string()),
            rescaled: event.rescaled.map(|dims| dims.to_string()),
            duration_us: event.duration_us,
            detail: event.detail.clone(),
        }
    }
}

pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        let envelope = TelemetryEnvelope::from(&event);
        match event.event_type {
            TelemetryEventType::RescaleError => tracing::warn!(
                event = %envelope.event_type,
                duration_us = envelope.duration_us,
                detail = envelope.detail.as_deref(),
                "rescale telemetry"
            ),
            _ => tracing::info!(
                event = %envelope.event_type,
                original = envelope.original.as_deref(),
                rescaled = envelope.rescaled.as_deref(),
                duration_us = envelope.duration_us,
                detail = envelope.detail.as_deref(),
                "rescale telemetry"
            ),
        }
    }
}

pub struct StdoutSink;

impl StdoutSink {
    pub fn render(event: &TelemetryEvent) -> Option<String> {
        serde_json::to_string(&TelemetryEnvelope::from(event)).ok()
    }
}

impl TelemetrySink for StdoutSink {
    fn emit(&self, event: TelemetryEvent) {
        if let Some(line) = Self::render(&event) {
            println!("{}", line);
        }
    }
}

#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: TelemetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
