use crate::core::NodeValue;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A single entry in the execution trace: one dispatched node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Seconds since the Unix epoch when the node finished.
    pub timestamp: u64,
    pub graph: String,
    /// Invocation label (prototype name, alias included).
    pub node: String,
    pub prototype: String,
    pub inputs: NodeValue,
    /// Alias-prefixed outputs, `Null` when the node failed.
    pub outputs: NodeValue,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceEntry {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Trait for recording execution traces.
pub trait Telemetry: Send + Sync {
    fn record(&self, entry: TraceEntry);
    fn flush(&self);
}

/// Simple in-memory collector for traces.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    traces: Mutex<Vec<TraceEntry>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_traces(&self) -> Vec<TraceEntry> {
        self.traces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Node labels in the order they were dispatched.
    pub fn visit_order(&self) -> Vec<String> {
        self.get_traces().into_iter().map(|t| t.node).collect()
    }

    pub fn clear(&self) {
        self.traces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl Telemetry for MemoryTelemetry {
    fn record(&self, entry: TraceEntry) {
        self.traces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    fn flush(&self) {
        // No-op for memory collector
    }
}

/// Emits every trace as one JSON line through the `log` facade.
#[derive(Debug, Clone)]
pub struct LogTelemetry {
    level: log::Level,
}

impl LogTelemetry {
    pub fn new(level: log::Level) -> Self {
        Self { level }
    }
}

impl Default for LogTelemetry {
    fn default() -> Self {
        Self::new(log::Level::Info)
    }
}

impl Telemetry for LogTelemetry {
    fn record(&self, entry: TraceEntry) {
        match serde_json::to_string(&entry) {
            Ok(line) => log::log!(target: "owlgraph::trace", self.level, "{}", line),
            Err(err) => log::warn!("Could not serialize trace for {}: {}", entry.node, err),
        }
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(node: &str) -> TraceEntry {
        TraceEntry {
            timestamp: 0,
            graph: "g".to_string(),
            node: node.to_string(),
            prototype: node.to_string(),
            inputs: json!({"x": 1}),
            outputs: json!({"y": 2}),
            duration_ms: 0,
            error: None,
        }
    }

    #[test]
    fn test_memory_telemetry_keeps_order() {
        let telemetry = MemoryTelemetry::new();
        telemetry.record(entry("a"));
        telemetry.record(entry("b"));
        assert_eq!(telemetry.visit_order(), vec!["a", "b"]);

        telemetry.clear();
        assert!(telemetry.get_traces().is_empty());
    }

    #[test]
    fn test_trace_serialization_skips_missing_error() {
        let line = serde_json::to_string(&entry("a")).unwrap();
        assert!(!line.contains("error"));

        let back: TraceEntry = serde_json::from_str(&line).unwrap();
        assert!(back.succeeded());
    }
}
