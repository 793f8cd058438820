use std::sync::Arc;

use serde::Serialize;

/// A Keen data-enrichment addon, copied into every event's `keen.addons`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Addon {
    pub name: String,
    pub input: serde_json::Value,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeenMeta {
    /// ISO-8601, passed through unvalidated.
    pub timestamp: String,
    pub addons: Arc<[Addon]>,
}

/// One event as it goes over the wire: `{"event": ..., "keen": {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub event: T,
    pub keen: KeenMeta,
    /// Already put back once after a failed flush.
    #[serde(skip)]
    pub(crate) requeued: bool,
}

impl<T> Envelope<T> {
    pub fn build(timestamp: impl Into<String>, payload: T, addons: Arc<[Addon]>) -> Self {
        Self {
            event: payload,
            keen: KeenMeta {
                timestamp: timestamp.into(),
                addons,
            },
            requeued: false,
        }
    }
}
