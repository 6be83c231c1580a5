// src/scrape/dedup.rs
use serde_json::Value;

/// Structural equality against the previous payload. Nothing is a duplicate
/// of "no previous payload"; a scalar never equals an object or array.
pub fn is_duplicate(current: &Value, previous: Option<&Value>) -> bool {
    previous.is_some_and(|prev| prev == current)
}

/// Per-source "last payload" cell. Owned by the source's orchestrator task.
#[derive(Debug, Clone, Default)]
pub struct DedupFilter {
    enabled: bool,
    last: Option<Value>,
}

impl DedupFilter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            last: None,
        }
    }

    /// Record `payload` as the latest one and report whether it should be
    /// forwarded. With the filter disabled every payload is forwarded.
    pub fn admit(&mut self, payload: &Value) -> bool {
        if !self.enabled {
            return true;
        }
        let dup = is_duplicate(payload, self.last.as_ref());
        if !dup {
            self.last = Some(payload.clone());
        }
        !dup
    }
}
