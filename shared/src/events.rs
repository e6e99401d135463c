//! Ledger events and their handler registry

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Triggered after a sales order shipment is committed
pub const SHIPMENT_COMPLETED: &str = "salesordershipment.completed";

/// Triggered after build allocations are committed
pub const BUILD_ALLOCATION_COMPLETED: &str = "build.allocation.completed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEvent {
    pub tag: String,
    /// Shipment or build the event is about
    pub id: Uuid,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl LedgerEvent {
    pub fn new(tag: impl Into<String>, id: Uuid) -> Self {
        Self {
            tag: tag.into(),
            id,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

type Handler = Box<dyn Fn(&LedgerEvent) + Send + Sync>;

/// Maps event tags to the handlers interested in them
#[derive(Default)]
pub struct EventRegistry {
    handlers: HashMap<String, Vec<Handler>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, tag: impl Into<String>, handler: F)
    where
        F: Fn(&LedgerEvent) + Send + Sync + 'static,
    {
        self.handlers
            .entry(tag.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Run every handler registered for the event's tag, in registration
    /// order. Returns how many ran.
    pub fn trigger(&self, event: &LedgerEvent) -> usize {
        let Some(handlers) = self.handlers.get(&event.tag) else {
            return 0;
        };

        for handler in handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn handler_count(&self, tag: &str) -> usize {
        self.handlers.get(tag).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(tag, handlers)| (tag.as_str(), handlers.len()))
            .collect();
        f.debug_struct("EventRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_trigger_runs_matching_handlers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = EventRegistry::new();

        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            registry.register(SHIPMENT_COMPLETED, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        let ran = registry.trigger(&LedgerEvent::new(SHIPMENT_COMPLETED, Uuid::new_v4()));
        assert_eq!(ran, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_tag_runs_nothing() {
        let registry = EventRegistry::new();
        let ran = registry.trigger(&LedgerEvent::new(BUILD_ALLOCATION_COMPLETED, Uuid::new_v4()));
        assert_eq!(ran, 0);
        assert_eq!(registry.handler_count(BUILD_ALLOCATION_COMPLETED), 0);
    }
}
