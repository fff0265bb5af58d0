//! Handlers for inbound named events.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handler for an inbound event payload.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// One handler per event name. Registering again replaces the previous
/// handler, so repeated initialization never double-fires.
#[derive(Default, Clone)]
pub(crate) struct HandlerRegistry {
    handlers: HashMap<String, EventHandler>,
}

impl HandlerRegistry {
    #[cfg(test)]
    fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`, returning the handler it replaced.
    pub(crate) fn register(&mut self, event: &str, handler: EventHandler) -> Option<EventHandler> {
        self.handlers.insert(event.to_string(), handler)
    }

    pub(crate) fn remove(&mut self, event: &str) -> Option<EventHandler> {
        self.handlers.remove(event)
    }

    pub(crate) fn get(&self, event: &str) -> Option<EventHandler> {
        self.handlers.get(event).cloned()
    }

    #[cfg(test)]
    fn contains(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Registered event names, sorted.
    pub(crate) fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.handlers.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("events", &self.event_names())
            .finish()
    }
}
