//! In-process change bus.
//!
//! Synchronous, payload-less fan-out used by the realtime bridge and the
//! views. One instance is created at start-up and shared by `Arc`.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock, Weak};

use tracing::{error, trace};

use crate::domain::sync::ChangeTopic;
use crate::ports::{ChangeHandler, ChangePublisher, ChangeSubscriber, Subscription};

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<ChangeTopic, Vec<(u64, ChangeHandler)>>,
}

impl Registry {
    fn remove(&mut self, topic: ChangeTopic, id: u64) {
        if let Some(list) = self.handlers.get_mut(&topic) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                self.handlers.remove(&topic);
            }
        }
    }
}

/// Change bus delivering on the emitting thread.
///
/// Features:
/// - Handlers run synchronously inside `emit`, in registration order
/// - Dispatch iterates a snapshot, so handlers may (un)subscribe freely
/// - A panicking handler is logged and does not affect the others
/// - Per-topic emit counters for assertions
pub struct InProcessEventBus {
    registry: Arc<RwLock<Registry>>,
    emitted: RwLock<HashMap<ChangeTopic, usize>>,
}

impl InProcessEventBus {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            emitted: RwLock::new(HashMap::new()),
        }
    }

    // === Test Helpers ===

    /// Number of times `topic` was emitted.
    pub fn emit_count(&self, topic: ChangeTopic) -> usize {
        self.emitted
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&topic)
            .copied()
            .unwrap_or(0)
    }

    /// Topics with at least one registered handler.
    pub fn active_topics(&self) -> Vec<ChangeTopic> {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        let mut topics: Vec<ChangeTopic> = registry.handlers.keys().copied().collect();
        topics.sort();
        topics
    }

    fn snapshot(&self, topic: ChangeTopic) -> Vec<ChangeHandler> {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        registry
            .handlers
            .get(&topic)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangePublisher for InProcessEventBus {
    fn emit(&self, topic: ChangeTopic) {
        *self
            .emitted
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic)
            .or_insert(0) += 1;

        // Clone handlers to release the lock before invoking them
        let handlers = self.snapshot(topic);
        trace!(topic = %topic, handlers = handlers.len(), "emit");

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler())).is_err() {
                error!(topic = %topic, "change handler panicked");
            }
        }
    }
}

impl ChangeSubscriber for InProcessEventBus {
    fn on(&self, topic: ChangeTopic, handler: ChangeHandler) -> Subscription {
        let id = {
            let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
            registry.next_id += 1;
            let id = registry.next_id;
            registry.handlers.entry(topic).or_default().push((id, handler));
            id
        };

        let registry: Weak<RwLock<Registry>> = Arc::downgrade(&self.registry);
        Subscription::new(topic, move || {
            if let Some(registry) = registry.upgrade() {
                registry
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(topic, id);
            }
        })
    }

    fn handler_count(&self, topic: ChangeTopic) -> usize {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .handlers
            .get(&topic)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
