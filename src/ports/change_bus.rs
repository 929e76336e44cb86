//! Change bus ports - payload-less, in-process change notifications.
//!
//! Producers (the realtime bridge, views after a successful write) emit a
//! [`ChangeTopic`]; views subscribe and react by re-fetching. The bus is a
//! service object constructed at start-up and shared by `Arc`.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::domain::sync::ChangeTopic;

/// Callback invoked synchronously on `emit`.
///
/// Handlers should be quick; anything async is spawned by the handler.
pub type ChangeHandler = Arc<dyn Fn() + Send + Sync>;

type Detach = Box<dyn FnOnce() + Send>;

/// Handle returned by [`ChangeSubscriber::on`].
///
/// Dropping the handle unsubscribes. Calling [`Subscription::unsubscribe`]
/// more than once is a no-op.
pub struct Subscription {
    topic: ChangeTopic,
    detach: Mutex<Option<Detach>>,
}

impl Subscription {
    pub fn new(topic: ChangeTopic, detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            topic,
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    pub fn topic(&self) -> ChangeTopic {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.detach
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn unsubscribe(&self) {
        let detach = self
            .detach
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(detach) = detach {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Port for announcing that rows behind a topic changed.
pub trait ChangePublisher: Send + Sync {
    /// Invokes every handler registered for `topic`.
    ///
    /// A handler that panics is logged and skipped; the remaining handlers
    /// still run.
    fn emit(&self, topic: ChangeTopic);
}

/// Port for registering interest in a topic.
pub trait ChangeSubscriber: Send + Sync {
    fn on(&self, topic: ChangeTopic, handler: ChangeHandler) -> Subscription;

    /// Registers the same handler for several topics.
    fn on_many(&self, topics: &[ChangeTopic], handler: ChangeHandler) -> Vec<Subscription> {
        topics
            .iter()
            .map(|topic| self.on(*topic, handler.clone()))
            .collect()
    }

    /// Number of live handlers for a topic.
    fn handler_count(&self, topic: ChangeTopic) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unsubscribe_runs_detach_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(ChangeTopic::ItemsChanged, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(sub.is_active());
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        drop(sub);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_detaches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _sub = Subscription::new(ChangeTopic::SwapsChanged, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
