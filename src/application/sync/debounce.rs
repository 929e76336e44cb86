//! Trailing-edge debouncing of view refreshes.
//!
//! A burst of change notifications collapses into one re-fetch issued
//! after the burst goes quiet. Runs that already started are never
//! cancelled; a newer schedule only supersedes a run that is still waiting.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::domain::sync::ChangeTopic;
use crate::ports::{ChangeSubscriber, Subscription};

type Action = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct PendingRun {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Runs an async action once, `delay` after the last call to `schedule`.
pub struct Debouncer {
    name: String,
    delay: Duration,
    action: Action,
    pending: Arc<Mutex<PendingRun>>,
}

impl Debouncer {
    pub fn new<F, Fut>(name: impl Into<String>, delay: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            delay,
            action: Arc::new(move || action().boxed()),
            pending: Arc::new(Mutex::new(PendingRun::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replaces any waiting run with a new one due after the delay.
    pub fn schedule(&self) {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(debouncer = %self.name, "schedule called outside a tokio runtime");
                return;
            }
        };

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.handle.take() {
            previous.abort();
        }
        pending.generation += 1;
        let generation = pending.generation;

        let state = Arc::downgrade(&self.pending);
        let action = self.action.clone();
        let delay = self.delay;
        let name = self.name.clone();

        pending.handle = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !claim(&state, generation) {
                return;
            }
            trace!(debouncer = %name, "debounced run");
            action().await;
        }));
    }

    /// Drops the waiting run, if any.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.generation += 1;
        if let Some(handle) = pending.handle.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .handle
            .is_some()
    }
}

/// Marks the run as started if it is still the latest one.
fn claim(state: &Weak<Mutex<PendingRun>>, generation: u64) -> bool {
    let Some(state) = state.upgrade() else {
        return false;
    };
    let mut pending = state.lock().unwrap_or_else(|e| e.into_inner());
    if pending.generation != generation {
        return false;
    }
    pending.handle = None;
    true
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Bus subscriptions that feed a debouncer.
///
/// Dropping it unsubscribes from every topic and cancels the waiting run.
pub struct RefetchOnChange {
    debouncer: Arc<Debouncer>,
    subscriptions: Vec<Subscription>,
}

impl RefetchOnChange {
    pub fn attach(
        subscriber: &dyn ChangeSubscriber,
        topics: &[ChangeTopic],
        debouncer: Arc<Debouncer>,
    ) -> Self {
        let weak = Arc::downgrade(&debouncer);
        let subscriptions = subscriber.on_many(
            topics,
            Arc::new(move || {
                if let Some(debouncer) = weak.upgrade() {
                    debouncer.schedule();
                }
            }),
        );
        Self {
            debouncer,
            subscriptions,
        }
    }

    pub fn debouncer(&self) -> &Arc<Debouncer> {
        &self.debouncer
    }

    pub fn topics(&self) -> Vec<ChangeTopic> {
        self.subscriptions.iter().map(Subscription::topic).collect()
    }
}

impl Drop for RefetchOnChange {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        self.debouncer.cancel();
    }
}
