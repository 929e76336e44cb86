//! Foreground/background state of the host application.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppLifecycle {
    #[default]
    Foreground,
    Background,
}

impl AppLifecycle {
    pub fn is_foreground(&self) -> bool {
        matches!(self, AppLifecycle::Foreground)
    }
}

impl fmt::Display for AppLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppLifecycle::Foreground => write!(f, "foreground"),
            AppLifecycle::Background => write!(f, "background"),
        }
    }
}

/// Shell-side handle for reporting lifecycle transitions.
///
/// Consumers call [`LifecycleSignal::subscribe`] and react on `changed()`.
#[derive(Debug)]
pub struct LifecycleSignal {
    tx: watch::Sender<AppLifecycle>,
}

impl LifecycleSignal {
    pub fn new(initial: AppLifecycle) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Records a transition. Repeating the current state notifies nobody.
    pub fn set(&self, state: AppLifecycle) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    pub fn current(&self) -> AppLifecycle {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppLifecycle> {
        self.tx.subscribe()
    }
}

impl Default for LifecycleSignal {
    fn default() -> Self {
        Self::new(AppLifecycle::Foreground)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_state_does_not_notify() {
        let signal = LifecycleSignal::default();
        let mut rx = signal.subscribe();

        signal.set(AppLifecycle::Foreground);
        assert!(!rx.has_changed().unwrap());

        signal.set(AppLifecycle::Background);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), AppLifecycle::Background);
        assert!(!signal.current().is_foreground());
    }
}
