//! Supervision of a single realtime channel.
//!
//! The channel is owned by one task. The task forwards row changes to a
//! callback, re-joins after error statuses, and obeys rejoin/close
//! commands from its [`ChannelGuard`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::ports::{ChannelEvent, ChannelStatus, RealtimeChannel, RowChange};

const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Rejoin,
    Close,
}

/// Settings shared by every supervised channel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SupervisorConfig {
    /// Wait between an error status and the resubscribe attempt.
    pub reconnect_delay: Duration,
    /// Log status transitions at debug instead of trace.
    pub verbose: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(800),
            verbose: false,
        }
    }
}

/// Owner-side handle of a supervised channel.
pub(crate) struct ChannelGuard {
    name: String,
    commands: mpsc::UnboundedSender<Command>,
    joined: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ChannelGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_joined(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }

    /// Asks the task to re-join unless the channel is already joined.
    pub fn rejoin_if_needed(&self) {
        if !self.is_joined() {
            let _ = self.commands.send(Command::Rejoin);
        }
    }

    /// Closes the channel, aborting the task if it does not finish in time.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Close);
        if timeout(CLOSE_GRACE, &mut self.task).await.is_err() {
            warn!(channel = %self.name, "channel did not close in time, aborting");
            self.task.abort();
        }
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns the task that owns `channel`.
///
/// `on_change` receives the index of the matching subscription and the
/// change itself.
pub(crate) fn supervise<F>(
    mut channel: Box<dyn RealtimeChannel>,
    config: SupervisorConfig,
    mut on_change: F,
) -> ChannelGuard
where
    F: FnMut(usize, RowChange) + Send + 'static,
{
    let name = channel.name().to_string();
    let joined = Arc::new(AtomicBool::new(channel.is_joined()));
    let (commands, mut rx) = mpsc::unbounded_channel();

    let task_joined = joined.clone();
    let task_name = name.clone();
    let task = tokio::spawn(async move {
        let mut retry_at: Option<Instant> = None;

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Rejoin) => {
                        if !channel.is_joined() {
                            retry_at = None;
                            info!(channel = %task_name, "rejoining channel");
                            if !resubscribe(channel.as_mut(), &task_name).await {
                                retry_at = Some(Instant::now() + config.reconnect_delay);
                            }
                        }
                    }
                    Some(Command::Close) | None => {
                        channel.close().await;
                        task_joined.store(false, Ordering::SeqCst);
                        info!(channel = %task_name, "channel closed");
                        break;
                    }
                },
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    retry_at = None;
                    if !resubscribe(channel.as_mut(), &task_name).await {
                        retry_at = Some(Instant::now() + config.reconnect_delay);
                    }
                }
                event = channel.next_event() => match event {
                    Some(ChannelEvent::Change { subscription, change }) => {
                        on_change(subscription, change);
                    }
                    Some(ChannelEvent::Status(status)) => {
                        log_status(config.verbose, &task_name, status);
                        task_joined.store(status == ChannelStatus::Subscribed, Ordering::SeqCst);
                        if status == ChannelStatus::Subscribed {
                            retry_at = None;
                        } else if status.needs_resubscribe() && retry_at.is_none() {
                            warn!(channel = %task_name, %status, "channel unhealthy, scheduling resubscribe");
                            retry_at = Some(Instant::now() + config.reconnect_delay);
                        }
                    }
                    None => {
                        task_joined.store(false, Ordering::SeqCst);
                        debug!(channel = %task_name, "channel stream ended");
                        break;
                    }
                },
            }
        }
    });

    ChannelGuard {
        name,
        commands,
        joined,
        task,
    }
}

/// Returns false when the attempt failed and another one is due.
async fn resubscribe(channel: &mut dyn RealtimeChannel, name: &str) -> bool {
    match channel.resubscribe().await {
        Ok(()) => true,
        Err(e) => {
            warn!(channel = %name, error = %e, "resubscribe failed");
            false
        }
    }
}

fn log_status(verbose: bool, channel: &str, status: ChannelStatus) {
    if verbose {
        debug!(channel = %channel, %status, "channel status");
    } else {
        trace!(channel = %channel, %status, "channel status");
    }
}
