use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use opsrelay_transport::{ChatTransport, DeliveryError, InboundMessage, UpdateSource};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::command_catalog::command_menu;
use crate::dispatcher::RelayDispatcher;

pub const DEFAULT_POLL_ERROR_DELAY: Duration = Duration::from_secs(5);
const MAX_POLL_ERROR_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayRuntimeConfig {
    /// Base delay after a failed poll; grows linearly with the failure streak.
    pub poll_error_delay: Duration,
}

impl Default for RelayRuntimeConfig {
    fn default() -> Self {
        Self {
            poll_error_delay: DEFAULT_POLL_ERROR_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollCycleReport {
    pub received: usize,
    pub spawned: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeSummary {
    pub polls: u64,
    pub poll_failures: u64,
    pub messages: u64,
    pub menu_registered: bool,
}

/// Long-polling loop that hands every inbound message to the dispatcher on
/// its own task. Messages from one chat never run concurrently.
pub struct RelayRuntime {
    source: Arc<dyn UpdateSource>,
    transport: Arc<dyn ChatTransport>,
    dispatcher: Arc<RelayDispatcher>,
    config: RelayRuntimeConfig,
    chat_locks: HashMap<i64, Arc<Mutex<()>>>,
    offset: Option<i64>,
    tasks: JoinSet<()>,
}

impl RelayRuntime {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        transport: Arc<dyn ChatTransport>,
        dispatcher: Arc<RelayDispatcher>,
        config: RelayRuntimeConfig,
    ) -> Self {
        Self {
            source,
            transport,
            dispatcher,
            config,
            chat_locks: HashMap::new(),
            offset: None,
            tasks: JoinSet::new(),
        }
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    pub async fn register_command_menu(&self) -> bool {
        let menu = command_menu();
        match self.transport.register_commands(&menu).await {
            Ok(()) => {
                info!(commands = menu.len(), "command menu registered");
                true
            }
            Err(error) => {
                warn!(
                    reason_code = %error.reason_code,
                    detail = %error.detail,
                    "command menu registration failed"
                );
                false
            }
        }
    }

    /// Fetches one batch and spawns a handler task per message.
    pub async fn poll_once(&mut self) -> Result<PollCycleReport, DeliveryError> {
        let batch = self.source.poll_updates(self.offset).await?;
        if let Some(next_offset) = batch.next_offset {
            self.offset = Some(next_offset);
        }
        let mut report = PollCycleReport {
            received: batch.messages.len(),
            spawned: 0,
        };
        for message in batch.messages {
            self.spawn_handler(message);
            report.spawned += 1;
        }
        Ok(report)
    }

    fn spawn_handler(&mut self, message: InboundMessage) {
        let lock = Arc::clone(self.chat_locks.entry(message.chat_id).or_default());
        let dispatcher = Arc::clone(&self.dispatcher);
        self.tasks.spawn(async move {
            let _chat_guard = lock.lock_owned().await;
            if let Some(report) = dispatcher.handle_message(&message).await {
                debug!(
                    update_id = message.update_id,
                    command = report.command,
                    reason_code = report.reason_code,
                    replies = report.replies_sent,
                    delivery_failures = report.delivery_failures.len(),
                    "message handled"
                );
            }
        });
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(error) = result {
                warn!(%error, "message handler task failed");
            }
        }
        self.forget_idle_chats();
    }

    async fn drain(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(error) = result {
                warn!(%error, "message handler task failed");
            }
        }
        self.forget_idle_chats();
    }

    /// Drops per-chat locks no pending handler holds a clone of.
    fn forget_idle_chats(&mut self) {
        self.chat_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped, then
    /// waits for in-flight handlers before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<RuntimeSummary> {
        let mut summary = RuntimeSummary {
            menu_registered: self.register_command_menu().await,
            ..RuntimeSummary::default()
        };
        let mut failure_streak: u32 = 0;
        info!("relay runtime started");

        while !*shutdown.borrow() {
            let polled = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                polled = self.poll_once() => polled,
            };
            summary.polls += 1;
            match polled {
                Ok(report) => {
                    failure_streak = 0;
                    summary.messages += report.spawned as u64;
                    if report.received > 0 {
                        debug!(received = report.received, offset = ?self.offset, "poll cycle");
                    }
                }
                Err(error) => {
                    failure_streak = failure_streak.saturating_add(1);
                    summary.poll_failures += 1;
                    let delay = self
                        .config
                        .poll_error_delay
                        .saturating_mul(failure_streak)
                        .min(MAX_POLL_ERROR_DELAY);
                    warn!(
                        reason_code = %error.reason_code,
                        detail = %error.detail,
                        failure_streak,
                        delay_ms = delay.as_millis() as u64,
                        "update poll failed"
                    );
                    tokio::select! {
                        biased;
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
            self.reap_finished();
        }

        info!(in_flight = self.tasks.len(), "relay runtime stopping");
        self.drain().await;
        info!(
            polls = summary.polls,
            poll_failures = summary.poll_failures,
            messages = summary.messages,
            "relay runtime stopped"
        );
        Ok(summary)
    }
}
