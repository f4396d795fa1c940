use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use opsrelay_access::AccessPolicy;
use opsrelay_core::{current_unix_timestamp_ms, Identity};
use opsrelay_exec::{CommandGateway, ExecutionOutcome, Operation, OperationKind, OutcomeStatus};
use opsrelay_transport::ChatTransport;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Read-only operations pushed to every authorized subscriber, in order.
pub const MONITOR_BUNDLE: [OperationKind; 2] =
    [OperationKind::ResourceUsage, OperationKind::DiskUsage];

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_SWEEP_SOFT_CAP: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub interval: Duration,
    /// Once a sweep has run this long, remaining subscribers wait for the
    /// next tick. Calls already in flight are never cut short.
    pub sweep_soft_cap: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MONITOR_INTERVAL,
            sweep_soft_cap: DEFAULT_SWEEP_SOFT_CAP,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tick: u64,
    pub subscribers: usize,
    pub served: Vec<Identity>,
    pub dropped: Vec<Identity>,
    pub deferred: Vec<Identity>,
    pub deliveries: usize,
    pub delivery_failures: usize,
    pub purged_sessions: usize,
}

pub struct MonitorScheduler {
    policy: Arc<AccessPolicy>,
    subscribers: Arc<crate::SubscriberRegistry>,
    gateway: Arc<CommandGateway>,
    transport: Arc<dyn ChatTransport>,
    config: MonitorConfig,
    /// Subscribers the previous sweep deferred; they go first next time.
    carry_over: Mutex<Vec<Identity>>,
}

impl MonitorScheduler {
    pub fn new(
        policy: Arc<AccessPolicy>,
        subscribers: Arc<crate::SubscriberRegistry>,
        gateway: Arc<CommandGateway>,
        transport: Arc<dyn ChatTransport>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            policy,
            subscribers,
            gateway,
            transport,
            config,
            carry_over: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> MonitorConfig {
        self.config
    }

    pub async fn run_sweep(&self, tick: u64) -> SweepReport {
        self.run_sweep_at(tick, current_unix_timestamp_ms()).await
    }

    /// One pass over a snapshot of the subscribers. The bundle is executed once
    /// and fanned out to every authorized subscriber. No lock is held while the
    /// gateway or the transport is awaited.
    pub async fn run_sweep_at(&self, tick: u64, now_unix_ms: u64) -> SweepReport {
        let started = Instant::now();
        let queue = self.delivery_order(self.subscribers.snapshot());
        let mut report = SweepReport {
            tick,
            subscribers: queue.len(),
            ..SweepReport::default()
        };

        let mut authorized = Vec::with_capacity(queue.len());
        for identity in queue {
            if self.policy.is_authorized_at(identity, now_unix_ms) {
                authorized.push(identity);
            } else {
                self.subscribers.unsubscribe(identity);
                debug!(%identity, tick, "monitor subscriber no longer authorized; dropped");
                report.dropped.push(identity);
            }
        }

        if !authorized.is_empty() {
            let texts = self.collect_bundle().await;
            for (position, identity) in authorized.iter().copied().enumerate() {
                // The head of the queue is always served.
                if position > 0 && started.elapsed() >= self.config.sweep_soft_cap {
                    report.deferred.extend_from_slice(&authorized[position..]);
                    break;
                }
                self.deliver_bundle(identity, tick, &texts, &mut report).await;
                report.served.push(identity);
            }
        }
        self.store_carry_over(&report.deferred);

        if !report.deferred.is_empty() {
            warn!(
                tick,
                deferred = report.deferred.len(),
                soft_cap_ms = self.config.sweep_soft_cap.as_millis() as u64,
                "monitor sweep hit soft cap; remaining subscribers wait for next tick"
            );
        }
        report.purged_sessions = self.policy.sessions().purge_expired_at(now_unix_ms);
        info!(
            tick,
            subscribers = report.subscribers,
            served = report.served.len(),
            dropped = report.dropped.len(),
            deliveries = report.deliveries,
            delivery_failures = report.delivery_failures,
            purged_sessions = report.purged_sessions,
            "monitor sweep finished"
        );
        report
    }

    /// Previously deferred subscribers first, then everyone else in registry
    /// order. Carried identities that have since unsubscribed are dropped.
    fn delivery_order(&self, snapshot: Vec<Identity>) -> Vec<Identity> {
        let carried = match self.carry_over.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let mut order: Vec<Identity> = carried
            .into_iter()
            .filter(|identity| snapshot.contains(identity))
            .collect();
        for identity in snapshot {
            if !order.contains(&identity) {
                order.push(identity);
            }
        }
        order
    }

    fn store_carry_over(&self, deferred: &[Identity]) {
        match self.carry_over.lock() {
            Ok(mut guard) => *guard = deferred.to_vec(),
            Err(poisoned) => *poisoned.into_inner() = deferred.to_vec(),
        }
    }

    async fn collect_bundle(&self) -> Vec<(OperationKind, String)> {
        let mut texts = Vec::with_capacity(MONITOR_BUNDLE.len());
        for kind in MONITOR_BUNDLE {
            let outcome = self.gateway.execute(&Operation::new(kind)).await;
            texts.push((kind, render_monitor_report(kind, &outcome)));
        }
        texts
    }

    async fn deliver_bundle(
        &self,
        identity: Identity,
        tick: u64,
        texts: &[(OperationKind, String)],
        report: &mut SweepReport,
    ) {
        for (kind, text) in texts {
            match self
                .transport
                .send_message(identity.direct_chat_id(), text)
                .await
            {
                Ok(()) => report.deliveries += 1,
                Err(error) => {
                    report.delivery_failures += 1;
                    warn!(
                        %identity,
                        tick,
                        kind = %kind,
                        reason_code = %error.reason_code,
                        "monitor delivery failed"
                    );
                }
            }
        }
    }
}

pub fn render_monitor_report(kind: OperationKind, outcome: &ExecutionOutcome) -> String {
    let title = match kind {
        OperationKind::ResourceUsage => "Resource usage",
        OperationKind::DiskUsage => "Disk usage",
        other => other.as_str(),
    };
    match outcome.status {
        OutcomeStatus::Success => format!("[monitor] {title}\n{}", outcome.text),
        status => format!("[monitor] {title} ({})\n{}", status.as_str(), outcome.text),
    }
}

/// Owns the background sweep task. Dropping the handle without calling
/// [`MonitorHandle::shutdown`] leaves the task running until the runtime stops.
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Spawns the sweep loop. The first sweep runs one interval after start.
pub fn start_monitor_scheduler(scheduler: Arc<MonitorScheduler>) -> Result<MonitorHandle> {
    let config = scheduler.config();
    if config.interval.is_zero() {
        bail!("monitor interval must be greater than zero");
    }
    if config.sweep_soft_cap.is_zero() {
        bail!("monitor sweep soft cap must be greater than zero");
    }
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(run_monitor_loop(scheduler, shutdown_rx));
    info!(
        interval_ms = config.interval.as_millis() as u64,
        "monitor scheduler started"
    );
    Ok(MonitorHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

async fn run_monitor_loop(
    scheduler: Arc<MonitorScheduler>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let period = scheduler.config().interval;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick = 0_u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick = tick.saturating_add(1);
                scheduler.run_sweep(tick).await;
            }
            _ = &mut shutdown_rx => {
                info!(ticks = tick, "monitor scheduler stopped");
                break;
            }
        }
    }
}
