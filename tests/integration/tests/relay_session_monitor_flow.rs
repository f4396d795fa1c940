use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use opsrelay_access::sha256_hex;
use opsrelay_bot::{RelayConfig, RelayDispatcher, RelayServices};
use opsrelay_core::Identity;
use opsrelay_exec::{
    BackupConfig, OutcomeStatus, ProcessInvocation, ProcessOutput, ProcessRunError, ProcessRunner,
};
use opsrelay_monitor::MonitorScheduler;
use opsrelay_transport::{ChatTransport, CommandMenuEntry, DeliveryError, InboundMessage};

const OPERATOR: i64 = 42;
const SECOND_OPERATOR: i64 = 43;
const STRANGER: i64 = 7;
const T0: u64 = 1_700_000_000_000;
const MINUTE_MS: u64 = 60_000;

/// Answers every invocation with canned output keyed by program name.
#[derive(Default)]
struct CannedRunner {
    invocations: Mutex<Vec<ProcessInvocation>>,
}

#[async_trait]
impl ProcessRunner for CannedRunner {
    async fn run(&self, invocation: &ProcessInvocation) -> Result<ProcessOutput, ProcessRunError> {
        self.invocations
            .lock()
            .expect("invocations lock")
            .push(invocation.clone());
        let stdout = match invocation.program.as_str() {
            "df" => "Filesystem Size Used Avail Use% Mounted on\n/dev/sda1 40G 12G 26G 32% /",
            "uptime" => "10:00:00 up 3 days, load average: 0.10, 0.20, 0.30",
            "free" => "Mem: 2.0Gi 1.1Gi 0.9Gi",
            _ => "ok",
        };
        Ok(ProcessOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }
}

/// Records deliveries; chats listed in `unreachable` fail like a recipient
/// that never opened a direct conversation.
#[derive(Default)]
struct RecordingTransport {
    messages: Mutex<Vec<(i64, String)>>,
    documents: Mutex<Vec<(i64, PathBuf)>>,
    unreachable: Mutex<HashSet<i64>>,
}

impl RecordingTransport {
    fn mark_unreachable(&self, chat_id: i64) {
        self.unreachable
            .lock()
            .expect("unreachable lock")
            .insert(chat_id);
    }

    fn texts_for(&self, chat_id: i64) -> Vec<String> {
        self.messages
            .lock()
            .expect("messages lock")
            .iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn check_reachable(&self, chat_id: i64) -> Result<(), DeliveryError> {
        if self
            .unreachable
            .lock()
            .expect("unreachable lock")
            .contains(&chat_id)
        {
            return Err(DeliveryError::new(
                "delivery_recipient_unreachable",
                "Forbidden: bot can't initiate conversation with a user",
                false,
                "https://api.telegram.org/bot<redacted>/sendMessage",
            )
            .with_http_status(403));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.check_reachable(chat_id)?;
        self.messages
            .lock()
            .expect("messages lock")
            .push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        _caption: &str,
    ) -> Result<(), DeliveryError> {
        self.check_reachable(chat_id)?;
        self.documents
            .lock()
            .expect("documents lock")
            .push((chat_id, path.to_path_buf()));
        Ok(())
    }

    async fn register_commands(&self, _commands: &[CommandMenuEntry]) -> Result<(), DeliveryError> {
        Ok(())
    }
}

struct Harness {
    services: RelayServices,
    runner: Arc<CannedRunner>,
    transport: Arc<RecordingTransport>,
    dispatcher: RelayDispatcher,
    monitor: MonitorScheduler,
}

impl Harness {
    fn new(backup: BackupConfig) -> Self {
        let mut config = RelayConfig::new(
            vec![Identity::new(OPERATOR), Identity::new(SECOND_OPERATOR)],
            sha256_hex("correct horse"),
        );
        config.gateway.backup = backup;
        let runner = Arc::new(CannedRunner::default());
        let services = RelayServices::from_config(&config, runner.clone()).expect("services");
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = services.dispatcher(transport.clone());
        let monitor = services.monitor(transport.clone());
        Self {
            services,
            runner,
            transport,
            dispatcher,
            monitor,
        }
    }

    async fn send(
        &self,
        identity: i64,
        text: &str,
        now_unix_ms: u64,
    ) -> opsrelay_bot::DispatchReport {
        let message = InboundMessage {
            update_id: 1,
            identity: Identity::new(identity),
            chat_id: identity,
            text: text.to_string(),
        };
        self.dispatcher
            .handle_message_at(&message, now_unix_ms)
            .await
            .expect("command report")
    }

    fn launched(&self) -> usize {
        self.runner.invocations.lock().expect("invocations").len()
    }
}

#[tokio::test]
async fn integration_authenticated_subscriber_receives_reports_until_session_expires() {
    let harness = Harness::new(BackupConfig::default());
    harness.send(OPERATOR, "/auth correct horse", T0).await;
    harness.send(OPERATOR, "/monitor_start", T0 + MINUTE_MS).await;

    let first = harness.monitor.run_sweep_at(1, T0 + 5 * MINUTE_MS).await;
    assert_eq!(first.served, vec![Identity::new(OPERATOR)]);
    assert_eq!(first.deliveries, 2);
    let texts = harness.transport.texts_for(OPERATOR);
    assert!(texts.iter().any(|text| text.starts_with("[monitor] Resource usage")));
    assert!(texts.iter().any(|text| text.starts_with("[monitor] Disk usage")));

    let expired = harness.monitor.run_sweep_at(2, T0 + 61 * MINUTE_MS).await;
    assert_eq!(expired.dropped, vec![Identity::new(OPERATOR)]);
    assert_eq!(expired.deliveries, 0);
    assert_eq!(expired.purged_sessions, 1);
    assert!(harness.services.subscribers.is_empty());

    let report = harness.send(OPERATOR, "/disk", T0 + 62 * MINUTE_MS).await;
    assert_eq!(report.reason_code, "deny_session_missing");
}

#[tokio::test]
async fn integration_stranger_never_reaches_gateway_or_registry() {
    let harness = Harness::new(BackupConfig::default());
    for text in [
        "/auth correct horse",
        "/monitor_start",
        "/reboot",
        "/restart_service ssh",
    ] {
        let report = harness.send(STRANGER, text, T0).await;
        assert_eq!(report.reason_code, "deny_not_allowlisted", "{text}");
    }
    assert_eq!(harness.launched(), 0);
    assert!(harness.services.subscribers.is_empty());
    assert!(harness.services.policy.sessions().is_empty());
    assert!(harness
        .transport
        .texts_for(STRANGER)
        .iter()
        .all(|text| text == "access denied"));
}

#[tokio::test]
async fn integration_unreachable_subscriber_does_not_block_others() {
    let harness = Harness::new(BackupConfig::default());
    for identity in [OPERATOR, SECOND_OPERATOR] {
        harness.send(identity, "/auth correct horse", T0).await;
        harness.send(identity, "/monitor_start", T0).await;
    }
    harness.transport.mark_unreachable(OPERATOR);

    let report = harness.monitor.run_sweep_at(1, T0 + 5 * MINUTE_MS).await;
    assert_eq!(report.served.len(), 2);
    assert_eq!(report.delivery_failures, 2);
    assert_eq!(report.deliveries, 2);
    assert_eq!(harness.transport.texts_for(SECOND_OPERATOR).len(), 4);
    assert!(harness
        .services
        .subscribers
        .contains(Identity::new(OPERATOR)));
}

#[tokio::test]
async fn integration_concurrent_requests_and_sweep_share_state() {
    let harness = Harness::new(BackupConfig::default());
    harness.send(OPERATOR, "/auth correct horse", T0).await;
    harness.send(OPERATOR, "/monitor_start", T0).await;

    let (disk, auth, sweep) = tokio::join!(
        harness.send(OPERATOR, "/disk", T0 + MINUTE_MS),
        harness.send(SECOND_OPERATOR, "/auth correct horse", T0 + MINUTE_MS),
        harness.monitor.run_sweep_at(1, T0 + MINUTE_MS),
    );
    assert_eq!(disk.outcome, Some(OutcomeStatus::Success));
    assert_eq!(auth.reason_code, "auth_granted");
    assert_eq!(sweep.served, vec![Identity::new(OPERATOR)]);
    assert_eq!(harness.services.policy.sessions().len(), 2);

    let report = harness
        .send(OPERATOR, "/monitor_stop", T0 + 2 * 60 * MINUTE_MS)
        .await;
    assert_eq!(report.reason_code, "allow_allowlisted");
    assert!(harness.services.subscribers.is_empty());
}

#[tokio::test]
async fn integration_backup_archive_reaches_operator_direct_chat() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let config_dir = workspace.path().join("etc");
    std::fs::create_dir_all(&config_dir).expect("config dir");
    std::fs::write(config_dir.join("relay.conf"), "interval=300\n").expect("write config");
    let harness = Harness::new(BackupConfig {
        paths: vec![config_dir, workspace.path().join("missing.conf")],
        output_dir: workspace.path().join("backups"),
    });
    harness.send(OPERATOR, "/auth correct horse", T0).await;

    let report = harness.send(OPERATOR, "/backup", T0).await;
    assert_eq!(report.outcome, Some(OutcomeStatus::Success));
    assert!(report.delivery_failures.is_empty());
    let documents = harness.transport.documents.lock().expect("documents").clone();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].0, OPERATOR);
    assert!(documents[0].1.starts_with(workspace.path().join("backups")));
    assert!(harness
        .transport
        .texts_for(OPERATOR)
        .iter()
        .any(|text| text.contains("skipped missing path")));
    assert_eq!(harness.launched(), 0);
}
