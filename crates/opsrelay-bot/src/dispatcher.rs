use std::sync::Arc;
use std::time::Duration;

use opsrelay_access::{AccessDecision, AccessPolicy, AuthenticationDecision, DenyReason};
use opsrelay_core::{current_unix_timestamp_ms, Identity};
use opsrelay_exec::{CommandGateway, ExecutionOutcome, Operation, OperationKind, OutcomeStatus};
use opsrelay_monitor::SubscriberRegistry;
use opsrelay_transport::{ChatTransport, DeliveryError, InboundMessage};
use tracing::{debug, info, warn};

use crate::command_catalog::{render_command_help, render_help_overview, unknown_command_message};
use crate::relay_command::{parse_relay_command, RelayCommand};

pub const ACCESS_DENIED_MESSAGE: &str = "access denied";
pub const AUTH_REQUIRED_MESSAGE: &str = "authentication required: send /auth <password>";
pub const SESSION_EXPIRED_MESSAGE: &str = "session expired: send /auth <password> again";

/// What handling one inbound message amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub command: &'static str,
    pub reason_code: &'static str,
    pub outcome: Option<OutcomeStatus>,
    pub replies_sent: usize,
    pub delivery_failures: Vec<String>,
}

impl DispatchReport {
    fn new(command: &'static str, reason_code: &'static str) -> Self {
        Self {
            command,
            reason_code,
            outcome: None,
            replies_sent: 0,
            delivery_failures: Vec::new(),
        }
    }
}

/// Turns inbound commands into gated actions and replies.
///
/// Every privileged path goes through [`AccessPolicy`]; the dispatcher keeps no
/// state of its own.
pub struct RelayDispatcher {
    policy: Arc<AccessPolicy>,
    subscribers: Arc<SubscriberRegistry>,
    gateway: Arc<CommandGateway>,
    transport: Arc<dyn ChatTransport>,
    monitor_interval: Duration,
    bot_username: Option<String>,
}

impl RelayDispatcher {
    pub fn new(
        policy: Arc<AccessPolicy>,
        subscribers: Arc<SubscriberRegistry>,
        gateway: Arc<CommandGateway>,
        transport: Arc<dyn ChatTransport>,
        monitor_interval: Duration,
    ) -> Self {
        Self {
            policy,
            subscribers,
            gateway,
            transport,
            monitor_interval,
            bot_username: None,
        }
    }

    /// Commands mentioning a different bot (`/reboot@other_bot`) are ignored.
    pub fn with_bot_username(mut self, bot_username: Option<String>) -> Self {
        self.bot_username = bot_username;
        self
    }

    /// Handles one message. Returns `None` for plain text that is not a command.
    pub async fn handle_message(&self, message: &InboundMessage) -> Option<DispatchReport> {
        self.handle_message_at(message, current_unix_timestamp_ms())
            .await
    }

    pub async fn handle_message_at(
        &self,
        message: &InboundMessage,
        now_unix_ms: u64,
    ) -> Option<DispatchReport> {
        let Some(command) = parse_relay_command(&message.text, self.bot_username.as_deref())
        else {
            debug!(identity = %message.identity, "ignoring non-command message");
            return None;
        };
        let identity = message.identity;
        debug!(%identity, command = command.log_name(), "inbound command");

        let report = match command {
            RelayCommand::Auth { secret } => {
                self.handle_auth(message, secret.as_deref(), now_unix_ms)
                    .await
            }
            RelayCommand::MonitorStop => self.handle_monitor_stop(message).await,
            RelayCommand::Start => {
                let decision = self.policy.decide_at(identity, now_unix_ms);
                match self.deny_outsider(message, "start", decision).await {
                    Some(report) => report,
                    None => self.handle_start(message, decision).await,
                }
            }
            RelayCommand::Help { topic } => {
                let decision = self.policy.decide_at(identity, now_unix_ms);
                match self.deny_outsider(message, "help", decision).await {
                    Some(report) => report,
                    None => self.handle_help(message, topic.as_deref(), decision).await,
                }
            }
            RelayCommand::Unknown { name } => {
                let decision = self.policy.decide_at(identity, now_unix_ms);
                match self.deny_outsider(message, "unknown", decision).await {
                    Some(report) => report,
                    None => {
                        let mut report = DispatchReport::new("unknown", decision.reason_code());
                        self.reply(message, &unknown_command_message(&name), &mut report)
                            .await;
                        report
                    }
                }
            }
            RelayCommand::MonitorStart => {
                match self.require_session(message, "monitor_start", now_unix_ms).await {
                    Ok(decision) => self.handle_monitor_start(message, decision).await,
                    Err(report) => report,
                }
            }
            RelayCommand::Run(operation) => {
                match self
                    .require_session(message, operation.kind.command_name(), now_unix_ms)
                    .await
                {
                    Ok(decision) => self.handle_operation(message, &operation, decision).await,
                    Err(report) => report,
                }
            }
        };
        Some(report)
    }

    /// Replies with the generic denial when the identity is not allow-listed.
    async fn deny_outsider(
        &self,
        message: &InboundMessage,
        command: &'static str,
        decision: AccessDecision,
    ) -> Option<DispatchReport> {
        let AccessDecision::Deny {
            reason: DenyReason::NotAllowlisted,
        } = decision
        else {
            return None;
        };
        let mut report = DispatchReport::new(command, decision.reason_code());
        self.reply(message, ACCESS_DENIED_MESSAGE, &mut report).await;
        Some(report)
    }

    async fn require_session(
        &self,
        message: &InboundMessage,
        command: &'static str,
        now_unix_ms: u64,
    ) -> Result<AccessDecision, DispatchReport> {
        let decision = self.policy.decide_at(message.identity, now_unix_ms);
        let reason = match decision {
            AccessDecision::Allow { .. } => return Ok(decision),
            AccessDecision::Deny { reason } => reason,
        };
        let mut report = DispatchReport::new(command, decision.reason_code());
        let text = match reason {
            DenyReason::NotAllowlisted => ACCESS_DENIED_MESSAGE,
            DenyReason::SessionMissing => AUTH_REQUIRED_MESSAGE,
            DenyReason::SessionExpired => SESSION_EXPIRED_MESSAGE,
        };
        debug!(
            identity = %message.identity,
            command,
            reason_code = report.reason_code,
            "request denied"
        );
        self.reply(message, text, &mut report).await;
        Err(report)
    }

    async fn handle_start(
        &self,
        message: &InboundMessage,
        decision: AccessDecision,
    ) -> DispatchReport {
        let mut report = DispatchReport::new("start", decision.reason_code());
        let text = match decision {
            AccessDecision::Allow { .. } => {
                "opsrelay is ready. Your session is active; /help lists commands.".to_string()
            }
            AccessDecision::Deny { .. } => {
                "opsrelay is ready. Authenticate with /auth <password>; /help lists commands."
                    .to_string()
            }
        };
        self.reply(message, &text, &mut report).await;
        report
    }

    async fn handle_help(
        &self,
        message: &InboundMessage,
        topic: Option<&str>,
        decision: AccessDecision,
    ) -> DispatchReport {
        let mut report = DispatchReport::new("help", decision.reason_code());
        let text = match topic {
            Some(topic) => render_command_help(topic)
                .unwrap_or_else(|| unknown_command_message(topic.trim_start_matches('/'))),
            None => render_help_overview(),
        };
        self.reply(message, &text, &mut report).await;
        report
    }

    async fn handle_auth(
        &self,
        message: &InboundMessage,
        secret: Option<&str>,
        now_unix_ms: u64,
    ) -> DispatchReport {
        let identity = message.identity;
        let Some(secret) = secret else {
            let (reason, text) = if self.policy.is_allowlisted(identity) {
                ("auth_missing_secret", "usage: /auth <password>")
            } else {
                (DenyReason::NotAllowlisted.reason_code(), ACCESS_DENIED_MESSAGE)
            };
            let mut report = DispatchReport::new("auth", reason);
            self.reply(message, text, &mut report).await;
            return report;
        };

        let decision = self.policy.authenticate_at(identity, secret, now_unix_ms);
        let (reason, text) = match decision {
            AuthenticationDecision::Granted { expires_unix_ms } => {
                let minutes = expires_unix_ms.saturating_sub(now_unix_ms) / 60_000;
                info!(%identity, expires_unix_ms, "session granted");
                (
                    "auth_granted",
                    format!("authenticated: session valid for {minutes} minutes"),
                )
            }
            AuthenticationDecision::InvalidSecret => {
                warn!(%identity, "authentication failed: invalid secret");
                ("auth_invalid_secret", "invalid password".to_string())
            }
            AuthenticationDecision::NotAllowlisted => {
                warn!(%identity, "authentication refused: identity not allow-listed");
                (
                    DenyReason::NotAllowlisted.reason_code(),
                    ACCESS_DENIED_MESSAGE.to_string(),
                )
            }
        };
        let mut report = DispatchReport::new("auth", reason);
        self.reply(message, &text, &mut report).await;
        report
    }

    async fn handle_monitor_start(
        &self,
        message: &InboundMessage,
        decision: AccessDecision,
    ) -> DispatchReport {
        let mut report = DispatchReport::new("monitor_start", decision.reason_code());
        let minutes = (self.monitor_interval.as_secs() / 60).max(1);
        let text = if self.subscribers.subscribe(message.identity) {
            info!(identity = %message.identity, "monitor subscription added");
            format!("monitoring started: usage and disk reports every {minutes} minutes")
        } else {
            format!("monitoring already active: reports every {minutes} minutes")
        };
        self.reply(message, &text, &mut report).await;
        report
    }

    /// Needs allow-list membership only; a lapsed session may still unsubscribe.
    async fn handle_monitor_stop(&self, message: &InboundMessage) -> DispatchReport {
        let identity = message.identity;
        if !self.policy.is_allowlisted(identity) {
            let mut report =
                DispatchReport::new("monitor_stop", DenyReason::NotAllowlisted.reason_code());
            self.reply(message, ACCESS_DENIED_MESSAGE, &mut report).await;
            return report;
        }
        let mut report = DispatchReport::new("monitor_stop", "allow_allowlisted");
        let text = if self.subscribers.unsubscribe(identity) {
            info!(%identity, "monitor subscription removed");
            "monitoring stopped"
        } else {
            "monitoring was not active"
        };
        self.reply(message, text, &mut report).await;
        report
    }

    async fn handle_operation(
        &self,
        message: &InboundMessage,
        operation: &Operation,
        decision: AccessDecision,
    ) -> DispatchReport {
        let mut report = DispatchReport::new(operation.kind.command_name(), decision.reason_code());
        if let Some(notice) = progress_notice(operation.kind) {
            if operation.validate().is_ok() {
                self.reply(message, notice, &mut report).await;
            }
        }

        let outcome = self.gateway.execute(operation).await;
        report.outcome = Some(outcome.status);
        info!(
            identity = %message.identity,
            kind = %operation.kind,
            status = outcome.status.as_str(),
            "operation completed"
        );
        self.reply(message, &render_outcome(&outcome), &mut report)
            .await;

        if let Some(artifact) = outcome.artifact.as_deref() {
            let caption = artifact
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "backup".to_string());
            let chat_id = message.identity.direct_chat_id();
            match self
                .transport
                .send_document(chat_id, artifact, &caption)
                .await
            {
                Ok(()) => report.replies_sent += 1,
                Err(error) => {
                    record_delivery_failure(message.identity, &error, &mut report);
                    let text = format!(
                        "backup archive was created at {} but could not be delivered ({})",
                        artifact.display(),
                        delivery_hint(&error)
                    );
                    self.reply(message, &text, &mut report).await;
                }
            }
        }
        report
    }

    async fn reply(&self, message: &InboundMessage, text: &str, report: &mut DispatchReport) {
        match self.transport.send_message(message.chat_id, text).await {
            Ok(()) => report.replies_sent += 1,
            Err(error) => record_delivery_failure(message.identity, &error, report),
        }
    }
}

fn record_delivery_failure(identity: Identity, error: &DeliveryError, report: &mut DispatchReport) {
    warn!(
        %identity,
        command = report.command,
        reason_code = %error.reason_code,
        detail = %error.detail,
        "reply delivery failed"
    );
    report.delivery_failures.push(error.reason_code.clone());
}

fn delivery_hint(error: &DeliveryError) -> String {
    if error.is_recipient_unreachable() {
        "open a direct chat with the bot and send /start first".to_string()
    } else {
        error.reason_code.clone()
    }
}

fn progress_notice(kind: OperationKind) -> Option<&'static str> {
    match kind {
        OperationKind::PackageUpdate => Some("updating package index; this can take a while"),
        OperationKind::PackageUpgrade => Some("upgrading packages; this can take a while"),
        OperationKind::Reboot => {
            Some("rebooting the host; the bot will be unavailable until it comes back")
        }
        OperationKind::Backup => Some("creating backup archive"),
        _ => None,
    }
}

/// Plain-text reply for an outcome.
pub fn render_outcome(outcome: &ExecutionOutcome) -> String {
    match outcome.status {
        OutcomeStatus::Success => outcome.text.clone(),
        OutcomeStatus::Failed => format!("error: {}", outcome.text),
        OutcomeStatus::TimedOut => format!("timed out: {}", outcome.text),
        OutcomeStatus::Rejected => format!("invalid request: {}", outcome.text),
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use opsrelay_access::sha256_hex;
    use opsrelay_core::Identity;
    use opsrelay_exec::{
        BackupConfig, GatewayConfig, OutcomeStatus, ProcessInvocation, ProcessOutput,
        ProcessRunError, ProcessRunner,
    };
    use opsrelay_transport::{ChatTransport, CommandMenuEntry, DeliveryError, InboundMessage};

    use super::{
        RelayDispatcher, ACCESS_DENIED_MESSAGE, AUTH_REQUIRED_MESSAGE, SESSION_EXPIRED_MESSAGE,
    };
    use crate::config::{RelayConfig, RelayServices};

    const NOW: u64 = 1_700_000_000_000;
    const HOUR_MS: u64 = 3_600_000;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<ProcessInvocation>>,
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn run(
            &self,
            invocation: &ProcessInvocation,
        ) -> Result<ProcessOutput, ProcessRunError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(invocation.clone());
            if invocation.program == "systemctl" {
                return Ok(ProcessOutput {
                    stdout: String::new(),
                    stderr: "Unit nginx.service could not be found.".to_string(),
                    exit_code: Some(4),
                });
            }
            Ok(ProcessOutput {
                stdout: format!("{} ok", invocation.program),
                stderr: String::new(),
                exit_code: Some(0),
            })
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        messages: Mutex<Vec<(i64, String)>>,
        documents: Mutex<Vec<(i64, PathBuf)>>,
        reject_documents: bool,
    }

    impl RecordingTransport {
        fn messages(&self) -> Vec<(i64, String)> {
            self.messages.lock().expect("messages lock").clone()
        }

        fn last_text(&self) -> String {
            self.messages().last().map(|(_, text)| text.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
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
            if self.reject_documents {
                return Err(DeliveryError::new(
                    "delivery_recipient_unreachable",
                    "Forbidden: bot can't initiate conversation with a user",
                    false,
                    "test",
                ));
            }
            self.documents
                .lock()
                .expect("documents lock")
                .push((chat_id, path.to_path_buf()));
            Ok(())
        }

        async fn register_commands(
            &self,
            _commands: &[CommandMenuEntry],
        ) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    struct Fixture {
        services: RelayServices,
        runner: Arc<RecordingRunner>,
        transport: Arc<RecordingTransport>,
        dispatcher: RelayDispatcher,
    }

    fn fixture_with(transport: RecordingTransport, gateway: GatewayConfig) -> Fixture {
        let mut config = RelayConfig::new(vec![Identity::new(42)], sha256_hex("pw"));
        config.gateway = gateway;
        let runner = Arc::new(RecordingRunner::default());
        let services = RelayServices::from_config(&config, runner.clone()).expect("services");
        let transport = Arc::new(transport);
        let dispatcher = services.dispatcher(transport.clone());
        Fixture {
            services,
            runner,
            transport,
            dispatcher,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingTransport::default(), GatewayConfig::default())
    }

    fn message(identity: i64, text: &str) -> InboundMessage {
        InboundMessage {
            update_id: 1,
            identity: Identity::new(identity),
            chat_id: identity,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn functional_auth_then_operation_within_session_window() {
        let fx = fixture();
        let report = fx
            .dispatcher
            .handle_message_at(&message(42, "/auth pw"), NOW)
            .await
            .expect("report");
        assert_eq!(report.reason_code, "auth_granted");
        assert!(fx.transport.last_text().contains("60 minutes"));

        let report = fx
            .dispatcher
            .handle_message_at(&message(42, "/disk"), NOW + 59 * 60_000)
            .await
            .expect("report");
        assert_eq!(report.outcome, Some(OutcomeStatus::Success));
        assert_eq!(fx.transport.last_text(), "df ok");

        let report = fx
            .dispatcher
            .handle_message_at(&message(42, "/disk"), NOW + 61 * 60_000)
            .await
            .expect("report");
        assert_eq!(report.reason_code, "deny_session_expired");
        assert_eq!(fx.transport.last_text(), SESSION_EXPIRED_MESSAGE);
        assert_eq!(fx.runner.calls.lock().expect("calls").len(), 1);
    }

    #[tokio::test]
    async fn regression_non_allowlisted_identity_gets_generic_denial() {
        let fx = fixture();
        for text in [
            "/auth pw",
            "/disk",
            "/start",
            "/help",
            "/monitor_start",
            "/monitor_stop",
            "/bogus",
        ] {
            let report = fx
                .dispatcher
                .handle_message_at(&message(7, text), NOW)
                .await
                .expect("report");
            assert_eq!(report.reason_code, "deny_not_allowlisted", "{text}");
            assert_eq!(fx.transport.last_text(), ACCESS_DENIED_MESSAGE);
        }
        assert!(fx.services.policy.sessions().is_empty());
        assert!(fx.runner.calls.lock().expect("calls").is_empty());
    }

    #[tokio::test]
    async fn regression_command_for_another_bot_is_ignored() {
        let mut config = RelayConfig::new(vec![Identity::new(42)], sha256_hex("pw"));
        config.bot_username = Some("opsrelay_bot".to_string());
        let runner = Arc::new(RecordingRunner::default());
        let services = RelayServices::from_config(&config, runner.clone()).expect("services");
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = services.dispatcher(transport.clone());
        dispatcher
            .handle_message_at(&message(42, "/auth pw"), NOW)
            .await
            .expect("auth report");

        let ignored = dispatcher
            .handle_message_at(&message(42, "/reboot@other_bot"), NOW)
            .await;
        assert!(ignored.is_none());
        assert!(runner.calls.lock().expect("calls").is_empty());

        let report = dispatcher
            .handle_message_at(&message(42, "/disk@OpsRelay_Bot"), NOW)
            .await
            .expect("report");
        assert_eq!(report.outcome, Some(OutcomeStatus::Success));
        assert_eq!(transport.messages().len(), 2);
    }

    #[tokio::test]
    async fn regression_wrong_secret_leaves_store_untouched() {
        let fx = fixture();
        let report = fx
            .dispatcher
            .handle_message_at(&message(42, "/auth nope"), NOW)
            .await
            .expect("report");
        assert_eq!(report.reason_code, "auth_invalid_secret");
        assert!(fx.services.policy.sessions().is_empty());
        let report = fx
            .dispatcher
            .handle_message_at(&message(42, "/usage"), NOW)
            .await
            .expect("report");
        assert_eq!(report.reason_code, "deny_session_missing");
        assert_eq!(fx.transport.last_text(), AUTH_REQUIRED_MESSAGE);
    }

    #[tokio::test]
    async fn functional_missing_service_reports_failed_diagnostic() {
        let fx = fixture();
        fx.dispatcher
            .handle_message_at(&message(42, "/auth pw"), NOW)
            .await;
        let report = fx
            .dispatcher
            .handle_message_at(&message(42, "/service_status nginx"), NOW)
            .await
            .expect("report");
        assert_eq!(report.outcome, Some(OutcomeStatus::Failed));
        assert!(fx.transport.last_text().starts_with("error: "));
        assert!(fx.transport.last_text().contains("could not be found"));
    }

    #[tokio::test]
    async fn regression_blank_argument_is_rejected_with_usage() {
        let fx = fixture();
        fx.dispatcher
            .handle_message_at(&message(42, "/auth pw"), NOW)
            .await;
        let report = fx
            .dispatcher
            .handle_message_at(&message(42, "/ping   "), NOW)
            .await
            .expect("report");
        assert_eq!(report.outcome, Some(OutcomeStatus::Rejected));
        assert!(fx.transport.last_text().contains("/ping <host>"));
        assert!(fx.runner.calls.lock().expect("calls").is_empty());
    }

    #[tokio::test]
    async fn functional_monitor_subscription_lifecycle() {
        let fx = fixture();
        let report = fx
            .dispatcher
            .handle_message_at(&message(42, "/monitor_start"), NOW)
            .await
            .expect("report");
        assert_eq!(report.reason_code, "deny_session_missing");
        assert!(fx.services.subscribers.is_empty());

        fx.dispatcher
            .handle_message_at(&message(42, "/auth pw"), NOW)
            .await;
        fx.dispatcher
            .handle_message_at(&message(42, "/monitor_start"), NOW)
            .await;
        assert!(fx.services.subscribers.contains(Identity::new(42)));
        assert!(fx.transport.last_text().contains("every 5 minutes"));

        let report = fx
            .dispatcher
            .handle_message_at(&message(42, "/monitor_stop"), NOW + 2 * HOUR_MS)
            .await
            .expect("report");
        assert_eq!(report.reason_code, "allow_allowlisted");
        assert!(fx.services.subscribers.is_empty());
        assert_eq!(fx.transport.last_text(), "monitoring stopped");
    }

    #[tokio::test]
    async fn functional_backup_delivery_failure_is_reported_separately() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config_file = temp.path().join("app.conf");
        std::fs::write(&config_file, "x=1").expect("write");
        let transport = RecordingTransport {
            reject_documents: true,
            ..RecordingTransport::default()
        };
        let gateway = GatewayConfig {
            backup: BackupConfig {
                paths: vec![config_file],
                output_dir: temp.path().join("out"),
            },
            ..GatewayConfig::default()
        };
        let fx = fixture_with(transport, gateway);
        fx.dispatcher
            .handle_message_at(&message(42, "/auth pw"), NOW)
            .await;
        let report = fx
            .dispatcher
            .handle_message_at(&message(42, "/backup"), NOW)
            .await
            .expect("report");
        assert_eq!(report.outcome, Some(OutcomeStatus::Success));
        assert_eq!(report.delivery_failures, vec!["delivery_recipient_unreachable"]);
        let texts = fx
            .transport
            .messages()
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>();
        assert!(texts.iter().any(|text| text.starts_with("backup archive created")));
        assert!(fx.transport.last_text().contains("could not be delivered"));
        assert!(fx.transport.last_text().contains("/start"));
    }

    #[tokio::test]
    async fn functional_backup_archive_is_sent_to_direct_chat() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config_file = temp.path().join("app.conf");
        std::fs::write(&config_file, "x=1").expect("write");
        let gateway = GatewayConfig {
            backup: BackupConfig {
                paths: vec![config_file],
                output_dir: temp.path().join("out"),
            },
            ..GatewayConfig::default()
        };
        let fx = fixture_with(RecordingTransport::default(), gateway);
        fx.dispatcher
            .handle_message_at(&message(42, "/auth pw"), NOW)
            .await;
        let group_message = InboundMessage {
            chat_id: -100,
            ..message(42, "/backup")
        };
        let report = fx
            .dispatcher
            .handle_message_at(&group_message, NOW)
            .await
            .expect("report");
        assert!(report.delivery_failures.is_empty());
        let documents = fx.transport.documents.lock().expect("documents").clone();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].0, 42);
        assert!(documents[0].1.exists());
    }

    #[tokio::test]
    async fn unit_plain_text_and_help_do_not_need_a_session() {
        let fx = fixture();
        assert!(fx
            .dispatcher
            .handle_message_at(&message(42, "hello"), NOW)
            .await
            .is_none());
        let report = fx
            .dispatcher
            .handle_message_at(&message(42, "/help restart_service"), NOW)
            .await
            .expect("report");
        assert_eq!(report.replies_sent, 1);
        assert!(fx.transport.last_text().contains("/restart_service <service name>"));
        fx.dispatcher
            .handle_message_at(&message(42, "/dsk"), NOW)
            .await;
        assert!(fx.transport.last_text().contains("did you mean /disk?"));
    }
}
