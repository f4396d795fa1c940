use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use opsrelay_core::{first_non_blank, truncate_chars};
use tracing::{debug, info, warn};

use crate::backup::{create_backup_archive_now, BackupConfig};
use crate::operation::{Operation, OperationKind};
use crate::outcome::ExecutionOutcome;
use crate::process_runner::{ProcessInvocation, ProcessOutput, ProcessRunError, ProcessRunner};

pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PACKAGE_TIMEOUT: Duration = Duration::from_secs(1_800);
pub const DEFAULT_INSPECTION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 3_500;
pub const DEFAULT_MAIN_SERVICES: [&str; 4] = ["cron", "ssh", "sysstat", "mysql"];
pub const DEFAULT_BACKUP_DIR: &str = "/var/backups/opsrelay";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub network_timeout: Duration,
    pub package_timeout: Duration,
    pub inspection_timeout: Duration,
    pub max_output_chars: usize,
    pub main_services: Vec<String>,
    pub backup: BackupConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
            package_timeout: DEFAULT_PACKAGE_TIMEOUT,
            inspection_timeout: DEFAULT_INSPECTION_TIMEOUT,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            main_services: DEFAULT_MAIN_SERVICES
                .iter()
                .map(|service| service.to_string())
                .collect(),
            backup: BackupConfig {
                paths: Vec::new(),
                output_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            },
        }
    }
}

/// Maps operations onto fixed argument vectors and classifies what comes back.
///
/// The gateway holds no locks and no per-request state, so the dispatcher and
/// the monitor share one instance behind an `Arc`.
#[derive(Clone)]
pub struct CommandGateway {
    runner: Arc<dyn ProcessRunner>,
    config: GatewayConfig,
}

impl CommandGateway {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: GatewayConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn execute(&self, operation: &Operation) -> ExecutionOutcome {
        let argument = match operation.validate() {
            Ok(argument) => argument,
            Err(rejection) => {
                debug!(kind = %operation.kind, "operation rejected before launch");
                return ExecutionOutcome::rejected(rejection.usage_hint());
            }
        };
        if operation.kind.is_mutating() {
            info!(kind = %operation.kind, argument = argument.as_deref(), "running host mutation");
        }

        let outcome = match operation.kind {
            OperationKind::ResourceUsage => self.resource_usage().await,
            OperationKind::MainServicesStatus => self.main_services_status().await,
            OperationKind::Backup => self.backup().await,
            kind => match self.invocation_for(kind, argument.as_deref()) {
                Some(invocation) => {
                    let result = self.runner.run(&invocation).await;
                    classify(kind, argument.as_deref(), &invocation, result)
                }
                None => ExecutionOutcome::failed(format!("{kind} has no process mapping")),
            },
        };
        debug!(kind = %operation.kind, status = outcome.status.as_str(), "operation finished");
        self.cap(outcome)
    }

    /// The argv a kind launches. Usage and main services compose several of
    /// these; backup launches nothing.
    pub fn invocation_for(
        &self,
        kind: OperationKind,
        argument: Option<&str>,
    ) -> Option<ProcessInvocation> {
        let arg = argument.unwrap_or_default();
        let invocation = match kind {
            OperationKind::DiskUsage => ProcessInvocation::new("df", ["-h"]),
            OperationKind::ResourceUsage => ProcessInvocation::new("uptime", Vec::<String>::new()),
            OperationKind::ServiceStatus => {
                ProcessInvocation::new("systemctl", ["status", "--no-pager", arg])
            }
            OperationKind::ServiceRestart => {
                ProcessInvocation::new("sudo", ["-n", "systemctl", "restart", arg])
            }
            OperationKind::MainServicesStatus => {
                ProcessInvocation::new("systemctl", ["is-active", arg])
            }
            OperationKind::Ping => ProcessInvocation::new("ping", ["-c", "4", arg]),
            OperationKind::Traceroute => ProcessInvocation::new("traceroute", [arg]),
            OperationKind::PackageUpdate => {
                ProcessInvocation::new("sudo", ["-n", "apt-get", "update"])
            }
            OperationKind::PackageUpgrade => {
                ProcessInvocation::new("sudo", ["-n", "apt-get", "upgrade", "-y"])
            }
            OperationKind::NetworkStatus => ProcessInvocation::new("ip", ["-brief", "address"]),
            OperationKind::Reboot => ProcessInvocation::new("sudo", ["-n", "systemctl", "reboot"]),
            OperationKind::Backup => return None,
        };
        Some(invocation.with_timeout(Some(self.timeout_for(kind))))
    }

    pub fn timeout_for(&self, kind: OperationKind) -> Duration {
        if kind.is_network_facing() {
            return self.config.network_timeout;
        }
        match kind {
            OperationKind::PackageUpdate | OperationKind::PackageUpgrade => {
                self.config.package_timeout
            }
            _ => self.config.inspection_timeout,
        }
    }

    async fn resource_usage(&self) -> ExecutionOutcome {
        let load = ProcessInvocation::new("uptime", Vec::<String>::new())
            .with_timeout(Some(self.timeout_for(OperationKind::ResourceUsage)));
        let memory = ProcessInvocation::new("free", ["-h"])
            .with_timeout(Some(self.timeout_for(OperationKind::ResourceUsage)));

        let load_output = match self.run_checked(OperationKind::ResourceUsage, &load).await {
            Ok(output) => output,
            Err(outcome) => return outcome,
        };
        let memory_output = match self.run_checked(OperationKind::ResourceUsage, &memory).await {
            Ok(output) => output,
            Err(outcome) => return outcome,
        };
        ExecutionOutcome::success(format!(
            "load: {}\n\nmemory:\n{}",
            load_output.stdout.trim(),
            memory_output.stdout.trim_end()
        ))
    }

    async fn main_services_status(&self) -> ExecutionOutcome {
        if self.config.main_services.is_empty() {
            return ExecutionOutcome::failed("no main services configured");
        }
        let mut lines = Vec::with_capacity(self.config.main_services.len());
        for service in &self.config.main_services {
            let invocation = ProcessInvocation::new("systemctl", ["is-active", service.as_str()])
                .with_timeout(Some(self.timeout_for(OperationKind::MainServicesStatus)));
            // `is-active` exits non-zero for inactive units; the state is still data.
            match self.runner.run(&invocation).await {
                Ok(output) => {
                    let state = first_non_blank(&[&output.stdout, &output.stderr])
                        .and_then(|text| text.lines().next())
                        .unwrap_or("unknown");
                    lines.push(format!("{service}: {state}"));
                }
                Err(error) => {
                    return classify(
                        OperationKind::MainServicesStatus,
                        Some(service.as_str()),
                        &invocation,
                        Err(error),
                    )
                }
            }
        }
        ExecutionOutcome::success(lines.join("\n"))
    }

    async fn backup(&self) -> ExecutionOutcome {
        let config = self.config.backup.clone();
        match tokio::task::spawn_blocking(move || create_backup_archive_now(&config)).await {
            Ok(Ok(report)) => {
                let archive_path = report.archive_path.clone();
                ExecutionOutcome::success(report.render()).with_artifact(archive_path)
            }
            Ok(Err(error)) => {
                warn!(error = %format!("{error:#}"), "backup failed");
                ExecutionOutcome::failed(format!("backup failed: {error:#}"))
            }
            Err(error) => {
                warn!(%error, "backup task aborted");
                ExecutionOutcome::failed(format!("backup failed: {error}"))
            }
        }
    }

    async fn run_checked(
        &self,
        kind: OperationKind,
        invocation: &ProcessInvocation,
    ) -> Result<ProcessOutput, ExecutionOutcome> {
        match self.runner.run(invocation).await {
            Ok(output) if output.success() => Ok(output),
            result => Err(classify(kind, None, invocation, result)),
        }
    }

    fn cap(&self, mut outcome: ExecutionOutcome) -> ExecutionOutcome {
        outcome.text = truncate_chars(&outcome.text, self.config.max_output_chars);
        outcome
    }
}

fn classify(
    kind: OperationKind,
    argument: Option<&str>,
    invocation: &ProcessInvocation,
    result: Result<ProcessOutput, ProcessRunError>,
) -> ExecutionOutcome {
    match result {
        Ok(output) if output.success() => {
            ExecutionOutcome::success(success_text(kind, argument, &output))
        }
        Ok(output) => {
            let diagnostic = first_non_blank(&[&output.stderr, &output.stdout])
                .unwrap_or("no diagnostic output");
            let exit = output
                .exit_code
                .map(|code| format!("exit code {code}"))
                .unwrap_or_else(|| "terminated by signal".to_string());
            ExecutionOutcome::failed(format!(
                "{} failed ({exit}): {diagnostic}",
                subject(kind, argument, invocation)
            ))
        }
        Err(ProcessRunError::Timeout { timeout_ms, .. }) => ExecutionOutcome::timed_out(format!(
            "{} timed out after {} s and was stopped",
            subject(kind, argument, invocation),
            timeout_ms / 1_000
        )),
        Err(error) => {
            warn!(kind = %kind, %error, "process could not be run");
            ExecutionOutcome::failed(format!("{}: {error}", subject(kind, argument, invocation)))
        }
    }
}

fn success_text(kind: OperationKind, argument: Option<&str>, output: &ProcessOutput) -> String {
    let arg = argument.unwrap_or_default();
    match kind {
        OperationKind::ServiceRestart => format!("service {arg} restarted"),
        OperationKind::Reboot => "reboot initiated".to_string(),
        _ => {
            let stdout = output.stdout.trim_end();
            if stdout.trim().is_empty() {
                format!("{} completed with no output", kind.command_name())
            } else {
                stdout.to_string()
            }
        }
    }
}

fn subject(kind: OperationKind, argument: Option<&str>, invocation: &ProcessInvocation) -> String {
    match (kind, argument) {
        (OperationKind::Ping, Some(host)) => format!("ping to {host}"),
        (OperationKind::Traceroute, Some(host)) => format!("traceroute to {host}"),
        (OperationKind::ServiceStatus, Some(service)) => format!("status of service {service}"),
        (OperationKind::ServiceRestart, Some(service)) => format!("restart of service {service}"),
        _ => format!("`{}`", invocation.display_line()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{CommandGateway, GatewayConfig};
    use crate::backup::BackupConfig;
    use crate::operation::{Operation, OperationKind};
    use crate::outcome::OutcomeStatus;
    use crate::process_runner::{
        ProcessInvocation, ProcessOutput, ProcessRunError, ProcessRunner,
    };

    type Responder =
        Box<dyn Fn(&ProcessInvocation) -> Result<ProcessOutput, ProcessRunError> + Send + Sync>;

    struct RecordingRunner {
        calls: Mutex<Vec<ProcessInvocation>>,
        respond: Responder,
    }

    impl RecordingRunner {
        fn new<F>(respond: F) -> Arc<Self>
        where
            F: Fn(&ProcessInvocation) -> Result<ProcessOutput, ProcessRunError>
                + Send
                + Sync
                + 'static,
        {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn ok(stdout: &'static str) -> Arc<Self> {
            Self::new(move |_| Ok(output(stdout, "", Some(0))))
        }

        fn calls(&self) -> Vec<ProcessInvocation> {
            self.calls.lock().expect("calls lock").clone()
        }
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
            (self.respond)(invocation)
        }
    }

    fn output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    fn gateway(runner: Arc<RecordingRunner>) -> CommandGateway {
        CommandGateway::new(runner, GatewayConfig::default())
    }

    #[tokio::test]
    async fn regression_blank_required_argument_is_rejected_without_launch() {
        let runner = RecordingRunner::ok("unused");
        let gateway = gateway(runner.clone());
        for kind in OperationKind::ALL
            .into_iter()
            .filter(|kind| kind.requires_argument())
        {
            for operation in [Operation::new(kind), Operation::with_argument(kind, "   ")] {
                let outcome = gateway.execute(&operation).await;
                assert_eq!(outcome.status, OutcomeStatus::Rejected, "{kind}");
                assert!(outcome.text.contains(kind.command_name()));
            }
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn functional_argument_is_passed_as_one_discrete_argv_element() {
        let runner = RecordingRunner::ok("PING ok");
        let gateway = gateway(runner.clone());
        let outcome = gateway
            .execute(&Operation::with_argument(OperationKind::Ping, " example.org "))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.text, "PING ok");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "ping");
        assert_eq!(calls[0].args, vec!["-c", "4", "example.org"]);
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn regression_option_like_argument_never_reaches_runner() {
        let runner = RecordingRunner::ok("unused");
        let gateway = gateway(runner.clone());
        let outcome = gateway
            .execute(&Operation::with_argument(OperationKind::Traceroute, "--help"))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn unit_timeouts_follow_operation_class() {
        let gateway = gateway(RecordingRunner::ok(""));
        assert!(gateway.invocation_for(OperationKind::Backup, None).is_none());
        let update = gateway
            .invocation_for(OperationKind::PackageUpdate, None)
            .expect("update argv");
        assert_eq!(update.program, "sudo");
        assert_eq!(update.args, vec!["-n", "apt-get", "update"]);
        assert_eq!(update.timeout, Some(Duration::from_secs(1_800)));
        let disk = gateway
            .invocation_for(OperationKind::DiskUsage, None)
            .expect("disk argv");
        assert_eq!(disk.timeout, Some(Duration::from_secs(60)));
        for kind in [OperationKind::Ping, OperationKind::Traceroute] {
            assert!(kind.is_network_facing());
            assert_eq!(gateway.timeout_for(kind), Duration::from_secs(10));
        }
        assert!(!OperationKind::DiskUsage.is_network_facing());
        let restart = gateway
            .invocation_for(OperationKind::ServiceRestart, Some("nginx"))
            .expect("restart argv");
        assert_eq!(restart.args, vec!["-n", "systemctl", "restart", "nginx"]);
    }

    #[tokio::test]
    async fn functional_timeout_is_reported_distinctly() {
        let runner = RecordingRunner::new(|invocation| {
            Err(ProcessRunError::Timeout {
                program: invocation.program.clone(),
                timeout_ms: 10_000,
                pid: Some(1),
            })
        });
        let outcome = gateway(runner)
            .execute(&Operation::with_argument(OperationKind::Traceroute, "10.0.0.1"))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::TimedOut);
        assert!(outcome.text.contains("traceroute to 10.0.0.1"));
        assert!(outcome.text.contains("10 s"));
    }

    #[tokio::test]
    async fn functional_missing_service_yields_failed_with_diagnostic() {
        let runner = RecordingRunner::new(|_| {
            Ok(output("", "Unit nginx.service could not be found.\n", Some(4)))
        });
        let outcome = gateway(runner)
            .execute(&Operation::with_argument(OperationKind::ServiceStatus, "nginx"))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.text.contains("could not be found"));
        assert!(outcome.text.contains("exit code 4"));
    }

    #[tokio::test]
    async fn regression_failure_falls_back_to_stdout_then_placeholder() {
        let runner = RecordingRunner::new(|invocation| {
            if invocation.program == "df" {
                Ok(output("partial table", "  ", Some(1)))
            } else {
                Ok(output("", "", Some(2)))
            }
        });
        let gateway = gateway(runner);
        let disk = gateway.execute(&Operation::new(OperationKind::DiskUsage)).await;
        assert_eq!(disk.status, OutcomeStatus::Failed);
        assert!(disk.text.ends_with("partial table"));
        let net = gateway.execute(&Operation::new(OperationKind::NetworkStatus)).await;
        assert!(net.text.contains("no diagnostic output"));
    }

    #[tokio::test]
    async fn regression_launch_error_becomes_failed_outcome() {
        let runner = RecordingRunner::new(|invocation| {
            Err(ProcessRunError::Launch {
                program: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
        });
        let outcome = gateway(runner)
            .execute(&Operation::new(OperationKind::NetworkStatus))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.text.contains("failed to launch ip"));
    }

    #[tokio::test]
    async fn functional_restart_success_names_the_service() {
        let runner = RecordingRunner::ok("");
        let outcome = gateway(runner)
            .execute(&Operation::with_argument(OperationKind::ServiceRestart, "nginx"))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.text, "service nginx restarted");
    }

    #[tokio::test]
    async fn functional_usage_combines_load_and_memory() {
        let runner = RecordingRunner::new(|invocation| match invocation.program.as_str() {
            "uptime" => Ok(output(" 10:00 up 1 day, load average: 0.10\n", "", Some(0))),
            "free" => Ok(output("Mem: 1Gi 512Mi\n", "", Some(0))),
            other => panic!("unexpected program {other}"),
        });
        let outcome = gateway(runner.clone())
            .execute(&Operation::new(OperationKind::ResourceUsage))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert!(outcome.text.starts_with("load: 10:00 up 1 day"));
        assert!(outcome.text.contains("memory:\nMem: 1Gi 512Mi"));
        let programs = runner
            .calls()
            .into_iter()
            .map(|call| call.program)
            .collect::<Vec<_>>();
        assert_eq!(programs, vec!["uptime", "free"]);
    }

    #[tokio::test]
    async fn functional_main_services_reports_one_line_per_service() {
        let runner = RecordingRunner::new(|invocation| {
            match invocation.args.last().map(String::as_str) {
                Some("mysql") => Ok(output("inactive\n", "", Some(3))),
                _ => Ok(output("active\n", "", Some(0))),
            }
        });
        let outcome = gateway(runner.clone())
            .execute(&Operation::new(OperationKind::MainServicesStatus))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(
            outcome.text,
            "cron: active\nssh: active\nsysstat: active\nmysql: inactive"
        );
        assert_eq!(runner.calls().len(), 4);
    }

    #[tokio::test]
    async fn regression_output_is_capped_to_transport_limit() {
        let runner = RecordingRunner::new(|_| Ok(output(&"x".repeat(10_000), "", Some(0))));
        let gateway = CommandGateway::new(
            runner,
            GatewayConfig {
                max_output_chars: 100,
                ..GatewayConfig::default()
            },
        );
        let outcome = gateway.execute(&Operation::new(OperationKind::DiskUsage)).await;
        assert!(outcome.text.starts_with(&"x".repeat(100)));
        assert!(outcome.text.ends_with(opsrelay_core::TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn functional_backup_outcome_carries_archive_artifact() {
        let temp = tempfile::tempdir().expect("tempdir");
        let present = temp.path().join("app.conf");
        std::fs::write(&present, "key=value").expect("write");
        let missing = temp.path().join("gone.conf");
        let runner = RecordingRunner::ok("unused");
        let gateway = CommandGateway::new(
            runner.clone(),
            GatewayConfig {
                backup: BackupConfig {
                    paths: vec![present, missing.clone()],
                    output_dir: temp.path().join("backups"),
                },
                ..GatewayConfig::default()
            },
        );
        let outcome = gateway.execute(&Operation::new(OperationKind::Backup)).await;
        assert_eq!(outcome.status, OutcomeStatus::Success);
        let artifact = outcome.artifact.expect("archive path");
        assert!(artifact.exists());
        assert!(outcome.text.contains(&missing.display().to_string()));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn regression_backup_without_existing_paths_is_failed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gateway = CommandGateway::new(
            RecordingRunner::ok("unused"),
            GatewayConfig {
                backup: BackupConfig {
                    paths: vec![temp.path().join("missing")],
                    output_dir: temp.path().join("backups"),
                },
                ..GatewayConfig::default()
            },
        );
        let outcome = gateway.execute(&Operation::new(OperationKind::Backup)).await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.artifact.is_none());
    }
}
