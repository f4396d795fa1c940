use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use opsrelay_bot::{RelayConfig, RelayRuntime, RelayRuntimeConfig, RelayServices};
use opsrelay_exec::{BackupConfig, GatewayConfig, TokioProcessRunner};
use opsrelay_monitor::{start_monitor_scheduler, MonitorConfig};
use opsrelay_transport::{TelegramClient, TelegramConfig};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli_args::Cli;

pub fn relay_config_from_cli(cli: &Cli) -> Result<RelayConfig> {
    let digest = cli
        .auth_password_sha256
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            anyhow!("--auth-password-sha256 is required (generate one with --hash-secret)")
        })?;
    let mut config = RelayConfig::new(cli.allowed_user_ids.clone(), digest);
    config.auth_duration = Duration::from_secs(cli.auth_duration_seconds);
    config.monitor = MonitorConfig {
        interval: Duration::from_secs(cli.monitor_interval_seconds),
        sweep_soft_cap: Duration::from_secs(cli.monitor_sweep_soft_cap_seconds),
    };
    config.gateway = GatewayConfig {
        network_timeout: Duration::from_secs(cli.network_timeout_seconds),
        package_timeout: Duration::from_secs(cli.package_timeout_seconds),
        inspection_timeout: Duration::from_secs(cli.inspection_timeout_seconds),
        max_output_chars: cli.max_output_chars,
        main_services: cli
            .main_services
            .iter()
            .map(|service| service.trim().to_string())
            .filter(|service| !service.is_empty())
            .collect(),
        backup: BackupConfig {
            paths: cli.backup_paths.clone(),
            output_dir: cli.backup_dir.clone(),
        },
    };
    config.bot_username = cli
        .telegram_bot_username
        .as_deref()
        .map(|username| username.trim().trim_start_matches('@'))
        .filter(|username| !username.is_empty())
        .map(str::to_string);
    config.validate().context("invalid relay configuration")?;
    Ok(config)
}

pub fn telegram_config_from_cli(cli: &Cli) -> Result<TelegramConfig> {
    let token = cli
        .telegram_bot_token
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("--telegram-bot-token is required"))?;
    let mut config = TelegramConfig::new(token);
    config.api_base = cli.telegram_api_base.trim_end_matches('/').to_string();
    config.poll_timeout = Duration::from_secs(cli.poll_timeout_seconds);
    Ok(config)
}

/// Wires the relay together and runs it until Ctrl-C.
pub async fn run_relay(cli: Cli) -> Result<()> {
    let mut relay_config = relay_config_from_cli(&cli)?;
    let telegram = Arc::new(
        TelegramClient::new(telegram_config_from_cli(&cli)?)
            .context("failed to build telegram client")?,
    );
    if relay_config.bot_username.is_none() {
        match telegram.bot_username().await {
            Ok(username) => relay_config.bot_username = Some(username),
            Err(error) => warn!(
                reason_code = %error.reason_code,
                "could not resolve bot username; commands mentioning any bot are accepted"
            ),
        }
    }
    let services = RelayServices::from_config(&relay_config, Arc::new(TokioProcessRunner))
        .context("failed to assemble relay services")?;

    let mut monitor = start_monitor_scheduler(Arc::new(services.monitor(telegram.clone())))
        .context("failed to start monitor scheduler")?;
    let dispatcher = Arc::new(services.dispatcher(telegram.clone()));
    let runtime = RelayRuntime::new(
        telegram.clone(),
        telegram,
        dispatcher,
        RelayRuntimeConfig::default(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(error) => {
                warn!(%error, "failed to listen for ctrl-c; relay runs until killed");
                std::future::pending::<()>().await;
            }
        }
    });

    info!(
        allowed_identities = relay_config.allowed_identities.len(),
        monitor_interval_s = relay_config.monitor.interval.as_secs(),
        bot_username = relay_config.bot_username.as_deref().unwrap_or("-"),
        "opsrelay started"
    );
    let result = runtime.run(shutdown_rx).await;
    signal_task.abort();
    monitor.shutdown().await;
    let summary = result?;
    info!(
        polls = summary.polls,
        messages = summary.messages,
        "opsrelay stopped"
    );
    Ok(())
}
