use std::path::PathBuf;

use clap::Parser;
use opsrelay_core::Identity;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "opsrelay",
    about = "Chat-driven relay for a fixed set of host administration commands",
    version
)]
pub struct Cli {
    #[arg(
        long = "telegram-bot-token",
        env = "OPSRELAY_TELEGRAM_BOT_TOKEN",
        hide_env_values = true,
        help = "Telegram bot API token"
    )]
    pub telegram_bot_token: Option<String>,

    #[arg(
        long = "telegram-api-base",
        env = "OPSRELAY_TELEGRAM_API_BASE",
        default_value = "https://api.telegram.org",
        help = "Base URL of the Telegram Bot API"
    )]
    pub telegram_api_base: String,

    #[arg(
        long = "telegram-bot-username",
        env = "OPSRELAY_TELEGRAM_BOT_USERNAME",
        help = "Bot username used to ignore commands addressed to other bots (default: from getMe)"
    )]
    pub telegram_bot_username: Option<String>,

    #[arg(
        long = "allowed-user-ids",
        env = "OPSRELAY_ALLOWED_USER_IDS",
        value_delimiter = ',',
        help = "Comma-separated user ids allowed to authenticate"
    )]
    pub allowed_user_ids: Vec<Identity>,

    #[arg(
        long = "auth-password-sha256",
        env = "OPSRELAY_AUTH_PASSWORD_SHA256",
        hide_env_values = true,
        help = "Hex SHA-256 digest of the shared password (see --hash-secret)"
    )]
    pub auth_password_sha256: Option<String>,

    #[arg(
        long = "auth-duration-seconds",
        env = "OPSRELAY_AUTH_DURATION_SECONDS",
        default_value_t = 3_600,
        value_parser = parse_positive_u64,
        help = "How long a successful /auth keeps a session open"
    )]
    pub auth_duration_seconds: u64,

    #[arg(
        long = "monitor-interval-seconds",
        env = "OPSRELAY_MONITOR_INTERVAL_SECONDS",
        default_value_t = 300,
        value_parser = parse_positive_u64,
        help = "Period between monitoring sweeps"
    )]
    pub monitor_interval_seconds: u64,

    #[arg(
        long = "monitor-sweep-soft-cap-seconds",
        env = "OPSRELAY_MONITOR_SWEEP_SOFT_CAP_SECONDS",
        default_value_t = 120,
        value_parser = parse_positive_u64,
        help = "Subscribers not reached within this budget wait for the next sweep"
    )]
    pub monitor_sweep_soft_cap_seconds: u64,

    #[arg(
        long = "network-timeout-seconds",
        env = "OPSRELAY_NETWORK_TIMEOUT_SECONDS",
        default_value_t = 10,
        value_parser = parse_positive_u64,
        help = "Timeout for ping and traceroute"
    )]
    pub network_timeout_seconds: u64,

    #[arg(
        long = "package-timeout-seconds",
        env = "OPSRELAY_PACKAGE_TIMEOUT_SECONDS",
        default_value_t = 1_800,
        value_parser = parse_positive_u64,
        help = "Timeout for package index update and upgrade"
    )]
    pub package_timeout_seconds: u64,

    #[arg(
        long = "inspection-timeout-seconds",
        env = "OPSRELAY_INSPECTION_TIMEOUT_SECONDS",
        default_value_t = 60,
        value_parser = parse_positive_u64,
        help = "Timeout for local inspection and service commands"
    )]
    pub inspection_timeout_seconds: u64,

    #[arg(
        long = "main-services",
        env = "OPSRELAY_MAIN_SERVICES",
        value_delimiter = ',',
        default_value = "cron,ssh,sysstat,mysql",
        help = "Services reported by /main_services_status"
    )]
    pub main_services: Vec<String>,

    #[arg(
        long = "backup-paths",
        env = "OPSRELAY_BACKUP_PATHS",
        value_delimiter = ',',
        help = "Files or directories archived by /backup"
    )]
    pub backup_paths: Vec<PathBuf>,

    #[arg(
        long = "backup-dir",
        env = "OPSRELAY_BACKUP_DIR",
        default_value = "/var/backups/opsrelay",
        help = "Directory receiving backup archives"
    )]
    pub backup_dir: PathBuf,

    #[arg(
        long = "max-output-chars",
        env = "OPSRELAY_MAX_OUTPUT_CHARS",
        default_value_t = 3_500,
        value_parser = parse_positive_usize,
        help = "Command output longer than this is truncated"
    )]
    pub max_output_chars: usize,

    #[arg(
        long = "poll-timeout-seconds",
        env = "OPSRELAY_POLL_TIMEOUT_SECONDS",
        default_value_t = 30,
        help = "Long-poll timeout for getUpdates"
    )]
    pub poll_timeout_seconds: u64,

    #[arg(
        long = "hash-secret",
        value_name = "SECRET",
        help = "Print the SHA-256 digest of SECRET for --auth-password-sha256 and exit"
    )]
    pub hash_secret: Option<String>,
}
