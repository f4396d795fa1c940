use std::sync::Arc;
use std::time::Duration;

use opsrelay_access::{
    AccessPolicy, AllowList, CredentialDigest, CredentialDigestError, SessionStore,
    DEFAULT_AUTH_DURATION,
};
use opsrelay_core::Identity;
use opsrelay_exec::{CommandGateway, GatewayConfig, ProcessRunner};
use opsrelay_monitor::{MonitorConfig, MonitorScheduler, SubscriberRegistry};
use opsrelay_transport::ChatTransport;
use thiserror::Error;

use crate::dispatcher::RelayDispatcher;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("allow-list must contain at least one user id")]
    EmptyAllowList,
    #[error("auth password digest is invalid: {0}")]
    InvalidDigest(#[from] CredentialDigestError),
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Everything loaded once at start-up. No hot reload.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub allowed_identities: Vec<Identity>,
    pub auth_password_sha256: String,
    pub auth_duration: Duration,
    pub gateway: GatewayConfig,
    pub monitor: MonitorConfig,
    /// Username of this bot; commands mentioning another bot are ignored.
    pub bot_username: Option<String>,
}

impl RelayConfig {
    pub fn new(allowed_identities: Vec<Identity>, auth_password_sha256: impl Into<String>) -> Self {
        Self {
            allowed_identities,
            auth_password_sha256: auth_password_sha256.into(),
            auth_duration: DEFAULT_AUTH_DURATION,
            gateway: GatewayConfig::default(),
            monitor: MonitorConfig::default(),
            bot_username: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_identities.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }
        CredentialDigest::from_sha256_hex(&self.auth_password_sha256)?;
        let durations = [
            ("auth duration", self.auth_duration),
            ("monitor interval", self.monitor.interval),
            ("monitor sweep soft cap", self.monitor.sweep_soft_cap),
            ("network timeout", self.gateway.network_timeout),
            ("package timeout", self.gateway.package_timeout),
            ("inspection timeout", self.gateway.inspection_timeout),
        ];
        if let Some((label, _)) = durations.into_iter().find(|(_, value)| value.is_zero()) {
            return Err(ConfigError::ZeroValue(label));
        }
        if self.gateway.max_output_chars == 0 {
            return Err(ConfigError::ZeroValue("max output chars"));
        }
        Ok(())
    }
}

/// Shared state owned by one relay instance and handed to both the request
/// path and the monitor.
#[derive(Clone)]
pub struct RelayServices {
    pub policy: Arc<AccessPolicy>,
    pub subscribers: Arc<SubscriberRegistry>,
    pub gateway: Arc<CommandGateway>,
    pub monitor_config: MonitorConfig,
    pub bot_username: Option<String>,
}

impl RelayServices {
    pub fn from_config(
        config: &RelayConfig,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let credential = CredentialDigest::from_sha256_hex(&config.auth_password_sha256)?;
        let sessions = Arc::new(SessionStore::new(credential, config.auth_duration));
        let allowlist = AllowList::new(config.allowed_identities.iter().copied());
        Ok(Self {
            policy: Arc::new(AccessPolicy::new(allowlist, sessions)),
            subscribers: Arc::new(SubscriberRegistry::new()),
            gateway: Arc::new(CommandGateway::new(runner, config.gateway.clone())),
            monitor_config: config.monitor,
            bot_username: config.bot_username.clone(),
        })
    }

    pub fn dispatcher(&self, transport: Arc<dyn ChatTransport>) -> RelayDispatcher {
        RelayDispatcher::new(
            Arc::clone(&self.policy),
            Arc::clone(&self.subscribers),
            Arc::clone(&self.gateway),
            transport,
            self.monitor_config.interval,
        )
        .with_bot_username(self.bot_username.clone())
    }

    pub fn monitor(&self, transport: Arc<dyn ChatTransport>) -> MonitorScheduler {
        MonitorScheduler::new(
            Arc::clone(&self.policy),
            Arc::clone(&self.subscribers),
            Arc::clone(&self.gateway),
            transport,
            self.monitor_config,
        )
    }
}
