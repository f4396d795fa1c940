use std::sync::Arc;

use opsrelay_core::{current_unix_timestamp_ms, Identity};
use tracing::debug;

use crate::allowlist::AllowList;
use crate::session_store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Why a request was refused.
pub enum DenyReason {
    NotAllowlisted,
    SessionMissing,
    SessionExpired,
}

impl DenyReason {
    pub fn reason_code(self) -> &'static str {
        match self {
            Self::NotAllowlisted => "deny_not_allowlisted",
            Self::SessionMissing => "deny_session_missing",
            Self::SessionExpired => "deny_session_expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow { expires_unix_ms: u64 },
    Deny { reason: DenyReason },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Allow { .. } => "allow_live_session",
            Self::Deny { reason } => reason.reason_code(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationDecision {
    Granted { expires_unix_ms: u64 },
    NotAllowlisted,
    InvalidSecret,
}

impl AuthenticationDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

/// The only place access decisions are made.
///
/// `is_authorized(id) := id ∈ allow-list ∧ session(id) is live`.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    allowlist: Arc<AllowList>,
    sessions: Arc<SessionStore>,
}

impl AccessPolicy {
    pub fn new(allowlist: AllowList, sessions: Arc<SessionStore>) -> Self {
        Self {
            allowlist: Arc::new(allowlist),
            sessions,
        }
    }

    pub fn allowlist(&self) -> &AllowList {
        &self.allowlist
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn is_allowlisted(&self, identity: Identity) -> bool {
        self.allowlist.contains(identity)
    }

    pub fn is_authorized(&self, identity: Identity) -> bool {
        self.decide(identity).is_allowed()
    }

    pub fn is_authorized_at(&self, identity: Identity, now_unix_ms: u64) -> bool {
        self.decide_at(identity, now_unix_ms).is_allowed()
    }

    pub fn decide(&self, identity: Identity) -> AccessDecision {
        self.decide_at(identity, current_unix_timestamp_ms())
    }

    pub fn decide_at(&self, identity: Identity, now_unix_ms: u64) -> AccessDecision {
        let decision = if !self.allowlist.contains(identity) {
            AccessDecision::Deny {
                reason: DenyReason::NotAllowlisted,
            }
        } else {
            match self.sessions.lookup(identity) {
                None => AccessDecision::Deny {
                    reason: DenyReason::SessionMissing,
                },
                Some(record) if record.is_live_at(now_unix_ms) => AccessDecision::Allow {
                    expires_unix_ms: record.expires_unix_ms,
                },
                Some(_) => AccessDecision::Deny {
                    reason: DenyReason::SessionExpired,
                },
            }
        };
        debug!(
            identity = %identity,
            reason_code = decision.reason_code(),
            "access decision"
        );
        decision
    }

    /// Runs the credential check for allow-listed identities only.
    pub fn authenticate(
        &self,
        identity: Identity,
        presented_secret: &str,
    ) -> AuthenticationDecision {
        self.authenticate_at(identity, presented_secret, current_unix_timestamp_ms())
    }

    pub fn authenticate_at(
        &self,
        identity: Identity,
        presented_secret: &str,
        now_unix_ms: u64,
    ) -> AuthenticationDecision {
        if !self.allowlist.contains(identity) {
            return AuthenticationDecision::NotAllowlisted;
        }
        if !self
            .sessions
            .authenticate_at(identity, presented_secret, now_unix_ms)
        {
            return AuthenticationDecision::InvalidSecret;
        }
        match self.sessions.lookup(identity) {
            Some(record) => AuthenticationDecision::Granted {
                expires_unix_ms: record.expires_unix_ms,
            },
            None => AuthenticationDecision::InvalidSecret,
        }
    }
}
