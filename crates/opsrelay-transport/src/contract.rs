use std::path::Path;

use async_trait::async_trait;
use opsrelay_core::Identity;
use thiserror::Error;

pub const REASON_RECIPIENT_UNREACHABLE: &str = "delivery_recipient_unreachable";
pub const REASON_RATE_LIMITED: &str = "delivery_rate_limited";
pub const REASON_PROVIDER_UNAVAILABLE: &str = "delivery_provider_unavailable";
pub const REASON_REQUEST_REJECTED: &str = "delivery_request_rejected";
pub const REASON_AUTH_FAILED: &str = "delivery_auth_failed";
pub const REASON_TRANSPORT_ERROR: &str = "delivery_transport_error";
pub const REASON_INVALID_RESPONSE: &str = "delivery_invalid_response";
pub const REASON_ATTACHMENT_UNREADABLE: &str = "delivery_attachment_unreadable";

/// A send, upload or poll the chat provider did not accept.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("reason_code={reason_code} retryable={retryable} endpoint={endpoint} detail={detail}")]
pub struct DeliveryError {
    pub reason_code: String,
    pub detail: String,
    pub retryable: bool,
    /// Endpoint with the bot token redacted.
    pub endpoint: String,
    pub http_status: Option<u16>,
}

impl DeliveryError {
    pub fn new(
        reason_code: &str,
        detail: impl Into<String>,
        retryable: bool,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            reason_code: reason_code.to_string(),
            detail: detail.into(),
            retryable,
            endpoint: endpoint.into(),
            http_status: None,
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// The recipient never opened a direct conversation with the bot, or
    /// blocked it.
    pub fn is_recipient_unreachable(&self) -> bool {
        self.reason_code == REASON_RECIPIENT_UNREACHABLE
    }
}

/// One inbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub update_id: i64,
    pub identity: Identity,
    pub chat_id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBatch {
    pub messages: Vec<InboundMessage>,
    /// Offset acknowledging every update in this batch, including skipped ones.
    pub next_offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMenuEntry {
    pub command: String,
    pub description: String,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError>;

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<(), DeliveryError>;

    async fn register_commands(&self, commands: &[CommandMenuEntry]) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn poll_updates(&self, offset: Option<i64>) -> Result<UpdateBatch, DeliveryError>;
}
