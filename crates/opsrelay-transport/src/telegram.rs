use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use opsrelay_core::{chunk_text, Identity};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::contract::{
    ChatTransport, CommandMenuEntry, DeliveryError, InboundMessage, UpdateBatch, UpdateSource,
    REASON_ATTACHMENT_UNREADABLE, REASON_AUTH_FAILED, REASON_INVALID_RESPONSE,
    REASON_PROVIDER_UNAVAILABLE, REASON_RATE_LIMITED, REASON_RECIPIENT_UNREACHABLE,
    REASON_REQUEST_REJECTED, REASON_TRANSPORT_ERROR,
};

pub const TELEGRAM_DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const TELEGRAM_MAX_MESSAGE_CHARS: usize = 4_096;
const DETAIL_LIMIT: usize = 512;

#[derive(Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    pub poll_timeout: Duration,
    pub request_timeout: Duration,
    pub max_message_chars: usize,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            api_base: TELEGRAM_DEFAULT_API_BASE.to_string(),
            bot_token: bot_token.into(),
            poll_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            max_message_chars: TELEGRAM_MAX_MESSAGE_CHARS,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .field("bot_token", &"<redacted>")
            .field("poll_timeout", &self.poll_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("max_message_chars", &self.max_message_chars)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TelegramEnvelope {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    #[serde(default)]
    from: Option<TelegramUser>,
    chat: TelegramChat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

/// Telegram Bot API client: long polling plus the send surface.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    config: TelegramConfig,
    client: Client,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Result<Self, DeliveryError> {
        if config.bot_token.trim().is_empty() {
            return Err(DeliveryError::new(
                REASON_AUTH_FAILED,
                "telegram bot token cannot be empty",
                false,
                "telegram",
            ));
        }
        if config.max_message_chars == 0 {
            return Err(DeliveryError::new(
                REASON_REQUEST_REJECTED,
                "telegram max message chars must be greater than 0",
                false,
                "telegram",
            ));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| {
                DeliveryError::new(
                    REASON_TRANSPORT_ERROR,
                    format!("failed to build http client: {}", error.without_url()),
                    false,
                    "telegram",
                )
            })?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.config.api_base.trim().trim_end_matches('/'),
            self.config.bot_token.trim()
        )
    }

    /// Username of the bot account, from `getMe`.
    pub async fn bot_username(&self) -> Result<String, DeliveryError> {
        let result = self.call("getMe", |client, url| client.get(url)).await?;
        result
            .get("username")
            .and_then(Value::as_str)
            .filter(|username| !username.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                DeliveryError::new(
                    REASON_INVALID_RESPONSE,
                    "getMe result has no username",
                    false,
                    self.redacted_endpoint("getMe"),
                )
            })
    }

    fn redacted_endpoint(&self, method: &str) -> String {
        format!(
            "{}/bot<redacted>/{method}",
            self.config.api_base.trim().trim_end_matches('/')
        )
    }

    /// Calls one Bot API method, retrying transport errors and retryable
    /// statuses with linear backoff. Returns the envelope's `result`.
    async fn call<F>(&self, method: &str, build_request: F) -> Result<Value, DeliveryError>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let url = self.endpoint(method);
        let redacted = self.redacted_endpoint(method);
        let max_attempts = self.config.retry_max_attempts.max(1);
        let mut attempt = 0usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = match build_request(&self.client, url.as_str()).send().await {
                Ok(response) => response,
                Err(error) => {
                    let error = error.without_url();
                    if attempt < max_attempts {
                        debug!(method, attempt, %error, "telegram transport error; retrying");
                        self.sleep_backoff(attempt).await;
                        continue;
                    }
                    return Err(DeliveryError::new(
                        REASON_TRANSPORT_ERROR,
                        error.to_string(),
                        true,
                        redacted,
                    ));
                }
            };

            let status = response.status();
            let body_raw = response.text().await.unwrap_or_default();
            let envelope = serde_json::from_str::<TelegramEnvelope>(&body_raw).ok();
            if status.is_success() {
                return match envelope {
                    Some(envelope) if envelope.ok => Ok(envelope.result),
                    Some(envelope) => Err(DeliveryError::new(
                        REASON_REQUEST_REJECTED,
                        truncate_detail(envelope.description.as_deref().unwrap_or("ok=false")),
                        false,
                        redacted,
                    )
                    .with_http_status(status.as_u16())),
                    None => Err(DeliveryError::new(
                        REASON_INVALID_RESPONSE,
                        truncate_detail(&body_raw),
                        false,
                        redacted,
                    )
                    .with_http_status(status.as_u16())),
                };
            }

            let description = envelope
                .and_then(|envelope| envelope.description)
                .unwrap_or(body_raw);
            let (reason_code, retryable) = classify_provider_status(status, &description);
            if retryable && attempt < max_attempts {
                debug!(method, attempt, status = status.as_u16(), "telegram request retry");
                self.sleep_backoff(attempt).await;
                continue;
            }
            return Err(DeliveryError::new(
                reason_code,
                truncate_detail(&description),
                retryable,
                redacted,
            )
            .with_http_status(status.as_u16()));
        }
    }

    async fn sleep_backoff(&self, attempt: usize) {
        let delay_ms = self
            .config
            .retry_base_delay_ms
            .saturating_mul(attempt as u64);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        let chunks = chunk_text(text, self.config.max_message_chars);
        let chunk_count = chunks.len();
        for (index, chunk) in chunks.iter().enumerate() {
            let body = json!({
                "chat_id": chat_id,
                "text": chunk,
                "disable_web_page_preview": true,
            });
            self.call("sendMessage", |client, url| client.post(url).json(&body))
                .await?;
            debug!(chat_id, chunk = index + 1, chunk_count, "telegram message sent");
        }
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        let bytes = tokio::fs::read(path).await.map_err(|error| {
            DeliveryError::new(
                REASON_ATTACHMENT_UNREADABLE,
                format!("failed to read {}: {error}", path.display()),
                false,
                self.redacted_endpoint("sendDocument"),
            )
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let caption = truncate_caption(caption);
        self.call("sendDocument", |client, url| {
            let part = reqwest::multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
            let form = reqwest::multipart::Form::new()
                .text("chat_id", chat_id.to_string())
                .text("caption", caption.clone())
                .part("document", part);
            client.post(url).multipart(form)
        })
        .await?;
        debug!(chat_id, file = %file_name, "telegram document sent");
        Ok(())
    }

    async fn register_commands(&self, commands: &[CommandMenuEntry]) -> Result<(), DeliveryError> {
        let entries = commands
            .iter()
            .map(|entry| json!({"command": entry.command, "description": entry.description}))
            .collect::<Vec<_>>();
        let body = json!({ "commands": entries });
        self.call("setMyCommands", |client, url| client.post(url).json(&body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn poll_updates(&self, offset: Option<i64>) -> Result<UpdateBatch, DeliveryError> {
        let poll_seconds = self.config.poll_timeout.as_secs();
        let request_timeout = self.config.poll_timeout + self.config.request_timeout;
        let mut body = json!({
            "timeout": poll_seconds,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        let result = self
            .call("getUpdates", |client, url| {
                client.post(url).timeout(request_timeout).json(&body)
            })
            .await?;
        parse_update_batch(result, offset).map_err(|detail| {
            DeliveryError::new(
                REASON_INVALID_RESPONSE,
                detail,
                false,
                self.redacted_endpoint("getUpdates"),
            )
        })
    }
}

fn parse_update_batch(result: Value, offset: Option<i64>) -> Result<UpdateBatch, String> {
    let raw_updates = match result {
        Value::Array(items) => items,
        other => return Err(format!("getUpdates result is not an array: {other}")),
    };
    let mut batch = UpdateBatch {
        messages: Vec::new(),
        next_offset: offset,
    };
    for raw in raw_updates {
        // Acknowledge by id first so an update we cannot decode is not redelivered.
        if let Some(update_id) = raw.get("update_id").and_then(Value::as_i64) {
            let acknowledged = update_id.saturating_add(1);
            batch.next_offset = Some(batch.next_offset.map_or(acknowledged, |current| {
                current.max(acknowledged)
            }));
        }
        let update = match serde_json::from_value::<TelegramUpdate>(raw) {
            Ok(update) => update,
            Err(error) => {
                warn!(%error, "skipping malformed telegram update");
                continue;
            }
        };
        let Some(message) = update.message else {
            continue;
        };
        let (Some(from), Some(text)) = (message.from, message.text) else {
            continue;
        };
        batch.messages.push(InboundMessage {
            update_id: update.update_id,
            identity: Identity::new(from.id),
            chat_id: message.chat.id,
            text,
        });
    }
    Ok(batch)
}

fn classify_provider_status(status: StatusCode, description: &str) -> (&'static str, bool) {
    let lowered = description.to_ascii_lowercase();
    if status == StatusCode::FORBIDDEN || lowered.contains("chat not found") {
        return (REASON_RECIPIENT_UNREACHABLE, false);
    }
    if status == StatusCode::UNAUTHORIZED {
        return (REASON_AUTH_FAILED, false);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return (REASON_RATE_LIMITED, true);
    }
    if status.is_server_error() {
        return (REASON_PROVIDER_UNAVAILABLE, true);
    }
    (REASON_REQUEST_REJECTED, false)
}

fn truncate_detail(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= DETAIL_LIMIT {
        return trimmed.to_string();
    }
    let mut output = trimmed.chars().take(DETAIL_LIMIT).collect::<String>();
    output.push_str("...");
    output
}

// Telegram caps document captions at 1024 characters.
fn truncate_caption(caption: &str) -> String {
    caption.chars().take(1_024).collect()
}
