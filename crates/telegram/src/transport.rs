//! Chat transport abstraction and the Telegram long-poll implementation.
//! The bot consumes text messages only; every other update kind is skipped
//! while still advancing the poll offset.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use sokoni_core::config::TelegramConfig;
use sokoni_core::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport poll failed: {0}")]
    Receive(String),
    #[error("transport send failed: {0}")]
    Send(String),
}

/// One inbound text message, already reduced to what the engine needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: UserId,
    pub text: String,
}

/// Inbound/outbound message stream. `next_messages` returning `None` means
/// the stream is closed and the runner should stop.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn next_messages(&self) -> Result<Option<Vec<InboundMessage>>, TransportError>;
    async fn send_message(&self, recipient: &UserId, text: &str) -> Result<(), TransportError>;
}

/// Transport used when no bot token is configured: the stream closes
/// immediately and outbound messages vanish.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl ChatTransport for NoopTransport {
    async fn next_messages(&self) -> Result<Option<Vec<InboundMessage>>, TransportError> {
        Ok(None)
    }

    async fn send_message(&self, _recipient: &UserId, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct TelegramTransport {
    client: Client,
    api_base: String,
    bot_token: SecretString,
    poll_timeout_secs: u64,
    // Next offset to request; Telegram acknowledges everything below it.
    offset: AtomicI64,
}

impl TelegramTransport {
    pub fn from_config(config: &TelegramConfig) -> Result<Self, TransportError> {
        // Long polls hold the connection open for poll_timeout_secs; the
        // client timeout must sit above that.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()
            .map_err(|err| TransportError::Connect(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            offset: AtomicI64::new(0),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token.expose_secret())
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn next_messages(&self) -> Result<Option<Vec<InboundMessage>>, TransportError> {
        let offset = self.offset.load(Ordering::Acquire);
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[("offset", offset), ("timeout", self.poll_timeout_secs as i64)])
            .send()
            .await
            .map_err(|err| TransportError::Receive(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Receive(format!("getUpdates returned {status}")));
        }

        let body: WireResponse<Vec<WireUpdate>> = response
            .json()
            .await
            .map_err(|err| TransportError::Receive(format!("malformed getUpdates body: {err}")))?;

        if !body.ok {
            let reason = body.description.unwrap_or_else(|| "unknown error".to_string());
            return Err(TransportError::Receive(format!("getUpdates rejected: {reason}")));
        }

        let updates = body.result.unwrap_or_default();
        if let Some(max_id) = updates.iter().map(|update| update.update_id).max() {
            self.offset.store(max_id + 1, Ordering::Release);
        }

        let messages = reduce_updates(updates);
        debug!(
            event_name = "telegram.poll.completed",
            message_count = messages.len(),
            "completed one long poll"
        );
        Ok(Some(messages))
    }

    async fn send_message(&self, recipient: &UserId, text: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": recipient.0, "text": text }))
            .send()
            .await
            .map_err(|err| TransportError::Send(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Send(format!("sendMessage returned {status}")));
        }

        let body: WireResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|err| TransportError::Send(format!("malformed sendMessage body: {err}")))?;
        if !body.ok {
            let reason = body.description.unwrap_or_else(|| "unknown error".to_string());
            return Err(TransportError::Send(format!("sendMessage rejected: {reason}")));
        }

        Ok(())
    }
}

fn reduce_updates(updates: Vec<WireUpdate>) -> Vec<InboundMessage> {
    updates
        .into_iter()
        .filter_map(|update| {
            let message = update.message?;
            let text = message.text?;
            Some(InboundMessage { sender: UserId(message.chat.id.to_string()), text })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct WireResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    text: Option<String>,
    chat: WireChat,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
}
