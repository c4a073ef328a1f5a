//! Long-poll pump: fetches update batches, fans turns out per user, and
//! survives transient transport failures with bounded backoff.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use sokoni_core::errors::EngineError;
use sokoni_core::{ConversationMachine, UserId};

use crate::gate::UserGate;
use crate::transport::{ChatTransport, InboundMessage, TransportError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// One conversational turn: inbound text, outbound reply.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, sender: &UserId, text: &str) -> Result<String, EngineError>;
}

#[async_trait]
impl MessageHandler for ConversationMachine {
    async fn handle(&self, sender: &UserId, text: &str) -> Result<String, EngineError> {
        self.advance(sender, text).await
    }
}

pub struct PollRunner {
    transport: Arc<dyn ChatTransport>,
    handler: Arc<dyn MessageHandler>,
    gate: Arc<UserGate>,
    reconnect_policy: ReconnectPolicy,
}

impl PollRunner {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        handler: Arc<dyn MessageHandler>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, handler, gate: Arc::new(UserGate::default()), reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "update poll failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "poll retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "starting update poll loop");
        let mut turns = JoinSet::new();

        let outcome = loop {
            match self.transport.next_messages().await {
                Ok(Some(batch)) => {
                    // One task per sender keeps same-user turns in batch
                    // order; the gate serializes across batches.
                    for (sender, texts) in group_by_sender(batch) {
                        turns.spawn(run_turns(
                            self.transport.clone(),
                            self.handler.clone(),
                            self.gate.clone(),
                            sender,
                            texts,
                        ));
                    }
                }
                Ok(None) => {
                    info!(attempt, "update stream closed");
                    break Ok(());
                }
                Err(error) => break Err(error),
            }
        };

        while turns.join_next().await.is_some() {}
        outcome
    }
}

/// Batch order is preserved both across senders and within one sender.
fn group_by_sender(batch: Vec<InboundMessage>) -> Vec<(UserId, Vec<String>)> {
    let mut grouped: Vec<(UserId, Vec<String>)> = Vec::new();
    for message in batch {
        match grouped.iter_mut().find(|(sender, _)| *sender == message.sender) {
            Some((_, texts)) => texts.push(message.text),
            None => grouped.push((message.sender, vec![message.text])),
        }
    }
    grouped
}

async fn run_turns(
    transport: Arc<dyn ChatTransport>,
    handler: Arc<dyn MessageHandler>,
    gate: Arc<UserGate>,
    sender: UserId,
    texts: Vec<String>,
) {
    let _guard = gate.acquire(&sender).await;

    for text in texts {
        let reply = match handler.handle(&sender, &text).await {
            Ok(reply) => reply,
            Err(error) => {
                error!(
                    event_name = "conversation.turn.failed",
                    user_id = %sender,
                    error = %error,
                    "turn failed; sending apology"
                );
                error.user_message().to_string()
            }
        };

        if let Err(error) = transport.send_message(&sender, &reply).await {
            warn!(
                event_name = "telegram.send.failed",
                user_id = %sender,
                error = %error,
                "failed to deliver reply"
            );
        }
    }
}
