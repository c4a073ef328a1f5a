use std::sync::Arc;

use async_trait::async_trait;

use sokoni_core::ports::{Notifier, NotifyError};
use sokoni_core::UserId;

use crate::transport::ChatTransport;

/// Adapts the chat transport to the engine's notifier port, used for
/// out-of-turn messages such as the seller's sale notice.
pub struct TransportNotifier {
    transport: Arc<dyn ChatTransport>,
}

impl TransportNotifier {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Notifier for TransportNotifier {
    async fn send(&self, recipient: &UserId, text: &str) -> Result<(), NotifyError> {
        self.transport
            .send_message(recipient, text)
            .await
            .map_err(|err| NotifyError(err.to_string()))
    }
}
