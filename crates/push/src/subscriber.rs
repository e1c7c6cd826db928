use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::PushError;

/// Source of push messages for a destination
#[async_trait]
pub trait PushSubscriber: Send + Sync {
    /// Start receiving message bodies published to `destination`
    async fn subscribe(&self, destination: &str) -> Result<PushSubscription, PushError>;
}

/// Receiving end of one subscription.
///
/// Dropping it unsubscribes; the publisher prunes the closed sender on its
/// next delivery.
#[derive(Debug)]
pub struct PushSubscription {
    destination: String,
    receiver: mpsc::UnboundedReceiver<String>,
}

impl PushSubscription {
    pub fn new(destination: impl Into<String>, receiver: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            destination: destination.into(),
            receiver,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Next message body; `None` once the publisher has gone away
    pub async fn next(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`next`](Self::next)
    pub fn try_next(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}
