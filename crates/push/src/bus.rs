use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

use crate::{PushError, PushSubscriber, PushSubscription};

/// Destination -> live subscriber senders
#[derive(Debug, Clone, Default)]
pub struct TopicRouter {
    routes: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<String>>>>>,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<String, Vec<mpsc::UnboundedSender<String>>>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber; returns the subscription and whether the
    /// destination had no subscribers before
    pub fn register(&self, destination: &str) -> (PushSubscription, bool) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut routes = self.routes();
        let senders = routes.entry(destination.to_string()).or_default();
        senders.retain(|s| !s.is_closed());
        let first = senders.is_empty();
        senders.push(tx);
        (PushSubscription::new(destination, rx), first)
    }

    /// Deliver `body` to every live subscriber of `destination`.
    ///
    /// Returns the number of subscribers reached.
    pub fn dispatch(&self, destination: &str, body: &str) -> usize {
        let mut routes = self.routes();
        let Some(senders) = routes.get_mut(destination) else {
            trace!(destination, "no subscribers");
            return 0;
        };

        senders.retain(|s| s.send(body.to_string()).is_ok());
        senders.len()
    }

    pub fn destinations(&self) -> Vec<String> {
        let mut destinations: Vec<_> = self
            .routes()
            .iter()
            .filter(|(_, senders)| senders.iter().any(|s| !s.is_closed()))
            .map(|(d, _)| d.clone())
            .collect();
        destinations.sort();
        destinations
    }

    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.routes()
            .get(destination)
            .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}

/// In-memory push channel
#[derive(Debug, Clone, Default)]
pub struct PushBus {
    router: TopicRouter,
}

impl PushBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, destination: &str, body: impl AsRef<str>) -> usize {
        self.router.dispatch(destination, body.as_ref())
    }

    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.router.subscriber_count(destination)
    }
}

#[async_trait]
impl PushSubscriber for PushBus {
    async fn subscribe(&self, destination: &str) -> Result<PushSubscription, PushError> {
        let (subscription, _) = self.router.register(destination);
        Ok(subscription)
    }
}
