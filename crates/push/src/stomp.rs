use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::{PushError, PushSubscriber, PushSubscription, StompCommand, StompFrame, TopicRouter};

/// Connection settings for [`StompClient`]
#[derive(Debug, Clone)]
pub struct StompConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8080/ws/websocket`
    pub url: String,

    /// Value of the CONNECT `host` header
    pub host: String,

    /// Wait between a dropped connection and the next attempt
    pub reconnect_delay: Duration,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws/websocket".to_string(),
            host: "localhost".to_string(),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl StompConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

struct Connection {
    control: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

/// STOMP 1.2 over WebSocket.
///
/// The connection is opened lazily by the first `subscribe` and kept alive
/// by a background task that reconnects after `reconnect_delay` and
/// re-subscribes every destination that still has a live subscriber.
/// Delivery is best effort: messages published while disconnected are lost.
pub struct StompClient {
    config: StompConfig,
    router: TopicRouter,
    connection: Mutex<Option<Connection>>,
}

impl StompClient {
    pub fn new(config: StompConfig) -> Self {
        Self {
            config,
            router: TopicRouter::new(),
            connection: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StompConfig {
        &self.config
    }

    /// Stop the background connection task
    pub fn shutdown(&self) {
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(connection) = connection.take() {
            connection.task.abort();
            info!(url = %self.config.url, "push connection stopped");
        }
    }

    fn ensure_running(&self, destination: &str) {
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = connection.as_ref() {
            if !existing.task.is_finished() {
                let _ = existing.control.send(destination.to_string());
                return;
            }
        }

        let (control, control_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(
            self.config.clone(),
            self.router.clone(),
            control_rx,
        ));
        *connection = Some(Connection { control, task });
    }
}

impl Drop for StompClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl PushSubscriber for StompClient {
    async fn subscribe(&self, destination: &str) -> Result<PushSubscription, PushError> {
        let (subscription, first) = self.router.register(destination);
        if first {
            debug!(destination, "new push destination");
        }
        self.ensure_running(destination);
        Ok(subscription)
    }
}

async fn run_connection(
    config: StompConfig,
    router: TopicRouter,
    mut control: mpsc::UnboundedReceiver<String>,
) {
    loop {
        match session(&config, &router, &mut control).await {
            Ok(()) => return,
            Err(e) => warn!(
                url = %config.url,
                error = %e,
                retry_in_ms = config.reconnect_delay.as_millis() as u64,
                "push connection lost"
            ),
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

/// One connection lifetime. `Ok` only when the owning client went away.
async fn session(
    config: &StompConfig,
    router: &TopicRouter,
    control: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), PushError> {
    let (socket, _) = connect_async(config.url.as_str())
        .await
        .map_err(|e| PushError::Connect {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
    let (mut sink, mut stream) = socket.split();

    sink.send(Message::Text(StompFrame::connect(&config.host).encode()))
        .await?;

    let mut connected = false;
    let mut subscribed: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            destination = control.recv() => {
                let Some(destination) = destination else {
                    let _ = sink.send(Message::Text(StompFrame::disconnect().encode())).await;
                    return Ok(());
                };
                if connected && subscribed.insert(destination.clone()) {
                    let id = format!("sub-{}", subscribed.len() - 1);
                    sink.send(Message::Text(StompFrame::subscribe(&id, &destination).encode()))
                        .await?;
                    debug!(%destination, subscription = %id, "subscribed");
                }
            }
            message = stream.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                    Some(Ok(Message::Close(_))) | None => return Err(PushError::Closed),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                };

                // Server heart-beat
                if text.trim_matches(['\r', '\n']).is_empty() {
                    continue;
                }

                let frame = match StompFrame::decode(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable frame");
                        continue;
                    }
                };

                match frame.command {
                    StompCommand::Connected => {
                        connected = true;
                        info!(url = %config.url, "push connection established");
                        for destination in router.destinations() {
                            if subscribed.insert(destination.clone()) {
                                let id = format!("sub-{}", subscribed.len() - 1);
                                sink.send(Message::Text(
                                    StompFrame::subscribe(&id, &destination).encode(),
                                ))
                                .await?;
                                debug!(%destination, subscription = %id, "subscribed");
                            }
                        }
                    }
                    StompCommand::Message => {
                        let Some(destination) = frame.header("destination") else {
                            warn!("MESSAGE frame without destination");
                            continue;
                        };
                        let delivered = router.dispatch(destination, &frame.body);
                        debug!(destination, delivered, "push message");
                    }
                    StompCommand::Error => {
                        let message = frame
                            .header("message")
                            .map(str::to_string)
                            .unwrap_or_else(|| frame.body.clone());
                        return Err(PushError::Server(message));
                    }
                    other => debug!(command = %other, "ignoring frame"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StompConfig::default();
        assert_eq!(config.url, "ws://localhost:8080/ws/websocket");
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_config_builder() {
        let config = StompConfig::new("ws://lab:9000/ws/websocket")
            .with_host("lab")
            .with_reconnect_delay(Duration::from_millis(250));
        assert_eq!(config.host, "lab");
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_subscribe_without_server_keeps_retrying() {
        // Nothing listens on port 9; the task must stay alive and retry.
        let client = StompClient::new(
            StompConfig::new("ws://127.0.0.1:9/ws").with_reconnect_delay(Duration::from_millis(10)),
        );
        let mut subscription = client.subscribe("/topic/dispense-status").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(subscription.try_next().is_none());
        client.shutdown();
    }
}
