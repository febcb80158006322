//! WebSocket bus client using `tokio-tungstenite`.
//!
//! The relay speaks small JSON frames tagged by `op`:
//!
//! ```text
//! → {"op":"subscribe","topic":"/topic/room/lobby"}
//! → {"op":"publish","topic":"/topic/room/lobby","body":"{...}"}
//! ← {"op":"message","topic":"/topic/room/lobby","body":"{...}"}
//! ```
//!
//! A background driver task owns the socket. When the socket drops it
//! reconnects after a fixed delay. Subscriptions are NOT replayed on
//! reconnect; the owner watches [`Bus::status`] and subscribes again.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::{Bus, BusMessage, BusStatus, Topic, TransportError};

/// Settings for [`WebSocketBus::connect`].
#[derive(Debug, Clone)]
pub struct WebSocketBusConfig {
    /// Relay endpoint, e.g. `ws://localhost:8080/ws`.
    pub url: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Capacity of the inbound and outbound frame queues.
    pub queue_size: usize,
}

impl Default for WebSocketBusConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            reconnect_delay: Duration::from_secs(5),
            queue_size: 256,
        }
    }
}

impl WebSocketBusConfig {
    /// Config for `url` with default timings.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Frame {
    Subscribe { topic: String },
    Publish { topic: String, body: String },
    Message { topic: String, body: String },
}

/// A [`Bus`] backed by a reconnecting WebSocket.
pub struct WebSocketBus {
    outbound: mpsc::Sender<Frame>,
    inbound: Mutex<mpsc::Receiver<BusMessage>>,
    status: watch::Receiver<BusStatus>,
    shutdown: watch::Sender<bool>,
}

impl WebSocketBus {
    /// Spawns the connection driver and returns immediately. The status
    /// starts at `Connecting`.
    pub fn connect(config: WebSocketBusConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.queue_size);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.queue_size);
        let (status_tx, status_rx) = watch::channel(BusStatus::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(drive(
            config,
            outbound_rx,
            inbound_tx,
            status_tx,
            shutdown_rx,
        ));

        Self {
            outbound: outbound_tx,
            inbound: Mutex::new(inbound_rx),
            status: status_rx,
            shutdown: shutdown_tx,
        }
    }

    async fn enqueue(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.status.borrow().is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Shutdown)
    }
}

impl Bus for WebSocketBus {
    async fn subscribe(&self, topic: &Topic) -> Result<(), TransportError> {
        self.enqueue(Frame::Subscribe {
            topic: topic.as_str().to_string(),
        })
        .await
    }

    async fn publish(
        &self,
        topic: &Topic,
        body: &[u8],
    ) -> Result<(), TransportError> {
        let body = String::from_utf8(body.to_vec()).map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e,
            ))
        })?;
        self.enqueue(Frame::Publish {
            topic: topic.as_str().to_string(),
            body,
        })
        .await
    }

    async fn recv(&self) -> Result<Option<BusMessage>, TransportError> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.shutdown.send_replace(true);
        Ok(())
    }

    fn status(&self) -> watch::Receiver<BusStatus> {
        self.status.clone()
    }
}

/// Outcome of one connected session of the driver.
enum SessionEnd {
    Lost,
    Shutdown,
}

async fn drive(
    config: WebSocketBusConfig,
    mut outbound: mpsc::Receiver<Frame>,
    inbound: mpsc::Sender<BusMessage>,
    status: watch::Sender<BusStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        status.send_replace(BusStatus::Connecting);

        match tokio_tungstenite::connect_async(config.url.as_str()).await {
            Ok((ws, _)) => {
                status.send_replace(BusStatus::Connected);
                tracing::info!(url = %config.url, "bus connected");

                let end = run_session(
                    ws,
                    &mut outbound,
                    &inbound,
                    &mut shutdown,
                )
                .await;
                status.send_replace(BusStatus::Disconnected);
                if matches!(end, SessionEnd::Shutdown) {
                    break;
                }
                tracing::warn!(
                    url = %config.url,
                    retry_in = ?config.reconnect_delay,
                    "bus connection lost"
                );
            }
            Err(e) => {
                tracing::warn!(url = %config.url, error = %e, "bus connect failed");
                status.send_replace(BusStatus::Error(e.to_string()));
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    status.send_replace(BusStatus::Disconnected);
    tracing::debug!(url = %config.url, "bus driver stopped");
}

async fn run_session(
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    outbound: &mut mpsc::Receiver<Frame>,
    inbound: &mpsc::Sender<BusMessage>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::debug!(error = %e, "failed to encode frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::debug!(error = %e, "bus send failed");
                    return SessionEnd::Lost;
                }
            }
            msg = stream.next() => {
                let data = match msg {
                    Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                    Some(Ok(Message::Binary(data))) => data.to_vec(),
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost,
                    Some(Ok(_)) => continue, // ping/pong/frame
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "bus receive failed");
                        return SessionEnd::Lost;
                    }
                };
                match serde_json::from_slice::<Frame>(&data) {
                    Ok(Frame::Message { topic, body }) => {
                        let msg = BusMessage {
                            topic: Topic::new(topic),
                            body: body.into_bytes(),
                        };
                        if inbound.send(msg).await.is_err() {
                            let _ = sink.close().await;
                            return SessionEnd::Shutdown;
                        }
                    }
                    Ok(other) => {
                        tracing::debug!(?other, "ignoring unexpected frame from relay");
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "ignoring malformed frame");
                    }
                }
            }
            _ = shutdown.changed() => {
                let _ = sink.close().await;
                return SessionEnd::Shutdown;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_subscribe_json_format() {
        let frame = Frame::Subscribe {
            topic: "/topic/room/a".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["op"], "subscribe");
        assert_eq!(json["topic"], "/topic/room/a");
    }

    #[test]
    fn test_frame_message_parses_from_relay() {
        let raw = r#"{"op":"message","topic":"/topic/room/a","body":"{\"type\":\"join\"}"}"#;
        let frame: Frame = serde_json::from_str(raw).unwrap();
        assert_eq!(
            frame,
            Frame::Message {
                topic: "/topic/room/a".into(),
                body: r#"{"type":"join"}"#.into(),
            }
        );
    }

    #[test]
    fn test_config_default_uses_fixed_five_second_backoff() {
        let config = WebSocketBusConfig::with_url("ws://relay/ws");
        assert_eq!(config.url, "ws://relay/ws");
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    }
}
