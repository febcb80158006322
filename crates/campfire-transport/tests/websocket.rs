//! Integration tests for the WebSocket bus client.
//!
//! These spin up a tiny in-test relay on a random port that understands
//! the subscribe/publish/message frames, and drive a real `WebSocketBus`
//! against it.

#[cfg(feature = "websocket")]
mod websocket {
    use std::collections::HashSet;
    use std::time::Duration;

    use campfire_transport::{
        Bus, BusStatus, Topic, TransportError, WebSocketBus, WebSocketBusConfig,
    };
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    /// Serves `connections` relay sessions one after another. Each session
    /// echoes publishes back as messages on subscribed topics. A session
    /// ends after `max_frames` inbound frames (simulating a dropped socket).
    async fn spawn_relay(connections: usize, max_frames: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for _ in 0..connections {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let mut subscribed = HashSet::new();
                let mut seen = 0;

                while let Some(Ok(Message::Text(text))) = ws.next().await {
                    let frame: serde_json::Value =
                        serde_json::from_str(text.as_str()).unwrap();
                    let topic = frame["topic"].as_str().unwrap().to_string();
                    match frame["op"].as_str().unwrap() {
                        "subscribe" => {
                            subscribed.insert(topic);
                        }
                        "publish" if subscribed.contains(&topic) => {
                            let out = serde_json::json!({
                                "op": "message",
                                "topic": topic,
                                "body": frame["body"],
                            });
                            ws.send(Message::Text(out.to_string().into()))
                                .await
                                .unwrap();
                        }
                        _ => {}
                    }
                    seen += 1;
                    if seen >= max_frames {
                        break;
                    }
                }
                let _ = ws.close(None).await;
            }
        });

        format!("ws://{addr}")
    }

    async fn wait_for_status(bus: &WebSocketBus, want: BusStatus) {
        let mut status = bus.status();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| *s == want),
        )
        .await
        .expect("status should change in time")
        .expect("driver alive");
    }

    #[tokio::test]
    async fn test_subscribe_publish_receive_round_trip() {
        let url = spawn_relay(1, 100).await;
        let bus = WebSocketBus::connect(WebSocketBusConfig::with_url(url));
        wait_for_status(&bus, BusStatus::Connected).await;

        let topic = Topic::new("/topic/room/lobby");
        bus.subscribe(&topic).await.unwrap();
        bus.publish(&topic, br#"{"type":"join","sender":"alice"}"#)
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(5), bus.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(msg.topic, topic);
        assert_eq!(msg.body, br#"{"type":"join","sender":"alice"}"#);

        bus.disconnect().await.unwrap();
        wait_for_status(&bus, BusStatus::Disconnected).await;
    }

    #[tokio::test]
    async fn test_reconnects_after_socket_drop_without_replaying_subscriptions() {
        // First session dies after one frame (the subscribe).
        let url = spawn_relay(2, 1).await;
        let config = WebSocketBusConfig {
            reconnect_delay: Duration::from_millis(50),
            ..WebSocketBusConfig::with_url(url)
        };
        let bus = WebSocketBus::connect(config);
        wait_for_status(&bus, BusStatus::Connected).await;

        let mut status = bus.status();
        status.borrow_and_update();
        let topic = Topic::new("/topic/room/lobby");
        bus.subscribe(&topic).await.unwrap();

        // Lost, then connected again.
        tokio::time::timeout(Duration::from_secs(5), async {
            status.wait_for(|s| !s.is_connected()).await.unwrap();
            status.wait_for(|s| s.is_connected()).await.unwrap();
        })
        .await
        .expect("bus should reconnect");
    }

    #[tokio::test]
    async fn test_publish_while_unreachable_is_rejected() {
        let config = WebSocketBusConfig {
            reconnect_delay: Duration::from_millis(50),
            ..WebSocketBusConfig::with_url("ws://127.0.0.1:1")
        };
        let bus = WebSocketBus::connect(config);

        let mut status = bus.status();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| matches!(s, BusStatus::Error(_))),
        )
        .await
        .unwrap()
        .unwrap();

        let result = bus.publish(&Topic::new("t"), b"{}").await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
        bus.disconnect().await.unwrap();
    }
}
