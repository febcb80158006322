//! In-process publish/subscribe broker.
//!
//! Every [`LocalBus`] created from the same [`LocalBroker`] shares one topic
//! table. Each client has its own unbounded inbox, so delivery from one
//! publisher to one topic stays in publish order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};

use crate::{Bus, BusMessage, BusStatus, Topic, TransportError};

#[derive(Default)]
struct BrokerState {
    next_client: u64,
    /// Inbox of every connected client.
    clients: HashMap<u64, mpsc::UnboundedSender<BusMessage>>,
    /// Subscribed client ids per topic.
    topics: HashMap<Topic, HashSet<u64>>,
}

/// Shared in-memory broker. Cheap to clone.
#[derive(Clone, Default)]
pub struct LocalBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl LocalBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new client connection. The returned bus starts connected.
    pub async fn connect(&self) -> LocalBus {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.state.lock().await;
            state.next_client += 1;
            let id = state.next_client;
            state.clients.insert(id, tx);
            id
        };
        let (status_tx, _) = watch::channel(BusStatus::Connected);
        tracing::debug!(client = id, "local bus connected");

        LocalBus {
            id,
            broker: self.clone(),
            inbox: Mutex::new(rx),
            status: status_tx,
        }
    }

    /// Number of clients subscribed to `topic`.
    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .map_or(0, HashSet::len)
    }

    async fn drop_subscriptions(&self, id: u64) {
        let mut state = self.state.lock().await;
        for subscribers in state.topics.values_mut() {
            subscribers.remove(&id);
        }
        state.topics.retain(|_, subscribers| !subscribers.is_empty());
    }
}

/// A client connection to a [`LocalBroker`].
pub struct LocalBus {
    id: u64,
    broker: LocalBroker,
    inbox: Mutex<mpsc::UnboundedReceiver<BusMessage>>,
    status: watch::Sender<BusStatus>,
}

impl LocalBus {
    /// Simulates a transport loss: subscriptions are dropped and the status
    /// goes to `Disconnected` until [`restore`](Self::restore) is called.
    pub async fn interrupt(&self) {
        self.broker.drop_subscriptions(self.id).await;
        self.status.send_replace(BusStatus::Disconnected);
        tracing::debug!(client = self.id, "local bus interrupted");
    }

    /// Ends a simulated loss. Subscriptions are not restored; the owner
    /// must subscribe again, as after a real reconnect.
    pub fn restore(&self) {
        self.status.send_replace(BusStatus::Connected);
        tracing::debug!(client = self.id, "local bus restored");
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.status.borrow().is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl Bus for LocalBus {
    async fn subscribe(&self, topic: &Topic) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.broker
            .state
            .lock()
            .await
            .topics
            .entry(topic.clone())
            .or_default()
            .insert(self.id);
        Ok(())
    }

    async fn publish(
        &self,
        topic: &Topic,
        body: &[u8],
    ) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let state = self.broker.state.lock().await;
        let Some(subscribers) = state.topics.get(topic) else {
            return Ok(());
        };
        for id in subscribers {
            if let Some(inbox) = state.clients.get(id) {
                // A closed inbox just means that client is going away.
                let _ = inbox.send(BusMessage {
                    topic: topic.clone(),
                    body: body.to_vec(),
                });
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Option<BusMessage>, TransportError> {
        Ok(self.inbox.lock().await.recv().await)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.broker.drop_subscriptions(self.id).await;
        self.broker.state.lock().await.clients.remove(&self.id);
        self.status.send_replace(BusStatus::Disconnected);
        tracing::debug!(client = self.id, "local bus disconnected");
        Ok(())
    }

    fn status(&self) -> watch::Receiver<BusStatus> {
        self.status.subscribe()
    }
}
