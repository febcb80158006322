//! The room session actor: one task per room visit.
//!
//! Everything a visit owns lives here: the bus, the negotiation engine,
//! the roster, the fire replica, and the decay scheduler. The task handles
//! one event at a time from a single `select!` loop, so no two state
//! changes ever overlap. Callers talk to it through
//! [`RoomSession`](crate::RoomSession) and observe it through watch
//! channels.

use std::collections::BTreeMap;

use campfire_peer::{MediaEngine, MediaEvent, NegotiationEngine, PeerStatus};
use campfire_protocol::{ChatMessage, Codec, JsonCodec, RoomName, Signal, Username};
use campfire_room::{FireStatus, FireSync, RoomError, Roster};
use campfire_tick::TickScheduler;
use campfire_transport::{Bus, BusMessage, BusStatus, Topic};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::CampfireError;

/// Commands sent from a [`RoomSession`](crate::RoomSession) handle.
pub(crate) enum Command {
    Ignite {
        reply: oneshot::Sender<Result<u8, CampfireError>>,
    },
    AddFuel {
        reply: oneshot::Sender<Result<u8, CampfireError>>,
    },
    SendChat {
        content: String,
        reply: oneshot::Sender<Result<(), CampfireError>>,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
}

/// Where the actor publishes what callers can observe.
pub(crate) struct Outlets {
    pub(crate) fire: watch::Sender<FireStatus>,
    pub(crate) roster: watch::Sender<Vec<Username>>,
    pub(crate) peers: watch::Sender<BTreeMap<Username, PeerStatus>>,
    pub(crate) chat: broadcast::Sender<ChatMessage>,
}

pub(crate) struct SessionActor<B: Bus, M: MediaEngine> {
    pub(crate) room: RoomName,
    pub(crate) local: Username,
    pub(crate) bus: B,
    pub(crate) codec: JsonCodec,
    pub(crate) signaling: Topic,
    pub(crate) chat_topic: Topic,
    pub(crate) engine: NegotiationEngine<M>,
    pub(crate) roster: Roster,
    pub(crate) fire: FireSync,
    pub(crate) scheduler: TickScheduler,
    pub(crate) commands: mpsc::Receiver<Command>,
    pub(crate) media_events: mpsc::UnboundedReceiver<MediaEvent>,
    pub(crate) roster_fetch: mpsc::UnboundedReceiver<Result<Vec<Username>, RoomError>>,
    pub(crate) bus_status: watch::Receiver<BusStatus>,
    pub(crate) outlets: Outlets,
    pub(crate) acquire_audio: bool,
    /// Subscribed and announced on the current bus connection.
    pub(crate) online: bool,
    /// Announced at least once during this visit.
    pub(crate) announced: bool,
}

impl<B: Bus, M: MediaEngine> SessionActor<B, M> {
    /// Runs the actor loop until the handle leaves, is dropped, or the bus
    /// closes for good.
    pub(crate) async fn run(mut self) {
        info!("entering room");

        if self.acquire_audio {
            if let Err(e) = self.engine.acquire_local_audio().await {
                warn!(error = %e, "continuing without local audio");
            }
        }

        self.roster.on_join(&self.local);
        self.publish_roster();

        let status = self.bus_status.borrow_and_update().clone();
        self.on_bus_status(status).await;

        let mut leave_reply = None;
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Leave { reply }) => {
                        leave_reply = Some(reply);
                        break;
                    }
                    Some(cmd) => self.on_command(cmd).await,
                    None => {
                        debug!("session handle dropped");
                        break;
                    }
                },
                msg = self.bus.recv() => match msg {
                    Ok(Some(msg)) => self.on_bus_message(msg).await,
                    Ok(None) => {
                        warn!("bus closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "bus receive failed");
                        break;
                    }
                },
                Some(event) = self.media_events.recv() => {
                    if let Some(signal) = self.engine.on_media_event(event) {
                        self.publish_signal(&signal).await;
                    }
                    self.publish_peers();
                }
                Some(result) = self.roster_fetch.recv() => self.on_roster_fetched(result),
                Ok(()) = self.bus_status.changed() => {
                    let status = self.bus_status.borrow_and_update().clone();
                    self.on_bus_status(status).await;
                }
                tick = self.scheduler.wait_for_tick() => {
                    for _ in 0..=tick.ticks_skipped {
                        self.fire.tick();
                    }
                    if !self.fire.is_lit() {
                        self.scheduler.pause();
                    }
                    self.outlets.fire.send_replace(self.fire.status());
                }
            }
        }

        self.teardown().await;
        if let Some(reply) = leave_reply {
            let _ = reply.send(());
        }
    }

    // -----------------------------------------------------------------
    // Commands from the handle
    // -----------------------------------------------------------------

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Ignite { reply } => {
                let result = self.fire.ignite();
                let _ = reply.send(self.after_local_fire_action(result).await);
            }
            Command::AddFuel { reply } => {
                let result = self.fire.add_fuel();
                let _ = reply.send(self.after_local_fire_action(result).await);
            }
            Command::SendChat { content, reply } => {
                let _ = reply.send(self.send_chat(content).await);
            }
            // Handled by the loop.
            Command::Leave { .. } => {}
        }
    }

    async fn after_local_fire_action(
        &mut self,
        result: Result<Signal, RoomError>,
    ) -> Result<u8, CampfireError> {
        let update = result?;
        self.fire_changed();
        // The local replica already moved; peers catch up on the next
        // update or sync if this publish is lost.
        self.publish_signal(&update).await;
        Ok(self.fire.level())
    }

    async fn send_chat(&mut self, content: String) -> Result<(), CampfireError> {
        let message = ChatMessage::new(self.local.clone(), self.room.clone(), content);
        let body = self.codec.encode(&message)?;
        self.bus.publish(&self.chat_topic, &body).await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Bus
    // -----------------------------------------------------------------

    async fn on_bus_status(&mut self, status: BusStatus) {
        match status {
            BusStatus::Connected if !self.online => {
                if self.announce().await {
                    self.online = true;
                }
            }
            BusStatus::Connected => {}
            other if self.online => {
                warn!(status = %other, "bus connection lost");
                self.online = false;
            }
            other => debug!(status = %other, "bus status"),
        }
    }

    /// Subscribe to the room's topics, then `join` and ask for the fire.
    /// Runs on first connect and after every reconnect: the bus does not
    /// replay subscriptions or signaling.
    async fn announce(&mut self) -> bool {
        for topic in [&self.signaling, &self.chat_topic] {
            if let Err(e) = self.bus.subscribe(topic).await {
                warn!(%topic, error = %e, "subscribe failed");
                return false;
            }
        }
        info!(rejoin = self.announced, "joined room topics");
        self.announced = true;

        let join = Signal::join(self.local.clone());
        self.publish_signal(&join).await;
        let request = self.fire.sync_request();
        self.publish_signal(&request).await;
        true
    }

    async fn on_bus_message(&mut self, msg: BusMessage) {
        if msg.topic == self.signaling {
            self.on_signal_bytes(&msg.body).await;
        } else if msg.topic == self.chat_topic {
            match self.codec.decode::<ChatMessage>(&msg.body) {
                Ok(chat) => {
                    // No receivers is fine; chat is fire-and-forget.
                    let _ = self.outlets.chat.send(chat);
                }
                Err(e) => debug!(error = %e, "ignoring malformed chat message"),
            }
        } else {
            trace!(topic = %msg.topic, "message on unrelated topic");
        }
    }

    /// Dispatch one signaling envelope by kind. Nothing in here may end
    /// the session: bad or unaddressed messages are dropped.
    async fn on_signal_bytes(&mut self, body: &[u8]) {
        let signal = match self.codec.decode_signal(body) {
            Ok(signal) => signal,
            Err(e) => {
                debug!(error = %e, "ignoring malformed signal");
                return;
            }
        };
        trace!(kind = signal.kind(), sender = %signal.sender(), "signal");

        let mut change = self.roster.apply_signal(&signal);
        // A relayed snapshot may predate our own join.
        if self.roster.on_join(&self.local) {
            change.removed.retain(|user| user != &self.local);
        }
        if !change.removed.is_empty() {
            let roster = &self.roster;
            self.engine.retain_members(|user| roster.contains(user));
        }
        if !change.is_empty() {
            debug!(added = ?change.added, removed = ?change.removed, "roster changed");
            self.publish_roster();
        }

        match &signal {
            Signal::FireUpdate { .. } | Signal::RequestFireSync { .. } | Signal::Join { .. } => {
                let before = self.fire.status();
                let reply = self.fire.handle_signal(&signal);
                if self.fire.status() != before {
                    self.fire_changed();
                }
                if let Some(reply) = reply {
                    self.publish_signal(&reply).await;
                }
            }
            _ => {}
        }

        if let Some(reply) = self.engine.handle_signal(&signal).await {
            self.publish_signal(&reply).await;
        }
        self.publish_peers();
    }

    async fn publish_signal(&mut self, signal: &Signal) {
        let body = match self.codec.encode(signal) {
            Ok(body) => body,
            Err(e) => {
                warn!(kind = signal.kind(), error = %e, "signal encode failed");
                return;
            }
        };
        if let Err(e) = self.bus.publish(&self.signaling, &body).await {
            warn!(kind = signal.kind(), error = %e, "signal publish failed");
        }
    }

    // -----------------------------------------------------------------
    // Roster fallback
    // -----------------------------------------------------------------

    fn on_roster_fetched(&mut self, result: Result<Vec<Username>, RoomError>) {
        match result {
            Ok(users) => {
                let change = self.roster.merge(users);
                info!(added = change.added.len(), "roster fallback merged");
                if !change.is_empty() {
                    self.publish_roster();
                }
            }
            Err(e) => warn!(error = %e, "roster fallback failed"),
        }
    }

    // -----------------------------------------------------------------
    // Outlets
    // -----------------------------------------------------------------

    /// The level was set: restart the burn countdown, or stop it if cold.
    fn fire_changed(&mut self) {
        if self.fire.is_lit() {
            self.scheduler.resume();
            self.scheduler.restart();
        } else {
            self.scheduler.pause();
        }
        self.outlets.fire.send_replace(self.fire.status());
    }

    fn publish_roster(&self) {
        self.outlets.roster.send_replace(self.roster.members());
    }

    fn publish_peers(&self) {
        let states = self.engine.peer_states();
        self.outlets.peers.send_if_modified(|current| {
            if *current == states {
                false
            } else {
                *current = states;
                true
            }
        });
    }

    // -----------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------

    async fn teardown(&mut self) {
        if self.online {
            let leave = Signal::leave(self.local.clone());
            self.publish_signal(&leave).await;
        }
        self.online = false;

        self.engine.close_all();
        self.fire.reset();
        self.scheduler.pause();
        self.roster.clear();

        self.outlets.fire.send_replace(self.fire.status());
        self.publish_roster();
        self.publish_peers();

        if let Err(e) = self.bus.disconnect().await {
            debug!(error = %e, "bus disconnect failed");
        }
        info!("left room");
    }
}
