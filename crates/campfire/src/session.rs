//! [`RoomSession`]: the caller's handle to one room visit.
//!
//! Entering a room spawns a [`SessionActor`](crate::actor::SessionActor)
//! that owns everything the visit needs. The handle sends it commands
//! through a bounded channel and reads its state through watch channels,
//! so a value read from the handle is always the actor's latest.
//!
//! Dropping the handle leaves the room, same as [`RoomSession::leave`]
//! without waiting for teardown to finish.

use std::collections::BTreeMap;

use campfire_peer::{MediaEngine, NegotiationEngine, PeerStatus};
use campfire_protocol::{ChatMessage, JsonCodec, MAX_FIRE_LEVEL, RoomName, Username};
use campfire_room::{FireStatus, FireSync, NoRoster, Roster, RosterSource};
use campfire_tick::{TickConfig, TickScheduler};
use campfire_transport::{Bus, BusStatus};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span};

use crate::actor::{Command, Outlets, SessionActor};
use crate::{CampfireError, SessionConfig};

/// Handle to an entered room.
pub struct RoomSession {
    room: RoomName,
    user: Username,
    commands: mpsc::Sender<Command>,
    fire: watch::Receiver<FireStatus>,
    roster: watch::Receiver<Vec<Username>>,
    peers: watch::Receiver<BTreeMap<Username, PeerStatus>>,
    bus_status: watch::Receiver<BusStatus>,
    chat: broadcast::Sender<ChatMessage>,
    task: Option<JoinHandle<()>>,
}

impl RoomSession {
    /// Start configuring a visit to `room` as `user`.
    pub fn builder(
        room: impl Into<RoomName>,
        user: impl Into<Username>,
    ) -> RoomSessionBuilder<NoRoster> {
        RoomSessionBuilder {
            room: room.into(),
            user: user.into(),
            config: SessionConfig::default(),
            roster_source: NoRoster,
        }
    }

    /// Enter `room` as `user` with default settings and no roster
    /// fallback.
    pub async fn enter<B: Bus, M: MediaEngine>(
        room: impl Into<RoomName>,
        user: impl Into<Username>,
        bus: B,
        media: M,
    ) -> Result<Self, CampfireError> {
        Self::builder(room, user).enter(bus, media).await
    }

    pub fn room(&self) -> &RoomName {
        &self.room
    }

    pub fn user(&self) -> &Username {
        &self.user
    }

    // -----------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------

    /// Light the fire. Returns the new level (1).
    ///
    /// # Errors
    /// [`RoomError::AlreadyLit`](campfire_room::RoomError::AlreadyLit) if
    /// it is burning, [`CampfireError::SessionClosed`] after leaving.
    pub async fn ignite(&self) -> Result<u8, CampfireError> {
        self.request(|reply| Command::Ignite { reply }).await?
    }

    /// Add one level of fuel. Returns the new level.
    ///
    /// # Errors
    /// [`RoomError::NotLit`](campfire_room::RoomError::NotLit) if the fire
    /// is out, [`CampfireError::SessionClosed`] after leaving.
    pub async fn add_fuel(&self) -> Result<u8, CampfireError> {
        self.request(|reply| Command::AddFuel { reply }).await?
    }

    /// Publish a chat line to the room's chat topic.
    pub async fn send_chat(&self, content: impl Into<String>) -> Result<(), CampfireError> {
        let content = content.into();
        self.request(|reply| Command::SendChat { content, reply })
            .await?
    }

    /// Leave the room: announce `leave`, close every peer link, stop the
    /// decay timer, and close the bus. Waits for teardown to finish.
    pub async fn leave(mut self) -> Result<(), CampfireError> {
        let result = self.request(|reply| Command::Leave { reply }).await;
        if let Some(task) = self.task.take() {
            // The actor has replied; the task is finishing up.
            let _ = task.await;
        }
        result
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CampfireError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| CampfireError::SessionClosed)?;
        reply_rx.await.map_err(|_| CampfireError::SessionClosed)
    }

    // -----------------------------------------------------------------
    // Observables
    // -----------------------------------------------------------------

    /// Current fire level and burn countdown.
    pub fn fire(&self) -> FireStatus {
        *self.fire.borrow()
    }

    pub fn fire_level(&self) -> u8 {
        self.fire.borrow().level
    }

    pub fn watch_fire(&self) -> watch::Receiver<FireStatus> {
        self.fire.clone()
    }

    /// Participants currently believed present, including this one.
    pub fn roster(&self) -> Vec<Username> {
        self.roster.borrow().clone()
    }

    pub fn watch_roster(&self) -> watch::Receiver<Vec<Username>> {
        self.roster.clone()
    }

    /// Per-peer negotiation and connectivity state.
    pub fn peer_states(&self) -> BTreeMap<Username, PeerStatus> {
        self.peers.borrow().clone()
    }

    pub fn watch_peers(&self) -> watch::Receiver<BTreeMap<Username, PeerStatus>> {
        self.peers.clone()
    }

    pub fn bus_status(&self) -> BusStatus {
        self.bus_status.borrow().clone()
    }

    pub fn watch_bus_status(&self) -> watch::Receiver<BusStatus> {
        self.bus_status.clone()
    }

    /// Subscribe to inbound chat, own messages included.
    pub fn chat(&self) -> broadcast::Receiver<ChatMessage> {
        self.chat.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures a [`RoomSession`] before entering.
///
/// ```rust,no_run
/// use campfire::prelude::*;
///
/// # async fn run() -> Result<(), CampfireError> {
/// let broker = LocalBroker::new();
/// let session = RoomSession::builder("den", "alice")
///     .config(SessionConfig {
///         roster_fallback: false,
///         ..Default::default()
///     })
///     .enter(broker.connect().await, LoopbackMedia::new())
///     .await?;
/// session.ignite().await?;
/// session.leave().await
/// # }
/// ```
pub struct RoomSessionBuilder<R> {
    room: RoomName,
    user: Username,
    config: SessionConfig,
    roster_source: R,
}

impl<R: RosterSource> RoomSessionBuilder<R> {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Where to fetch the roster fallback from on entry.
    pub fn roster_source<S: RosterSource>(self, source: S) -> RoomSessionBuilder<S> {
        RoomSessionBuilder {
            room: self.room,
            user: self.user,
            config: self.config,
            roster_source: source,
        }
    }

    /// Enter the room over `bus`, negotiating media with `media`.
    ///
    /// Returns as soon as the session actor is running; subscribing and
    /// announcing happen once the bus reports `connected`.
    ///
    /// # Errors
    /// [`CampfireError::InvalidConfig`] for an empty room or user name, a
    /// zero-sized command buffer, a fire cap outside `1..=10`, or a zero
    /// burn time.
    pub async fn enter<B: Bus, M: MediaEngine>(
        self,
        bus: B,
        media: M,
    ) -> Result<RoomSession, CampfireError> {
        let Self {
            room,
            user,
            config,
            roster_source,
        } = self;

        if room.as_str().is_empty() {
            return Err(CampfireError::InvalidConfig("room name is empty".into()));
        }
        if user.as_str().is_empty() {
            return Err(CampfireError::InvalidConfig("username is empty".into()));
        }
        if config.command_buffer == 0 {
            return Err(CampfireError::InvalidConfig("command_buffer must be > 0".into()));
        }
        if !(1..=MAX_FIRE_LEVEL).contains(&config.fire.max_level) {
            return Err(CampfireError::InvalidConfig(format!(
                "fire.max_level must be in 1..={MAX_FIRE_LEVEL}, got {}",
                config.fire.max_level
            )));
        }
        if config.fire.burn_ticks == 0 {
            return Err(CampfireError::InvalidConfig("fire.burn_ticks must be > 0".into()));
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let (roster_tx, roster_rx) = mpsc::unbounded_channel();

        let fire = FireSync::new(user.clone(), config.fire.clone());
        let (fire_tx, fire_rx) = watch::channel(fire.status());
        let (roster_watch_tx, roster_watch_rx) = watch::channel(Vec::new());
        let (peers_tx, peers_rx) = watch::channel(BTreeMap::new());
        let (chat_tx, _) = broadcast::channel(config.chat_buffer.max(1));
        let bus_status = bus.status();

        if config.roster_fallback {
            let room = room.clone();
            tokio::spawn(async move {
                let _ = roster_tx.send(roster_source.fetch(&room).await);
            });
        }

        let scheduler = TickScheduler::new(TickConfig {
            start_paused: true,
            ..config.tick.clone()
        });

        let actor = SessionActor {
            room: room.clone(),
            local: user.clone(),
            signaling: room.signaling_topic(),
            chat_topic: room.chat_topic(),
            bus_status: bus_status.clone(),
            bus,
            codec: JsonCodec,
            engine: NegotiationEngine::new(user.clone(), media, media_tx),
            roster: Roster::new(),
            fire,
            scheduler,
            commands: cmd_rx,
            media_events: media_rx,
            roster_fetch: roster_rx,
            outlets: Outlets {
                fire: fire_tx,
                roster: roster_watch_tx,
                peers: peers_tx,
                chat: chat_tx.clone(),
            },
            acquire_audio: config.acquire_audio,
            online: false,
            announced: false,
        };

        let span = info_span!("room", room = %room, user = %user);
        let task = tokio::spawn(actor.run().instrument(span));

        Ok(RoomSession {
            room,
            user,
            commands: cmd_tx,
            fire: fire_rx,
            roster: roster_watch_rx,
            peers: peers_rx,
            bus_status,
            chat: chat_tx,
            task: Some(task),
        })
    }
}
