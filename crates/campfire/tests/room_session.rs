//! End-to-end tests: several room sessions sharing an in-memory broker,
//! negotiating over loopback media.
//!
//! Every test runs on a paused clock, so decay ticks and timeouts cost
//! no wall time and `settle()` returns only once every task is idle.

use std::sync::Arc;
use std::time::Duration;

use campfire::prelude::*;
use campfire::protocol::{Codec, JsonCodec, SessionDescription, Signal};
use tokio::sync::watch;
use tokio::time::{Instant, timeout};

const ROOM: &str = "den";
const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Helpers
// =========================================================================

fn user(name: &str) -> Username {
    Username::new(name)
}

fn quiet_config() -> SessionConfig {
    SessionConfig {
        roster_fallback: false,
        ..Default::default()
    }
}

/// Let every task run until the runtime is idle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn enter(broker: &LocalBroker, name: &str, media: &LoopbackMedia) -> RoomSession {
    let session = RoomSession::builder(ROOM, name)
        .config(quiet_config())
        .enter(broker.connect().await, media.clone())
        .await
        .unwrap();
    settle().await;
    session
}

async fn wait_until<T>(mut rx: watch::Receiver<T>, what: &str, f: impl FnMut(&T) -> bool) {
    timeout(WAIT, rx.wait_for(f))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("session closed");
}

async fn wait_connected(session: &RoomSession, remotes: &[&str]) {
    let remotes: Vec<Username> = remotes.iter().map(|r| user(r)).collect();
    wait_until(session.watch_peers(), "peers connected", |peers| {
        remotes
            .iter()
            .all(|r| peers.get(r).is_some_and(|s| s.state == PeerState::Connected))
    })
    .await;
}

async fn wait_level(session: &RoomSession, level: u8) {
    wait_until(session.watch_fire(), "fire level", |f| f.level == level).await;
}

/// A bare bus client on the room's signaling topic, for injecting raw
/// envelopes.
async fn raw_client(broker: &LocalBroker) -> impl Bus {
    let bus = broker.connect().await;
    bus.subscribe(&RoomName::new(ROOM).signaling_topic())
        .await
        .unwrap();
    bus
}

async fn inject(bus: &impl Bus, signal: &Signal) {
    let body = JsonCodec.encode(signal).unwrap();
    bus.publish(&RoomName::new(ROOM).signaling_topic(), &body)
        .await
        .unwrap();
}

// =========================================================================
// Fire sync
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ignite_reaches_other_participant() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;
    let bob = enter(&broker, "bob", &LoopbackMedia::new()).await;

    assert_eq!(alice.ignite().await.unwrap(), 1);
    wait_level(&bob, 1).await;

    assert_eq!(bob.add_fuel().await.unwrap(), 2);
    wait_level(&alice, 2).await;
}

#[tokio::test(start_paused = true)]
async fn test_newcomer_receives_lit_fire() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;
    alice.ignite().await.unwrap();
    alice.add_fuel().await.unwrap();
    alice.add_fuel().await.unwrap();

    let carol = enter(&broker, "carol", &LoopbackMedia::new()).await;

    wait_level(&carol, 3).await;
}

#[tokio::test(start_paused = true)]
async fn test_local_fire_action_errors() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;

    let err = alice.add_fuel().await.unwrap_err();
    assert!(matches!(err, CampfireError::Room(RoomError::NotLit)));

    alice.ignite().await.unwrap();
    let err = alice.ignite().await.unwrap_err();
    assert!(matches!(err, CampfireError::Room(RoomError::AlreadyLit(1))));
    assert_eq!(alice.fire_level(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fuel_caps_at_max_level() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;

    alice.ignite().await.unwrap();
    for _ in 0..15 {
        alice.add_fuel().await.unwrap();
    }

    assert_eq!(alice.fire_level(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_fire_decays_to_out() {
    let broker = LocalBroker::new();
    let alice = RoomSession::builder(ROOM, "alice")
        .config(SessionConfig {
            fire: FireConfig {
                burn_ticks: 3,
                ..Default::default()
            },
            ..quiet_config()
        })
        .enter(broker.connect().await, LoopbackMedia::new())
        .await
        .unwrap();
    settle().await;

    let start = Instant::now();
    alice.ignite().await.unwrap();
    alice.add_fuel().await.unwrap();

    timeout(Duration::from_secs(30), async {
        let mut fire = alice.watch_fire();
        fire.wait_for(|f| f.level == 0).await.map(|_| ())
    })
    .await
    .expect("fire never went out")
    .unwrap();

    // Two levels at three one-second ticks each.
    assert!(start.elapsed() >= Duration::from_secs(6));
    assert!(!alice.fire().is_lit());
}

#[tokio::test(start_paused = true)]
async fn test_last_fire_update_wins() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;
    let raw = raw_client(&broker).await;

    inject(&raw, &Signal::FireUpdate { sender: user("carol"), level: 4 }).await;
    inject(&raw, &Signal::FireUpdate { sender: user("dave"), level: 7 }).await;
    settle().await;

    assert_eq!(alice.fire_level(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_fire_update_can_put_fire_out() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;
    alice.ignite().await.unwrap();
    let raw = raw_client(&broker).await;

    inject(&raw, &Signal::FireUpdate { sender: user("carol"), level: 0 }).await;
    settle().await;

    assert_eq!(alice.fire_level(), 0);
    alice.ignite().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_malformed_messages_are_dropped() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;
    let raw = raw_client(&broker).await;
    let topic = RoomName::new(ROOM).signaling_topic();

    raw.publish(&topic, b"not json").await.unwrap();
    raw.publish(&topic, br#"{"type":"fire-update"}"#).await.unwrap();
    raw.publish(&topic, br#"{"type":"fire-update","sender":"x","level":11}"#)
        .await
        .unwrap();
    raw.publish(&topic, br#"{"type":"dance","sender":"x"}"#).await.unwrap();
    inject(&raw, &Signal::FireUpdate { sender: user("carol"), level: 3 }).await;
    settle().await;

    assert_eq!(alice.fire_level(), 3);
    assert_eq!(alice.bus_status(), BusStatus::Connected);
}

// =========================================================================
// Peer mesh
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_two_participants_connect() {
    let broker = LocalBroker::new();
    let alice_media = LoopbackMedia::new();
    let bob_media = LoopbackMedia::new();
    let alice = enter(&broker, "alice", &alice_media).await;
    let bob = enter(&broker, "bob", &bob_media).await;

    wait_connected(&alice, &["bob"]).await;
    wait_connected(&bob, &["alice"]).await;

    // The member already present offers; the newcomer answers.
    assert_eq!(alice_media.offers_to(&user("bob")), 1);
    assert_eq!(bob_media.offers_to(&user("alice")), 0);
    assert_eq!(bob_media.answers_to(&user("alice")), 1);
    assert_eq!(
        alice.peer_states()[&user("bob")].role,
        Some(campfire::peer::Role::Initiator)
    );
}

#[tokio::test(start_paused = true)]
async fn test_three_participants_one_offer_per_pair() {
    let broker = LocalBroker::new();
    let names = ["alice", "bob", "carol"];
    let medias: Vec<LoopbackMedia> = names.iter().map(|_| LoopbackMedia::new()).collect();
    let mut sessions = Vec::new();
    for (name, media) in names.iter().zip(&medias) {
        sessions.push(enter(&broker, name, media).await);
    }

    for (i, session) in sessions.iter().enumerate() {
        let others: Vec<&str> = names
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, n)| *n)
            .collect();
        wait_connected(session, &others).await;
    }

    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            let offers =
                medias[i].offers_to(&user(names[j])) + medias[j].offers_to(&user(names[i]));
            assert_eq!(offers, 1, "{} <-> {}", names[i], names[j]);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_rejoin_gets_fresh_link() {
    let broker = LocalBroker::new();
    let alice_media = LoopbackMedia::new();
    let alice = enter(&broker, "alice", &alice_media).await;
    let bob = enter(&broker, "bob", &LoopbackMedia::new()).await;
    wait_connected(&alice, &["bob"]).await;

    bob.leave().await.unwrap();
    wait_until(alice.watch_peers(), "bob gone", |p| !p.contains_key(&user("bob"))).await;
    assert_eq!(alice_media.closes(&user("bob")), 1);

    let bob = enter(&broker, "bob", &LoopbackMedia::new()).await;
    wait_connected(&alice, &["bob"]).await;
    wait_connected(&bob, &["alice"]).await;

    assert_eq!(alice_media.offers_to(&user("bob")), 2);
}

#[tokio::test(start_paused = true)]
async fn test_offer_for_someone_else_is_ignored() {
    let broker = LocalBroker::new();
    let alice_media = LoopbackMedia::new();
    let alice = enter(&broker, "alice", &alice_media).await;
    let raw = raw_client(&broker).await;

    inject(
        &raw,
        &Signal::Offer {
            sender: user("mallory"),
            target_user: user("zed"),
            data: SessionDescription::offer("v=0\r\n"),
        },
    )
    .await;
    settle().await;

    assert_eq!(alice_media.answers_to(&user("mallory")), 0);
    assert!(!alice.peer_states().contains_key(&user("mallory")));
}

#[tokio::test(start_paused = true)]
async fn test_missing_microphone_still_connects() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::without_audio()).await;
    let bob = enter(&broker, "bob", &LoopbackMedia::new()).await;

    wait_connected(&alice, &["bob"]).await;
    wait_connected(&bob, &["alice"]).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_negotiation_is_isolated() {
    let broker = LocalBroker::new();
    let alice_media = LoopbackMedia::new();
    alice_media.fail_negotiation_with(user("bob"));
    let alice = enter(&broker, "alice", &alice_media).await;
    let _bob = enter(&broker, "bob", &LoopbackMedia::new()).await;
    let _carol = enter(&broker, "carol", &LoopbackMedia::new()).await;

    wait_connected(&alice, &["carol"]).await;
    assert_eq!(alice.peer_states()[&user("bob")].state, PeerState::Failed);

    alice.ignite().await.unwrap();
    assert_eq!(alice.fire_level(), 1);
}

// =========================================================================
// Roster
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_roster_tracks_join_and_drop() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;
    let bob = enter(&broker, "bob", &LoopbackMedia::new()).await;

    wait_until(alice.watch_roster(), "bob listed", |r| r.contains(&user("bob"))).await;
    assert_eq!(alice.roster(), vec![user("alice"), user("bob")]);

    drop(bob);

    wait_until(alice.watch_roster(), "bob removed", |r| !r.contains(&user("bob"))).await;
    wait_until(alice.watch_peers(), "bob's link closed", |p| p.is_empty()).await;
}

#[tokio::test(start_paused = true)]
async fn test_roster_snapshot_replaces_but_keeps_self() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;
    let raw = raw_client(&broker).await;

    inject(
        &raw,
        &Signal::Join {
            sender: user("bob"),
            users: Some(vec![user("bob"), user("carol")]),
        },
    )
    .await;
    settle().await;

    assert_eq!(alice.roster(), vec![user("alice"), user("bob"), user("carol")]);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_dropping_peer_closes_its_link() {
    let broker = LocalBroker::new();
    let alice_media = LoopbackMedia::new();
    let alice = enter(&broker, "alice", &alice_media).await;
    let _bob = enter(&broker, "bob", &LoopbackMedia::new()).await;
    wait_connected(&alice, &["bob"]).await;
    let raw = raw_client(&broker).await;

    inject(
        &raw,
        &Signal::Leave {
            sender: user("carol"),
            users: Some(vec![user("alice")]),
        },
    )
    .await;

    wait_until(alice.watch_peers(), "bob's link closed", |p| p.is_empty()).await;
    assert_eq!(alice.roster(), vec![user("alice")]);
    assert_eq!(alice_media.closes(&user("bob")), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_sender_is_not_a_participant() {
    let broker = LocalBroker::new();
    let alice_media = LoopbackMedia::new();
    let alice = enter(&broker, "alice", &alice_media).await;
    let raw = raw_client(&broker).await;

    raw.publish(
        &RoomName::new(ROOM).signaling_topic(),
        br#"{"type":"join","sender":""}"#,
    )
    .await
    .unwrap();
    settle().await;

    assert_eq!(alice.roster(), vec![user("alice")]);
    assert!(alice.peer_states().is_empty());
    assert_eq!(alice_media.offers_to(&user("")), 0);
}

#[tokio::test(start_paused = true)]
async fn test_roster_fallback_merges_static_source() {
    let broker = LocalBroker::new();
    let alice = RoomSession::builder(ROOM, "alice")
        .roster_source(StaticRoster(vec![user("zoe"), user("yann")]))
        .enter(broker.connect().await, LoopbackMedia::new())
        .await
        .unwrap();

    wait_until(alice.watch_roster(), "fallback merged", |r| r.len() == 3).await;
    assert_eq!(alice.roster(), vec![user("alice"), user("yann"), user("zoe")]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_names_rejected() {
    let broker = LocalBroker::new();

    let err = RoomSession::enter("", "alice", broker.connect().await, LoopbackMedia::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, CampfireError::InvalidConfig(_)));

    let err = RoomSession::enter(ROOM, "", broker.connect().await, LoopbackMedia::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, CampfireError::InvalidConfig(_)));
}

#[tokio::test(start_paused = true)]
async fn test_fire_cap_outside_protocol_range_rejected() {
    let broker = LocalBroker::new();

    for max_level in [0, 11, 15] {
        let err = RoomSession::builder(ROOM, "alice")
            .config(SessionConfig {
                fire: FireConfig {
                    max_level,
                    ..Default::default()
                },
                ..quiet_config()
            })
            .enter(broker.connect().await, LoopbackMedia::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CampfireError::InvalidConfig(_)), "max_level {max_level}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_lower_fire_cap_is_shared_by_peers() {
    let broker = LocalBroker::new();
    let alice = RoomSession::builder(ROOM, "alice")
        .config(SessionConfig {
            fire: FireConfig {
                max_level: 4,
                ..Default::default()
            },
            ..quiet_config()
        })
        .enter(broker.connect().await, LoopbackMedia::new())
        .await
        .unwrap();
    settle().await;
    let bob = enter(&broker, "bob", &LoopbackMedia::new()).await;

    alice.ignite().await.unwrap();
    for _ in 0..10 {
        alice.add_fuel().await.unwrap();
    }

    assert_eq!(alice.fire_level(), 4);
    wait_level(&bob, 4).await;
}

// =========================================================================
// Chat
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_chat_reaches_everyone() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;
    let bob = enter(&broker, "bob", &LoopbackMedia::new()).await;
    let mut bob_chat = bob.chat();
    let mut alice_chat = alice.chat();

    alice.send_chat("marshmallows?").await.unwrap();

    let msg = timeout(WAIT, bob_chat.recv()).await.unwrap().unwrap();
    assert_eq!(msg.sender, user("alice"));
    assert_eq!(msg.content, "marshmallows?");
    assert_eq!(msg.room_id, RoomName::new(ROOM));

    let echo = timeout(WAIT, alice_chat.recv()).await.unwrap().unwrap();
    assert_eq!(echo, msg);
}

// =========================================================================
// Bus lifecycle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_bus_status_is_observable() {
    let broker = LocalBroker::new();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;

    assert_eq!(alice.bus_status(), BusStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resubscribes_and_resyncs() {
    let broker = LocalBroker::new();
    let topic = RoomName::new(ROOM).signaling_topic();
    let alice_bus = Arc::new(broker.connect().await);
    let alice = RoomSession::builder(ROOM, "alice")
        .config(quiet_config())
        .enter(Arc::clone(&alice_bus), LoopbackMedia::new())
        .await
        .unwrap();
    let bob = enter(&broker, "bob", &LoopbackMedia::new()).await;
    wait_connected(&alice, &["bob"]).await;

    alice_bus.interrupt().await;
    settle().await;
    assert_eq!(broker.subscriber_count(&topic).await, 1);

    // Lit while alice was away.
    bob.ignite().await.unwrap();
    settle().await;
    assert_eq!(alice.fire_level(), 0);

    alice_bus.restore();
    wait_level(&alice, 1).await;
    assert_eq!(broker.subscriber_count(&topic).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_leave_closes_session() {
    let broker = LocalBroker::new();
    let topic = RoomName::new(ROOM).signaling_topic();
    let alice = enter(&broker, "alice", &LoopbackMedia::new()).await;
    let bob = enter(&broker, "bob", &LoopbackMedia::new()).await;
    let fire = bob.watch_fire();
    bob.ignite().await.unwrap();

    bob.leave().await.unwrap();

    assert_eq!(fire.borrow().level, 0);
    assert_eq!(broker.subscriber_count(&topic).await, 1);
    wait_until(alice.watch_roster(), "bob removed", |r| r == &vec![user("alice")]).await;
}

#[tokio::test(start_paused = true)]
async fn test_actions_after_bus_close_report_session_closed() {
    let broker = LocalBroker::new();
    let alice_bus = Arc::new(broker.connect().await);
    let alice = RoomSession::builder(ROOM, "alice")
        .config(quiet_config())
        .enter(Arc::clone(&alice_bus), LoopbackMedia::new())
        .await
        .unwrap();
    settle().await;

    alice_bus.disconnect().await.unwrap();
    settle().await;

    let err = alice.ignite().await.unwrap_err();
    assert!(matches!(err, CampfireError::SessionClosed));
}
