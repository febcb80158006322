use std::time::Duration;

use campfire::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// A short evening around the fire
// ---------------------------------------------------------------------------

const PARTICIPANTS: [&str; 3] = ["alice", "bob", "carol"];

fn config() -> SessionConfig {
    SessionConfig {
        // Burn fast enough to watch a level drop.
        fire: FireConfig {
            burn_ticks: 3,
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn enter_all(broker: &LocalBroker, room: &str) -> Result<Vec<RoomSession>, CampfireError> {
    let mut sessions = Vec::new();
    for name in PARTICIPANTS {
        let session = RoomSession::builder(room, name)
            .config(config())
            .roster_source(StaticRoster(vec![Username::new("ranger")]))
            .enter(broker.connect().await, LoopbackMedia::new())
            .await?;
        sessions.push(session);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(sessions)
}

fn report(sessions: &[RoomSession]) {
    for s in sessions {
        let peers: Vec<String> = s
            .peer_states()
            .iter()
            .map(|(who, status)| format!("{who}:{}", status.state))
            .collect();
        let fire = s.fire();
        info!(
            user = %s.user(),
            level = fire.level,
            countdown = fire.countdown,
            roster = ?s.roster(),
            peers = ?peers,
            "state"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let room = std::env::var("CAMPFIRE_ROOM").unwrap_or_else(|_| "lakeside".to_string());
    info!(%room, "lighting up a room");

    let broker = LocalBroker::new();
    let sessions = enter_all(&broker, &room).await?;
    let [alice, bob, carol] = &sessions[..] else {
        return Err("expected three participants".into());
    };

    let mut chat = carol.chat();
    alice.ignite().await?;
    bob.add_fuel().await?;
    carol.add_fuel().await?;
    alice.send_chat("who brought marshmallows?").await?;

    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(msg) = chat.try_recv() {
        info!(from = %msg.sender, text = %msg.content, "chat");
    }
    report(&sessions);

    info!("letting the fire burn down a little");
    tokio::time::sleep(Duration::from_secs(4)).await;
    report(&sessions);

    for session in sessions {
        let user = session.user().clone();
        session.leave().await?;
        info!(%user, "left");
    }
    Ok(())
}
