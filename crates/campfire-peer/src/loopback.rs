//! In-process media primitive.
//!
//! [`LoopbackMedia`] behaves like a browser peer connection as far as the
//! negotiation contract goes: descriptions must come in a legal order,
//! remote candidates are rejected before a remote description exists, a
//! local candidate is gathered once the local description is set, and
//! connectivity reaches `connected` once both descriptions are in place.
//! No audio moves. Every call is recorded so tests can assert on it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use campfire_protocol::{IceCandidate, SdpKind, SessionDescription, Username};
use rand::Rng;
use tokio::sync::mpsc;

use crate::{
    ConnectivityState, LinkId, MediaConnection, MediaEngine, MediaEvent,
    MediaEventKind, MediaTrack, PeerError,
};

/// One recorded media call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopbackRecord {
    AudioAcquired,
    OfferCreated { remote: Username },
    AnswerCreated { remote: Username },
    RemoteDescriptionSet { remote: Username, kind: SdpKind },
    CandidateApplied { remote: Username, candidate: String },
    Closed { remote: Username },
}

#[derive(Default)]
struct Shared {
    records: Mutex<Vec<LoopbackRecord>>,
    failing: Mutex<HashSet<Username>>,
    no_audio: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle; clones share the same record log.
#[derive(Clone, Default)]
pub struct LoopbackMedia {
    shared: Arc<Shared>,
}

impl LoopbackMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// A participant without a microphone.
    pub fn without_audio() -> Self {
        Self {
            shared: Arc::new(Shared {
                no_audio: true,
                ..Default::default()
            }),
        }
    }

    /// Make every offer or answer toward `remote` fail from now on.
    pub fn fail_negotiation_with(&self, remote: Username) {
        lock(&self.shared.failing).insert(remote);
    }

    pub fn records(&self) -> Vec<LoopbackRecord> {
        lock(&self.shared.records).clone()
    }

    fn count(&self, pred: impl Fn(&LoopbackRecord) -> bool) -> usize {
        lock(&self.shared.records).iter().filter(|r| pred(r)).count()
    }

    pub fn offers_to(&self, remote: &Username) -> usize {
        self.count(|r| matches!(r, LoopbackRecord::OfferCreated { remote: who } if who == remote))
    }

    pub fn answers_to(&self, remote: &Username) -> usize {
        self.count(|r| matches!(r, LoopbackRecord::AnswerCreated { remote: who } if who == remote))
    }

    pub fn remote_descriptions(&self, remote: &Username) -> usize {
        self.count(|r| {
            matches!(r, LoopbackRecord::RemoteDescriptionSet { remote: who, .. } if who == remote)
        })
    }

    pub fn closes(&self, remote: &Username) -> usize {
        self.count(|r| matches!(r, LoopbackRecord::Closed { remote: who } if who == remote))
    }

    /// Remote candidates applied toward `remote`, in order.
    pub fn applied_candidates(&self, remote: &Username) -> Vec<String> {
        lock(&self.shared.records)
            .iter()
            .filter_map(|r| match r {
                LoopbackRecord::CandidateApplied {
                    remote: who,
                    candidate,
                } if who == remote => Some(candidate.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, record: LoopbackRecord) {
        lock(&self.shared.records).push(record);
    }
}

impl MediaEngine for LoopbackMedia {
    type Connection = LoopbackConnection;

    async fn acquire_audio(&self) -> Result<Vec<MediaTrack>, PeerError> {
        if self.shared.no_audio {
            return Err(PeerError::MediaUnavailable("no input device".into()));
        }
        self.record(LoopbackRecord::AudioAcquired);
        Ok(vec![MediaTrack::audio("loopback-mic")])
    }

    fn create_connection(
        &self,
        remote: &Username,
        link: LinkId,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<LoopbackConnection, PeerError> {
        Ok(LoopbackConnection {
            media: self.clone(),
            remote: remote.clone(),
            link,
            events,
            session_id: rand::rng().random_range(1..u32::MAX as u64),
            local: None,
            remote_kind: None,
            tracks: Vec::new(),
            connected: false,
            closed: false,
        })
    }
}

/// One loopback connection toward a single remote.
pub struct LoopbackConnection {
    media: LoopbackMedia,
    remote: Username,
    link: LinkId,
    events: mpsc::UnboundedSender<MediaEvent>,
    session_id: u64,
    local: Option<SdpKind>,
    remote_kind: Option<SdpKind>,
    tracks: Vec<MediaTrack>,
    connected: bool,
    closed: bool,
}

impl LoopbackConnection {
    fn emit(&self, kind: MediaEventKind) {
        // The receiver is gone once the session is torn down.
        let _ = self.events.send(MediaEvent {
            remote: self.remote.clone(),
            link: self.link,
            kind,
        });
    }

    fn check_open(&self) -> Result<(), PeerError> {
        if self.closed {
            return Err(PeerError::media(&self.remote, "connection closed"));
        }
        if lock(&self.media.shared.failing).contains(&self.remote) {
            return Err(PeerError::media(&self.remote, "negotiation refused"));
        }
        Ok(())
    }

    fn sdp(&self) -> String {
        let mut sdp = format!(
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n",
            self.session_id
        );
        for track in &self.tracks {
            sdp.push_str(&format!("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=msid:{}\r\n", track.id));
        }
        sdp
    }

    fn set_local(&mut self, kind: SdpKind) {
        self.local = Some(kind);
        let candidate = IceCandidate {
            candidate: format!(
                "candidate:{} 1 udp 2122260223 127.0.0.1 {} typ host",
                self.session_id % 10_000,
                40_000 + self.link.0 % 20_000
            ),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        };
        self.emit(MediaEventKind::LocalCandidate(candidate));
        self.maybe_connect();
    }

    fn maybe_connect(&mut self) {
        if self.connected || self.local.is_none() || self.remote_kind.is_none() {
            return;
        }
        self.connected = true;
        self.emit(MediaEventKind::Connectivity(ConnectivityState::Checking));
        self.emit(MediaEventKind::Connectivity(ConnectivityState::Connected));
    }
}

impl MediaConnection for LoopbackConnection {
    fn add_track(&mut self, track: &MediaTrack) -> Result<(), PeerError> {
        if self.closed {
            return Err(PeerError::media(&self.remote, "connection closed"));
        }
        self.tracks.push(track.clone());
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, PeerError> {
        self.check_open()?;
        if self.local.is_some() {
            return Err(PeerError::media(&self.remote, "local description already set"));
        }
        let offer = SessionDescription::offer(self.sdp());
        self.media.record(LoopbackRecord::OfferCreated {
            remote: self.remote.clone(),
        });
        self.set_local(SdpKind::Offer);
        Ok(offer)
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, PeerError> {
        self.check_open()?;
        if self.remote_kind != Some(SdpKind::Offer) {
            return Err(PeerError::media(&self.remote, "no remote offer to answer"));
        }
        let answer = SessionDescription::answer(self.sdp());
        self.media.record(LoopbackRecord::AnswerCreated {
            remote: self.remote.clone(),
        });
        self.set_local(SdpKind::Answer);
        Ok(answer)
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), PeerError> {
        if self.closed {
            return Err(PeerError::media(&self.remote, "connection closed"));
        }
        let legal = match description.kind {
            SdpKind::Offer => self.local.is_none(),
            SdpKind::Answer => self.local == Some(SdpKind::Offer),
        };
        if !legal || self.remote_kind.is_some() {
            return Err(PeerError::media(&self.remote, "description out of order"));
        }

        self.remote_kind = Some(description.kind);
        self.media.record(LoopbackRecord::RemoteDescriptionSet {
            remote: self.remote.clone(),
            kind: description.kind,
        });
        if description.sdp.contains("m=audio") {
            let id = format!("{}-audio", self.remote);
            self.emit(MediaEventKind::RemoteTrack(MediaTrack::audio(id)));
        }
        self.maybe_connect();
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), PeerError> {
        if self.closed {
            return Err(PeerError::media(&self.remote, "connection closed"));
        }
        if self.remote_kind.is_none() {
            return Err(PeerError::media(&self.remote, "remote description not set"));
        }
        self.media.record(LoopbackRecord::CandidateApplied {
            remote: self.remote.clone(),
            candidate: candidate.candidate,
        });
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.media.record(LoopbackRecord::Closed {
                remote: self.remote.clone(),
            });
        }
    }
}
