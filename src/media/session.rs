use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::backend::{CaptureHandle, MediaBackend, MediaKind};
use crate::config::RoomsConfig;
use crate::shared::AppError;
use crate::signaling::{SignalKind, SignalingChannel, SignalingMessage};

/// Consecutive `PeerUnavailable` failures tolerated before the whole
/// member session is torn down
const UNAVAILABLE_STRIKE_LIMIT: u32 = 3;

/// Overall phase of a member's media state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPhase {
    Idle,
    AcquiringLocalMedia,
    Negotiating,
    Connected,
    Renegotiating,
    Closed,
}

/// State of one pairwise session with a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerSessionState {
    Negotiating,
    Connected,
    Renegotiating,
}

#[derive(Debug)]
struct PeerSession {
    state: PeerSessionState,
    has_video: bool,
}

struct MediaState {
    phase: MediaPhase,
    audio: Option<CaptureHandle>,
    video: Option<CaptureHandle>,
    muted: bool,
    peers: HashMap<String, PeerSession>,
    /// Handshakes waiting for an answer from a peer
    pending_answers: HashMap<String, oneshot::Sender<String>>,
    /// Outgoing sequence counter per pair
    next_seq: HashMap<String, u64>,
    unavailable_strikes: u32,
}

impl MediaState {
    fn take_seq(&mut self, peer: &str) -> u64 {
        let counter = self.next_seq.entry(peer.to_string()).or_insert(0);
        let seq = *counter;
        *counter += 1;
        seq
    }
}

/// Per-member state machine driving local media acquisition, peer
/// session establishment and renegotiation.
///
/// One manager exists per (room, member), created on join and torn down
/// on leave. The room is a full mesh: each joiner negotiates exactly one
/// pairwise session with every existing connected member. The mesh cost
/// grows quadratically, which is what the participant cap bounds.
///
/// Local capture devices are exclusively owned here; no other component
/// acquires or releases them.
pub struct MediaSessionManager {
    room_id: Uuid,
    user_id: String,
    backend: Arc<dyn MediaBackend>,
    signaling: Arc<SignalingChannel>,
    config: RoomsConfig,
    state: Mutex<MediaState>,
}

impl MediaSessionManager {
    pub fn new(
        room_id: Uuid,
        user_id: impl Into<String>,
        backend: Arc<dyn MediaBackend>,
        signaling: Arc<SignalingChannel>,
        config: RoomsConfig,
    ) -> Self {
        Self {
            room_id,
            user_id: user_id.into(),
            backend,
            signaling,
            config,
            state: Mutex::new(MediaState {
                phase: MediaPhase::Idle,
                audio: None,
                video: None,
                muted: false,
                peers: HashMap::new(),
                pending_answers: HashMap::new(),
                next_seq: HashMap::new(),
                unavailable_strikes: 0,
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Acquires a local capture device. Failure is non-fatal and leaves
    /// already-acquired tracks untouched; an audio-only member keeps
    /// functioning without video.
    #[instrument(skip(self), fields(room_id = %self.room_id, user_id = %self.user_id))]
    pub async fn start_local_media(&self, kind: MediaKind) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if state.phase == MediaPhase::Closed {
            return Err(AppError::Internal);
        }

        let already_held = match kind {
            MediaKind::Audio => state.audio.is_some(),
            MediaKind::Video => state.video.is_some(),
        };
        if already_held {
            return Ok(());
        }

        let previous_phase = state.phase;
        state.phase = MediaPhase::AcquiringLocalMedia;

        let acquired = self.backend.acquire(kind).await;
        state.phase = previous_phase;

        match acquired {
            Ok(handle) => {
                match kind {
                    MediaKind::Audio => state.audio = Some(handle),
                    MediaKind::Video => state.video = Some(handle),
                }
                debug!(kind = %kind, "Local media ready");
                Ok(())
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Local media acquisition failed");
                Err(e)
            }
        }
    }

    /// Local-only mute: the track is disabled, not removed, so no
    /// renegotiation happens
    pub async fn set_muted(&self, muted: bool) {
        let mut state = self.state.lock().await;
        state.muted = muted;
        debug!(
            room_id = %self.room_id,
            user_id = %self.user_id,
            muted,
            "Mute toggled"
        );
    }

    /// Adds the video track and renegotiates every active peer session.
    /// Audio continues uninterrupted: the handshake replaces the session
    /// description without touching the audio capture.
    #[instrument(skip(self), fields(room_id = %self.room_id, user_id = %self.user_id))]
    pub async fn enable_video(&self) -> Result<(), AppError> {
        {
            let state = self.state.lock().await;
            if state.video.is_some() {
                return Ok(());
            }
        }

        self.start_local_media(MediaKind::Video).await?;
        self.renegotiate_all(true).await;
        Ok(())
    }

    /// Removes the video track and renegotiates every active peer session
    #[instrument(skip(self), fields(room_id = %self.room_id, user_id = %self.user_id))]
    pub async fn disable_video(&self) -> Result<(), AppError> {
        let video = {
            let mut state = self.state.lock().await;
            state.video.take()
        };

        let Some(handle) = video else {
            return Ok(());
        };
        self.backend.release(handle).await;
        self.renegotiate_all(false).await;
        Ok(())
    }

    /// Runs an offer/answer handshake with a newly seen member.
    /// Called once per existing connected member when this member joins.
    pub async fn negotiate_with(&self, peer: &str) -> Result<(), AppError> {
        let with_video = {
            let state = self.state.lock().await;
            state.video.is_some()
        };
        self.handshake(peer, with_video, false).await
    }

    /// Renegotiates every current peer; a pair that fails is closed on
    /// its own and the rest proceed
    async fn renegotiate_all(&self, with_video: bool) {
        let peers: Vec<String> = {
            let state = self.state.lock().await;
            state.peers.keys().cloned().collect()
        };

        for peer in peers {
            if let Err(e) = self.handshake(&peer, with_video, true).await {
                warn!(
                    room_id = %self.room_id,
                    user_id = %self.user_id,
                    peer = %peer,
                    error = %e,
                    "Renegotiation failed, pair closed"
                );
            }
        }
    }

    /// One bounded-retry offer/answer cycle with a single peer
    async fn handshake(
        &self,
        peer: &str,
        with_video: bool,
        renegotiating: bool,
    ) -> Result<(), AppError> {
        for attempt in 0..self.config.negotiation_max_attempts {
            let (tx, rx) = oneshot::channel();
            let seq = {
                let mut state = self.state.lock().await;
                if state.phase == MediaPhase::Closed {
                    return Err(AppError::NegotiationFailed(peer.to_string()));
                }

                let session = state.peers.entry(peer.to_string()).or_insert(PeerSession {
                    state: PeerSessionState::Negotiating,
                    has_video: false,
                });
                session.state = if renegotiating {
                    PeerSessionState::Renegotiating
                } else {
                    PeerSessionState::Negotiating
                };
                state.phase = if renegotiating {
                    MediaPhase::Renegotiating
                } else {
                    MediaPhase::Negotiating
                };
                state.pending_answers.insert(peer.to_string(), tx);
                state.take_seq(peer)
            };

            let offer = self.backend.create_offer(with_video).await?;
            let message = SignalingMessage::new(
                self.room_id,
                self.user_id.clone(),
                peer,
                SignalKind::Offer,
                offer,
                seq,
            );

            if let Err(e) = self.signaling.send(message) {
                if matches!(e, AppError::PeerUnavailable(_)) {
                    // The peer already left; abandon this pair, don't retry
                    self.close_peer(peer).await;
                    self.record_unavailable().await;
                }
                return Err(e);
            }

            match timeout(self.config.negotiation_timeout, rx).await {
                Ok(Ok(answer)) => match self.backend.apply_answer(&answer).await {
                    Ok(()) => {
                        let mut state = self.state.lock().await;
                        if let Some(session) = state.peers.get_mut(peer) {
                            session.state = PeerSessionState::Connected;
                            session.has_video = with_video;
                        }
                        state.phase = MediaPhase::Connected;
                        state.unavailable_strikes = 0;
                        info!(
                            room_id = %self.room_id,
                            user_id = %self.user_id,
                            peer = %peer,
                            with_video,
                            "Pairwise session established"
                        );
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(peer = %peer, error = %e, attempt, "Answer rejected");
                    }
                },
                _ => {
                    warn!(
                        room_id = %self.room_id,
                        user_id = %self.user_id,
                        peer = %peer,
                        attempt,
                        "No answer within negotiation timeout"
                    );
                }
            }

            // Exponential backoff before the next attempt
            let backoff = self.config.negotiation_backoff * 2u32.pow(attempt);
            tokio::time::sleep(backoff).await;
        }

        // Retries exhausted: this pair is closed, other peers unaffected
        self.close_peer(peer).await;
        Err(AppError::NegotiationFailed(peer.to_string()))
    }

    /// Consumes the member's signaling subscription, answering offers and
    /// routing answers back into in-flight handshakes. Runs as an
    /// independent task so negotiation never blocks room serializers.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<SignalingMessage>) {
        debug!(
            room_id = %self.room_id,
            user_id = %self.user_id,
            "Media session task started"
        );

        while let Some(message) = rx.recv().await {
            match message.kind {
                SignalKind::Offer => self.answer_offer(&message).await,
                SignalKind::Answer => {
                    let pending = {
                        let mut state = self.state.lock().await;
                        state.pending_answers.remove(&message.from_user)
                    };
                    match pending {
                        Some(tx) => {
                            let _ = tx.send(message.payload);
                        }
                        None => {
                            debug!(
                                from = %message.from_user,
                                "Answer with no handshake in flight"
                            );
                        }
                    }
                }
                SignalKind::Candidate => {
                    // Transport candidates are applied by the platform
                    // media layer; nothing to track here
                    debug!(from = %message.from_user, "Candidate relayed");
                }
            }
        }

        debug!(
            room_id = %self.room_id,
            user_id = %self.user_id,
            "Media session task ended"
        );
    }

    /// Answers an incoming offer and marks the pair connected on this side
    async fn answer_offer(&self, message: &SignalingMessage) {
        let answer = match self.backend.create_answer(&message.payload).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(from = %message.from_user, error = %e, "Could not answer offer");
                return;
            }
        };

        let seq = {
            let mut state = self.state.lock().await;
            if state.phase == MediaPhase::Closed {
                return;
            }
            let session = state
                .peers
                .entry(message.from_user.clone())
                .or_insert(PeerSession {
                    state: PeerSessionState::Negotiating,
                    has_video: false,
                });
            session.state = PeerSessionState::Connected;
            state.phase = MediaPhase::Connected;
            state.take_seq(&message.from_user)
        };

        let reply = SignalingMessage::new(
            self.room_id,
            self.user_id.clone(),
            message.from_user.clone(),
            SignalKind::Answer,
            answer,
            seq,
        );

        if let Err(e) = self.signaling.send(reply) {
            warn!(peer = %message.from_user, error = %e, "Could not deliver answer");
            if matches!(e, AppError::PeerUnavailable(_)) {
                self.close_peer(&message.from_user).await;
                self.record_unavailable().await;
            }
        }
    }

    /// Closes one pairwise session; the rest of the room is unaffected
    pub async fn close_peer(&self, peer: &str) {
        let mut state = self.state.lock().await;
        state.peers.remove(peer);
        state.pending_answers.remove(peer);
        debug!(
            room_id = %self.room_id,
            user_id = %self.user_id,
            peer = %peer,
            "Pairwise session closed"
        );
    }

    async fn record_unavailable(&self) {
        let strikes = {
            let mut state = self.state.lock().await;
            state.unavailable_strikes += 1;
            state.unavailable_strikes
        };
        if strikes >= UNAVAILABLE_STRIKE_LIMIT {
            warn!(
                room_id = %self.room_id,
                user_id = %self.user_id,
                strikes,
                "Repeated peer unavailability, tearing down"
            );
            self.teardown().await;
        }
    }

    /// Releases all local capture devices and closes all peer sessions.
    /// Idempotent; invoked on leave, on repeated peer unavailability, and
    /// safe to call again after either.
    #[instrument(skip(self), fields(room_id = %self.room_id, user_id = %self.user_id))]
    pub async fn teardown(&self) {
        let (audio, video) = {
            let mut state = self.state.lock().await;
            if state.phase == MediaPhase::Closed {
                return;
            }
            state.phase = MediaPhase::Closed;
            state.peers.clear();
            state.pending_answers.clear();
            (state.audio.take(), state.video.take())
        };

        if let Some(handle) = audio {
            self.backend.release(handle).await;
        }
        if let Some(handle) = video {
            self.backend.release(handle).await;
        }

        info!("Media session torn down");
    }

    // --- inspection helpers -------------------------------------------------

    pub async fn phase(&self) -> MediaPhase {
        self.state.lock().await.phase
    }

    pub async fn peer_count(&self) -> usize {
        self.state.lock().await.peers.len()
    }

    pub async fn peer_state(&self, peer: &str) -> Option<PeerSessionState> {
        self.state.lock().await.peers.get(peer).map(|p| p.state)
    }

    pub async fn peer_has_video(&self, peer: &str) -> Option<bool> {
        self.state.lock().await.peers.get(peer).map(|p| p.has_video)
    }

    pub async fn audio_handle(&self) -> Option<CaptureHandle> {
        self.state.lock().await.audio
    }

    pub async fn has_video(&self) -> bool {
        self.state.lock().await.video.is_some()
    }

    pub async fn is_muted(&self) -> bool {
        self.state.lock().await.muted
    }
}
