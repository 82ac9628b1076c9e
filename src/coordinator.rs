use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::chat::{ChatChannel, ChatMessage};
use crate::config::RoomsConfig;
use crate::event::{EventBus, RoomEvent};
use crate::invite::InviteTokenService;
use crate::media::{MediaBackend, MediaKind, MediaSessionManager};
use crate::presence::PresenceTracker;
use crate::room::models::Room;
use crate::room::service::RoomService;
use crate::room::types::{CreateRoomRequest, RoomResponse};
use crate::room::{JoinOutcome, LeaveOutcome, RoomRegistry};
use crate::shared::{AppError, Identity};
use crate::signaling::{SignalKind, SignalingChannel, SignalingMessage};

/// The façade gluing the room subsystem together.
///
/// Accepts create/join/leave requests, supervises each member's media
/// session, and fans presence and chat events out through the room bus.
/// Rooms are independent units of concurrency: mutations within a room
/// are serialized by the registry and chat sequencers, while cross-room
/// traffic proceeds in parallel.
pub struct RoomCoordinator {
    registry: Arc<dyn RoomRegistry>,
    room_service: Arc<RoomService>,
    presence: Arc<PresenceTracker>,
    invites: Arc<InviteTokenService>,
    signaling: Arc<SignalingChannel>,
    chat: Arc<ChatChannel>,
    media_backend: Arc<dyn MediaBackend>,
    event_bus: EventBus,
    config: RoomsConfig,
    /// Live media managers, one per attached (room, member)
    sessions: RwLock<HashMap<(Uuid, String), Arc<MediaSessionManager>>>,
}

impl RoomCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn RoomRegistry>,
        room_service: Arc<RoomService>,
        presence: Arc<PresenceTracker>,
        invites: Arc<InviteTokenService>,
        signaling: Arc<SignalingChannel>,
        chat: Arc<ChatChannel>,
        media_backend: Arc<dyn MediaBackend>,
        event_bus: EventBus,
        config: RoomsConfig,
    ) -> Self {
        Self {
            registry,
            room_service,
            presence,
            invites,
            signaling,
            chat,
            media_backend,
            event_bus,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn chat(&self) -> &ChatChannel {
        &self.chat
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Creates a room; the caller becomes host and first member. Live
    /// resources (presence, media) attach when the host connects.
    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<RoomResponse, AppError> {
        self.room_service.create_room(request).await
    }

    /// Admits a member to a public room and attaches live resources
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn join(&self, room_id: Uuid, identity: &Identity) -> Result<Room, AppError> {
        let outcome = self.registry.try_join(room_id, identity, false).await?;
        self.complete_join(room_id, identity, outcome).await
    }

    /// Redeems an invite token and attaches live resources. Redemption
    /// and admission are one atomic unit inside the invite service.
    #[instrument(skip(self, token, identity), fields(user_id = %identity.user_id))]
    pub async fn join_with_invite(
        &self,
        token: &str,
        identity: &Identity,
    ) -> Result<Room, AppError> {
        let outcome = self.invites.redeem(token, identity).await?;
        let room_id = match &outcome {
            JoinOutcome::Joined { room, .. } | JoinOutcome::AlreadyMember { room, .. } => room.id,
            // The invite service surfaces these as errors already
            _ => return Err(AppError::InvalidToken),
        };
        self.complete_join(room_id, identity, outcome).await
    }

    async fn complete_join(
        &self,
        room_id: Uuid,
        identity: &Identity,
        outcome: JoinOutcome,
    ) -> Result<Room, AppError> {
        let room = match outcome {
            JoinOutcome::Joined { room, .. } | JoinOutcome::AlreadyMember { room, .. } => room,
            JoinOutcome::RoomFull => return Err(AppError::RoomFull),
            JoinOutcome::RoomNotFound => {
                return Err(AppError::RoomNotFound(room_id.to_string()))
            }
        };

        self.attach_member(&room, identity).await;

        self.event_bus
            .emit_to_room(
                room.id,
                RoomEvent::MemberJoined {
                    room_id: room.id,
                    user_id: identity.user_id.clone(),
                    display_name: identity.display_name.clone(),
                    member_count: room.member_count(),
                },
            )
            .await;

        Ok(room)
    }

    /// Wires presence, signaling and a media session for an admitted
    /// member. Local audio starts immediately; failure to acquire it is
    /// non-fatal. Each existing connected member gets exactly one
    /// pairwise negotiation (full mesh).
    async fn attach_member(&self, room: &Room, identity: &Identity) {
        let user_id = identity.user_id.clone();

        self.presence.mark_joining(room.id, &user_id).await;

        // A stale session from a previous connection is torn down first
        // so its devices cannot leak
        let stale = self
            .sessions
            .write()
            .await
            .remove(&(room.id, user_id.clone()));
        if let Some(old) = stale {
            warn!(room_id = %room.id, user_id = %user_id, "Replacing stale media session");
            old.teardown().await;
        }

        let rx = self.signaling.subscribe(room.id, &user_id);
        let manager = Arc::new(MediaSessionManager::new(
            room.id,
            user_id.clone(),
            Arc::clone(&self.media_backend),
            Arc::clone(&self.signaling),
            self.config.clone(),
        ));

        // Audio-only members keep functioning when the device is denied
        if let Err(e) = manager.start_local_media(MediaKind::Audio).await {
            warn!(
                room_id = %room.id,
                user_id = %user_id,
                error = %e,
                "Joining without local audio"
            );
        }

        tokio::spawn(Arc::clone(&manager).run(rx));

        // Full mesh: one negotiation per existing connected member, run
        // off the join path so long handshakes never block admission
        let peers: Vec<String> = self
            .presence
            .connected_members(room.id)
            .into_iter()
            .filter(|peer| peer != &user_id)
            .collect();
        for peer in peers {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                if let Err(e) = manager.negotiate_with(&peer).await {
                    warn!(peer = %peer, error = %e, "Pairwise negotiation abandoned");
                }
            });
        }

        self.sessions
            .write()
            .await
            .insert((room.id, user_id.clone()), manager);

        self.presence.mark_connected(room.id, &user_id).await;

        if let Err(e) = self.registry.touch(room.id).await {
            debug!(room_id = %room.id, error = %e, "Activity touch failed");
        }

        info!(
            room_id = %room.id,
            user_id = %user_id,
            member_count = room.member_count(),
            "Member attached"
        );
    }

    /// The single cancellation path: releases the member's media devices,
    /// closes peer sessions, unsubscribes signaling, drops presence and
    /// removes the membership, in that order. Idempotent, and every step
    /// runs even if an earlier one fails.
    #[instrument(skip(self))]
    pub async fn leave(&self, room_id: Uuid, user_id: &str) -> Result<(), AppError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&(room_id, user_id.to_string()));
        if let Some(manager) = session {
            manager.teardown().await;
        }

        self.signaling.unsubscribe(room_id, user_id);
        self.presence.mark_left(room_id, user_id).await;

        match self.registry.leave(room_id, user_id).await {
            Ok(LeaveOutcome::Left {
                room,
                new_host,
                deactivated,
            }) => {
                if let Some(new_host_id) = new_host {
                    self.event_bus
                        .emit_to_room(
                            room_id,
                            RoomEvent::HostChanged {
                                room_id,
                                new_host_id,
                            },
                        )
                        .await;
                }

                if deactivated {
                    // Chat history does not outlive the room
                    self.chat.clear_room(room_id);
                    self.event_bus
                        .emit_to_room(room_id, RoomEvent::RoomDeactivated { room_id })
                        .await;
                }

                self.event_bus
                    .emit_to_room(
                        room_id,
                        RoomEvent::MemberLeft {
                            room_id,
                            user_id: user_id.to_string(),
                            member_count: room.member_count(),
                        },
                    )
                    .await;
            }
            Ok(LeaveOutcome::NotAMember) | Ok(LeaveOutcome::RoomNotFound) => {
                debug!(room_id = %room_id, user_id = %user_id, "Leave was a no-op");
            }
            Err(e) => {
                // Local resources are already released; membership removal
                // is retried by the presence sweeper if the member lingers
                error!(room_id = %room_id, user_id = %user_id, error = %e, "Registry leave failed");
            }
        }

        Ok(())
    }

    /// Posts a chat message; the room sequencer assigns its order
    pub async fn post_chat(
        &self,
        room_id: Uuid,
        user_id: &str,
        display_name: &str,
        text: &str,
    ) -> Result<ChatMessage, AppError> {
        let message = self.chat.post(room_id, user_id, display_name, text).await?;
        if let Err(e) = self.registry.touch(room_id).await {
            debug!(room_id = %room_id, error = %e, "Activity touch failed");
        }
        Ok(message)
    }

    /// Relays a session-negotiation message between two members
    pub fn send_signal(
        &self,
        room_id: Uuid,
        from_user: &str,
        to_user: &str,
        kind: SignalKind,
        payload: String,
        seq: u64,
    ) -> Result<(), AppError> {
        self.signaling.send(SignalingMessage::new(
            room_id, from_user, to_user, kind, payload, seq,
        ))
    }

    /// Resets the member's liveness timer
    pub async fn heartbeat(&self, room_id: Uuid, user_id: &str) {
        self.presence.heartbeat(room_id, user_id).await;
    }

    pub async fn enable_video(&self, room_id: Uuid, user_id: &str) -> Result<(), AppError> {
        self.media_session(room_id, user_id)
            .await
            .ok_or_else(|| AppError::PeerUnavailable(user_id.to_string()))?
            .enable_video()
            .await
    }

    pub async fn disable_video(&self, room_id: Uuid, user_id: &str) -> Result<(), AppError> {
        self.media_session(room_id, user_id)
            .await
            .ok_or_else(|| AppError::PeerUnavailable(user_id.to_string()))?
            .disable_video()
            .await
    }

    pub async fn set_muted(&self, room_id: Uuid, user_id: &str, muted: bool) -> Result<(), AppError> {
        self.media_session(room_id, user_id)
            .await
            .ok_or_else(|| AppError::PeerUnavailable(user_id.to_string()))?
            .set_muted(muted)
            .await;
        Ok(())
    }

    /// The live media manager for a member, if attached
    pub async fn media_session(
        &self,
        room_id: Uuid,
        user_id: &str,
    ) -> Option<Arc<MediaSessionManager>> {
        self.sessions
            .read()
            .await
            .get(&(room_id, user_id.to_string()))
            .cloned()
    }

    /// Starts the background task that demotes silent members, funnels
    /// expirations through the normal leave path and purges long-inactive
    /// rooms
    pub fn spawn_presence_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);

        info!(
            sweep_interval_ms = coordinator.config.sweep_interval.as_millis() as u64,
            heartbeat_timeout_secs = coordinator.config.heartbeat_timeout.as_secs(),
            "Starting presence sweeper"
        );

        tokio::spawn(async move {
            let mut ticker = interval(coordinator.config.sweep_interval);

            loop {
                ticker.tick().await;

                let expired = coordinator.presence.sweep().await;
                for (room_id, user_id) in expired {
                    info!(
                        room_id = %room_id,
                        user_id = %user_id,
                        "Presence timeout, leaving room"
                    );
                    if let Err(e) = coordinator.leave(room_id, &user_id).await {
                        error!(
                            room_id = %room_id,
                            user_id = %user_id,
                            error = %e,
                            "Timeout-triggered leave failed"
                        );
                    }
                }

                match coordinator
                    .registry
                    .purge_inactive(coordinator.config.room_retention)
                    .await
                {
                    Ok(purged) => {
                        for room_id in purged {
                            coordinator.event_bus.drop_room(room_id).await;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Inactive room purge failed");
                    }
                }
            }
        })
    }
}
