use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::RoomEvent;
use crate::room::models::Room;
use crate::room::types::RoomResponse;
use crate::shared::{AppError, AppState, Identity};

use super::connection_manager::ConnectionManager;
use super::messages::{ClientFrame, ServerFrame};
use super::socket::{Connection, FrameHandler};

/// Identity and invite parameters carried on the invite/join link.
///
/// The identity fields come from the already-authenticated caller; the
/// optional `invite` is the opaque token from an invite link and is
/// redeemed exactly once during this request.
#[derive(Debug, Deserialize)]
pub struct JoinQuery {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub contact: String,
    pub invite: Option<String>,
}

/// WebSocket endpoint joining a member to a room
///
/// GET /rooms/{room_id}/ws?user_id=&display_name=&invite=
/// Admission runs before the upgrade so failures surface as plain HTTP
/// errors; disconnecting triggers the same teardown as an explicit leave.
pub async fn room_ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<Uuid>,
    Query(query): Query<JoinQuery>,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    let identity = Identity::new(query.user_id, query.display_name, query.contact);

    info!(
        room_id = %room_id,
        user_id = %identity.user_id,
        via_invite = query.invite.is_some(),
        "WebSocket join requested"
    );

    let room = match &query.invite {
        Some(token) => {
            app_state
                .coordinator
                .join_with_invite(token, &identity)
                .await?
        }
        None => app_state.coordinator.join(room_id, &identity).await?,
    };

    // An invite for some other room does not admit to this one
    if room.id != room_id {
        warn!(
            room_id = %room_id,
            token_room = %room.id,
            "Invite token targets a different room"
        );
        app_state.coordinator.leave(room.id, &identity.user_id).await?;
        return Err(AppError::InvalidToken);
    }

    info!(
        room_id = %room_id,
        user_id = %identity.user_id,
        "Member admitted, establishing WebSocket connection"
    );
    Ok(ws.on_upgrade(move |socket| handle_room_connection(socket, room, identity, app_state)))
}

/// Handle the upgraded WebSocket connection
async fn handle_room_connection(
    socket: axum::extract::ws::WebSocket,
    room: Room,
    identity: Identity,
    app_state: AppState,
) {
    let room_id = room.id;
    let user_id = identity.user_id.clone();

    info!(
        room_id = %room_id,
        user_id = %user_id,
        "WebSocket connection established"
    );

    // Create the outbound queue (room -> client)
    let (outbound_sender, outbound_receiver) = mpsc::unbounded_channel::<String>();

    app_state
        .connection_manager
        .add_connection(room_id, user_id.clone(), outbound_sender.clone())
        .await;

    // Bootstrap snapshot: the room and who is currently present
    let welcome = ServerFrame::Welcome {
        room: RoomResponse::from(&room),
        presence: app_state.coordinator.presence().snapshot(room_id),
    };
    let _ = outbound_sender.send(welcome.encode());

    // Bridge live chat into the socket; no history is replayed unless the
    // client asks for it with an explicit after-sequence
    let (_, mut chat_rx) = app_state.coordinator.chat().subscribe(room_id, None);
    let chat_task = {
        let sender = outbound_sender.clone();
        tokio::spawn(async move {
            loop {
                match chat_rx.recv().await {
                    Ok(message) => {
                        if sender.send(ServerFrame::chat(message).encode()).is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Chat subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    // Bridge room events: presence gets its own frame kind, lifecycle
    // events are forwarded as-is; chat already flows above
    let mut event_rx = app_state.event_bus.subscribe_to_room(room_id).await;
    let event_task = {
        let sender = outbound_sender.clone();
        tokio::spawn(async move {
            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        let frame = match event {
                            RoomEvent::PresenceChanged { user_id, state, .. } => {
                                ServerFrame::presence(user_id, state)
                            }
                            RoomEvent::MessagePosted { .. } | RoomEvent::RoomCreated { .. } => {
                                continue
                            }
                            other => ServerFrame::event(other),
                        };
                        if sender.send(frame.encode()).is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    let frame_handler = Arc::new(GatewayFrameHandler::new(app_state.clone(), identity));

    let connection = Connection::new(
        user_id.clone(),
        room_id,
        Box::new(socket),
        outbound_receiver,
        frame_handler,
    );

    match connection.run().await {
        Ok(()) => {
            info!(
                room_id = %room_id,
                user_id = %user_id,
                "WebSocket connection closed cleanly"
            );
        }
        Err(e) => {
            warn!(
                room_id = %room_id,
                user_id = %user_id,
                error = ?e,
                "WebSocket connection error"
            );
        }
    }

    // Cleanup: stop the bridges, drop the queue, and leave the room -
    // disconnecting has the same effect as an explicit leave
    chat_task.abort();
    event_task.abort();
    app_state
        .connection_manager
        .remove_connection(room_id, &user_id)
        .await;

    if let Err(e) = app_state.coordinator.leave(room_id, &user_id).await {
        warn!(
            room_id = %room_id,
            user_id = %user_id,
            error = %e,
            "Disconnect-triggered leave failed"
        );
    }

    info!(
        room_id = %room_id,
        user_id = %user_id,
        "WebSocket teardown complete"
    );
}

/// Routes parsed client frames into the coordinator
pub struct GatewayFrameHandler {
    app_state: AppState,
    identity: Identity,
}

impl GatewayFrameHandler {
    pub fn new(app_state: AppState, identity: Identity) -> Self {
        Self {
            app_state,
            identity,
        }
    }

    async fn report_error(&self, room_id: Uuid, user_id: &str, error: &AppError) {
        self.app_state
            .connection_manager
            .send_to_member(room_id, user_id, &ServerFrame::error(error.to_string()).encode())
            .await;
    }
}

#[async_trait]
impl FrameHandler for GatewayFrameHandler {
    async fn handle_frame(&self, room_id: Uuid, user_id: &str, raw: String) -> bool {
        let frame = match serde_json::from_str::<ClientFrame>(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    room_id = %room_id,
                    user_id = %user_id,
                    error = %e,
                    "Unparseable client frame"
                );
                self.app_state
                    .connection_manager
                    .send_to_member(
                        room_id,
                        user_id,
                        &ServerFrame::error("unrecognized frame").encode(),
                    )
                    .await;
                return true;
            }
        };

        match frame {
            ClientFrame::Chat { text } => {
                if let Err(e) = self
                    .app_state
                    .coordinator
                    .post_chat(room_id, user_id, &self.identity.display_name, &text)
                    .await
                {
                    self.report_error(room_id, user_id, &e).await;
                }
            }
            ClientFrame::Signal {
                to_user,
                kind,
                payload,
                seq,
            } => {
                if let Err(e) = self
                    .app_state
                    .coordinator
                    .send_signal(room_id, user_id, &to_user, kind, payload, seq)
                {
                    self.report_error(room_id, user_id, &e).await;
                }
            }
            ClientFrame::Heartbeat => {
                self.app_state.coordinator.heartbeat(room_id, user_id).await;
            }
            ClientFrame::EnableVideo => {
                // Renegotiation can take several timeout cycles; never
                // block the socket read loop on it
                let app_state = self.app_state.clone();
                let user_id = user_id.to_string();
                tokio::spawn(async move {
                    if let Err(e) = app_state.coordinator.enable_video(room_id, &user_id).await {
                        app_state
                            .connection_manager
                            .send_to_member(
                                room_id,
                                &user_id,
                                &ServerFrame::error(e.to_string()).encode(),
                            )
                            .await;
                    }
                });
            }
            ClientFrame::DisableVideo => {
                let app_state = self.app_state.clone();
                let user_id = user_id.to_string();
                tokio::spawn(async move {
                    if let Err(e) = app_state.coordinator.disable_video(room_id, &user_id).await {
                        app_state
                            .connection_manager
                            .send_to_member(
                                room_id,
                                &user_id,
                                &ServerFrame::error(e.to_string()).encode(),
                            )
                            .await;
                    }
                });
            }
            ClientFrame::SetMuted { muted } => {
                if let Err(e) = self
                    .app_state
                    .coordinator
                    .set_muted(room_id, user_id, muted)
                    .await
                {
                    self.report_error(room_id, user_id, &e).await;
                }
            }
            ClientFrame::Leave => {
                debug!(room_id = %room_id, user_id = %user_id, "Client asked to leave");
                if let Err(e) = self.app_state.coordinator.leave(room_id, user_id).await {
                    warn!(room_id = %room_id, user_id = %user_id, error = %e, "Leave failed");
                }
                return false;
            }
        }

        true
    }
}
