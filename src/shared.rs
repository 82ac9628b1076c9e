use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::coordinator::RoomCoordinator;
use crate::event::EventBus;
use crate::gateway::ConnectionManager;
use crate::invite::InviteTokenService;
use crate::room::service::RoomService;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RoomCoordinator>,
    pub room_service: Arc<RoomService>,
    pub invite_service: Arc<InviteTokenService>,
    pub connection_manager: Arc<dyn ConnectionManager>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(
        coordinator: Arc<RoomCoordinator>,
        room_service: Arc<RoomService>,
        invite_service: Arc<InviteTokenService>,
        connection_manager: Arc<dyn ConnectionManager>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            coordinator,
            room_service,
            invite_service,
            connection_manager,
            event_bus,
        }
    }
}

/// Identity of an already-authenticated caller.
///
/// Authentication happens upstream (identity provider collaborator);
/// the core only consumes the resolved identity fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub contact_handle: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        contact_handle: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            contact_handle: contact_handle.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid room spec: {0}")]
    InvalidSpec(String),

    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("room is full")]
    RoomFull,

    #[error("invite token is invalid or expired")]
    InvalidToken,

    #[error("invite token has no remaining uses")]
    TokenExhausted,

    #[error("media acquisition failed: {0}")]
    MediaAcquisitionFailed(String),

    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    #[error("negotiation with {0} failed")]
    NegotiationFailed(String),

    #[error("message exceeds {limit} characters")]
    MessageTooLong { limit: usize },

    #[error("internal server error")]
    Internal,
}

/// Fully wired in-memory AppState for unit tests
#[cfg(test)]
pub fn test_state() -> AppState {
    use crate::chat::ChatChannel;
    use crate::config::RoomsConfig;
    use crate::gateway::InMemoryConnectionManager;
    use crate::media::LoopbackMediaBackend;
    use crate::presence::PresenceTracker;
    use crate::room::registry::InMemoryRoomRegistry;
    use crate::room::RoomRegistry;
    use crate::signaling::SignalingChannel;

    let config = RoomsConfig::default();
    let event_bus = EventBus::new();
    let registry: Arc<dyn RoomRegistry> = Arc::new(InMemoryRoomRegistry::new());
    let room_service = Arc::new(RoomService::new(registry.clone(), event_bus.clone()));
    let presence = Arc::new(PresenceTracker::new(
        config.heartbeat_timeout,
        config.reconnect_grace,
        event_bus.clone(),
    ));
    let invite_service = Arc::new(InviteTokenService::new(registry.clone()));
    let signaling = Arc::new(SignalingChannel::new());
    let chat = Arc::new(ChatChannel::new(config.max_message_chars, event_bus.clone()));
    let media_backend = Arc::new(LoopbackMediaBackend::new());

    let coordinator = Arc::new(RoomCoordinator::new(
        registry,
        room_service.clone(),
        presence,
        invite_service.clone(),
        signaling,
        chat,
        media_backend,
        event_bus.clone(),
        config,
    ));

    AppState::new(
        coordinator,
        room_service,
        invite_service,
        Arc::new(InMemoryConnectionManager::new()),
        event_bus,
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidSpec(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::RoomNotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::RoomFull => (StatusCode::CONFLICT, "room is full".to_string()),
            AppError::InvalidToken => (
                StatusCode::GONE,
                "invite token is invalid or expired".to_string(),
            ),
            AppError::TokenExhausted => (
                StatusCode::GONE,
                "invite token has no remaining uses".to_string(),
            ),
            AppError::MessageTooLong { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("message exceeds {} characters", limit),
            ),
            AppError::MediaAcquisitionFailed(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::PeerUnavailable(peer) => (
                StatusCode::CONFLICT,
                format!("peer unavailable: {}", peer),
            ),
            AppError::NegotiationFailed(peer) => (
                StatusCode::BAD_GATEWAY,
                format!("negotiation with {} failed", peer),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
