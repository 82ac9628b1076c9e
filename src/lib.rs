// Library crate for the vibe room service
// This file exposes the public API for integration tests

pub mod chat;
pub mod config;
pub mod coordinator;
pub mod event;
pub mod gateway;
pub mod invite;
pub mod media;
pub mod presence;
pub mod room;
pub mod shared;
pub mod signaling;

// Re-export commonly used types for easier access in tests
pub use chat::{ChatChannel, ChatMessage};
pub use config::RoomsConfig;
pub use coordinator::RoomCoordinator;
pub use event::{EventBus, RoomEvent};
pub use gateway::{
    ClientFrame, ConnectionManager, GatewayFrameHandler, InMemoryConnectionManager, ServerFrame,
};
pub use invite::InviteTokenService;
pub use media::{LoopbackMediaBackend, MediaBackend, MediaKind, MediaSessionManager};
pub use presence::{ConnectionState, PresenceTracker};
pub use room::{InMemoryRoomRegistry, JoinOutcome, LeaveOutcome, RoomRegistry};
pub use shared::{AppError, AppState, Identity};
pub use signaling::{SignalKind, SignalingChannel, SignalingMessage};
