mod chat;
mod config;
mod coordinator;
mod event;
mod gateway;
mod invite;
mod media;
mod presence;
mod room;
mod shared;
mod signaling;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat::ChatChannel;
use config::RoomsConfig;
use coordinator::RoomCoordinator;
use event::EventBus;
use gateway::InMemoryConnectionManager;
use invite::InviteTokenService;
use media::LoopbackMediaBackend;
use presence::PresenceTracker;
use room::registry::InMemoryRoomRegistry;
use room::service::RoomService;
use room::RoomRegistry;
use shared::AppState;
use signaling::SignalingChannel;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "viberoom=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vibe room server");

    let config = RoomsConfig::default();
    let event_bus = EventBus::new();

    // Wire the in-memory components. Rooms are ephemeral; a durable
    // registry would slot in behind the RoomRegistry trait.
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

    // The loopback backend stands in for the platform media layer
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

    // Background presence sweeper: demotes silent members and purges
    // long-inactive rooms
    coordinator.spawn_presence_sweeper();

    let app_state = AppState::new(
        coordinator,
        room_service,
        invite_service,
        Arc::new(InMemoryConnectionManager::new()),
        event_bus,
    );

    let app = Router::new()
        .route("/rooms", get(room::list_rooms).post(room::create_room))
        .route("/rooms/:room_id/invites", post(invite::issue_invite))
        .route("/rooms/:room_id/ws", get(gateway::room_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    info!("Server running on http://localhost:3000");
    axum::serve(listener, app).await.unwrap();
}
