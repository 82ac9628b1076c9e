use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use viberoom::chat::ChatChannel;
use viberoom::coordinator::RoomCoordinator;
use viberoom::event::EventBus;
use viberoom::gateway::InMemoryConnectionManager;
use viberoom::invite::InviteTokenService;
use viberoom::media::LoopbackMediaBackend;
use viberoom::presence::PresenceTracker;
use viberoom::room::models::{Room, RoomCategory, RoomKind};
use viberoom::room::registry::InMemoryRoomRegistry;
use viberoom::room::service::RoomService;
use viberoom::room::types::CreateRoomRequest;
use viberoom::room::RoomRegistry;
use viberoom::shared::{AppState, Identity};
use viberoom::signaling::SignalingChannel;
use viberoom::RoomsConfig;

/// A fully wired in-memory server for workflow tests
pub struct TestSetup {
    pub state: AppState,
    pub backend: Arc<LoopbackMediaBackend>,
    pub registry: Arc<InMemoryRoomRegistry>,
    pub event_bus: EventBus,
}

pub struct TestSetupBuilder {
    config: RoomsConfig,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        // Short timings so tests never wait on production timeouts
        Self {
            config: RoomsConfig {
                heartbeat_timeout: Duration::from_millis(40),
                reconnect_grace: Duration::from_millis(40),
                sweep_interval: Duration::from_millis(10),
                negotiation_timeout: Duration::from_millis(200),
                negotiation_max_attempts: 2,
                negotiation_backoff: Duration::from_millis(5),
                ..RoomsConfig::default()
            },
        }
    }

    pub fn build(self) -> TestSetup {
        let config = self.config;
        let event_bus = EventBus::new();
        let registry = Arc::new(InMemoryRoomRegistry::new());
        let registry_dyn: Arc<dyn RoomRegistry> = registry.clone();
        let room_service = Arc::new(RoomService::new(registry_dyn.clone(), event_bus.clone()));
        let presence = Arc::new(PresenceTracker::new(
            config.heartbeat_timeout,
            config.reconnect_grace,
            event_bus.clone(),
        ));
        let invite_service = Arc::new(InviteTokenService::new(registry_dyn.clone()));
        let signaling = Arc::new(SignalingChannel::new());
        let chat = Arc::new(ChatChannel::new(config.max_message_chars, event_bus.clone()));
        let backend = Arc::new(LoopbackMediaBackend::new());

        let coordinator = Arc::new(RoomCoordinator::new(
            registry_dyn,
            room_service.clone(),
            presence,
            invite_service.clone(),
            signaling,
            chat,
            backend.clone(),
            event_bus.clone(),
            config,
        ));

        let state = AppState::new(
            coordinator,
            room_service,
            invite_service,
            Arc::new(InMemoryConnectionManager::new()),
            event_bus.clone(),
        );

        TestSetup {
            state,
            backend,
            registry,
            event_bus,
        }
    }
}

impl Default for TestSetupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSetup {
    pub fn identity(user_id: &str) -> Identity {
        Identity::new(user_id, format!("name-{}", user_id), format!("{}@x", user_id))
    }

    /// Creates a room with the given host; the host is admitted but not
    /// yet live-attached
    pub async fn create_room(&self, host: &str, max_participants: u32, is_public: bool) -> Uuid {
        let response = self
            .state
            .coordinator
            .create_room(CreateRoomRequest {
                user_id: host.to_string(),
                display_name: format!("name-{}", host),
                contact_handle: format!("{}@x", host),
                title: format!("{}'s room", host),
                category: RoomCategory::Party,
                kind: RoomKind::Discussion,
                max_participants,
                is_public,
                tags: vec![],
            })
            .await
            .unwrap();
        response.id
    }

    /// Joins a member and waits for spawned negotiations to settle
    pub async fn join(&self, room_id: Uuid, user_id: &str) -> Room {
        let room = self
            .state
            .coordinator
            .join(room_id, &Self::identity(user_id))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        room
    }

    pub async fn room(&self, room_id: Uuid) -> Room {
        self.registry.get(room_id).await.unwrap().unwrap()
    }
}
