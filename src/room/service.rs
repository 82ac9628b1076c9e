use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    models::Room,
    registry::RoomRegistry,
    types::{CreateRoomRequest, RoomResponse},
};
use crate::event::{EventBus, RoomEvent};
use crate::shared::AppError;

/// Service for room creation and listing
pub struct RoomService {
    registry: Arc<dyn RoomRegistry>,
    event_bus: EventBus,
}

impl RoomService {
    pub fn new(registry: Arc<dyn RoomRegistry>, event_bus: EventBus) -> Self {
        Self {
            registry,
            event_bus,
        }
    }

    /// Creates a new room; the host is admitted as the first member
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<RoomResponse, AppError> {
        let spec = request.spec();
        spec.validate()?;

        let host = request.identity();
        let room = Room::new(&spec, &host);
        debug!(room_id = %room.id, "Generated room id");

        self.registry.create(&room).await?;

        self.event_bus
            .emit_to_room(
                room.id,
                RoomEvent::RoomCreated {
                    room_id: room.id,
                    host_id: room.host_id.clone(),
                    title: room.title.clone(),
                },
            )
            .await;

        info!(
            room_id = %room.id,
            host_id = %room.host_id,
            max_participants = room.max_participants,
            "Room created successfully"
        );

        Ok(RoomResponse::from(&room))
    }

    /// Gets the full room model for internal use (gateway, coordinator)
    #[instrument(skip(self))]
    pub async fn get_room(&self, room_id: Uuid) -> Result<Option<Room>, AppError> {
        self.registry.get(room_id).await
    }

    /// Lists public active rooms, most recently active first
    #[instrument(skip(self))]
    pub async fn list_rooms(
        &self,
        category: Option<crate::room::models::RoomCategory>,
    ) -> Result<Vec<RoomResponse>, AppError> {
        let rooms = self.registry.list(category).await?;

        info!(room_count = rooms.len(), "Rooms retrieved successfully");

        Ok(rooms.iter().map(RoomResponse::from).collect())
    }
}
