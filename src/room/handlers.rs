use axum::{
    extract::{Query, State},
    Json,
};
use tracing::{info, instrument};

use super::types::{CreateRoomRequest, ListRoomsQuery, RoomResponse};
use crate::shared::{AppError, AppState};

/// HTTP handler for creating a new room
///
/// POST /rooms
/// Returns room information with generated id; the caller becomes host
#[instrument(name = "create_room", skip(state, request))]
pub async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    info!(user_id = %request.user_id, title = %request.title, "Creating new room");

    let room = state.coordinator.create_room(request).await?;

    info!(
        room_id = %room.id,
        host_id = %room.host_id,
        "Room created successfully"
    );

    Ok(Json(room))
}

/// HTTP handler for listing public active rooms
///
/// GET /rooms?category=party
/// Sorted most recently active first
#[instrument(name = "list_rooms", skip(state))]
pub async fn list_rooms(
    State(state): State<AppState>,
    Query(query): Query<ListRoomsQuery>,
) -> Result<Json<Vec<RoomResponse>>, AppError> {
    let rooms = state.room_service.list_rooms(query.category).await?;

    info!(room_count = rooms.len(), "Rooms listed successfully");

    Ok(Json(rooms))
}
