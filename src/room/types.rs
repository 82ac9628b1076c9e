use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{Room, RoomCategory, RoomKind, RoomSpec};
use crate::shared::Identity;

/// Request payload for creating a new room.
/// Identity fields are trusted as-is; authentication happens upstream.
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub contact_handle: String,
    pub title: String,
    pub category: RoomCategory,
    pub kind: RoomKind,
    pub max_participants: u32,
    pub is_public: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateRoomRequest {
    pub fn spec(&self) -> RoomSpec {
        RoomSpec {
            title: self.title.clone(),
            category: self.category,
            kind: self.kind,
            max_participants: self.max_participants,
            is_public: self.is_public,
            tags: self.tags.clone(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(
            self.user_id.clone(),
            self.display_name.clone(),
            self.contact_handle.clone(),
        )
    }
}

/// Query parameters for the room listing
#[derive(Debug, Default, Deserialize)]
pub struct ListRoomsQuery {
    pub category: Option<RoomCategory>,
}

/// Response for room creation and room information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomResponse {
    pub id: Uuid,
    pub title: String,
    pub category: RoomCategory,
    pub kind: RoomKind,
    pub host_id: String,
    pub member_count: usize,
    pub max_participants: u32,
    pub is_public: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl From<&Room> for RoomResponse {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id,
            title: room.title.clone(),
            category: room.category,
            kind: room.kind,
            host_id: room.host_id.clone(),
            member_count: room.member_count(),
            max_participants: room.max_participants,
            is_public: room.is_public,
            tags: room.tags.clone(),
            created_at: room.created_at,
            last_active_at: room.last_active_at,
        }
    }
}
