use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::shared::{AppError, Identity};

/// Bounds enforced at room creation
pub const MIN_PARTICIPANTS: u32 = 2;
pub const MAX_PARTICIPANTS: u32 = 50;
pub const MAX_TAGS: usize = 5;

/// Closed set of room categories
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoomCategory {
    Sports,
    Cultural,
    Party,
    Gaming,
}

/// Closed set of room types
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoomKind {
    Planning,
    Feedback,
    Discussion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MemberRole {
    Host,
    Member,
}

/// The binding of one identity to one room.
/// Exactly one Membership exists per (room, user); rejoining is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub room_id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub contact_handle: String,
    pub joined_at: DateTime<Utc>,
    pub role: MemberRole,
}

impl Membership {
    pub fn new(room_id: Uuid, identity: &Identity, role: MemberRole) -> Self {
        Self {
            room_id,
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
            contact_handle: identity.contact_handle.clone(),
            joined_at: Utc::now(),
            role,
        }
    }
}

/// Validated parameters for creating a room
#[derive(Debug, Clone, Deserialize)]
pub struct RoomSpec {
    pub title: String,
    pub category: RoomCategory,
    pub kind: RoomKind,
    pub max_participants: u32,
    pub is_public: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RoomSpec {
    /// Checks the creation bounds; callers get `InvalidSpec` with the
    /// first violated constraint
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::InvalidSpec("title must not be empty".to_string()));
        }
        if self.max_participants < MIN_PARTICIPANTS || self.max_participants > MAX_PARTICIPANTS {
            return Err(AppError::InvalidSpec(format!(
                "max_participants must be between {} and {}",
                MIN_PARTICIPANTS, MAX_PARTICIPANTS
            )));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(AppError::InvalidSpec(format!(
                "at most {} tags allowed",
                MAX_TAGS
            )));
        }
        Ok(())
    }
}

/// A bounded-capacity, categorized space for live presence, media
/// sessions and chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub title: String,
    pub category: RoomCategory,
    pub kind: RoomKind,
    pub host_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub max_participants: u32,
    pub is_public: bool,
    pub is_active: bool,
    pub tags: Vec<String>,
    /// Memberships in join order; the front entry is the promotion
    /// candidate when the host leaves
    pub members: Vec<Membership>,
}

impl Room {
    /// Creates a room from a validated spec with the host admitted as the
    /// first member
    pub fn new(spec: &RoomSpec, host: &Identity) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();

        Self {
            id,
            title: spec.title.clone(),
            category: spec.category,
            kind: spec.kind,
            host_id: host.user_id.clone(),
            created_at: now,
            last_active_at: now,
            max_participants: spec.max_participants,
            is_public: spec.is_public,
            is_active: true,
            tags: spec.tags.clone(),
            members: vec![Membership::new(id, host, MemberRole::Host)],
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_participants as usize
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    pub fn membership(&self, user_id: &str) -> Option<&Membership> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    /// User ids of all current members
    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.user_id.clone()).collect()
    }
}
