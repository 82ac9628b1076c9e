use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::presence::ConnectionState;

/// Events that can occur in a vibe room
///
/// Events represent facts about things that have already happened. No
/// event is emitted before the state change it describes has been
/// committed to the owning component's store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RoomEvent {
    /// A new room has been created
    RoomCreated {
        room_id: Uuid,
        host_id: String,
        title: String,
    },

    /// A member has been admitted to the room
    MemberJoined {
        room_id: Uuid,
        user_id: String,
        display_name: String,
        member_count: usize,
    },

    /// A member has left the room (explicitly or via presence timeout)
    MemberLeft {
        room_id: Uuid,
        user_id: String,
        member_count: usize,
    },

    /// The host left and another member was promoted
    HostChanged { room_id: Uuid, new_host_id: String },

    /// A member's connection state changed
    PresenceChanged {
        room_id: Uuid,
        user_id: String,
        state: ConnectionState,
    },

    /// A chat message was assigned a sequence number and delivered
    MessagePosted {
        room_id: Uuid,
        user_id: String,
        seq: u64,
    },

    /// The last member left and the room was marked inactive
    RoomDeactivated { room_id: Uuid },
}

impl RoomEvent {
    /// Get the room id associated with this event
    /// All events are room-specific in this subsystem
    pub fn room_id(&self) -> Uuid {
        match self {
            RoomEvent::RoomCreated { room_id, .. } => *room_id,
            RoomEvent::MemberJoined { room_id, .. } => *room_id,
            RoomEvent::MemberLeft { room_id, .. } => *room_id,
            RoomEvent::HostChanged { room_id, .. } => *room_id,
            RoomEvent::PresenceChanged { room_id, .. } => *room_id,
            RoomEvent::MessagePosted { room_id, .. } => *room_id,
            RoomEvent::RoomDeactivated { room_id } => *room_id,
        }
    }

    /// Get a human-readable description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            RoomEvent::RoomCreated { .. } => "room_created",
            RoomEvent::MemberJoined { .. } => "member_joined",
            RoomEvent::MemberLeft { .. } => "member_left",
            RoomEvent::HostChanged { .. } => "host_changed",
            RoomEvent::PresenceChanged { .. } => "presence_changed",
            RoomEvent::MessagePosted { .. } => "message_posted",
            RoomEvent::RoomDeactivated { .. } => "room_deactivated",
        }
    }
}
