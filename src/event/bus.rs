use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::events::RoomEvent;

/// Per-room broadcast capacity; slow subscribers that lag past this lose
/// events rather than stalling the emitter
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// Event bus distributing room events to subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    /// Room-specific event channels: room_id -> sender
    room_channels: Arc<RwLock<HashMap<Uuid, broadcast::Sender<RoomEvent>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            room_channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Emits an event to all subscribers of a specific room
    pub async fn emit_to_room(&self, room_id: Uuid, event: RoomEvent) {
        let room_channels = self.room_channels.read().await;

        if let Some(sender) = room_channels.get(&room_id) {
            match sender.send(event) {
                Ok(receiver_count) => {
                    debug!(
                        room_id = %room_id,
                        receivers = receiver_count,
                        "Room event emitted"
                    );
                }
                Err(_) => {
                    debug!(room_id = %room_id, "Room event emitted with no receivers");
                }
            }
        } else {
            debug!(room_id = %room_id, "No room channel found - creating one");
            drop(room_channels);

            // Create room channel if it doesn't exist
            let mut room_channels = self.room_channels.write().await;
            let (sender, _) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
            room_channels.insert(room_id, sender.clone());

            // Try to send again
            if sender.send(event).is_err() {
                debug!(room_id = %room_id, "Room event sent to new channel with no receivers");
            }
        }
    }

    /// Subscribe to events for a specific room
    pub async fn subscribe_to_room(&self, room_id: Uuid) -> broadcast::Receiver<RoomEvent> {
        let room_channels = self.room_channels.read().await;

        if let Some(sender) = room_channels.get(&room_id) {
            sender.subscribe()
        } else {
            debug!(room_id = %room_id, "Creating new room channel for subscription");
            drop(room_channels);

            // Create room channel if it doesn't exist
            let mut room_channels = self.room_channels.write().await;
            let (sender, _) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
            let receiver = sender.subscribe();
            room_channels.insert(room_id, sender);
            receiver
        }
    }

    /// Drop a room's channel once the room has been purged
    pub async fn drop_room(&self, room_id: Uuid) {
        let mut room_channels = self.room_channels.write().await;
        if room_channels.remove(&room_id).is_some() {
            debug!(room_id = %room_id, "Room event channel dropped");
        }
    }
}
