use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::models::ChatMessage;
use crate::event::{EventBus, RoomEvent};
use crate::shared::AppError;

/// Per-room fan-out capacity for live chat delivery
const CHAT_CHANNEL_CAPACITY: usize = 256;

struct RoomLog {
    /// Next sequence number to assign; sequences start at 1
    next_seq: u64,
    log: Vec<ChatMessage>,
    sender: broadcast::Sender<ChatMessage>,
}

impl RoomLog {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHAT_CHANNEL_CAPACITY);
        Self {
            next_seq: 1,
            log: Vec::new(),
            sender,
        }
    }
}

/// Per-room ordered, append-only chat with at-least-once delivery.
///
/// Sequence numbers are assigned by exactly one sequencer per room
/// (the room's log lock), never computed by callers, so concurrent posts
/// get distinct, gap-free, strictly increasing numbers.
pub struct ChatChannel {
    max_message_chars: usize,
    event_bus: EventBus,
    rooms: Mutex<HashMap<Uuid, RoomLog>>,
}

impl ChatChannel {
    pub fn new(max_message_chars: usize, event_bus: EventBus) -> Self {
        Self {
            max_message_chars,
            event_bus,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Appends a message to the room log and fans it out to subscribers.
    ///
    /// Either fully succeeds (sequence assigned and delivered) or fully
    /// fails with no state change; oversize input is rejected before the
    /// sequencer is touched.
    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    pub async fn post(
        &self,
        room_id: Uuid,
        user_id: &str,
        display_name: &str,
        text: &str,
    ) -> Result<ChatMessage, AppError> {
        if text.chars().count() > self.max_message_chars {
            debug!(room_id = %room_id, user_id = %user_id, "Rejecting oversize message");
            return Err(AppError::MessageTooLong {
                limit: self.max_message_chars,
            });
        }

        let message = {
            let mut rooms = self.rooms.lock().unwrap();
            let room = rooms.entry(room_id).or_insert_with(RoomLog::new);

            let message = ChatMessage {
                id: Uuid::new_v4(),
                room_id,
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                text: text.to_string(),
                seq: room.next_seq,
                timestamp: Utc::now(),
            };
            room.next_seq += 1;
            room.log.push(message.clone());

            // Fan out while still holding the sequencer so subscribers
            // observe messages in sequence order
            let _ = room.sender.send(message.clone());
            message
        };

        info!(
            room_id = %room_id,
            user_id = %user_id,
            seq = message.seq,
            "Chat message posted"
        );

        self.event_bus
            .emit_to_room(
                room_id,
                RoomEvent::MessagePosted {
                    room_id,
                    user_id: user_id.to_string(),
                    seq: message.seq,
                },
            )
            .await;

        Ok(message)
    }

    /// Subscribes to a room's chat.
    ///
    /// With `after_seq`, the returned replay holds logged messages with
    /// `seq > after_seq`; without it, no history is replayed. The live
    /// receiver is created under the same lock as the replay, so no
    /// message falls in the gap between the two.
    pub fn subscribe(
        &self,
        room_id: Uuid,
        after_seq: Option<u64>,
    ) -> (Vec<ChatMessage>, broadcast::Receiver<ChatMessage>) {
        let mut rooms = self.rooms.lock().unwrap();
        let room = rooms.entry(room_id).or_insert_with(RoomLog::new);

        let receiver = room.sender.subscribe();
        let replay = match after_seq {
            Some(after) => room
                .log
                .iter()
                .filter(|m| m.seq > after)
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        (replay, receiver)
    }

    /// Clears a room's log once the room deactivates; chat history does
    /// not outlive the room. The sequence counter survives so numbering
    /// stays monotonic if the room is relisted.
    pub fn clear_room(&self, room_id: Uuid) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(room) = rooms.get_mut(&room_id) {
            debug!(room_id = %room_id, dropped = room.log.len(), "Chat log cleared");
            room.log.clear();
        }
    }
}
