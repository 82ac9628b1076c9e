use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use strum_macros::Display;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::event::{EventBus, RoomEvent};

/// Live connectivity state of a member within a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Joining,
    Connected,
    Reconnecting,
    Left,
}

/// Snapshot entry handed to the gateway for bootstrap frames
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub user_id: String,
    pub state: ConnectionState,
}

struct PresenceEntry {
    state: ConnectionState,
    last_heartbeat: Instant,
}

/// Tracks the live set of connected members per room and broadcasts
/// state-change events.
///
/// Events are emitted only after the corresponding state mutation has
/// been committed to the tracker's own store, so subscribers never see a
/// member that is not really there.
pub struct PresenceTracker {
    heartbeat_timeout: Duration,
    reconnect_grace: Duration,
    event_bus: EventBus,
    entries: Mutex<HashMap<(Uuid, String), PresenceEntry>>,
}

impl PresenceTracker {
    pub fn new(heartbeat_timeout: Duration, reconnect_grace: Duration, event_bus: EventBus) -> Self {
        Self {
            heartbeat_timeout,
            reconnect_grace,
            event_bus,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a member mid-admission
    #[instrument(skip(self))]
    pub async fn mark_joining(&self, room_id: Uuid, user_id: &str) {
        {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(
                (room_id, user_id.to_string()),
                PresenceEntry {
                    state: ConnectionState::Joining,
                    last_heartbeat: Instant::now(),
                },
            );
        }
        self.emit(room_id, user_id, ConnectionState::Joining).await;
    }

    /// Marks a member fully connected
    #[instrument(skip(self))]
    pub async fn mark_connected(&self, room_id: Uuid, user_id: &str) {
        {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(
                (room_id, user_id.to_string()),
                PresenceEntry {
                    state: ConnectionState::Connected,
                    last_heartbeat: Instant::now(),
                },
            );
        }
        self.emit(room_id, user_id, ConnectionState::Connected).await;
    }

    /// Resets the liveness timer; a reconnecting member recovers to
    /// connected
    pub async fn heartbeat(&self, room_id: Uuid, user_id: &str) {
        let recovered = {
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(&(room_id, user_id.to_string())) {
                Some(entry) => {
                    entry.last_heartbeat = Instant::now();
                    if entry.state == ConnectionState::Reconnecting {
                        entry.state = ConnectionState::Connected;
                        true
                    } else {
                        false
                    }
                }
                None => {
                    debug!(room_id = %room_id, user_id = %user_id, "Heartbeat for unknown member");
                    false
                }
            }
        };

        if recovered {
            info!(room_id = %room_id, user_id = %user_id, "Member recovered from reconnecting");
            self.emit(room_id, user_id, ConnectionState::Connected).await;
        }
    }

    /// Removes the member's presence entry; idempotent
    #[instrument(skip(self))]
    pub async fn mark_left(&self, room_id: Uuid, user_id: &str) {
        let removed = {
            let mut entries = self.entries.lock().unwrap();
            entries.remove(&(room_id, user_id.to_string())).is_some()
        };

        if removed {
            self.emit(room_id, user_id, ConnectionState::Left).await;
        }
    }

    /// Applies timeout transitions and returns the members that crossed
    /// into `Left`. The caller funnels them through the normal leave path.
    pub async fn sweep(&self) -> Vec<(Uuid, String)> {
        let mut demoted = Vec::new();
        let mut expired = Vec::new();

        {
            let mut entries = self.entries.lock().unwrap();
            let now = Instant::now();

            entries.retain(|(room_id, user_id), entry| {
                let silence = now.duration_since(entry.last_heartbeat);
                match entry.state {
                    ConnectionState::Joining | ConnectionState::Connected
                        if silence > self.heartbeat_timeout =>
                    {
                        entry.state = ConnectionState::Reconnecting;
                        demoted.push((*room_id, user_id.clone()));
                        true
                    }
                    ConnectionState::Reconnecting
                        if silence > self.heartbeat_timeout + self.reconnect_grace =>
                    {
                        expired.push((*room_id, user_id.clone()));
                        false
                    }
                    _ => true,
                }
            });
        }

        for (room_id, user_id) in &demoted {
            info!(room_id = %room_id, user_id = %user_id, "Member missed heartbeats, reconnecting");
            self.emit(*room_id, user_id, ConnectionState::Reconnecting)
                .await;
        }
        for (room_id, user_id) in &expired {
            info!(room_id = %room_id, user_id = %user_id, "Member presence expired");
            self.emit(*room_id, user_id, ConnectionState::Left).await;
        }

        expired
    }

    /// Current presence entries for a room
    pub fn snapshot(&self, room_id: Uuid) -> Vec<PresenceSnapshot> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|((rid, _), _)| *rid == room_id)
            .map(|((_, user_id), entry)| PresenceSnapshot {
                user_id: user_id.clone(),
                state: entry.state,
            })
            .collect()
    }

    /// User ids currently in `Connected` state in a room
    pub fn connected_members(&self, room_id: Uuid) -> Vec<String> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|((rid, _), entry)| *rid == room_id && entry.state == ConnectionState::Connected)
            .map(|((_, user_id), _)| user_id.clone())
            .collect()
    }

    async fn emit(&self, room_id: Uuid, user_id: &str, state: ConnectionState) {
        self.event_bus
            .emit_to_room(
                room_id,
                RoomEvent::PresenceChanged {
                    room_id,
                    user_id: user_id.to_string(),
                    state,
                },
            )
            .await;
    }
}
