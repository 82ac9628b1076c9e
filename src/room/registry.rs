use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::models::{MemberRole, Membership, Room, RoomCategory};
use crate::shared::{AppError, Identity};

/// Result of attempting to join a room
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// Successfully admitted, returns updated room and the new membership
    Joined { room: Room, membership: Membership },
    /// User already holds a membership; returned unchanged (idempotent rejoin)
    AlreadyMember { room: Room, membership: Membership },
    /// Room is at capacity
    RoomFull,
    /// Room does not exist, or is private and the caller holds no invite
    RoomNotFound,
}

/// Result of attempting to leave a room
#[derive(Debug, Clone)]
pub enum LeaveOutcome {
    /// Successfully left; `new_host` is set when the departing host's role
    /// was promoted to another member, `deactivated` when the room emptied
    Left {
        room: Room,
        new_host: Option<String>,
        deactivated: bool,
    },
    /// User was not a member (leaving twice is a no-op)
    NotAMember,
    /// Room does not exist
    RoomNotFound,
}

/// The single source of truth for room existence, capacity and membership.
///
/// All mutations on a given room are serialized so capacity checks are
/// atomic under concurrent joins. The storage technology behind this
/// trait is pluggable; rooms are ephemeral, so the in-memory
/// implementation is the one the server runs with.
#[async_trait]
pub trait RoomRegistry: Send + Sync {
    async fn create(&self, room: &Room) -> Result<(), AppError>;
    async fn get(&self, room_id: Uuid) -> Result<Option<Room>, AppError>;

    /// Public, active rooms, optionally filtered by category, sorted
    /// most-recently-active first
    async fn list(&self, category: Option<RoomCategory>) -> Result<Vec<Room>, AppError>;

    /// Atomically checks capacity and admits the user. `allow_private` is
    /// set only by the invite redemption path.
    async fn try_join(
        &self,
        room_id: Uuid,
        identity: &Identity,
        allow_private: bool,
    ) -> Result<JoinOutcome, AppError>;

    /// Atomically removes the membership, promoting a new host or
    /// deactivating the room as needed
    async fn leave(&self, room_id: Uuid, user_id: &str) -> Result<LeaveOutcome, AppError>;

    /// Refreshes the room's last-activity timestamp
    async fn touch(&self, room_id: Uuid) -> Result<(), AppError>;

    /// Drops rooms that have been inactive for longer than `older_than`,
    /// returning the ids that were removed
    async fn purge_inactive(&self, older_than: Duration) -> Result<Vec<Uuid>, AppError>;
}

/// In-memory implementation of RoomRegistry
pub struct InMemoryRoomRegistry {
    rooms: Mutex<HashMap<Uuid, Room>>,
}

impl Default for InMemoryRoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoomRegistry {
    /// Creates a new empty in-memory registry
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RoomRegistry for InMemoryRoomRegistry {
    #[instrument(skip(self, room))]
    async fn create(&self, room: &Room) -> Result<(), AppError> {
        debug!(room_id = %room.id, title = %room.title, "Creating room");

        let mut rooms = self.rooms.lock().unwrap();
        if rooms.contains_key(&room.id) {
            warn!(room_id = %room.id, "Room already exists");
            return Err(AppError::Internal);
        }
        rooms.insert(room.id, room.clone());

        debug!(room_id = %room.id, "Room created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, room_id: Uuid) -> Result<Option<Room>, AppError> {
        let rooms = self.rooms.lock().unwrap();
        Ok(rooms.get(&room_id).cloned())
    }

    #[instrument(skip(self))]
    async fn list(&self, category: Option<RoomCategory>) -> Result<Vec<Room>, AppError> {
        let rooms = self.rooms.lock().unwrap();
        let mut listed: Vec<Room> = rooms
            .values()
            .filter(|r| r.is_public && r.is_active)
            .filter(|r| category.map_or(true, |c| r.category == c))
            .cloned()
            .collect();

        // Most recently active first
        listed.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));

        debug!(room_count = listed.len(), "Rooms listed");
        Ok(listed)
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    async fn try_join(
        &self,
        room_id: Uuid,
        identity: &Identity,
        allow_private: bool,
    ) -> Result<JoinOutcome, AppError> {
        let mut rooms = self.rooms.lock().unwrap();

        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => {
                debug!(room_id = %room_id, "Room not found");
                return Ok(JoinOutcome::RoomNotFound);
            }
        };

        // A private room is indistinguishable from a missing one unless
        // the caller came through invite redemption
        if !room.is_public && !allow_private {
            debug!(room_id = %room_id, "Private room without invite");
            return Ok(JoinOutcome::RoomNotFound);
        }

        // Idempotent rejoin: the existing membership is returned unchanged
        if let Some(membership) = room.membership(&identity.user_id).cloned() {
            debug!(room_id = %room_id, user_id = %identity.user_id, "Already a member");
            return Ok(JoinOutcome::AlreadyMember {
                room: room.clone(),
                membership,
            });
        }

        if room.is_full() {
            debug!(
                room_id = %room_id,
                member_count = room.member_count(),
                "Room is full"
            );
            return Ok(JoinOutcome::RoomFull);
        }

        let membership = Membership::new(room_id, identity, MemberRole::Member);
        room.members.push(membership.clone());
        room.is_active = true;
        room.last_active_at = Utc::now();

        info!(
            room_id = %room_id,
            user_id = %identity.user_id,
            member_count = room.member_count(),
            "Member joined room"
        );

        Ok(JoinOutcome::Joined {
            room: room.clone(),
            membership,
        })
    }

    #[instrument(skip(self))]
    async fn leave(&self, room_id: Uuid, user_id: &str) -> Result<LeaveOutcome, AppError> {
        let mut rooms = self.rooms.lock().unwrap();

        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => {
                debug!(room_id = %room_id, "Room not found");
                return Ok(LeaveOutcome::RoomNotFound);
            }
        };

        if !room.has_member(user_id) {
            debug!(room_id = %room_id, user_id = %user_id, "Not a member");
            return Ok(LeaveOutcome::NotAMember);
        }

        let was_host = room.host_id == user_id;
        room.members.retain(|m| m.user_id != user_id);
        room.last_active_at = Utc::now();

        // Empty room: mark inactive, retain for relisting
        if room.members.is_empty() {
            room.is_active = false;
            info!(room_id = %room_id, user_id = %user_id, "Last member left, room deactivated");
            return Ok(LeaveOutcome::Left {
                room: room.clone(),
                new_host: None,
                deactivated: true,
            });
        }

        // Host departure promotes the earliest-joined remaining member
        let mut new_host = None;
        if was_host {
            if let Some(promoted) = room.members.first_mut() {
                promoted.role = MemberRole::Host;
                room.host_id = promoted.user_id.clone();
                new_host = Some(promoted.user_id.clone());
                info!(
                    room_id = %room_id,
                    old_host = %user_id,
                    new_host = %room.host_id,
                    "Host left, promoted earliest-joined member"
                );
            }
        }

        info!(
            room_id = %room_id,
            user_id = %user_id,
            member_count = room.member_count(),
            "Member left room"
        );

        Ok(LeaveOutcome::Left {
            room: room.clone(),
            new_host,
            deactivated: false,
        })
    }

    #[instrument(skip(self))]
    async fn touch(&self, room_id: Uuid) -> Result<(), AppError> {
        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get_mut(&room_id) {
            Some(room) => {
                room.last_active_at = Utc::now();
                Ok(())
            }
            None => Err(AppError::RoomNotFound(room_id.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn purge_inactive(&self, older_than: Duration) -> Result<Vec<Uuid>, AppError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).map_err(|_| AppError::Internal)?;

        let mut rooms = self.rooms.lock().unwrap();
        let purged: Vec<Uuid> = rooms
            .values()
            .filter(|r| !r.is_active && r.last_active_at < cutoff)
            .map(|r| r.id)
            .collect();

        for id in &purged {
            rooms.remove(id);
        }

        if !purged.is_empty() {
            info!(purged = purged.len(), "Purged inactive rooms");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::models::{RoomKind, RoomSpec};
    use std::sync::Arc;

    mod helpers {
        use super::*;

        pub fn identity(user_id: &str) -> Identity {
            Identity::new(user_id, format!("name-{}", user_id), format!("{}@x", user_id))
        }

        pub fn test_room(host: &str, max: u32, public: bool) -> Room {
            let spec = RoomSpec {
                title: "test room".to_string(),
                category: RoomCategory::Gaming,
                kind: RoomKind::Discussion,
                max_participants: max,
                is_public: public,
                tags: vec![],
            };
            Room::new(&spec, &identity(host))
        }
    }

    use helpers::*;

    #[tokio::test]
    async fn test_create_and_get_room() {
        let registry = InMemoryRoomRegistry::new();
        let room = test_room("host", 4, true);

        registry.create(&room).await.unwrap();

        let retrieved = registry.get(room.id).await.unwrap().unwrap();
        assert_eq!(retrieved.id, room.id);
        assert_eq!(retrieved.host_id, "host");
        assert_eq!(retrieved.member_count(), 1);
        assert!(retrieved.is_active);
    }

    #[tokio::test]
    async fn test_get_nonexistent_room() {
        let registry = InMemoryRoomRegistry::new();
        assert!(registry.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_join_respects_capacity() {
        let registry = InMemoryRoomRegistry::new();
        let room = test_room("host", 2, true);
        registry.create(&room).await.unwrap();

        // Second slot is free
        let outcome = registry
            .try_join(room.id, &identity("b"), false)
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::Joined { .. }));

        // Third member is rejected
        let outcome = registry
            .try_join(room.id, &identity("c"), false)
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::RoomFull));

        let stored = registry.get(room.id).await.unwrap().unwrap();
        assert_eq!(stored.member_count(), 2);
    }

    #[tokio::test]
    async fn test_rejoin_is_idempotent() {
        let registry = InMemoryRoomRegistry::new();
        let room = test_room("host", 2, true);
        registry.create(&room).await.unwrap();

        let outcome = registry
            .try_join(room.id, &identity("host"), false)
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::AlreadyMember { .. }));

        // Membership count did not grow
        let stored = registry.get(room.id).await.unwrap().unwrap();
        assert_eq!(stored.member_count(), 1);
    }

    #[tokio::test]
    async fn test_private_room_hidden_without_invite() {
        let registry = InMemoryRoomRegistry::new();
        let room = test_room("host", 4, false);
        registry.create(&room).await.unwrap();

        let outcome = registry
            .try_join(room.id, &identity("b"), false)
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::RoomNotFound));

        // The invite path sets allow_private
        let outcome = registry
            .try_join(room.id, &identity("b"), true)
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::Joined { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_joins_never_exceed_capacity() {
        let registry = Arc::new(InMemoryRoomRegistry::new());
        let room = test_room("host", 4, true);
        registry.create(&room).await.unwrap();

        // 3 free slots, 8 contenders
        let handles = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let room_id = room.id;
                tokio::spawn(async move {
                    registry
                        .try_join(room_id, &identity(&format!("user-{}", i)), false)
                        .await
                })
            })
            .collect::<Vec<_>>();

        let results = futures::future::join_all(handles).await;
        let admitted = results
            .into_iter()
            .filter(|r| {
                matches!(
                    r.as_ref().unwrap().as_ref().unwrap(),
                    JoinOutcome::Joined { .. }
                )
            })
            .count();

        assert_eq!(admitted, 3);

        let stored = registry.get(room.id).await.unwrap().unwrap();
        assert_eq!(stored.member_count(), 4, "capacity must never be exceeded");
    }

    #[tokio::test]
    async fn test_host_leave_promotes_earliest_joined() {
        let registry = InMemoryRoomRegistry::new();
        let room = test_room("host", 4, true);
        registry.create(&room).await.unwrap();

        registry.try_join(room.id, &identity("b"), false).await.unwrap();
        registry.try_join(room.id, &identity("c"), false).await.unwrap();

        let outcome = registry.leave(room.id, "host").await.unwrap();
        match outcome {
            LeaveOutcome::Left {
                room,
                new_host,
                deactivated,
            } => {
                assert_eq!(new_host.as_deref(), Some("b"));
                assert_eq!(room.host_id, "b");
                assert_eq!(room.members[0].role, MemberRole::Host);
                assert!(!deactivated);
                assert!(room.is_active);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_last_leave_deactivates_and_rejoin_reactivates() {
        let registry = InMemoryRoomRegistry::new();
        let room = test_room("host", 4, true);
        registry.create(&room).await.unwrap();

        let outcome = registry.leave(room.id, "host").await.unwrap();
        assert!(matches!(
            outcome,
            LeaveOutcome::Left {
                deactivated: true,
                ..
            }
        ));

        let stored = registry.get(room.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.member_count(), 0);

        // Rejoining reactivates the retained room
        let outcome = registry
            .try_join(room.id, &identity("b"), false)
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::Joined { .. }));
        let stored = registry.get(room.id).await.unwrap().unwrap();
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn test_leave_twice_is_noop() {
        let registry = InMemoryRoomRegistry::new();
        let room = test_room("host", 4, true);
        registry.create(&room).await.unwrap();
        registry.try_join(room.id, &identity("b"), false).await.unwrap();

        registry.leave(room.id, "b").await.unwrap();
        let outcome = registry.leave(room.id, "b").await.unwrap();
        assert!(matches!(outcome, LeaveOutcome::NotAMember));
    }

    #[tokio::test]
    async fn test_list_hides_private_and_inactive_rooms() {
        let registry = InMemoryRoomRegistry::new();

        let public_room = test_room("a", 4, true);
        let private_room = test_room("b", 4, false);
        let empty_room = test_room("c", 4, true);

        registry.create(&public_room).await.unwrap();
        registry.create(&private_room).await.unwrap();
        registry.create(&empty_room).await.unwrap();
        registry.leave(empty_room.id, "c").await.unwrap();

        let listed = registry.list(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, public_room.id);
    }

    #[tokio::test]
    async fn test_list_filters_by_category_and_sorts_by_activity() {
        let registry = InMemoryRoomRegistry::new();

        let older = test_room("a", 4, true);
        registry.create(&older).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let newer = test_room("b", 4, true);
        registry.create(&newer).await.unwrap();

        let listed = registry.list(Some(RoomCategory::Gaming)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id, "most recently active first");

        // Touching the older room moves it to the front
        registry.touch(older.id).await.unwrap();
        let listed = registry.list(None).await.unwrap();
        assert_eq!(listed[0].id, older.id);

        let listed = registry.list(Some(RoomCategory::Sports)).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_purge_drops_only_long_inactive_rooms() {
        let registry = InMemoryRoomRegistry::new();

        let active = test_room("a", 4, true);
        let stale = test_room("b", 4, true);
        registry.create(&active).await.unwrap();
        registry.create(&stale).await.unwrap();
        registry.leave(stale.id, "b").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let purged = registry
            .purge_inactive(Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(purged, vec![stale.id]);

        assert!(registry.get(active.id).await.unwrap().is_some());
        assert!(registry.get(stale.id).await.unwrap().is_none());
    }
}
