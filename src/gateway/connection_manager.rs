use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Outbound frame queues for connected members, keyed per room so the
/// same user can sit in several rooms at once
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn add_connection(
        &self,
        room_id: Uuid,
        user_id: String,
        sender: mpsc::UnboundedSender<String>,
    );

    async fn remove_connection(&self, room_id: Uuid, user_id: &str);

    async fn send_to_member(&self, room_id: Uuid, user_id: &str, frame: &str);
}

pub struct InMemoryConnectionManager {
    // (room, user) -> sender
    connections: Arc<RwLock<HashMap<(Uuid, String), mpsc::UnboundedSender<String>>>>,
}

impl Default for InMemoryConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ConnectionManager for InMemoryConnectionManager {
    async fn add_connection(
        &self,
        room_id: Uuid,
        user_id: String,
        sender: mpsc::UnboundedSender<String>,
    ) {
        let mut connections = self.connections.write().await;
        connections.insert((room_id, user_id), sender);
    }

    async fn remove_connection(&self, room_id: Uuid, user_id: &str) {
        let mut connections = self.connections.write().await;
        connections.remove(&(room_id, user_id.to_string()));
    }

    async fn send_to_member(&self, room_id: Uuid, user_id: &str, frame: &str) {
        let connections = self.connections.read().await;
        if let Some(sender) = connections.get(&(room_id, user_id.to_string())) {
            let _ = sender.send(frame.to_string());
        }
    }
}
