use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry of a room's append-only chat log.
///
/// `seq` is the authoritative order; `timestamp` is informational only,
/// since client clocks may skew.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub text: String,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
}
