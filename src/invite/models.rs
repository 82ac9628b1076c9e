use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A capability granting room membership without public listing.
///
/// Tokens expire and carry a bounded number of uses; redemption
/// decrements `remaining_uses` atomically with the room admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteToken {
    pub token: String,
    pub room_id: Uuid,
    pub issued_by: String,
    pub expires_at: DateTime<Utc>,
    pub remaining_uses: u32,
}

impl InviteToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
