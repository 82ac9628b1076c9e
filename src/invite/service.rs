use chrono::{Duration as ChronoDuration, Utc};
use rand::distr::{Alphanumeric, SampleString};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::models::InviteToken;
use crate::room::{JoinOutcome, RoomRegistry};
use crate::shared::{AppError, Identity};

/// Length of the opaque token carried in invite links
const TOKEN_LEN: usize = 24;

/// Issues and redeems single-use/expiring tokens that grant membership
/// to a private room without public listing.
///
/// Redemption and admission are one atomic unit: the token table lock is
/// held across the registry join, and a use is only burned when the join
/// actually admitted the caller. A join that fails (room became full
/// concurrently) leaves the token untouched.
pub struct InviteTokenService {
    registry: Arc<dyn RoomRegistry>,
    tokens: Mutex<HashMap<String, InviteToken>>,
}

impl InviteTokenService {
    pub fn new(registry: Arc<dyn RoomRegistry>) -> Self {
        Self {
            registry,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a new token for a room. Only current members may invite.
    #[instrument(skip(self))]
    pub async fn issue(
        &self,
        room_id: Uuid,
        issued_by: &str,
        ttl: Duration,
        max_uses: u32,
    ) -> Result<InviteToken, AppError> {
        let room = self
            .registry
            .get(room_id)
            .await?
            .ok_or_else(|| AppError::RoomNotFound(room_id.to_string()))?;

        if !room.has_member(issued_by) {
            warn!(room_id = %room_id, issued_by = %issued_by, "Non-member tried to issue invite");
            return Err(AppError::RoomNotFound(room_id.to_string()));
        }

        let ttl = ChronoDuration::from_std(ttl).map_err(|_| AppError::Internal)?;
        let token = InviteToken {
            token: Alphanumeric.sample_string(&mut rand::rng(), TOKEN_LEN),
            room_id,
            issued_by: issued_by.to_string(),
            expires_at: Utc::now() + ttl,
            remaining_uses: max_uses.max(1),
        };

        let mut tokens = self.tokens.lock().await;
        tokens.insert(token.token.clone(), token.clone());

        info!(
            room_id = %room_id,
            issued_by = %issued_by,
            remaining_uses = token.remaining_uses,
            "Invite token issued"
        );

        Ok(token)
    }

    /// Redeems a token and admits the caller to the room.
    ///
    /// Fails with `InvalidToken` for unknown or expired tokens,
    /// `TokenExhausted` when no uses remain, and `RoomFull` when the
    /// admission itself fails, in which case no use is consumed.
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn redeem(&self, token: &str, identity: &Identity) -> Result<JoinOutcome, AppError> {
        let mut tokens = self.tokens.lock().await;

        let entry = match tokens.get_mut(token) {
            Some(entry) => entry,
            None => {
                debug!("Unknown invite token");
                return Err(AppError::InvalidToken);
            }
        };

        if entry.is_expired(Utc::now()) {
            debug!(room_id = %entry.room_id, "Expired invite token");
            tokens.remove(token);
            return Err(AppError::InvalidToken);
        }

        if entry.remaining_uses == 0 {
            debug!(room_id = %entry.room_id, "Exhausted invite token");
            return Err(AppError::TokenExhausted);
        }

        let room_id = entry.room_id;

        // Admission runs while the token table is locked so two redeemers
        // cannot both spend the last use
        let outcome = self.registry.try_join(room_id, identity, true).await?;

        match &outcome {
            JoinOutcome::Joined { .. } => {
                // Re-borrow: the entry may not outlive the await above
                if let Some(entry) = tokens.get_mut(token) {
                    entry.remaining_uses -= 1;
                    info!(
                        room_id = %room_id,
                        user_id = %identity.user_id,
                        remaining_uses = entry.remaining_uses,
                        "Invite token redeemed"
                    );
                }
                Ok(outcome)
            }
            // Idempotent rejoin must not burn a use
            JoinOutcome::AlreadyMember { .. } => {
                debug!(room_id = %room_id, user_id = %identity.user_id, "Redeemer already a member");
                Ok(outcome)
            }
            JoinOutcome::RoomFull => {
                info!(room_id = %room_id, "Room filled before redemption, token kept");
                Err(AppError::RoomFull)
            }
            JoinOutcome::RoomNotFound => Err(AppError::RoomNotFound(room_id.to_string())),
        }
    }
}
