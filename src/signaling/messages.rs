use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Closed set of session-negotiation message kinds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

/// A session-negotiation message between exactly two members of a room.
///
/// `seq` is assigned by the sending side, monotonically increasing per
/// ordered pair (from, to) starting at 0; the channel delivers messages
/// for a pair in non-decreasing sequence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingMessage {
    pub room_id: Uuid,
    pub from_user: String,
    pub to_user: String,
    pub kind: SignalKind,
    pub payload: String,
    pub seq: u64,
}

impl SignalingMessage {
    pub fn new(
        room_id: Uuid,
        from_user: impl Into<String>,
        to_user: impl Into<String>,
        kind: SignalKind,
        payload: impl Into<String>,
        seq: u64,
    ) -> Self {
        Self {
            room_id,
            from_user: from_user.into(),
            to_user: to_user.into(),
            kind,
            payload: payload.into(),
            seq,
        }
    }
}
