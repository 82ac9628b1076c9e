use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::messages::SignalingMessage;
use crate::shared::AppError;

/// Sequencing state for one ordered pair (room, from, to)
struct PairOrdering {
    /// Next sequence number expected from the sender
    expected_seq: u64,
    /// Out-of-order arrivals held back until the gap closes
    buffered: BTreeMap<u64, SignalingMessage>,
}

impl PairOrdering {
    fn new() -> Self {
        Self {
            expected_seq: 0,
            buffered: BTreeMap::new(),
        }
    }
}

struct SignalingState {
    /// Live delivery queues: (room, user) -> sender
    subscribers: HashMap<(Uuid, String), mpsc::UnboundedSender<SignalingMessage>>,
    /// Per-ordered-pair sequencing: (room, from, to)
    pairs: HashMap<(Uuid, String, String), PairOrdering>,
}

/// Relays session-negotiation messages between exactly two members of a
/// room, preserving per-pair ordering.
///
/// Messages arriving out of sequence are buffered and released in order,
/// never dropped. Sends to a member without a live subscription fail
/// with `PeerUnavailable`; the caller abandons that pairwise session
/// rather than retrying indefinitely.
pub struct SignalingChannel {
    inner: Mutex<SignalingState>,
}

impl Default for SignalingChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingChannel {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SignalingState {
                subscribers: HashMap::new(),
                pairs: HashMap::new(),
            }),
        }
    }

    /// Registers the delivery queue for a member; messages for all pairs
    /// involving the member arrive on the returned receiver
    #[instrument(skip(self))]
    pub fn subscribe(
        &self,
        room_id: Uuid,
        user_id: &str,
    ) -> mpsc::UnboundedReceiver<SignalingMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        inner
            .subscribers
            .insert((room_id, user_id.to_string()), sender);
        debug!(room_id = %room_id, user_id = %user_id, "Signaling subscription registered");
        receiver
    }

    /// Drops the member's delivery queue and all pair sequencing state
    /// involving the member in that room
    #[instrument(skip(self))]
    pub fn unsubscribe(&self, room_id: Uuid, user_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.remove(&(room_id, user_id.to_string()));
        inner
            .pairs
            .retain(|(rid, from, to), _| !(*rid == room_id && (from == user_id || to == user_id)));
        debug!(room_id = %room_id, user_id = %user_id, "Signaling subscription removed");
    }

    /// Relays a message to its recipient, releasing any buffered
    /// follow-ups whose gap it closes
    pub fn send(&self, message: SignalingMessage) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();

        let recipient_key = (message.room_id, message.to_user.clone());
        if !inner.subscribers.contains_key(&recipient_key) {
            info!(
                room_id = %message.room_id,
                from = %message.from_user,
                to = %message.to_user,
                "Recipient has no live subscription"
            );
            return Err(AppError::PeerUnavailable(message.to_user));
        }

        let pair_key = (
            message.room_id,
            message.from_user.clone(),
            message.to_user.clone(),
        );
        let pair = inner
            .pairs
            .entry(pair_key.clone())
            .or_insert_with(PairOrdering::new);

        if message.seq < pair.expected_seq {
            // Already delivered at this position; re-delivering would
            // violate non-decreasing order
            warn!(
                room_id = %message.room_id,
                from = %message.from_user,
                to = %message.to_user,
                seq = message.seq,
                expected = pair.expected_seq,
                "Duplicate signaling message ignored"
            );
            return Ok(());
        }

        if message.seq > pair.expected_seq {
            debug!(
                room_id = %message.room_id,
                from = %message.from_user,
                to = %message.to_user,
                seq = message.seq,
                expected = pair.expected_seq,
                "Out-of-order signaling message buffered"
            );
            pair.buffered.insert(message.seq, message);
            return Ok(());
        }

        // In order: deliver it and everything consecutive behind it
        let mut ready = vec![message];
        let mut next = pair.expected_seq + 1;
        while let Some(buffered) = pair.buffered.remove(&next) {
            ready.push(buffered);
            next += 1;
        }
        pair.expected_seq = next;

        let sender = inner
            .subscribers
            .get(&recipient_key)
            .cloned()
            .ok_or_else(|| AppError::PeerUnavailable(recipient_key.1.clone()))?;
        drop(inner);

        for msg in ready {
            if sender.send(msg).is_err() {
                // Receiver dropped between the check and the send
                let mut inner = self.inner.lock().unwrap();
                inner.subscribers.remove(&recipient_key);
                return Err(AppError::PeerUnavailable(recipient_key.1));
            }
        }

        Ok(())
    }
}
