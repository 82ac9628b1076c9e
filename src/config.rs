use std::time::Duration;

/// Tunable timings and bounds for the room subsystem
#[derive(Debug, Clone)]
pub struct RoomsConfig {
    /// Silence after which a connected member is considered reconnecting
    pub heartbeat_timeout: Duration,
    /// Additional silence after which a reconnecting member is dropped
    pub reconnect_grace: Duration,
    /// How often the presence sweeper runs
    pub sweep_interval: Duration,
    /// How long to wait for a negotiation answer before retrying
    pub negotiation_timeout: Duration,
    /// Maximum offer/answer attempts per peer before the pair is closed
    pub negotiation_max_attempts: u32,
    /// Base delay for negotiation retry backoff (doubles per attempt)
    pub negotiation_backoff: Duration,
    /// Maximum chat message length in characters
    pub max_message_chars: usize,
    /// How long a deactivated room is retained before being purged
    pub room_retention: Duration,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(30),
            reconnect_grace: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
            negotiation_timeout: Duration::from_secs(5),
            negotiation_max_attempts: 3,
            negotiation_backoff: Duration::from_millis(250),
            max_message_chars: 2000,
            room_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}
