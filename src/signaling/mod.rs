// Public API - what other modules can use
pub use channel::SignalingChannel;
pub use messages::{SignalKind, SignalingMessage};

// Internal modules
mod channel;
mod messages;
