// Public API - what other modules can use
pub use tracker::{ConnectionState, PresenceSnapshot, PresenceTracker};

// Internal modules
mod tracker;
