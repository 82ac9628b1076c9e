// Public API - what other modules can use
pub use channel::ChatChannel;
pub use models::ChatMessage;

// Internal modules
mod channel;
pub mod models;
