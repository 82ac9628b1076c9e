// Public API - what other modules can use
pub use handlers::issue_invite;
pub use models::InviteToken;
pub use service::InviteTokenService;

// Internal modules
mod handlers;
pub mod models;
mod service;
