// Public API - what other modules can use
pub use handlers::{create_room, list_rooms};
pub use registry::{InMemoryRoomRegistry, JoinOutcome, LeaveOutcome, RoomRegistry};

// Internal modules
mod handlers;
pub mod models;
pub mod registry;
pub mod service;
pub mod types;
