// Event-driven architecture components
//
// Room events fan out through a per-room broadcast bus. The gamification
// collaborator subscribes here for join/leave/message bookkeeping; the
// core has no dependency in the other direction.

// Public API - what other modules can use
pub use bus::EventBus;
pub use events::RoomEvent;

// Internal modules
mod bus;
mod events;
