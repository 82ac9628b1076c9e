// Public API - what other modules can use
pub use connection_manager::{ConnectionManager, InMemoryConnectionManager};
pub use handler::{room_ws_handler, GatewayFrameHandler};
pub use messages::{ClientFrame, ServerFrame};
pub use socket::{Connection, FrameHandler, SocketError, SocketWrapper};

// Internal modules
mod connection_manager;
mod handler;
mod messages;
mod socket;
