// Public API - what other modules can use
pub use backend::{CaptureHandle, LoopbackMediaBackend, MediaBackend, MediaKind};
pub use session::{MediaPhase, MediaSessionManager, PeerSessionState};

// Internal modules
mod backend;
mod session;
