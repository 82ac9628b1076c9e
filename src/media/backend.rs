use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use strum_macros::Display;
use tracing::debug;
use uuid::Uuid;

use crate::shared::AppError;

/// Kinds of local capture devices
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Exclusive-ownership token for an acquired capture device.
///
/// A handle is held by exactly one member's MediaSessionManager and must
/// be released back to the backend on mute-off/leave; the backend tracks
/// open handles so leaks are observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureHandle {
    pub id: Uuid,
    pub kind: MediaKind,
}

/// Seam to the platform media transport layer.
///
/// Codec work, device IO and the actual peer transport live behind this
/// trait; the core only drives acquisition and the offer/answer payload
/// exchange. The loopback implementation below stands in for the real
/// platform layer in the server binary and in tests.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Acquires exclusive use of a capture device of the given kind
    async fn acquire(&self, kind: MediaKind) -> Result<CaptureHandle, AppError>;

    /// Releases a previously acquired device
    async fn release(&self, handle: CaptureHandle);

    /// Produces an offer payload describing the local tracks
    async fn create_offer(&self, with_video: bool) -> Result<String, AppError>;

    /// Produces an answer payload for a received offer
    async fn create_answer(&self, offer: &str) -> Result<String, AppError>;

    /// Applies a received answer, completing the handshake
    async fn apply_answer(&self, answer: &str) -> Result<(), AppError>;
}

/// Session description payload exchanged by the loopback backend
#[derive(Debug, Serialize, Deserialize)]
struct LoopbackSdp {
    #[serde(rename = "type")]
    sdp_type: String,
    audio: bool,
    video: bool,
}

/// In-process MediaBackend used by the server and by tests
pub struct LoopbackMediaBackend {
    open: Mutex<HashSet<CaptureHandle>>,
    denied: Mutex<HashSet<MediaKind>>,
}

impl Default for LoopbackMediaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackMediaBackend {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(HashSet::new()),
            denied: Mutex::new(HashSet::new()),
        }
    }

    /// Simulates the user denying access to a device kind
    pub fn deny(&self, kind: MediaKind) {
        self.denied.lock().unwrap().insert(kind);
    }

    /// Number of capture devices currently held; zero once every member
    /// has torn down
    pub fn open_device_count(&self) -> usize {
        self.open.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaBackend for LoopbackMediaBackend {
    async fn acquire(&self, kind: MediaKind) -> Result<CaptureHandle, AppError> {
        if self.denied.lock().unwrap().contains(&kind) {
            return Err(AppError::MediaAcquisitionFailed(format!(
                "{} capture denied",
                kind
            )));
        }

        let handle = CaptureHandle {
            id: Uuid::new_v4(),
            kind,
        };
        self.open.lock().unwrap().insert(handle);
        debug!(handle_id = %handle.id, kind = %kind, "Capture device acquired");
        Ok(handle)
    }

    async fn release(&self, handle: CaptureHandle) {
        let released = self.open.lock().unwrap().remove(&handle);
        if released {
            debug!(handle_id = %handle.id, kind = %handle.kind, "Capture device released");
        }
    }

    async fn create_offer(&self, with_video: bool) -> Result<String, AppError> {
        let sdp = LoopbackSdp {
            sdp_type: "offer".to_string(),
            audio: true,
            video: with_video,
        };
        serde_json::to_string(&sdp).map_err(|_| AppError::Internal)
    }

    async fn create_answer(&self, offer: &str) -> Result<String, AppError> {
        let offer: LoopbackSdp = serde_json::from_str(offer).map_err(|_| AppError::Internal)?;
        if offer.sdp_type != "offer" {
            return Err(AppError::Internal);
        }
        let sdp = LoopbackSdp {
            sdp_type: "answer".to_string(),
            audio: offer.audio,
            video: offer.video,
        };
        serde_json::to_string(&sdp).map_err(|_| AppError::Internal)
    }

    async fn apply_answer(&self, answer: &str) -> Result<(), AppError> {
        let answer: LoopbackSdp = serde_json::from_str(answer).map_err(|_| AppError::Internal)?;
        if answer.sdp_type != "answer" {
            return Err(AppError::Internal);
        }
        Ok(())
    }
}
