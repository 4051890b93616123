//! Perimeter ROI client
//!
//! Crops a video source (local clip or live camera) to an operator-drawn
//! region of interest, streams the crop as JPEG frames to a remote detector
//! over a WebSocket, and renders the detector's boxes and alarm banners back
//! onto the display.
//!
//! # Module Structure
//!
//! - `geometry`: display ↔ native coordinate mapping and letterbox sizing
//! - `roi`: ROI drawing, editing tools and single-level undo
//! - `media`: clip playback, camera capture and source switching
//! - `capture`: crop-and-encode of the current frame
//! - `transport`: detector WebSocket and endpoint derivation
//! - `stream`: the backpressured capture → send → receive loop
//! - `detect`: detector reply parsing
//! - `overlay`: boxes, colors and banners for the current result
//! - `stats`, `storage`: persisted dashboard counters and activity log
//! - `api`, `auth`: REST client and signed-in session
//! - `workspace`: the page-level state tying the above together

pub mod api;
pub mod auth;
pub mod capture;
pub mod config;
pub mod detect;
pub mod geometry;
pub mod media;
pub mod overlay;
pub mod roi;
pub mod stats;
pub mod storage;
pub mod stream;
pub mod transport;
pub mod workspace;

pub use api::{ApiClient, SystemConfig, UserRead};
pub use auth::{AuthEvent, AuthSession, User};
pub use capture::{capture, CapturedFrame, JPEG_QUALITY};
pub use config::ClientConfig;
pub use detect::{DetectionItem, DetectionResult};
pub use geometry::{DisplayRect, DisplaySize, NativeCrop, NativeSize, Point, ScaleFactors};
pub use media::{
    CameraConstraints, CameraProvider, ClipPlayer, DeviceCameraProvider, LiveStream,
    MediaElement, SourceKind, VideoSource, VideoSourceManager,
};
pub use overlay::{rasterize, render_overlay, OverlayScene};
pub use roi::{PointerEvent, PointerPhase, RoiModel, RoiRect, Tool};
pub use stats::{DashboardStats, StatsRecorder, StatsStore};
pub use storage::{InMemoryKvStore, KvStore, SharedStore, SqliteKvStore};
pub use stream::{FrameInputs, StreamController, StreamCounters, StreamState};
pub use transport::{detect_endpoint, DetectorSocket, SocketConnector, SocketEvent, WsConnector};
pub use workspace::{StatusLabel, Workspace};
