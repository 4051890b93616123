//! Media sources for the ROI workspace.
//!
//! This module provides the two kinds of video the workspace can show:
//! - Local clips (MJPEG files, `stub://` synthetic clips, FFmpeg containers
//!   with feature `media-ffmpeg`)
//! - Live cameras (`stub://` synthetic, HTTP MJPEG, V4L2 devices with
//!   feature `camera-v4l2`)
//!
//! Both are driven through `MediaElement`, which mirrors the playback surface
//! the capture loop needs: paused/ended flags, a seekable position, and the
//! pixels currently presented. `VideoSourceManager` owns whichever one is
//! active and guarantees at most one exists.

pub mod camera;
#[cfg(feature = "camera-v4l2")]
pub(crate) mod camera_v4l2;
pub mod clip;
#[cfg(feature = "media-ffmpeg")]
pub(crate) mod clip_ffmpeg;
pub(crate) mod mjpeg;
pub mod source;

use anyhow::Result;
use image::RgbImage;

use crate::geometry::NativeSize;

pub use camera::{CameraConstraints, CameraProvider, DeviceCameraProvider, LiveStream};
pub use clip::{ClipOptions, ClipPlayer};
pub use source::{VideoSource, VideoSourceManager};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Camera,
}

/// Playback surface shared by clips and live streams.
pub trait MediaElement {
    fn kind(&self) -> SourceKind;

    /// Decoded frame size, once known.
    fn decoded_size(&self) -> Option<NativeSize>;

    fn is_paused(&self) -> bool;

    fn is_ended(&self) -> bool;

    /// Playback position in seconds.
    fn current_time(&self) -> f64;

    /// Clip length in seconds; `None` for live streams.
    fn duration(&self) -> Option<f64>;

    fn set_current_time(&mut self, seconds: f64);

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Pixels at the current position.
    fn current_frame(&mut self) -> Result<RgbImage>;

    /// Stop tracks / drop decoders. The element is ended afterwards.
    fn release(&mut self);
}

/// `m:ss` for the playback status line.
pub fn format_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    };
    let minutes = (seconds / 60.0).floor() as u64;
    let rest = (seconds % 60.0).floor() as u64;
    format!("{}:{:02}", minutes, rest)
}

/// Patterned RGB frame used by the `stub://` sources.
pub(crate) fn synthetic_frame(size: NativeSize, frame_index: u64) -> RgbImage {
    let phase = (frame_index % 256) as u32;
    RgbImage::from_fn(size.width, size.height, |x, y| {
        image::Rgb([
            ((x + phase) % 256) as u8,
            ((y + phase / 2) % 256) as u8,
            ((x / 8 + y / 8 + phase) % 256) as u8,
        ])
    })
}
