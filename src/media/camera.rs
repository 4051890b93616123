//! Live camera streams.
//!
//! `DeviceCameraProvider` turns a configured device string into a running
//! `LiveStream`:
//! - `stub://...` synthetic camera (tests, demos)
//! - `http://` / `https://` MJPEG endpoints (IP cameras, ESP32-CAM)
//! - `/dev/videoN` with feature `camera-v4l2`
//!
//! Every failure to obtain a stream is reported as a camera access error so
//! the workspace can show one message regardless of backend.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::io::Read;
use std::time::Instant;

#[cfg(feature = "camera-v4l2")]
use super::camera_v4l2::V4l2Camera;
use super::mjpeg::{decode_jpeg, MjpegStream};
use super::{synthetic_frame, MediaElement, SourceKind};
use crate::geometry::NativeSize;

pub const CAMERA_ACCESS_ERROR: &str = "unable to access camera; check permissions";

/// Requested capture resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CameraConstraints {
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

impl CameraConstraints {
    pub fn size(&self) -> NativeSize {
        NativeSize::new(self.width, self.height)
    }
}

/// Grants access to a live camera.
pub trait CameraProvider: Send {
    fn request(&mut self, constraints: CameraConstraints) -> Result<LiveStream>;
}

pub struct DeviceCameraProvider {
    device: String,
}

impl DeviceCameraProvider {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl CameraProvider for DeviceCameraProvider {
    fn request(&mut self, constraints: CameraConstraints) -> Result<LiveStream> {
        let backend = open_backend(&self.device, constraints).map_err(|err| {
            log::warn!("camera {}: {:#}", self.device, err);
            err.context(CAMERA_ACCESS_ERROR)
        })?;
        log::info!("camera {}: stream granted", self.device);
        Ok(LiveStream::with_backend(self.device.clone(), backend))
    }
}

fn open_backend(device: &str, constraints: CameraConstraints) -> Result<CameraBackend> {
    if device.starts_with("stub://") {
        return Ok(CameraBackend::Synthetic {
            size: constraints.size(),
            frame_index: 0,
        });
    }
    if device.starts_with("http://") || device.starts_with("https://") {
        return Ok(CameraBackend::Http(HttpCamera::connect(device)?));
    }
    if device.starts_with("/dev/") {
        #[cfg(feature = "camera-v4l2")]
        {
            return Ok(CameraBackend::V4l2(V4l2Camera::open(device, constraints)?));
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            return Err(anyhow!(
                "camera device {} requires the camera-v4l2 feature",
                device
            ));
        }
    }
    Err(anyhow!("unsupported camera device {}", device))
}

/// A running camera stream.
pub struct LiveStream {
    device: String,
    backend: CameraBackend,
    playing: bool,
    started_at: Instant,
}

enum CameraBackend {
    Synthetic { size: NativeSize, frame_index: u64 },
    Http(HttpCamera),
    #[cfg(feature = "camera-v4l2")]
    V4l2(V4l2Camera),
    Stopped,
}

impl LiveStream {
    /// Synthetic stream of the requested size.
    pub fn synthetic(constraints: CameraConstraints) -> Self {
        Self::with_backend(
            "stub://camera".to_string(),
            CameraBackend::Synthetic {
                size: constraints.size(),
                frame_index: 0,
            },
        )
    }

    fn with_backend(device: String, backend: CameraBackend) -> Self {
        Self {
            device,
            backend,
            playing: false,
            started_at: Instant::now(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Stop every track of the stream.
    pub fn stop_tracks(&mut self) {
        if !matches!(self.backend, CameraBackend::Stopped) {
            log::info!("camera {}: tracks stopped", self.device);
        }
        self.backend = CameraBackend::Stopped;
        self.playing = false;
    }
}

impl MediaElement for LiveStream {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn decoded_size(&self) -> Option<NativeSize> {
        match &self.backend {
            CameraBackend::Synthetic { size, .. } => Some(*size),
            CameraBackend::Http(camera) => camera.size,
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::V4l2(camera) => Some(camera.size()),
            CameraBackend::Stopped => None,
        }
    }

    fn is_paused(&self) -> bool {
        !self.playing
    }

    fn is_ended(&self) -> bool {
        matches!(self.backend, CameraBackend::Stopped)
    }

    fn current_time(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn set_current_time(&mut self, _seconds: f64) {}

    fn play(&mut self) -> Result<()> {
        if self.is_ended() {
            return Err(anyhow!("camera {} has been stopped", self.device));
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn current_frame(&mut self) -> Result<RgbImage> {
        match &mut self.backend {
            CameraBackend::Synthetic { size, frame_index } => {
                *frame_index += 1;
                Ok(synthetic_frame(*size, *frame_index))
            }
            CameraBackend::Http(camera) => camera.next_frame(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::V4l2(camera) => camera.next_frame(),
            CameraBackend::Stopped => Err(anyhow!("camera {} has been stopped", self.device)),
        }
    }

    fn release(&mut self) {
        self.stop_tracks();
    }
}

/// Multipart MJPEG over HTTP. Single-JPEG endpoints are polled per frame.
struct HttpCamera {
    url: String,
    stream: Option<MjpegStream>,
    size: Option<NativeSize>,
}

impl HttpCamera {
    fn connect(url: &str) -> Result<Self> {
        let response = ureq::get(url)
            .call()
            .with_context(|| format!("connect to camera stream {}", url))?;
        let content_type = response.header("Content-Type").unwrap_or("");
        let stream = if content_type.to_lowercase().contains("multipart") {
            Some(MjpegStream::new(response.into_reader()))
        } else {
            None
        };
        Ok(Self {
            url: url.to_string(),
            stream,
            size: None,
        })
    }

    fn next_frame(&mut self) -> Result<RgbImage> {
        let jpeg = match &mut self.stream {
            Some(stream) => stream.read_next_jpeg()?,
            None => fetch_single_jpeg(&self.url)?,
        };
        let frame = decode_jpeg(&jpeg)?;
        self.size = Some(NativeSize::new(frame.width(), frame.height()));
        Ok(frame)
    }
}

fn fetch_single_jpeg(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch camera snapshot {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(super::mjpeg::MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read camera snapshot")?;
    Ok(bytes)
}
