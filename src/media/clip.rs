//! Local clip playback.
//!
//! `ClipPlayer` plays a local video file in wall-clock time and exposes the
//! frame at the current position. Supported inputs:
//! - `stub://clip?frames=N&fps=F&width=W&height=H` synthetic clips (tests)
//! - `.mjpeg` / `.mjpg` files of concatenated JPEG frames
//! - anything FFmpeg can open, with feature `media-ffmpeg`
//!
//! The player never fetches remote URLs and never writes decoded frames.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::Path;
use std::time::Instant;
use url::Url;

#[cfg(feature = "media-ffmpeg")]
use super::clip_ffmpeg::FfmpegClip;
use super::mjpeg::{decode_jpeg, split_jpeg_frames};
use super::{synthetic_frame, MediaElement, SourceKind};
use crate::geometry::NativeSize;

const DEFAULT_STUB_FRAMES: u64 = 250;
const DEFAULT_STUB_FPS: f64 = 25.0;
const DEFAULT_STUB_WIDTH: u32 = 640;
const DEFAULT_STUB_HEIGHT: u32 = 480;

/// Options for clip formats that carry no timing of their own.
#[derive(Clone, Debug)]
pub struct ClipOptions {
    /// Playback rate for MJPEG files.
    pub mjpeg_fps: f64,
}

impl Default for ClipOptions {
    fn default() -> Self {
        Self { mjpeg_fps: 25.0 }
    }
}

pub struct ClipPlayer {
    path: String,
    frames: ClipFrames,
    clock: PlaybackClock,
    cached: Option<(u64, RgbImage)>,
}

enum ClipFrames {
    Synthetic {
        size: NativeSize,
        count: u64,
        fps: f64,
    },
    Mjpeg {
        data: Vec<u8>,
        spans: Vec<(usize, usize)>,
        size: NativeSize,
        fps: f64,
    },
    #[cfg(feature = "media-ffmpeg")]
    Ffmpeg(FfmpegClip),
    Released,
}

impl ClipFrames {
    fn fps(&self) -> f64 {
        match self {
            ClipFrames::Synthetic { fps, .. } | ClipFrames::Mjpeg { fps, .. } => *fps,
            #[cfg(feature = "media-ffmpeg")]
            ClipFrames::Ffmpeg(clip) => clip.fps(),
            ClipFrames::Released => 0.0,
        }
    }

    fn count(&self) -> u64 {
        match self {
            ClipFrames::Synthetic { count, .. } => *count,
            ClipFrames::Mjpeg { spans, .. } => spans.len() as u64,
            #[cfg(feature = "media-ffmpeg")]
            ClipFrames::Ffmpeg(clip) => clip.frame_count(),
            ClipFrames::Released => 0,
        }
    }

    fn size(&self) -> Option<NativeSize> {
        match self {
            ClipFrames::Synthetic { size, .. } | ClipFrames::Mjpeg { size, .. } => Some(*size),
            #[cfg(feature = "media-ffmpeg")]
            ClipFrames::Ffmpeg(clip) => Some(clip.size()),
            ClipFrames::Released => None,
        }
    }

    fn frame_at(&mut self, index: u64) -> Result<RgbImage> {
        match self {
            ClipFrames::Synthetic { size, .. } => Ok(synthetic_frame(*size, index)),
            ClipFrames::Mjpeg { data, spans, .. } => {
                let (start, end) = spans
                    .get(index as usize)
                    .copied()
                    .ok_or_else(|| anyhow!("mjpeg frame {} out of range", index))?;
                decode_jpeg(&data[start..end])
            }
            #[cfg(feature = "media-ffmpeg")]
            ClipFrames::Ffmpeg(clip) => clip.frame_at(index),
            ClipFrames::Released => Err(anyhow!("clip has been released")),
        }
    }
}

impl ClipPlayer {
    pub fn open(path: &str, options: &ClipOptions) -> Result<Self> {
        let frames = if path.starts_with("stub://") {
            open_synthetic(path)?
        } else {
            if !is_local_file_path(path) {
                return Err(anyhow!(
                    "clip playback only supports local paths (no URL schemes)"
                ));
            }
            open_local(Path::new(path), options)?
        };

        let fps = frames.fps();
        if fps <= 0.0 || !fps.is_finite() {
            return Err(anyhow!("clip {} has no usable frame rate", path));
        }
        let duration = frames.count() as f64 / fps;
        log::info!(
            "ClipPlayer: opened {} ({} frames, {:.1} fps, {:.2}s)",
            path,
            frames.count(),
            fps,
            duration
        );
        Ok(Self {
            path: path.to_string(),
            frames,
            clock: PlaybackClock::new(duration),
            cached: None,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.count()
    }

    fn frame_index(&self) -> u64 {
        let count = self.frames.count();
        if count == 0 {
            return 0;
        }
        let index = (self.clock.current_time() * self.frames.fps()).floor() as u64;
        index.min(count - 1)
    }
}

impl MediaElement for ClipPlayer {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn decoded_size(&self) -> Option<NativeSize> {
        self.frames.size()
    }

    fn is_paused(&self) -> bool {
        !self.clock.is_playing()
    }

    fn is_ended(&self) -> bool {
        matches!(self.frames, ClipFrames::Released) || self.clock.is_at_end()
    }

    fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    fn duration(&self) -> Option<f64> {
        Some(self.clock.duration)
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.clock.seek(seconds);
    }

    fn play(&mut self) -> Result<()> {
        if matches!(self.frames, ClipFrames::Released) {
            return Err(anyhow!("cannot play released clip {}", self.path));
        }
        self.clock.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.clock.pause();
    }

    fn current_frame(&mut self) -> Result<RgbImage> {
        let index = self.frame_index();
        if let Some((cached_index, frame)) = &self.cached {
            if *cached_index == index {
                return Ok(frame.clone());
            }
        }
        let frame = self
            .frames
            .frame_at(index)
            .with_context(|| format!("decode frame {} of {}", index, self.path))?;
        self.cached = Some((index, frame.clone()));
        Ok(frame)
    }

    fn release(&mut self) {
        if !matches!(self.frames, ClipFrames::Released) {
            log::info!("ClipPlayer: released {}", self.path);
        }
        self.clock.pause();
        self.frames = ClipFrames::Released;
        self.cached = None;
    }
}

/// Wall-clock playback position.
#[derive(Debug)]
struct PlaybackClock {
    position: f64,
    playing_since: Option<Instant>,
    duration: f64,
}

impl PlaybackClock {
    fn new(duration: f64) -> Self {
        Self {
            position: 0.0,
            playing_since: None,
            duration,
        }
    }

    fn current_time(&self) -> f64 {
        let elapsed = self
            .playing_since
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        (self.position + elapsed).min(self.duration)
    }

    fn is_playing(&self) -> bool {
        self.playing_since.is_some()
    }

    fn is_at_end(&self) -> bool {
        self.duration > 0.0 && self.current_time() >= self.duration
    }

    fn play(&mut self) {
        if self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.position = self.current_time();
        self.playing_since = None;
    }

    fn seek(&mut self, seconds: f64) {
        self.position = seconds.clamp(0.0, self.duration);
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
    }
}

fn open_synthetic(path: &str) -> Result<ClipFrames> {
    let url = Url::parse(path).with_context(|| format!("parse stub clip url {}", path))?;
    let mut count = DEFAULT_STUB_FRAMES;
    let mut fps = DEFAULT_STUB_FPS;
    let mut width = DEFAULT_STUB_WIDTH;
    let mut height = DEFAULT_STUB_HEIGHT;
    for (key, value) in url.query_pairs() {
        let parse_err = || anyhow!("invalid stub clip parameter {}={}", key, value);
        match key.as_ref() {
            "frames" => count = value.parse().map_err(|_| parse_err())?,
            "fps" => fps = value.parse().map_err(|_| parse_err())?,
            "width" => width = value.parse().map_err(|_| parse_err())?,
            "height" => height = value.parse().map_err(|_| parse_err())?,
            _ => {}
        }
    }
    if width == 0 || height == 0 {
        return Err(anyhow!("stub clip dimensions must be non-zero"));
    }
    Ok(ClipFrames::Synthetic {
        size: NativeSize::new(width, height),
        count,
        fps,
    })
}

fn open_local(path: &Path, options: &ClipOptions) -> Result<ClipFrames> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mjpeg" | "mjpg" => {
            let data = std::fs::read(path)
                .with_context(|| format!("read clip {}", path.display()))?;
            let spans = split_jpeg_frames(&data);
            let &(start, end) = spans
                .first()
                .ok_or_else(|| anyhow!("{} contains no jpeg frames", path.display()))?;
            let first = decode_jpeg(&data[start..end])?;
            Ok(ClipFrames::Mjpeg {
                size: NativeSize::new(first.width(), first.height()),
                data,
                spans,
                fps: options.mjpeg_fps,
            })
        }
        _ => {
            #[cfg(feature = "media-ffmpeg")]
            {
                Ok(ClipFrames::Ffmpeg(FfmpegClip::open(path)?))
            }
            #[cfg(not(feature = "media-ffmpeg"))]
            {
                Err(anyhow!(
                    "playing {} requires the media-ffmpeg feature",
                    path.display()
                ))
            }
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    !path.contains("://")
}
