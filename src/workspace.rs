//! The Video ROI workspace.
//!
//! `Workspace` wires the ROI model, the video source, the streaming
//! controller and the stats recorder together and exposes the operations an
//! interface layer calls: source selection, ROI editing, stream toggling,
//! resize/fullscreen, and the per-frame `tick`.
//!
//! Every source change stops and closes the stream, drops the last result and
//! clears the ROI before the new source is opened. Dropping the workspace
//! closes the detector socket.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::fmt;
use std::path::Path;

use crate::auth::AuthEvent;
use crate::geometry::{fit_display_size, DisplayRect, DisplaySize, NativeSize, Point};
use crate::media::{format_time, MediaElement, SourceKind, VideoSourceManager};
use crate::overlay::{rasterize, render_overlay, OverlayInput, OverlayScene};
use crate::roi::{PointerEvent, RoiModel, Tool};
use crate::stats::StatsRecorder;
use crate::stream::{FrameInputs, StreamController, StreamState};

/// Display size before the first decode.
pub const DEFAULT_DISPLAY: DisplaySize = DisplaySize {
    width: 640.0,
    height: 480.0,
};

/// Connection badge shown over the video.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusLabel {
    Connecting,
    SystemActive,
    Ready,
    Disconnected,
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusLabel::Connecting => "Connecting...",
            StatusLabel::SystemActive => "System active",
            StatusLabel::Ready => "Ready",
            StatusLabel::Disconnected => "Disconnected",
        };
        f.write_str(text)
    }
}

pub struct Workspace {
    roi: RoiModel,
    video: VideoSourceManager,
    controller: StreamController,
    stats: Box<dyn StatsRecorder>,
    window: DisplaySize,
    screen: Option<DisplaySize>,
    display: DisplaySize,
    ended_seen: bool,
}

impl Workspace {
    pub fn new(
        video: VideoSourceManager,
        controller: StreamController,
        stats: Box<dyn StatsRecorder>,
        container: DisplaySize,
    ) -> Self {
        Self {
            roi: RoiModel::new(),
            video,
            controller,
            stats,
            window: container,
            screen: None,
            display: DEFAULT_DISPLAY,
            ended_seen: false,
        }
    }

    pub fn roi(&self) -> &RoiModel {
        &self.roi
    }

    pub fn video(&self) -> &VideoSourceManager {
        &self.video
    }

    pub fn controller(&self) -> &StreamController {
        &self.controller
    }

    pub fn display(&self) -> DisplaySize {
        self.display
    }

    pub fn is_fullscreen(&self) -> bool {
        self.screen.is_some()
    }

    fn container(&self) -> DisplaySize {
        self.screen.unwrap_or(self.window)
    }

    /// Native size, falling back to the media's own decode while the manager
    /// has not been told yet.
    pub fn native_size(&self) -> NativeSize {
        let native = self.video.native_size();
        if native.is_known() {
            return native;
        }
        self.video
            .media()
            .and_then(|media| media.decoded_size())
            .unwrap_or(NativeSize::ZERO)
    }

    fn teardown_stream(&mut self) {
        self.controller.stop(self.video.media_mut());
        self.controller.close();
        self.controller.clear_result();
        self.ended_seen = false;
    }

    pub fn select_file(&mut self, path: &str) -> Result<()> {
        self.teardown_stream();
        self.roi.reset();
        self.video.load_file(path)?;
        let name = Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        if let Err(err) = self.stats.increment_video_session(&name) {
            log::warn!("record video session: {:#}", err);
        }
        log::info!("video source: {}", path);
        Ok(())
    }

    /// Open the configured camera. On denial the workspace is left without a
    /// source and the error is returned for display.
    pub fn open_camera(&mut self) -> Result<()> {
        self.teardown_stream();
        self.roi.reset();
        self.video.open_camera()?;
        if let Err(err) = self.stats.increment_camera_session() {
            log::warn!("record camera session: {:#}", err);
        }
        self.recompute_display();
        log::info!("video source: live camera");
        Ok(())
    }

    pub fn clear_video(&mut self) {
        self.teardown_stream();
        self.video.clear();
        self.roi.reset();
        self.display = DEFAULT_DISPLAY;
    }

    /// Clear the ROI after confirmation. The last result is dropped either way.
    pub fn clear_roi<F>(&mut self, confirm: F) -> bool
    where
        F: FnOnce(&str) -> bool,
    {
        self.controller.clear_result();
        self.roi.clear(confirm)
    }

    pub fn undo_roi(&mut self) {
        self.roi.undo();
    }

    pub fn select_tool(&mut self, tool: Tool) -> Tool {
        self.roi.select_tool(tool)
    }

    pub fn pointer(&mut self, event: PointerEvent) {
        self.roi.handle_pointer(event);
    }

    /// Programmatic ROI, as if drawn with the draw tool.
    pub fn set_roi(&mut self, rect: DisplayRect) -> bool {
        let previous = self.roi.tool();
        self.roi.set_tool(Tool::Draw);
        let drawn = self.roi.begin_draw(Point::new(rect.x, rect.y));
        if drawn {
            self.roi
                .update_draw(Point::new(rect.x + rect.width, rect.y + rect.height));
        }
        let committed = drawn && self.roi.commit_draw().is_some();
        self.roi.set_tool(previous);
        committed
    }

    pub fn toggle_stream(&mut self) -> Result<()> {
        self.controller.toggle_stream(self.video.media_mut())
    }

    pub fn resize(&mut self, container: DisplaySize) {
        self.window = container;
        self.recompute_display();
    }

    /// Swap between the window and `screen`. Streaming continues; the loop
    /// picks up the new display size on its next frame.
    pub fn toggle_fullscreen(&mut self, screen: DisplaySize) -> bool {
        self.screen = match self.screen {
            Some(_) => None,
            None => Some(screen),
        };
        self.recompute_display();
        self.is_fullscreen()
    }

    fn recompute_display(&mut self) {
        if let Some(display) = fit_display_size(self.container(), self.native_size()) {
            self.display = display;
        }
    }

    /// Forward the media's decoded size. Returns whether it changed.
    pub fn on_media_decoded(&mut self) -> bool {
        let Some(size) = self.video.media().and_then(|media| media.decoded_size()) else {
            return false;
        };
        let changed = self.video.on_media_decoded(size);
        if changed {
            self.recompute_display();
        }
        changed
    }

    /// End of a file clip stops the stream and closes the socket. Fires once
    /// per end; a rewind re-arms it.
    fn on_media_ended(&mut self) {
        let ended = self
            .video
            .media()
            .map(|media| media.kind() == SourceKind::File && media.is_ended())
            .unwrap_or(false);
        if ended && !self.ended_seen {
            log::info!("video ended");
            self.controller.stop(self.video.media_mut());
            self.controller.close();
        }
        self.ended_seen = ended;
    }

    pub fn pump_socket(&mut self) {
        self.controller
            .pump(self.video.media_mut(), self.stats.as_mut());
    }

    /// Run the capture loop's pending iteration.
    pub fn animation_frame(&mut self) -> bool {
        let native = self.native_size();
        let inputs = FrameInputs {
            media: self.video.media_mut(),
            display: self.display,
            native,
            roi: self.roi.rectangle(),
        };
        self.controller.run_scheduled_frame(inputs)
    }

    /// One display refresh: socket events, decode/end notifications, then
    /// the capture loop.
    pub fn tick(&mut self) -> bool {
        self.pump_socket();
        self.on_media_decoded();
        self.on_media_ended();
        self.animation_frame()
    }

    pub fn handle_auth_event(&mut self, event: &AuthEvent) {
        if matches!(event, AuthEvent::LoggedOut) {
            self.teardown_stream();
            self.roi.reset();
        }
        self.video.on_auth_event(event);
    }

    pub fn overlay(&self) -> OverlayScene {
        render_overlay(&OverlayInput {
            display: self.display,
            native: self.native_size(),
            roi: self.roi.rectangle(),
            draft: self.roi.draft(),
            result: self.controller.last_result(),
        })
    }

    /// Current frame scaled to the display with the overlay drawn on top.
    pub fn snapshot(&mut self) -> Result<RgbImage> {
        let display = self.display;
        let media = self
            .video
            .media_mut()
            .ok_or_else(|| anyhow!("no video source to snapshot"))?;
        let frame = media.current_frame()?;
        let width = display.width.round().max(1.0) as u32;
        let height = display.height.round().max(1.0) as u32;
        let mut canvas = imageops::resize(&frame, width, height, FilterType::Triangle);
        rasterize(&self.overlay(), &mut canvas);
        Ok(canvas)
    }

    pub fn status(&self) -> StatusLabel {
        match self.controller.state() {
            StreamState::Connecting => StatusLabel::Connecting,
            StreamState::Streaming => StatusLabel::SystemActive,
            StreamState::Connected => StatusLabel::Ready,
            StreamState::Idle | StreamState::Error => StatusLabel::Disconnected,
        }
    }

    /// `m:ss / m:ss` for file playback.
    pub fn playback_line(&self) -> Option<String> {
        let media: &dyn MediaElement = self.video.media()?;
        let duration = media.duration()?;
        Some(format!(
            "{} / {}",
            format_time(media.current_time()),
            format_time(duration)
        ))
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.teardown_stream();
    }
}
