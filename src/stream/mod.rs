//! Streaming session controller.
//!
//! Drives the capture → send → receive loop against the detector:
//!
//! ```text
//! Idle ──connect──▶ Connecting ──open──▶ Connected ──start──▶ Streaming
//!   ▲                                       ▲  ◀──────stop──────┘
//!   └──────────── close / remote close ─────┴──── error ──▶ Error
//! ```
//!
//! An error keeps the socket until its close arrives, which settles the
//! controller in `Idle`.
//!
//! Exactly one frame may be in flight: while a reply is outstanding the loop
//! reschedules itself without capturing. All state lives on the controller and
//! is read fresh on every iteration, so geometry and source changes take
//! effect without restarting the stream.

mod scheduler;

use anyhow::Result;
use url::Url;

use crate::capture::{capture, JPEG_QUALITY};
use crate::detect::DetectionResult;
use crate::geometry::{DisplaySize, NativeSize};
use crate::media::{MediaElement, SourceKind};
use crate::roi::RoiRect;
use crate::stats::StatsRecorder;
use crate::transport::{DetectorSocket, ReadyState, SocketConnector, SocketEvent};

pub use scheduler::{FrameRequestId, FrameScheduler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Connected,
    Streaming,
    Error,
}

/// Running totals for status output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamCounters {
    pub frames_sent: u64,
    pub results_received: u64,
    /// Iterations skipped because a reply was still outstanding.
    pub backpressure_skips: u64,
    pub capture_errors: u64,
    pub malformed_results: u64,
    /// Replies that arrived after the stream stopped.
    pub late_results: u64,
}

/// Live inputs for one loop iteration.
pub struct FrameInputs<'a> {
    pub media: Option<&'a mut dyn MediaElement>,
    pub display: DisplaySize,
    pub native: NativeSize,
    pub roi: Option<&'a RoiRect>,
}

pub struct StreamController {
    endpoint: Url,
    connector: Box<dyn SocketConnector>,
    socket: Option<Box<dyn DetectorSocket>>,
    state: StreamState,
    scheduler: FrameScheduler,
    awaiting_response: bool,
    auto_start: bool,
    last_result: Option<DetectionResult>,
    jpeg_quality: u8,
    counters: StreamCounters,
}

impl StreamController {
    pub fn new(endpoint: Url, connector: Box<dyn SocketConnector>) -> Self {
        Self {
            endpoint,
            connector,
            socket: None,
            state: StreamState::Idle,
            scheduler: FrameScheduler::new(),
            awaiting_response: false,
            auto_start: false,
            last_result: None,
            jpeg_quality: JPEG_QUALITY,
            counters: StreamCounters::default(),
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == StreamState::Streaming
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn is_frame_scheduled(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn auto_start_pending(&self) -> bool {
        self.auto_start
    }

    pub fn counters(&self) -> StreamCounters {
        self.counters
    }

    pub fn last_result(&self) -> Option<&DetectionResult> {
        self.last_result.as_ref()
    }

    pub fn clear_result(&mut self) {
        self.last_result = None;
    }

    pub fn socket_state(&self) -> ReadyState {
        self.socket
            .as_ref()
            .map(|socket| socket.ready_state())
            .unwrap_or(ReadyState::Closed)
    }

    fn socket_open(&self) -> bool {
        self.socket_state() == ReadyState::Open
    }

    /// Open the detector socket unless one is already connecting or open.
    pub fn connect(&mut self) -> Result<()> {
        if matches!(
            self.socket_state(),
            ReadyState::Connecting | ReadyState::Open
        ) {
            return Ok(());
        }
        if let Some(mut stale) = self.socket.take() {
            stale.close();
        }
        match self.connector.connect(&self.endpoint) {
            Ok(socket) => {
                self.socket = Some(socket);
                self.awaiting_response = false;
                self.state = StreamState::Connecting;
                Ok(())
            }
            Err(err) => {
                log::warn!("detector: cannot connect to {}: {:#}", self.endpoint, err);
                self.state = StreamState::Error;
                Err(err)
            }
        }
    }

    /// Begin streaming. Requires an open socket and a media element.
    ///
    /// Media that already ended is rewound, so starting after end-of-stream
    /// replays from zero.
    pub fn start(&mut self, media: Option<&mut dyn MediaElement>) -> bool {
        let Some(media) = media else {
            log::warn!("cannot start streaming: no video source");
            return false;
        };
        if !self.socket_open() {
            log::warn!("cannot start streaming: detector socket is not open");
            return false;
        }
        if self.state == StreamState::Streaming {
            return true;
        }
        if media.is_ended() {
            media.set_current_time(0.0);
        }
        if let Err(err) = media.play() {
            log::warn!("cannot start streaming: playback failed: {:#}", err);
            self.stop(Some(media));
            return false;
        }
        self.awaiting_response = false;
        self.state = StreamState::Streaming;
        self.scheduler.request();
        log::info!("streaming to {}", self.endpoint);
        true
    }

    /// Run the pending loop iteration, if any. Returns whether a frame was
    /// sent.
    pub fn run_scheduled_frame(&mut self, inputs: FrameInputs<'_>) -> bool {
        if self.scheduler.take_pending().is_none() || self.state != StreamState::Streaming {
            return false;
        }
        let FrameInputs {
            media,
            display,
            native,
            roi,
        } = inputs;

        if !self.socket_open() {
            log::info!("detector socket no longer open; stopping stream");
            self.stop(media);
            return false;
        }
        let Some(media) = media else {
            self.stop(None);
            return false;
        };
        if media.is_paused() || media.is_ended() {
            log::debug!("video paused or ended; stopping stream");
            self.stop(Some(media));
            return false;
        }
        if self.awaiting_response {
            self.counters.backpressure_skips += 1;
            self.scheduler.request();
            return false;
        }

        let mut sent = false;
        match capture(media, display, native, roi, self.jpeg_quality) {
            Ok(frame) => {
                let crop = frame.crop;
                self.awaiting_response = true;
                let result = match self.socket.as_mut() {
                    Some(socket) => socket.send_binary(frame.jpeg),
                    None => Err(anyhow::anyhow!("detector socket is gone")),
                };
                match result {
                    Ok(()) => {
                        self.counters.frames_sent += 1;
                        log::debug!(
                            "sent frame {}x{} at ({}, {})",
                            crop.width,
                            crop.height,
                            crop.x,
                            crop.y
                        );
                        sent = true;
                    }
                    Err(err) => {
                        self.awaiting_response = false;
                        log::warn!("frame send failed: {:#}", err);
                    }
                }
            }
            Err(err) => {
                self.counters.capture_errors += 1;
                log::error!("frame capture failed: {:#}", err);
            }
        }
        self.scheduler.request();
        sent
    }

    /// Deliver pending socket events.
    pub fn pump(
        &mut self,
        mut media: Option<&mut dyn MediaElement>,
        stats: &mut dyn StatsRecorder,
    ) {
        let mut events = Vec::new();
        if let Some(socket) = self.socket.as_mut() {
            while let Some(event) = socket.poll_event() {
                events.push(event);
            }
        }

        for event in events {
            match event {
                SocketEvent::Open => {
                    log::info!("detector: connected");
                    self.awaiting_response = false;
                    if self.state == StreamState::Connecting {
                        self.state = StreamState::Connected;
                    }
                    if self.auto_start {
                        self.auto_start = false;
                        self.start(reborrow(&mut media));
                    }
                }
                SocketEvent::Message(text) => self.handle_message(&text, stats),
                SocketEvent::Error(message) => {
                    log::warn!("detector socket error: {}", message);
                    self.stop(reborrow(&mut media));
                    self.auto_start = false;
                    self.state = StreamState::Error;
                }
                SocketEvent::Closed => {
                    log::info!("detector socket closed");
                    self.stop(reborrow(&mut media));
                    self.auto_start = false;
                    self.socket = None;
                    self.state = StreamState::Idle;
                    return;
                }
            }
        }
    }

    fn handle_message(&mut self, text: &str, stats: &mut dyn StatsRecorder) {
        if self.state != StreamState::Streaming {
            self.counters.late_results += 1;
            log::debug!("dropping detector reply received while not streaming");
            return;
        }
        self.awaiting_response = false;
        let result = match DetectionResult::parse(text) {
            Ok(result) => result,
            Err(err) => {
                self.counters.malformed_results += 1;
                log::error!("{:#}", err);
                return;
            }
        };
        self.counters.results_received += 1;
        log::debug!(
            "detector reply: {} objects, breach={}",
            result.detections.len(),
            result.breach
        );

        if !result.detections.is_empty() {
            if let Err(err) = stats.increment_detection(result.detections.len()) {
                log::warn!("record detections: {:#}", err);
            }
        }
        if result.confirmed_breach {
            log::warn!("confirmed breach ({} objects)", result.count);
            if let Err(err) = stats.increment_alarm() {
                log::warn!("record alarm: {:#}", err);
            }
        }
        self.last_result = Some(result);
    }

    /// Stop streaming and keep the socket.
    ///
    /// File playback is paused; live cameras keep running.
    pub fn stop(&mut self, media: Option<&mut dyn MediaElement>) {
        let was_streaming = self.state == StreamState::Streaming;
        self.scheduler.cancel_all();
        self.awaiting_response = false;
        self.last_result = None;
        if let Some(media) = media {
            if media.kind() == SourceKind::File {
                media.pause();
            }
        }
        if self.state == StreamState::Streaming {
            self.state = if self.socket_open() {
                StreamState::Connected
            } else {
                StreamState::Idle
            };
        }
        if was_streaming {
            log::info!("streaming stopped");
        }
    }

    /// Close the socket, drop the last result and reset to `Idle`.
    pub fn close(&mut self) {
        self.scheduler.cancel_all();
        self.awaiting_response = false;
        self.auto_start = false;
        self.last_result = None;
        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }
        self.state = StreamState::Idle;
    }

    /// Connect, start or stop depending on the current state.
    pub fn toggle_stream(&mut self, media: Option<&mut dyn MediaElement>) -> Result<()> {
        if self.socket_open() {
            if self.state == StreamState::Streaming {
                self.stop(media);
            } else {
                self.start(media);
            }
            return Ok(());
        }
        if self.socket_state() == ReadyState::Connecting {
            return Ok(());
        }
        self.auto_start = true;
        if let Err(err) = self.connect() {
            self.auto_start = false;
            return Err(err);
        }
        Ok(())
    }
}

/// Shorten the media borrow so the option can be lent out more than once.
fn reborrow<'a>(
    media: &'a mut Option<&mut dyn MediaElement>,
) -> Option<&'a mut dyn MediaElement> {
    media.as_mut().map(|m| &mut **m as &mut dyn MediaElement)
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.close();
    }
}
