//! Scripted detector socket, clip and stats recorder for the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use url::Url;

use perimeter_roi::stats::StatsRecorder;
use perimeter_roi::transport::{DetectorSocket, ReadyState, SocketConnector, SocketEvent};
use perimeter_roi::{MediaElement, NativeSize, SourceKind};

#[derive(Default)]
pub struct SocketScript {
    pub ready: Option<ReadyState>,
    pub events: VecDeque<SocketEvent>,
    pub sent: Vec<Vec<u8>>,
    pub connects: usize,
    pub closes: usize,
}

/// Handle the test keeps to drive the socket from the outside.
#[derive(Clone, Default)]
pub struct SocketHandle(pub Arc<Mutex<SocketScript>>);

impl SocketHandle {
    pub fn connector(&self) -> Box<dyn SocketConnector> {
        Box::new(ScriptedConnector {
            script: self.clone(),
            refuse: false,
        })
    }

    pub fn refusing_connector(&self) -> Box<dyn SocketConnector> {
        Box::new(ScriptedConnector {
            script: self.clone(),
            refuse: true,
        })
    }

    pub fn open(&self) {
        let mut script = self.0.lock().unwrap();
        script.ready = Some(ReadyState::Open);
        script.events.push_back(SocketEvent::Open);
    }

    pub fn reply(&self, payload: &str) {
        self.0
            .lock()
            .unwrap()
            .events
            .push_back(SocketEvent::Message(payload.to_string()));
    }

    pub fn fail(&self, message: &str) {
        let mut script = self.0.lock().unwrap();
        script.ready = Some(ReadyState::Closed);
        script
            .events
            .push_back(SocketEvent::Error(message.to_string()));
    }

    pub fn remote_close(&self) {
        let mut script = self.0.lock().unwrap();
        script.ready = Some(ReadyState::Closed);
        script.events.push_back(SocketEvent::Closed);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().sent.clone()
    }

    pub fn connects(&self) -> usize {
        self.0.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }
}

struct ScriptedConnector {
    script: SocketHandle,
    refuse: bool,
}

impl SocketConnector for ScriptedConnector {
    fn connect(&mut self, _url: &Url) -> Result<Box<dyn DetectorSocket>> {
        if self.refuse {
            return Err(anyhow!("connection refused"));
        }
        {
            let mut script = self.script.0.lock().unwrap();
            script.connects += 1;
            script.ready = Some(ReadyState::Connecting);
        }
        Ok(Box::new(ScriptedSocket {
            script: self.script.clone(),
        }))
    }
}

struct ScriptedSocket {
    script: SocketHandle,
}

impl DetectorSocket for ScriptedSocket {
    fn ready_state(&self) -> ReadyState {
        self.script
            .0
            .lock()
            .unwrap()
            .ready
            .unwrap_or(ReadyState::Closed)
    }

    fn send_binary(&mut self, payload: Vec<u8>) -> Result<()> {
        let mut script = self.script.0.lock().unwrap();
        if script.ready != Some(ReadyState::Open) {
            return Err(anyhow!("socket is not open"));
        }
        script.sent.push(payload);
        Ok(())
    }

    fn poll_event(&mut self) -> Option<SocketEvent> {
        self.script.0.lock().unwrap().events.pop_front()
    }

    fn close(&mut self) {
        let mut script = self.script.0.lock().unwrap();
        script.closes += 1;
        script.ready = Some(ReadyState::Closed);
    }
}

/// A file clip whose clock only moves when the test says so.
pub struct FakeClip {
    pub size: NativeSize,
    pub time: f64,
    pub duration: f64,
    pub playing: bool,
    pub released: bool,
}

impl FakeClip {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: NativeSize::new(width, height),
            time: 0.0,
            duration: 10.0,
            playing: false,
            released: false,
        }
    }

    pub fn finish(&mut self) {
        self.time = self.duration;
        self.playing = false;
    }
}

impl MediaElement for FakeClip {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn decoded_size(&self) -> Option<NativeSize> {
        Some(self.size)
    }

    fn is_paused(&self) -> bool {
        !self.playing
    }

    fn is_ended(&self) -> bool {
        self.released || self.time >= self.duration
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn duration(&self) -> Option<f64> {
        Some(self.duration)
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.time = seconds.clamp(0.0, self.duration);
    }

    fn play(&mut self) -> Result<()> {
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn current_frame(&mut self) -> Result<RgbImage> {
        Ok(RgbImage::new(self.size.width, self.size.height))
    }

    fn release(&mut self) {
        self.released = true;
        self.playing = false;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub detections: usize,
    pub alarms: usize,
    pub video_sessions: Vec<String>,
    pub camera_sessions: usize,
}

/// Stats recorder that keeps its counts where the test can see them.
#[derive(Clone, Default)]
pub struct TallyRecorder(pub Arc<Mutex<Tally>>);

impl TallyRecorder {
    pub fn tally(&self) -> Tally {
        self.0.lock().unwrap().clone()
    }
}

impl StatsRecorder for TallyRecorder {
    fn increment_detection(&mut self, count: usize) -> Result<()> {
        self.0.lock().unwrap().detections += count;
        Ok(())
    }

    fn increment_alarm(&mut self) -> Result<()> {
        self.0.lock().unwrap().alarms += 1;
        Ok(())
    }

    fn increment_video_session(&mut self, name: &str) -> Result<()> {
        self.0.lock().unwrap().video_sessions.push(name.to_string());
        Ok(())
    }

    fn increment_camera_session(&mut self) -> Result<()> {
        self.0.lock().unwrap().camera_sessions += 1;
        Ok(())
    }
}

pub fn endpoint() -> Url {
    Url::parse("ws://127.0.0.1:8000/api/v1/ws/detect").unwrap()
}
