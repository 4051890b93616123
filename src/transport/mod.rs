//! Detector transport.
//!
//! The streaming controller talks to the detector through `DetectorSocket`,
//! a poll-based view of a WebSocket: binary frames go out, text replies and
//! lifecycle events come back through `poll_event`. `WsConnector` provides the
//! real implementation; tests substitute scripted sockets.

mod endpoint;
mod ws;

use anyhow::Result;
use url::Url;

pub use endpoint::{detect_endpoint, to_ws_url, DETECT_PATH};
pub use ws::{WsConnector, WsSocket};

/// Connection state as seen by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SocketEvent {
    Open,
    /// A text message (binary replies are decoded as UTF-8).
    Message(String),
    Error(String),
    Closed,
}

pub trait DetectorSocket: Send {
    fn ready_state(&self) -> ReadyState;

    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Queue one binary frame. Fails if the socket is not open.
    fn send_binary(&mut self, payload: Vec<u8>) -> Result<()>;

    /// Next pending event, without blocking.
    fn poll_event(&mut self) -> Option<SocketEvent>;

    /// Begin closing. Idempotent.
    fn close(&mut self);
}

pub trait SocketConnector: Send {
    /// Start connecting; the returned socket reports `Open` once ready.
    fn connect(&mut self, url: &Url) -> Result<Box<dyn DetectorSocket>>;
}
