//! Blocking tungstenite client driven from an I/O thread.
//!
//! The thread owns the socket. The caller side only sees channels and an
//! atomic ready state, so polling never blocks the render loop.
//!
//! The handshake runs over a stream with a short read timeout and is retried
//! until it completes, times out or the owner closes the socket. Closing a
//! socket that is still connecting never waits for the peer.

use anyhow::{anyhow, bail, Context, Result};
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tungstenite::handshake::HandshakeError;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use super::{DetectorSocket, ReadyState, SocketConnector, SocketEvent};

const READ_POLL_INTERVAL: Duration = Duration::from_millis(20);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Polls to wait for the peer's close frame before giving up.
const CLOSE_GRACE_POLLS: u32 = 25;

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSING: u8 = 2;
const STATE_CLOSED: u8 = 3;

#[derive(Default)]
pub struct WsConnector;

impl SocketConnector for WsConnector {
    fn connect(&mut self, url: &Url) -> Result<Box<dyn DetectorSocket>> {
        Ok(Box::new(WsSocket::connect(url.clone())?))
    }
}

enum Command {
    Send(Vec<u8>),
    Close,
}

pub struct WsSocket {
    url: Url,
    state: Arc<AtomicU8>,
    /// Set by the worker once the handshake has completed.
    opened: Arc<AtomicBool>,
    commands: Sender<Command>,
    events: Receiver<SocketEvent>,
    worker: Option<JoinHandle<()>>,
}

impl WsSocket {
    pub fn connect(url: Url) -> Result<Self> {
        let state = Arc::new(AtomicU8::new(STATE_CONNECTING));
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let opened = Arc::new(AtomicBool::new(false));

        let worker_state = Arc::clone(&state);
        let worker_opened = Arc::clone(&opened);
        let worker_url = url.clone();
        let worker = thread::Builder::new()
            .name("detector-ws".to_string())
            .spawn(move || {
                run_socket(worker_url, worker_state, worker_opened, command_rx, event_tx)
            })
            .map_err(|e| anyhow!("spawn websocket thread: {}", e))?;

        log::info!("detector: connecting to {}", url);
        Ok(Self {
            url,
            state,
            opened,
            commands: command_tx,
            events: event_rx,
            worker: Some(worker),
        })
    }
}

impl DetectorSocket for WsSocket {
    fn ready_state(&self) -> ReadyState {
        match self.state.load(Ordering::SeqCst) {
            STATE_CONNECTING => ReadyState::Connecting,
            STATE_OPEN => ReadyState::Open,
            STATE_CLOSING => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    fn send_binary(&mut self, payload: Vec<u8>) -> Result<()> {
        if !self.is_open() {
            return Err(anyhow!("detector socket is not open"));
        }
        self.commands
            .send(Command::Send(payload))
            .map_err(|_| anyhow!("detector socket thread has exited"))
    }

    fn poll_event(&mut self) -> Option<SocketEvent> {
        self.events.try_recv().ok()
    }

    fn close(&mut self) {
        let previous = self.state.load(Ordering::SeqCst);
        if previous == STATE_CLOSED || previous == STATE_CLOSING {
            return;
        }
        self.state.store(STATE_CLOSING, Ordering::SeqCst);
        let _ = self.commands.send(Command::Close);
        log::debug!("detector: closing {}", self.url);
    }
}

impl Drop for WsSocket {
    fn drop(&mut self) {
        self.close();
        // A worker still in the handshake aborts on its own once it sees the
        // closing state; only an open socket is worth waiting for.
        if !self.opened.load(Ordering::SeqCst) {
            return;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

fn run_socket(
    url: Url,
    state: Arc<AtomicU8>,
    opened: Arc<AtomicBool>,
    commands: Receiver<Command>,
    events: Sender<SocketEvent>,
) {
    let mut socket = match open_socket(&url, &state) {
        Ok(socket) => socket,
        Err(err) => {
            let cancelled = state.load(Ordering::SeqCst) != STATE_CONNECTING;
            state.store(STATE_CLOSED, Ordering::SeqCst);
            if cancelled {
                log::debug!("detector: connect to {} cancelled", url);
            } else {
                log::warn!("detector: connect to {} failed: {:#}", url, err);
                let _ = events.send(SocketEvent::Error(format!("{:#}", err)));
            }
            let _ = events.send(SocketEvent::Closed);
            return;
        }
    };
    opened.store(true, Ordering::SeqCst);

    if state
        .compare_exchange(STATE_CONNECTING, STATE_OPEN, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        log::info!("detector: connected to {}", url);
        let _ = events.send(SocketEvent::Open);
    }

    let mut close_polls: Option<u32> = None;
    loop {
        if close_polls.is_none() {
            match drain_commands(&mut socket, &commands) {
                Ok(true) => {
                    state.store(STATE_CLOSING, Ordering::SeqCst);
                    let _ = socket.close(None);
                    close_polls = Some(0);
                }
                Ok(false) => {}
                Err(err) => {
                    let _ = events.send(SocketEvent::Error(err.to_string()));
                    break;
                }
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                let _ = events.send(SocketEvent::Message(text));
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => {
                    let _ = events.send(SocketEvent::Message(text));
                }
                Err(_) => log::warn!("detector: dropped non-UTF-8 binary reply"),
            },
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                if let Some(polls) = close_polls.as_mut() {
                    *polls += 1;
                    if *polls >= CLOSE_GRACE_POLLS {
                        break;
                    }
                }
            }
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                break;
            }
            Err(err) => {
                if close_polls.is_none() {
                    log::warn!("detector: socket error: {}", err);
                    let _ = events.send(SocketEvent::Error(err.to_string()));
                }
                break;
            }
        }
    }

    state.store(STATE_CLOSED, Ordering::SeqCst);
    log::info!("detector: connection to {} closed", url);
    let _ = events.send(SocketEvent::Closed);
}

/// Connect and run the handshake, giving up when `state` leaves
/// `STATE_CONNECTING` or the handshake outlives `HANDSHAKE_TIMEOUT`.
fn open_socket(url: &Url, state: &AtomicU8) -> Result<Socket> {
    let stream = connect_tcp(url)?;
    stream
        .set_read_timeout(Some(READ_POLL_INTERVAL))
        .context("set websocket read timeout")?;
    stream
        .set_write_timeout(Some(HANDSHAKE_TIMEOUT))
        .context("set websocket write timeout")?;

    let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
    let mut attempt = tungstenite::client_tls(url.as_str(), stream);
    loop {
        match attempt {
            Ok((socket, _response)) => return Ok(socket),
            Err(HandshakeError::Failure(err)) => bail!("websocket handshake: {}", err),
            Err(HandshakeError::Interrupted(mid)) => {
                if state.load(Ordering::SeqCst) != STATE_CONNECTING {
                    bail!("websocket handshake cancelled");
                }
                if Instant::now() >= deadline {
                    bail!("websocket handshake timed out after {:?}", HANDSHAKE_TIMEOUT);
                }
                attempt = mid.handshake();
            }
        }
    }
}

fn connect_tcp(url: &Url) -> Result<TcpStream> {
    let addrs = url
        .socket_addrs(|| None)
        .with_context(|| format!("resolve {}", url))?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    match last_err {
        Some(err) => Err(anyhow!("connect {}: {}", url, err)),
        None => Err(anyhow!("{} resolved to no addresses", url)),
    }
}

/// Flush queued commands. Returns `true` when a close was requested or the
/// owner went away.
fn drain_commands(socket: &mut Socket, commands: &Receiver<Command>) -> Result<bool> {
    loop {
        match commands.try_recv() {
            Ok(Command::Send(payload)) => {
                socket
                    .send(Message::Binary(payload))
                    .map_err(|e| anyhow!("send frame: {}", e))?;
            }
            Ok(Command::Close) | Err(TryRecvError::Disconnected) => return Ok(true),
            Err(TryRecvError::Empty) => return Ok(false),
        }
    }
}
