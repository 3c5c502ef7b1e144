//! Runtime link: the "tab server" socket a running player connects to.
//!
//! The server accepts at most one player connection at a time. Messages are
//! newline-delimited JSON objects tagged with a `kind`. Everything that
//! happens on the socket is reported as a [`LinkEvent`] through a channel,
//! the debug session drains that channel between protocol requests.

use crate::error::Error;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

/// Well-known port the player connects to.
pub const TAB_SERVER_PORT: u16 = 4712;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A single kind-tagged message exchanged with the player. `data` is owned
/// by the player and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkMessage {
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl LinkMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected { id: Uuid, peer: SocketAddr },
    Disconnected { id: Uuid },
    Message { id: Uuid, message: LinkMessage },
}

struct Connection {
    id: Uuid,
    stream: TcpStream,
}

type LiveConnection = Arc<Mutex<Option<Connection>>>;

pub struct TabServer {
    addr: SocketAddr,
    closed: Arc<AtomicBool>,
    live: LiveConnection,
    accept_thread: Option<JoinHandle<()>>,
}

impl TabServer {
    /// Open the listener and start accepting player connections.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<(Self, Receiver<LinkEvent>), Error> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let (events, receiver) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        let live: LiveConnection = Arc::new(Mutex::new(None));

        let accept_thread = {
            let closed = closed.clone();
            let live = live.clone();
            thread::Builder::new()
                .name("tab-server".to_string())
                .spawn(move || accept_loop(listener, closed, live, events))?
        };

        info!(target: "link", "tab server listening on {addr}");
        Ok((
            Self {
                addr,
                closed,
                live,
                accept_thread: Some(accept_thread),
            },
            receiver,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.live
            .lock()
            .map(|live| live.is_some())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a message to the connected player.
    pub fn send(&self, message: &LinkMessage) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::LinkClosed);
        }
        let mut payload = serde_json::to_vec(message)?;
        payload.push(b'\n');

        let live = self.live.lock().map_err(|_| Error::LinkClosed)?;
        let conn = live.as_ref().ok_or(Error::NoRuntime)?;
        let mut stream = &conn.stream;
        stream.write_all(&payload)?;
        stream.flush()?;
        Ok(())
    }

    /// Stop accepting players and drop the live connection. Only the first
    /// call does anything.
    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Ok(mut live) = self.live.lock() {
            if let Some(conn) = live.take() {
                let _ = conn.stream.shutdown(Shutdown::Both);
            }
        }
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        info!(target: "link", "tab server on {} closed", self.addr);
    }
}

impl Drop for TabServer {
    fn drop(&mut self) {
        self.close();
    }
}

fn accept_loop(
    listener: TcpListener,
    closed: Arc<AtomicBool>,
    live: LiveConnection,
    events: Sender<LinkEvent>,
) {
    while !closed.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept() {
            Ok(v) => v,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(err) => {
                warn!(target: "link", "accept failed: {err:#}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
        };

        if let Err(err) = register(stream, peer, &live, &events) {
            warn!(target: "link", "player connection from {peer} dropped: {err:#}");
        }
    }
}

fn register(
    stream: TcpStream,
    peer: SocketAddr,
    live: &LiveConnection,
    events: &Sender<LinkEvent>,
) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;

    let mut slot = live
        .lock()
        .map_err(|_| std::io::Error::other("connection slot poisoned"))?;
    if slot.is_some() {
        warn!(target: "link", "refusing player {peer}: a player is already connected");
        return stream.shutdown(Shutdown::Both);
    }

    let id = Uuid::new_v4();
    let reader = BufReader::new(stream.try_clone()?);
    *slot = Some(Connection { id, stream });
    drop(slot);

    info!(target: "link", "player {peer} connected as {id}");
    let _ = events.send(LinkEvent::Connected { id, peer });

    let live = live.clone();
    let events = events.clone();
    thread::Builder::new()
        .name(format!("tab-conn-{id}"))
        .spawn(move || read_loop(id, reader, live, events))?;
    Ok(())
}

fn read_loop(id: Uuid, reader: BufReader<TcpStream>, live: LiveConnection, events: Sender<LinkEvent>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                debug!(target: "link", "player {id} read error: {err:#}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LinkMessage>(&line) {
            Ok(message) => {
                debug!(target: "link", "player {id} sent `{}`", message.kind);
                let _ = events.send(LinkEvent::Message { id, message });
            }
            Err(err) => warn!(target: "link", "skip malformed message from player {id}: {err}"),
        }
    }

    if let Ok(mut slot) = live.lock() {
        if slot.as_ref().is_some_and(|conn| conn.id == id) {
            *slot = None;
        }
    }
    info!(target: "link", "player {id} disconnected");
    let _ = events.send(LinkEvent::Disconnected { id });
}
