//! # Time-Sync Listener
//!
//! A connection-scoped service that lets a phone push the current time to the
//! clock. The listener walks `Listening → Connected → Disconnecting → Listening`
//! forever:
//!
//! - **Listening**: wait for exactly one inbound link
//! - **Connected**: one read of at most `read_buffer` bytes, decoded as UTF-8 and
//!   trimmed
//! - **Disconnecting**: a non-empty result is handed verbatim to the
//!   [`ClockUpdater`] while our side of the link is shut down
//!
//! Each link belongs to a teardown task from the moment it is accepted. The
//! task does the read, closes our side and then waits until the peer closes
//! the link or the grace deadline passes, whichever comes first. On the
//! deadline the link is dropped (a transport-level close) and the optional
//! disconnect hook is run, e.g. `bluetoothctl disconnect {peer}`. The same
//! deadline bounds the clock update, so neither a silent peer nor a hung
//! clock program can hold the link or the listener past the grace period.
//!
//! Any byte-stream transport can carry the protocol: [`TcpTransport`] ships with
//! the library, and an RFCOMM socket or an in-memory pipe fit the same
//! [`Transport`] shape.

use crate::clock::{ClockApplyError, ClockUpdater};
use log::{debug, info, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};

/// Per-connection limits and teardown behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Maximum bytes taken from the single read
    pub read_buffer: usize,
    /// Hard upper bound on a link's lifetime, measured from accept
    pub grace_period: Duration,
    /// Command run after a forced teardown; `{peer}` is replaced by the peer id
    pub disconnect_command: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            read_buffer: 1024,
            grace_period: Duration::from_secs(15),
            disconnect_command: None,
        }
    }
}

/// The listening service could not be opened. This is the only fatal error.
#[derive(Error, Debug)]
#[error("could not listen on {addr}: {source}")]
pub struct TransportBindError {
    pub addr: String,
    #[source]
    pub source: io::Error,
}

/// Reading the candidate time from a link failed. The link is still closed and
/// the listener keeps accepting.
#[derive(Error, Debug)]
pub enum ConnectionReadError {
    #[error("nothing received before the grace deadline")]
    TimedOut,

    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error("payload is not valid UTF-8: {0}")]
    Malformed(#[from] std::str::Utf8Error),
}

/// A connected byte stream.
pub trait Link: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Link for T {}

/// Source of inbound links.
pub trait Transport: Send + 'static {
    type Link: Link;

    /// Wait for the next link. Returns it with a printable peer identifier.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Link, String)>> + Send;
}

/// TCP stand-in for the wireless serial link.
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    pub async fn bind(addr: &str) -> Result<Self, TransportBindError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportBindError {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for TcpTransport {
    type Link = TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, String)>> + Send {
        async move {
            let (stream, addr) = self.listener.accept().await?;
            Ok((stream, addr.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerPhase {
    Listening,
    Connected,
    Disconnecting,
}

/// How a serviced link ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The peer closed (or errored) before the deadline
    PeerClosed,
    /// The deadline passed and the link was dropped
    Forced,
}

/// One serviced connection.
#[derive(Debug)]
pub struct Session {
    pub peer: String,
    /// Trimmed text received, if the read succeeded
    pub candidate: Option<String>,
    /// The clock updater accepted the candidate
    pub applied: bool,
    /// Resolves once the link is fully closed
    pub teardown: JoinHandle<Teardown>,
}

pub struct TimeSyncListener<T, C> {
    transport: T,
    clock: Arc<C>,
    settings: SyncSettings,
    phase: ListenerPhase,
}

impl<T: Transport, C: ClockUpdater> TimeSyncListener<T, C> {
    pub fn new(transport: T, clock: Arc<C>, settings: SyncSettings) -> Self {
        Self {
            transport,
            clock,
            settings,
            phase: ListenerPhase::Listening,
        }
    }

    pub fn phase(&self) -> ListenerPhase {
        self.phase
    }

    /// Accept and service exactly one link.
    ///
    /// The link goes to its teardown task as soon as it is accepted, so the
    /// grace deadline holds even while the clock update is still running.
    /// Returns once the candidate has been applied or the deadline has passed;
    /// it does not wait for the teardown.
    pub async fn serve_next(&mut self) -> io::Result<Session> {
        self.phase = ListenerPhase::Listening;
        let (link, peer) = self.transport.accept().await?;
        let deadline = Instant::now() + self.settings.grace_period;
        self.phase = ListenerPhase::Connected;
        info!("Time sync connection from {}", peer);

        let (received_tx, received_rx) = oneshot::channel();
        let teardown = tokio::spawn(supervise(
            link,
            peer.clone(),
            deadline,
            self.settings.read_buffer,
            received_tx,
            self.settings.disconnect_command.clone(),
        ));

        // A dropped sender means the deadline cut the read short
        let received = received_rx.await.unwrap_or(Err(ConnectionReadError::TimedOut));
        let candidate = match received {
            Ok(text) if text.is_empty() => {
                debug!("{} sent nothing usable", peer);
                None
            }
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Reading from {} failed: {}", peer, e);
                None
            }
        };

        self.phase = ListenerPhase::Disconnecting;
        let applied = match &candidate {
            Some(text) => match self.apply(text.clone(), deadline).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Clock update for {} failed: {}", peer, e);
                    false
                }
            },
            None => false,
        };
        self.phase = ListenerPhase::Listening;

        Ok(Session {
            peer,
            candidate,
            applied,
            teardown,
        })
    }

    /// Run the updater off the runtime, giving up at `deadline`. A clock
    /// program that overruns keeps running on the blocking pool.
    async fn apply(&self, candidate: String, deadline: Instant) -> Result<(), ClockApplyError> {
        let clock = Arc::clone(&self.clock);
        let update = tokio::task::spawn_blocking(move || clock.apply_time(&candidate));
        match timeout_at(deadline, update).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ClockApplyError::Spawn {
                program: "clock update task".to_string(),
                source: io::Error::other(e),
            }),
            Err(_) => Err(ClockApplyError::TimedOut(self.settings.grace_period)),
        }
    }

    /// Service links forever.
    pub async fn run(mut self) {
        info!("Time sync listener ready");
        loop {
            match self.serve_next().await {
                Ok(session) => debug!("Finished serving {}", session.peer),
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

async fn read_candidate<L: Link>(link: &mut L, capacity: usize) -> Result<String, ConnectionReadError> {
    let mut buf = vec![0u8; capacity];
    let n = link.read(&mut buf).await?;
    let text = std::str::from_utf8(&buf[..n])?;
    Ok(text.trim().to_string())
}

/// Own the link from accept until the peer closes it or `deadline` passes.
///
/// The single read happens here and its result goes back through `received`;
/// our side is shut down right after. When the deadline wins, `received` is
/// dropped unsent if the read was still pending.
async fn supervise<L: Link>(
    mut link: L,
    peer: String,
    deadline: Instant,
    read_buffer: usize,
    received: oneshot::Sender<Result<String, ConnectionReadError>>,
    disconnect_command: Option<String>,
) -> Teardown {
    let service = async {
        let result = read_candidate(&mut link, read_buffer).await;
        // The listener may already have stopped waiting
        let _ = received.send(result);
        match link.shutdown().await {
            Ok(()) => debug!("Closed our side of {}", peer),
            Err(e) => debug!("Shutting down {} failed: {}", peer, e),
        }
        drain(&mut link).await;
    };

    let outcome = tokio::select! {
        _ = service => Teardown::PeerClosed,
        _ = sleep_until(deadline) => Teardown::Forced,
    };
    drop(link);

    match outcome {
        Teardown::PeerClosed => debug!("{} closed the link", peer),
        Teardown::Forced => {
            info!("Grace period over, dropped link to {}", peer);
            if let Some(template) = disconnect_command {
                disconnect_peer(&template, &peer).await;
            }
        }
    }
    outcome
}

/// Discard input until EOF or an error.
async fn drain<L: Link>(link: &mut L) {
    let mut scratch = [0u8; 64];
    loop {
        match link.read(&mut scratch).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

async fn disconnect_peer(template: &str, peer: &str) {
    let mut parts = template
        .split_whitespace()
        .map(|part| part.replace("{peer}", peer));
    let Some(program) = parts.next() else {
        return;
    };

    match Command::new(&program).args(parts).status().await {
        Ok(status) if status.success() => debug!("Disconnected {} with {}", peer, program),
        Ok(status) => warn!("{} exited with {} for {}", program, status, peer),
        Err(e) => warn!("Could not run {}: {}", program, e),
    }
}
