//! Per-connection session
//!
//! A session owns one accepted connection and runs on its own thread until
//! the connection fails, the peer closes it, or the server stops it.
//!
//! # Lifecycle
//!
//! ```text
//! 1. Listener accepts a connection and builds a Session
//! 2. start(): peer is added to the registry, session thread is spawned
//! 3. Transmit policy drives the connection (periodic push or request/reply)
//! 4. Policy returns on peer close, send failure or stop()
//! 5. Teardown: socket closed, peer removed from the registry, diagnostic logged
//! ```
//!
//! # Transmit policies
//!
//! | Policy | Trigger | Used by |
//! |--------|---------|---------|
//! | [`Periodic`] | fixed interval, drift-free | NMEA |
//! | [`OnRequest`] | inbound read containing a trigger byte | USV2 |
//!
//! # Status flag
//!
//! The status is stored as a single atomic byte. Toggles are serialized by
//! the session's own lock; the transmit loop reads the byte without locking
//! and may see either value for a frame encoded while a toggle is in flight.

use super::registry::{SessionControl, SessionRegistry};
use crate::error::{Error, Result};
use crate::protocol::{FrameEncoder, StatusFlag, hex_dump};
use log::{debug, error, info, log, warn};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Size of the inbound read buffer
const READ_BUFFER_SIZE: usize = 1024;

/// State of a session visible to other threads
pub struct SessionShared<S: StatusFlag> {
    peer: SocketAddr,
    status: AtomicU8,
    toggle_lock: Mutex<()>,
    /// Clone of the connection, used only to shut it down from `stop()`
    shutdown: TcpStream,
    stopping: AtomicBool,
    _status: PhantomData<fn() -> S>,
}

impl<S: StatusFlag> SessionShared<S> {
    fn new(peer: SocketAddr, status: S, shutdown: TcpStream) -> Self {
        Self {
            peer,
            status: AtomicU8::new(status.to_byte()),
            toggle_lock: Mutex::new(()),
            shutdown,
            stopping: AtomicBool::new(false),
            _status: PhantomData,
        }
    }

    /// Current status, read without taking the lock
    pub fn status(&self) -> S {
        S::from_byte(self.status.load(Ordering::Acquire))
    }

    /// Flip the status under the session lock and return the new value
    pub fn toggle_status(&self) -> S {
        let _guard = self.toggle_lock.lock();
        let next = self.status().toggled();
        self.status.store(next.to_byte(), Ordering::Release);
        info!("New status {} for [{}]", next, self.peer);
        next
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}

impl<S: StatusFlag> SessionControl for SessionShared<S> {
    fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn toggle(&self) -> String {
        self.toggle_status().to_string()
    }

    fn stop(&self) {
        if !self.stopping.swap(true, Ordering::AcqRel) {
            debug!("Stopping session [{}]", self.peer);
            if let Err(e) = self.shutdown.shutdown(Shutdown::Both) {
                debug!("Shutdown of [{}] failed: {}", self.peer, e);
            }
        }
    }
}

/// Result of one read on the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// `n` bytes were read into the buffer
    Data(usize),
    /// Read timed out or was interrupted
    Idle,
    /// Peer closed the connection
    Closed,
}

/// The connection as seen by a transmit policy
pub struct Link<'a, E: FrameEncoder> {
    stream: &'a mut TcpStream,
    encoder: &'a E,
    shared: &'a SessionShared<E::Status>,
    frames_sent: u64,
}

impl<E: FrameEncoder> Link<'_, E> {
    pub fn peer(&self) -> SocketAddr {
        self.shared.peer
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Encode a fresh frame with the current status and write all of it
    pub fn send_frame(&mut self) -> io::Result<()> {
        let frame = self.encoder.encode(self.shared.status());
        self.stream.write_all(&frame)?;
        self.frames_sent += 1;
        log!(
            self.encoder.log_level(),
            "[{}] <-- TX: {}",
            self.shared.peer,
            self.encoder.render(&frame)
        );
        Ok(())
    }

    /// Read once, waiting at most `timeout` (`None` blocks)
    ///
    /// Orderly close and connection reset are both reported as
    /// [`Inbound::Closed`].
    pub fn receive(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<Inbound> {
        if timeout == Some(Duration::ZERO) {
            return Ok(Inbound::Idle);
        }
        self.stream.set_read_timeout(timeout)?;

        match self.stream.read(buf) {
            Ok(0) => Ok(Inbound::Closed),
            Ok(n) => {
                log!(
                    self.encoder.log_level(),
                    "[{}] --> RX: {}",
                    self.shared.peer,
                    hex_dump(&buf[..n])
                );
                Ok(Inbound::Data(n))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(Inbound::Idle)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
                ) =>
            {
                debug!("[{}] connection reset: {}", self.shared.peer, e);
                Ok(Inbound::Closed)
            }
            Err(e) => Err(e),
        }
    }
}

/// What makes a session transmit
///
/// `drive` runs until the session should end: `Ok(())` when the peer closed
/// the connection, `Err` when a read or send failed.
pub trait TransmitPolicy: Send + 'static {
    fn drive<E: FrameEncoder>(&mut self, link: &mut Link<'_, E>) -> io::Result<()>;
}

/// Push one frame every `interval`
///
/// The remainder of each tick is spent reading the socket, so inbound bytes
/// are logged and a peer close ends the session within the current tick.
/// Encoding and send time are absorbed into the tick; a send that takes
/// longer than the interval delays the next tick without catch-up.
#[derive(Debug, Clone, Copy)]
pub struct Periodic {
    interval: Duration,
}

impl Periodic {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl TransmitPolicy for Periodic {
    fn drive<E: FrameEncoder>(&mut self, link: &mut Link<'_, E>) -> io::Result<()> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            let tick = Instant::now();
            link.send_frame()?;

            loop {
                let remaining = self.interval.saturating_sub(tick.elapsed());
                if remaining.is_zero() {
                    break;
                }
                if link.receive(&mut buf, Some(remaining))? == Inbound::Closed {
                    return Ok(());
                }
            }
        }
    }
}

/// Reply with one frame to every read that contains the trigger byte
#[derive(Debug, Clone, Copy)]
pub struct OnRequest {
    trigger: u8,
}

impl OnRequest {
    pub fn new(trigger: u8) -> Self {
        Self { trigger }
    }
}

impl TransmitPolicy for OnRequest {
    fn drive<E: FrameEncoder>(&mut self, link: &mut Link<'_, E>) -> io::Result<()> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match link.receive(&mut buf, None)? {
                Inbound::Closed => return Ok(()),
                Inbound::Data(n) => {
                    if buf[..n].contains(&self.trigger) {
                        link.send_frame()?;
                    }
                }
                Inbound::Idle => {}
            }
        }
    }
}

/// Server side of one accepted connection
pub struct Session<E: FrameEncoder, P: TransmitPolicy> {
    stream: TcpStream,
    shared: Arc<SessionShared<E::Status>>,
    encoder: Arc<E>,
    policy: P,
    registry: Arc<SessionRegistry>,
    last_error: Option<io::Error>,
}

impl<E: FrameEncoder, P: TransmitPolicy> Session<E, P> {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        encoder: Arc<E>,
        policy: P,
        status: E::Status,
        registry: Arc<SessionRegistry>,
    ) -> Result<Self> {
        let shutdown = stream.try_clone()?;
        Ok(Self {
            stream,
            shared: Arc::new(SessionShared::new(peer, status, shutdown)),
            encoder,
            policy,
            registry,
            last_error: None,
        })
    }

    /// Register the session and spawn its thread; returns immediately
    pub fn start(self) -> Result<SessionHandle> {
        let peer = self.shared.peer;
        let control: Arc<dyn SessionControl> = self.shared.clone();

        if !self.registry.add(Arc::clone(&control)) {
            return Err(Error::Other(format!("Session [{}] is already active", peer)));
        }
        info!("{}", self.registry.describe());

        let registry = Arc::clone(&self.registry);
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", E::NAME, peer))
            .spawn(move || self.run());

        match spawned {
            Ok(thread) => Ok(SessionHandle {
                peer,
                control,
                thread,
            }),
            Err(e) => {
                registry.remove(&peer);
                Err(Error::Io(e))
            }
        }
    }

    fn run(mut self) {
        let result = {
            let mut link = Link {
                stream: &mut self.stream,
                encoder: self.encoder.as_ref(),
                shared: self.shared.as_ref(),
                frames_sent: 0,
            };
            let result = self.policy.drive(&mut link);
            debug!("[{}] sent {} frames", link.peer(), link.frames_sent());
            result
        };

        if let Err(e) = result {
            self.last_error = Some(e);
        }
        self.close();
    }

    /// Teardown: runs once, on the session's own thread
    fn close(self) {
        let peer = self.shared.peer;

        if self.shared.is_stopping() {
            info!("Client [{}] connection closed (stopped by server)", peer);
        } else if let Some(ref e) = self.last_error {
            warn!("Client [{}] connection closed ({})", peer, e);
        } else {
            info!("Client [{}] connection closed (closed by peer)", peer);
        }

        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("[{}] shutdown: {}", peer, e);
        }
        drop(self.stream);

        self.registry.remove(&peer);
        info!("{}", self.registry.describe());
    }
}

/// Handle to a running session
pub struct SessionHandle {
    peer: SocketAddr,
    control: Arc<dyn SessionControl>,
    thread: JoinHandle<()>,
}

impl SessionHandle {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Close the connection; the session tears itself down
    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the session thread to exit
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("Session [{}] thread panicked", self.peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FixStatus, NmeaEncoder, Talker};
    use std::net::TcpListener;

    fn socket_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        (server, client, peer)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_toggle_pair_restores_status() {
        let (server, _client, peer) = socket_pair();
        let shutdown = server.try_clone().unwrap();
        let shared = SessionShared::new(peer, FixStatus::Valid, shutdown);

        assert_eq!(shared.toggle_status(), FixStatus::Void);
        assert_eq!(shared.status(), FixStatus::Void);
        assert_eq!(shared.toggle_status(), FixStatus::Valid);
        assert_eq!(shared.status(), FixStatus::Valid);
    }

    #[test]
    fn test_concurrent_toggles_serialize() {
        let (server, _client, peer) = socket_pair();
        let shared = Arc::new(SessionShared::new(
            peer,
            FixStatus::Valid,
            server.try_clone().unwrap(),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for _ in 0..50 {
                        shared.toggle_status();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // 200 toggles: even count, back to the start value
        assert_eq!(shared.status(), FixStatus::Valid);
    }

    #[test]
    fn test_session_registers_and_unregisters() {
        let (server, client, peer) = socket_pair();
        let registry = Arc::new(SessionRegistry::new());
        let session = Session::new(
            server,
            peer,
            Arc::new(NmeaEncoder::new(Talker::Gps, true, false)),
            Periodic::new(Duration::from_millis(100)),
            FixStatus::Valid,
            Arc::clone(&registry),
        )
        .unwrap();

        let handle = session.start().unwrap();
        assert!(registry.contains(&peer));

        drop(client);
        assert!(wait_for(|| registry.count() == 0));
        handle.join();
    }

    #[test]
    fn test_stop_tears_down_session() {
        let (server, _client, peer) = socket_pair();
        let registry = Arc::new(SessionRegistry::new());
        let session = Session::new(
            server,
            peer,
            Arc::new(NmeaEncoder::new(Talker::Gps, true, false)),
            Periodic::new(Duration::from_secs(1)),
            FixStatus::Valid,
            Arc::clone(&registry),
        )
        .unwrap();

        let handle = session.start().unwrap();
        handle.stop();
        assert!(wait_for(|| handle.is_finished()));
        assert_eq!(registry.count(), 0);
        handle.join();
    }
}
