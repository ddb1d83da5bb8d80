//! TCP accept loop
//!
//! The listening socket is built with socket2 so the address is reusable
//! immediately after a restart and the backlog is configurable. Readiness is
//! polled with mio using a bounded timeout so the loop notices a shutdown
//! request within [`POLL_TIMEOUT`] even when no client ever connects.
//!
//! Each accepted connection gets its own [`Session`]; the listener never
//! touches a connection after handing it over.

use super::registry::SessionRegistry;
use super::session::{Session, SessionHandle, TransmitPolicy};
use crate::error::{Error, Result};
use crate::protocol::FrameEncoder;
use log::{debug, error, info, warn};
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const LISTENER: Token = Token(0);

/// Upper bound on how long a shutdown request can go unnoticed
pub const POLL_TIMEOUT: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 16;

/// What to do after a failed `accept`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptStep {
    /// Queue is empty; wait for the next readiness event
    Drained,
    /// Transient failure for one connection; keep accepting
    Again,
    /// Queue may still hold connections; retry on the next wakeup
    Retry,
}

fn accept_step(e: &io::Error) -> AcceptStep {
    match e.kind() {
        io::ErrorKind::WouldBlock => AcceptStep::Drained,
        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted => AcceptStep::Again,
        _ => AcceptStep::Retry,
    }
}

/// Resolve `host:port` to the first matching socket address
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::InvalidAddress(format!("{}:{} ({})", host, port, e)))?
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("{}:{}", host, port)))
}

/// Accepts connections and spawns one session per client
pub struct Listener<E: FrameEncoder, P: TransmitPolicy + Clone> {
    listener: TcpListener,
    /// Registered with `poll`; shares the socket with `listener`
    _source: mio::net::TcpListener,
    poll: Poll,
    local_addr: SocketAddr,
    encoder: Arc<E>,
    policy: P,
    status: E::Status,
    registry: Arc<SessionRegistry>,
    sessions: Vec<SessionHandle>,
    /// Set when an accept failed with connections possibly still queued;
    /// no further readiness event arrives for those
    accept_retry: bool,
}

impl<E: FrameEncoder, P: TransmitPolicy + Clone> Listener<E, P> {
    /// Bind and listen on `addr`
    ///
    /// Every session accepted later starts with `status` and its own copy
    /// of `policy`.
    pub fn bind(
        addr: SocketAddr,
        backlog: i32,
        encoder: E,
        policy: P,
        status: E::Status,
    ) -> Result<Self> {
        let listener = Self::listen(addr, backlog).map_err(|source| {
            error!("Failed to bind to {}: {}", addr, source);
            Error::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        let mut source = mio::net::TcpListener::from_std(listener.try_clone()?);
        poll.registry()
            .register(&mut source, LISTENER, Interest::READABLE)?;

        Ok(Self {
            listener,
            _source: source,
            poll,
            local_addr,
            encoder: Arc::new(encoder),
            policy,
            status,
            registry: Arc::new(SessionRegistry::new()),
            sessions: Vec::new(),
            accept_retry: false,
        })
    }

    fn listen(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog)?;

        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        Ok(listener)
    }

    /// Bound address; differs from the requested one when port 0 was asked for
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `shutdown` is set, then stop every session
    /// and wait for them to finish
    pub fn serve(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        info!(
            "{} server listening on {}",
            E::NAME.to_uppercase(),
            self.local_addr
        );

        while !shutdown.load(Ordering::Acquire) {
            if let Err(e) = self.poll_once(&mut events) {
                self.shutdown_sessions();
                return Err(e);
            }
        }

        info!("{} server shutting down", E::NAME.to_uppercase());
        self.shutdown_sessions();
        Ok(())
    }

    /// Run [`Listener::serve`] on a named thread
    pub fn spawn(mut self, shutdown: Arc<AtomicBool>) -> Result<JoinHandle<Result<()>>> {
        let handle = thread::Builder::new()
            .name(format!("{}-listener", E::NAME))
            .spawn(move || self.serve(&shutdown))?;
        Ok(handle)
    }

    /// Wait up to [`POLL_TIMEOUT`], accept what is queued and reap
    /// finished sessions
    fn poll_once(&mut self, events: &mut Events) -> Result<()> {
        if let Err(e) = self.poll.poll(events, Some(POLL_TIMEOUT)) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(e.into());
        }

        if self.accept_retry || events.iter().any(|event| event.token() == LISTENER) {
            self.accept_pending();
        }
        self.reap_finished();
        Ok(())
    }

    /// Drain the accept queue; readiness is edge-triggered
    fn accept_pending(&mut self) {
        self.accept_retry = false;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.spawn_session(stream, peer),
                Err(e) => match accept_step(&e) {
                    AcceptStep::Drained => break,
                    AcceptStep::Again => {
                        debug!("Accept interrupted: {}", e);
                        continue;
                    }
                    AcceptStep::Retry => {
                        error!("Accept error: {}", e);
                        self.accept_retry = true;
                        break;
                    }
                },
            }
        }
    }

    fn spawn_session(&mut self, stream: TcpStream, peer: SocketAddr) {
        info!("Connection detected from [{}]", peer);

        if let Err(e) = stream.set_nonblocking(false) {
            error!("Failed to set [{}] to blocking mode: {}", peer, e);
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for [{}]: {}", peer, e);
        }

        let session = Session::new(
            stream,
            peer,
            Arc::clone(&self.encoder),
            self.policy.clone(),
            self.status,
            Arc::clone(&self.registry),
        );

        match session.and_then(Session::start) {
            Ok(handle) => self.sessions.push(handle),
            Err(e) => error!("Failed to start session for [{}]: {}", peer, e),
        }
    }

    fn reap_finished(&mut self) {
        let (finished, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.sessions)
            .into_iter()
            .partition(SessionHandle::is_finished);
        self.sessions = live;

        for handle in finished {
            debug!("Reaped session [{}]", handle.peer());
            handle.join();
        }
    }

    fn shutdown_sessions(&mut self) {
        let stopped = self.registry.stop_all();
        if stopped > 0 {
            info!("Stopping {} session(s)", stopped);
        }
        for handle in self.sessions.drain(..) {
            handle.stop();
            handle.join();
        }
    }
}
