//! Shared helpers: run a listener on an ephemeral loopback port and talk to
//! it with plain `TcpStream` clients.

#![allow(dead_code)]

use nav_emu::EmulatorConfig;
use nav_emu::protocol::FrameEncoder;
use nav_emu::server::{Listener, SessionRegistry, TransmitPolicy};
use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A listener running on its own thread; shut down and joined on drop
pub struct RunningServer {
    pub addr: SocketAddr,
    pub registry: Arc<SessionRegistry>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<nav_emu::Result<()>>>,
}

impl RunningServer {
    pub fn start<E, P>(listener: Listener<E, P>) -> Self
    where
        E: FrameEncoder,
        P: TransmitPolicy + Clone,
    {
        let addr = listener.local_addr();
        let registry = listener.registry();
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread = listener
            .spawn(Arc::clone(&shutdown))
            .expect("spawn listener");
        Self {
            addr,
            registry,
            shutdown,
            thread: Some(thread),
        }
    }

    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(3)))
            .unwrap();
        stream
    }

    /// Connect and wait until the session is registered
    pub fn connect_registered(&self) -> TcpStream {
        let before = self.registry.count();
        let stream = self.connect();
        let local = stream.local_addr().unwrap();
        assert!(
            wait_for(Duration::from_secs(3), || self.registry.contains(&local)),
            "session for {} never registered (had {})",
            local,
            before
        );
        stream
    }

    pub fn stop(mut self) -> nav_emu::Result<()> {
        self.shutdown.store(true, Ordering::Release);
        self.thread
            .take()
            .expect("listener thread")
            .join()
            .expect("listener thread panicked")
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Config bound to an ephemeral loopback port
pub fn loopback_config() -> EmulatorConfig {
    let mut config = EmulatorConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = Some(0);
    config
}

pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Read one `\r\n`-terminated NMEA line
pub fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).expect("read line");
    assert!(n > 0, "connection closed");
    String::from_utf8(line).expect("ASCII line")
}

/// Recompute the XOR checksum of `$...*XX\r\n` and compare
pub fn checksum_ok(line: &str) -> bool {
    let (Some(star), true) = (line.find('*'), line.starts_with('$')) else {
        return false;
    };
    let expected = line[1..star].bytes().fold(0u8, |acc, b| acc ^ b);
    line.get(star + 1..star + 3) == Some(format!("{:02X}", expected).as_str())
}
