//! Operator control surface
//!
//! Commands reach the main loop over a channel from two sources:
//!
//! | Source | Toggle status | Shut down |
//! |--------|---------------|-----------|
//! | Signals | `SIGUSR1` | `SIGINT`, `SIGTERM` |
//! | Hotkeys (terminal only) | Space | Esc, `q`, Ctrl+C |
//!
//! A toggle flips the status of every live session; sessions accepted later
//! still start with the configured status.

use crate::error::{Error, Result};
use crate::logging;
use crate::protocol::FrameEncoder;
use crate::server::{Listener, SessionRegistry, TransmitPolicy};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::{debug, error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
use signal_hook::iterator::{Handle, Signals};
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the main loop checks the listener thread
const DISPATCH_INTERVAL: Duration = Duration::from_millis(100);

/// How long the hotkey thread blocks before re-checking its stop flag
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Flip the status flag of every live session
    ToggleStatus,
    /// Stop accepting, stop all sessions, exit
    Shutdown,
}

/// Map a signal number to a command
pub fn signal_command(signal: i32) -> Option<ControlCommand> {
    match signal {
        SIGINT | SIGTERM => Some(ControlCommand::Shutdown),
        SIGUSR1 => Some(ControlCommand::ToggleStatus),
        _ => None,
    }
}

/// Map a key press to a command
pub fn key_command(key: &KeyEvent) -> Option<ControlCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char(' ') => Some(ControlCommand::ToggleStatus),
        KeyCode::Esc | KeyCode::Char('q') => Some(ControlCommand::Shutdown),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(ControlCommand::Shutdown)
        }
        _ => None,
    }
}

/// Forwards process signals as commands until dropped
pub struct SignalListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalListener {
    pub fn spawn(commands: Sender<ControlCommand>) -> Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGUSR1])?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    let Some(command) = signal_command(signal) else {
                        continue;
                    };
                    info!("Received signal {}, {:?}", signal, command);
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                debug!("Signal handler stopped");
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Puts the terminal in raw mode for its lifetime
struct RawModeGuard(bool);

impl RawModeGuard {
    fn new() -> Self {
        match enable_raw_mode() {
            Ok(()) => {
                logging::set_raw_line_endings(true);
                Self(true)
            }
            Err(e) => {
                warn!("Failed to enable raw mode, hotkeys may need Enter: {}", e);
                Self(false)
            }
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.0 {
            let _ = disable_raw_mode();
            logging::set_raw_line_endings(false);
        }
    }
}

/// Reads single key presses from the terminal until dropped
pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HotkeyListener {
    /// Hotkeys need an interactive terminal on stdin
    pub fn available() -> bool {
        io::stdin().is_terminal()
    }

    pub fn spawn(commands: Sender<ControlCommand>) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("hotkeys".to_string())
            .spawn(move || {
                let _raw = RawModeGuard::new();
                info!("Hotkeys: [Space] toggle status, [Esc]/[q] quit");
                if let Err(e) = Self::read_keys(&commands, &thread_stop) {
                    error!("Hotkey listener error: {}", e);
                }
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    fn read_keys(commands: &Sender<ControlCommand>, stop: &AtomicBool) -> io::Result<()> {
        while !stop.load(Ordering::Relaxed) {
            if !event::poll(KEY_POLL_INTERVAL)? {
                continue;
            }
            if let Event::Key(key) = event::read()?
                && let Some(command) = key_command(&key)
            {
                debug!("Key {:?} -> {:?}", key.code, command);
                if commands.send(command).is_err() {
                    break;
                }
            }
        }
        Ok(())
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Dispatch commands until shutdown is requested or the listener exits,
/// then raise `shutdown`
pub fn dispatch(
    commands: &Receiver<ControlCommand>,
    registry: &SessionRegistry,
    listener: &JoinHandle<Result<()>>,
    shutdown: &AtomicBool,
) {
    loop {
        if listener.is_finished() {
            warn!("Listener thread exited");
            break;
        }
        match commands.recv_timeout(DISPATCH_INTERVAL) {
            Ok(ControlCommand::ToggleStatus) => {
                let toggled = registry.broadcast_toggle();
                info!("Status toggled for {} session(s)", toggled);
            }
            Ok(ControlCommand::Shutdown) => {
                info!("Shutdown requested");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    shutdown.store(true, Ordering::Release);
}

/// Run a bound listener with the control surface until shutdown
///
/// Returns the listener's own result; a clean shutdown is `Ok(())`.
pub fn run<E, P>(listener: Listener<E, P>, hotkeys: bool) -> Result<()>
where
    E: FrameEncoder,
    P: TransmitPolicy + Clone,
{
    let registry = listener.registry();
    let shutdown = Arc::new(AtomicBool::new(false));
    let (tx, rx) = crossbeam_channel::unbounded();

    let _signals = SignalListener::spawn(tx.clone())?;
    let _hotkeys = if hotkeys && HotkeyListener::available() {
        Some(HotkeyListener::spawn(tx.clone())?)
    } else {
        None
    };
    drop(tx);

    let server = listener.spawn(Arc::clone(&shutdown))?;
    dispatch(&rx, &registry, &server, &shutdown);

    let result = server
        .join()
        .map_err(|_| Error::Other("Listener thread panicked".to_string()))?;
    info!("{}", registry.describe());
    result
}
