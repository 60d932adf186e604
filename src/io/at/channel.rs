// src/io/at/channel.rs
//
// Half-duplex AT command channel. One pump consumes lines from the
// transport and classifies them; callers of command() serialize on a
// command gate and block until a terminator resolves their request.
//
// Two pumping modes, chosen at construction:
//   Driven      the calling thread pumps inline while waiting
//   Background  a dedicated reader thread pumps continuously
//
// The pending command and its completion signal are the only state shared
// between the reader role and waiting callers; both live under one mutex
// with one condvar.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;

use log::{debug, error, info};

use super::codec::{self, LineClass};
use crate::io::error::AtError;
use crate::io::LineTransport;

/// Who drives the pump while a command waits for its terminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    /// `command()` pumps the transport inline on the calling thread.
    Driven,
    /// A dedicated reader started with `run_background()` pumps; callers
    /// block on the completion signal.
    Background,
}

type NotificationSink = Box<dyn Fn(&str) + Send + Sync>;

/// Resolution state of the at-most-one in-flight command.
enum Pending {
    /// No command in flight; payload lines are unsolicited and dropped.
    Idle,
    /// Accumulating response fragments for the waiting caller.
    Collecting(Vec<String>),
    /// Terminator observed; outcome waiting to be consumed by the caller.
    Done(Result<Vec<String>, AtError>),
}

struct PumpShared {
    pending: Pending,
    /// Set once on the first unrecoverable transport failure; every
    /// subsequent command fails with a clone of it.
    fatal: Option<AtError>,
}

impl PumpShared {
    fn take_outcome(&mut self) -> Result<Vec<String>, AtError> {
        match std::mem::replace(&mut self.pending, Pending::Idle) {
            Pending::Done(outcome) => outcome,
            _ => Err(self
                .fatal
                .clone()
                .unwrap_or_else(|| AtError::Transport("channel closed".to_string()))),
        }
    }
}

struct Inner<T: LineTransport> {
    transport: T,
    mode: ChannelMode,
    shared: Mutex<PumpShared>,
    resolved: Condvar,
    command_gate: Mutex<()>,
    sink: RwLock<Option<NotificationSink>>,
    stop: AtomicBool,
    reader_running: AtomicBool,
    closed: AtomicBool,
}

impl<T: LineTransport> Inner<T> {
    fn lock_shared(&self) -> MutexGuard<'_, PumpShared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read one line and apply the classification table. Never blocks
    /// longer than the transport read timeout.
    fn pump_once(&self) -> Result<(), AtError> {
        let line = match self.transport.read_line() {
            Ok(Some(line)) => line,
            // Timeout with no data; the pump loop simply repeats
            Ok(None) => return Ok(()),
            Err(e) => {
                self.poison(e.clone());
                return Err(e);
            }
        };

        match codec::classify(&line) {
            LineClass::Empty => {}
            LineClass::Status => debug!("dropping status line {:?}", line),
            LineClass::Comment => debug!("dropping comment {:?}", line),
            LineClass::Payload => {
                {
                    let sink = self.sink.read().unwrap_or_else(|e| e.into_inner());
                    if let Some(handler) = sink.as_ref() {
                        // Exclusive destination: correlation is skipped
                        handler(&line);
                        return Ok(());
                    }
                }

                let mut shared = self.lock_shared();
                match &mut shared.pending {
                    Pending::Collecting(lines) => {
                        if line == codec::TERMINATOR_OK {
                            let lines = std::mem::take(lines);
                            shared.pending = Pending::Done(Ok(lines));
                            self.resolved.notify_all();
                        } else if line == codec::TERMINATOR_ERROR {
                            shared.pending = Pending::Done(Err(AtError::Command));
                            self.resolved.notify_all();
                        } else {
                            lines.push(line);
                        }
                    }
                    _ => debug!("dropping unsolicited line {:?}", line),
                }
            }
        }

        Ok(())
    }

    /// Record a fatal transport failure, fail the waiting caller, and
    /// close the device. The channel refuses further commands afterwards.
    fn poison(&self, err: AtError) {
        error!("channel fatal: {}", err);
        self.fail_pending(err);
    }

    fn fail_pending(&self, err: AtError) {
        {
            let mut shared = self.lock_shared();
            if shared.fatal.is_none() {
                shared.fatal = Some(err.clone());
            }
            if let Pending::Collecting(_) = shared.pending {
                shared.pending = Pending::Done(Err(err));
            }
            self.resolved.notify_all();
        }
        self.transport.close();
    }
}

/// Synchronous AT command channel over a line transport.
pub struct AtChannel<T: LineTransport> {
    inner: Arc<Inner<T>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl<T: LineTransport> AtChannel<T> {
    pub fn new(transport: T, mode: ChannelMode) -> Self {
        AtChannel {
            inner: Arc::new(Inner {
                transport,
                mode,
                shared: Mutex::new(PumpShared {
                    pending: Pending::Idle,
                    fatal: None,
                }),
                resolved: Condvar::new(),
                command_gate: Mutex::new(()),
                sink: RwLock::new(None),
                stop: AtomicBool::new(false),
                reader_running: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
            reader: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> ChannelMode {
        self.inner.mode
    }

    /// Read and classify at most one line. Public so a driven-mode owner
    /// can service unsolicited traffic between commands.
    pub fn pump_once(&self) -> Result<(), AtError> {
        self.inner.pump_once()
    }

    /// Issue one command and block until the device resolves it.
    ///
    /// `body` is the command without the protocol prefix or terminator;
    /// the channel writes `AT{body}\r\n`. Exactly one command is in flight
    /// system-wide: concurrent callers block until the gate is free.
    /// Returns the accumulated response lines (empty for "OK with no
    /// output"), `Command` when the device replied `ERROR`, or the fatal
    /// transport error.
    pub fn command(&self, body: &str) -> Result<Vec<String>, AtError> {
        let inner = &self.inner;

        {
            let sink = inner.sink.read().unwrap_or_else(|e| e.into_inner());
            if sink.is_some() {
                // With a sink registered no terminator can ever be
                // correlated; refuse instead of blocking forever.
                return Err(AtError::SinkActive);
            }
        }

        let _gate = inner.command_gate.lock().unwrap_or_else(|e| e.into_inner());

        if inner.mode == ChannelMode::Background
            && !inner.reader_running.load(Ordering::SeqCst)
        {
            if let Some(e) = inner.lock_shared().fatal.clone() {
                return Err(e);
            }
            return Err(AtError::Config(
                "background reader is not running".to_string(),
            ));
        }

        {
            let mut shared = inner.lock_shared();
            if let Some(e) = shared.fatal.clone() {
                return Err(e);
            }
            // Clears any stale completion from a previous command
            shared.pending = Pending::Collecting(Vec::new());
        }

        let framed = codec::frame_command(body);
        debug!("command {}", framed);
        if let Err(e) = inner.transport.write_line(&framed) {
            inner.poison(e.clone());
            inner.lock_shared().pending = Pending::Idle;
            return Err(e);
        }

        match inner.mode {
            ChannelMode::Background => {
                let mut shared = inner.lock_shared();
                while matches!(shared.pending, Pending::Collecting(_)) {
                    shared = inner
                        .resolved
                        .wait(shared)
                        .unwrap_or_else(|e| e.into_inner());
                }
                shared.take_outcome()
            }
            ChannelMode::Driven => loop {
                {
                    let mut shared = inner.lock_shared();
                    if !matches!(shared.pending, Pending::Collecting(_)) {
                        return shared.take_outcome();
                    }
                }
                if let Err(e) = inner.pump_once() {
                    inner.lock_shared().pending = Pending::Idle;
                    return Err(e);
                }
            },
        }
    }

    /// Register the exclusive destination for unsolicited device lines.
    ///
    /// One-time registration. While a sink is present, response
    /// correlation is disabled and `command()` fails with `SinkActive`.
    pub fn register_notification_sink<F>(&self, handler: F) -> Result<(), AtError>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut sink = self.inner.sink.write().unwrap_or_else(|e| e.into_inner());
        if sink.is_some() {
            return Err(AtError::Config(
                "notification sink already registered".to_string(),
            ));
        }
        *sink = Some(Box::new(handler));
        Ok(())
    }

    /// Start the dedicated reader thread. Background-mode channels only.
    pub fn run_background(&self) -> Result<(), AtError> {
        if self.inner.mode != ChannelMode::Background {
            return Err(AtError::Config(
                "channel was built in driven mode".to_string(),
            ));
        }

        let mut handle = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        if handle.is_some() {
            return Err(AtError::Config(
                "background reader already running".to_string(),
            ));
        }

        self.inner.stop.store(false, Ordering::SeqCst);
        self.inner.reader_running.store(true, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let spawned = std::thread::Builder::new()
            .name("at-reader".to_string())
            .spawn(move || {
                debug!("background reader started");
                while !inner.stop.load(Ordering::SeqCst) {
                    if inner.pump_once().is_err() {
                        // pump already poisoned the channel
                        break;
                    }
                }
                inner.reader_running.store(false, Ordering::SeqCst);
                debug!("background reader stopped");
            });

        match spawned {
            Ok(h) => {
                *handle = Some(h);
                Ok(())
            }
            Err(e) => {
                self.inner.reader_running.store(false, Ordering::SeqCst);
                Err(AtError::Config(format!("spawn background reader: {}", e)))
            }
        }
    }

    /// Cooperatively stop the reader: the flag is checked once per
    /// iteration, so an in-flight read is allowed to finish (bounded by
    /// the transport read timeout). A caller still waiting for a
    /// terminator is failed rather than left blocked.
    pub fn stop_background(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);

        let handle = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(h) = handle {
            let _ = h.join();
        }

        let mut shared = self.inner.lock_shared();
        if let Pending::Collecting(_) = shared.pending {
            shared.pending = Pending::Done(Err(AtError::Transport(
                "background reader stopped".to_string(),
            )));
            self.inner.resolved.notify_all();
        }
    }

    /// Idempotent teardown: fail any blocked caller, stop the reader,
    /// release the device.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing channel");
        self.inner.stop.store(true, Ordering::SeqCst);
        self.inner
            .fail_pending(AtError::Transport("channel closed".to_string()));
        self.stop_background();
    }
}

impl<T: LineTransport> Drop for AtChannel<T> {
    fn drop(&mut self) {
        self.close();
    }
}
