//! AT command engine
//!
//! One [`AtHandler`] is bound to one transport. Every command/response
//! exchange happens inside an [`AtSession`], the guard returned by
//! [`AtHandler::lock`], so concurrent users of the same transport serialize
//! whole exchanges rather than interleaving bytes.
//!
//! # Format
//! - Commands: `AT+XXX=<p1>,"<p2>"\r` (strings quoted, comma separated)
//! - Replies: CRLF-delimited lines ending in a final result code
//!   (`OK`, `ERROR`, `+CME ERROR: <n>`, `+CMS ERROR: <n>`)
//!
//! Errors are sticky: once an exchange fails, every later call on the
//! session is a no-op until [`AtSession::clear_error`] or the next lock.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::command;
use crate::error::{AtError, AtResult};
use crate::transport::{Transport, TransportId};

/// Default timeout for one command/response exchange
pub const DEFAULT_AT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Read chunk size
const READ_CHUNK: usize = 256;

/// Protocol engine bound to a single transport
///
/// The default timeout and the debug flag live outside the engine lock, so
/// changing them never waits for an exchange in progress; they take effect
/// from the next [`lock`](Self::lock).
pub struct AtHandler {
    id: TransportId,
    default_timeout_ms: AtomicU64,
    debug: AtomicBool,
    engine: Mutex<Engine>,
}

impl std::fmt::Debug for AtHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtHandler")
            .field("transport", &self.id)
            .field("engine", &"<locked>")
            .finish()
    }
}

impl AtHandler {
    /// Create an engine over an already opened transport
    pub fn new(
        id: TransportId,
        stream: Box<dyn Transport>,
        default_timeout: Duration,
        debug: bool,
    ) -> Self {
        Self {
            id,
            default_timeout_ms: AtomicU64::new(as_millis(default_timeout)),
            debug: AtomicBool::new(debug),
            engine: Mutex::new(Engine::new(stream)),
        }
    }

    /// Identity of the transport this engine is bound to
    pub fn transport_id(&self) -> &TransportId {
        &self.id
    }

    /// Lock the transport for one exchange
    ///
    /// Blocks until no other session is active. Any error left from a
    /// previous session is cleared.
    pub fn lock(&self) -> AtSession<'_> {
        let mut engine = self.engine();
        engine.last_error = None;
        engine.timeout = self.default_timeout();
        engine.debug = self.debug();
        AtSession {
            handler: self,
            engine,
        }
    }

    /// Set the timeout every later exchange starts with
    pub fn set_default_timeout(&self, timeout: Duration) {
        self.default_timeout_ms.store(as_millis(timeout), Ordering::Relaxed);
    }

    /// Enable or disable logging of every line sent and received
    pub fn set_debug(&self, on: bool) {
        self.debug.store(on, Ordering::Relaxed);
    }

    /// Current default exchange timeout
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms.load(Ordering::Relaxed))
    }

    /// Whether line logging is enabled
    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to an [`AtHandler`] for the duration of an exchange
///
/// Dropping the session unlocks the transport and restores the default
/// timeout.
pub struct AtSession<'a> {
    handler: &'a AtHandler,
    engine: MutexGuard<'a, Engine>,
}

impl AtSession<'_> {
    /// Identity of the locked transport
    pub fn transport_id(&self) -> &TransportId {
        &self.handler.id
    }

    /// Discard any unread input
    pub fn flush(&mut self) {
        let handler = self.handler;
        self.engine.flush(&handler.id);
    }

    /// Begin a new command line with `text` (e.g. `"AT+CPIN="`)
    pub fn cmd_start(&mut self, text: &str) {
        if self.engine.last_error.is_some() {
            return;
        }
        let engine = &mut *self.engine;
        engine.cmd.clear();
        engine.cmd.push_str(text);
        engine.params = 0;
        engine.info.clear();
        engine.final_seen = false;
    }

    /// Append an integer parameter
    pub fn write_int(&mut self, value: i64) {
        if self.engine.last_error.is_some() {
            return;
        }
        self.engine.separator();
        let _ = write!(self.engine.cmd, "{}", value);
    }

    /// Append a quoted string parameter
    pub fn write_string(&mut self, value: &str) {
        if self.engine.last_error.is_some() {
            return;
        }
        self.engine.separator();
        let cmd = &mut self.engine.cmd;
        cmd.push('"');
        cmd.push_str(value);
        cmd.push('"');
    }

    /// Terminate and transmit the command line
    pub fn cmd_stop(&mut self) {
        let handler = self.handler;
        self.engine.send(&handler.id);
    }

    /// Transmit the command and consume the whole reply up to its final
    /// result code, ignoring information lines
    pub fn cmd_stop_read_resp(&mut self) {
        self.cmd_stop();
        self.resp_start("");
        self.resp_stop();
    }

    /// Wait for the information line starting with `prefix`
    ///
    /// With an empty prefix the first line that is neither the command echo
    /// nor a final result code is taken as the information line.
    pub fn resp_start(&mut self, prefix: &str) {
        let handler = self.handler;
        self.engine.resp_start(&handler.id, prefix);
    }

    /// Next parameter of the current information line
    ///
    /// `None` when there is no information line, all of its parameters have
    /// been read, or the session is in an error state.
    pub fn read_string(&mut self) -> Option<String> {
        if self.engine.last_error.is_some() {
            return None;
        }
        self.engine.info.pop_front()
    }

    /// Consume the rest of the reply up to its final result code
    pub fn resp_stop(&mut self) {
        let handler = self.handler;
        self.engine.resp_stop(&handler.id);
    }

    /// The error recorded in this session, if any
    pub fn last_error(&self) -> AtResult<()> {
        match &self.engine.last_error {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        }
    }

    /// Forget the recorded error so later calls take effect again
    pub fn clear_error(&mut self) {
        self.engine.last_error = None;
    }

    /// Set the exchange timeout, optionally making it the new default
    pub fn set_at_timeout(&mut self, timeout: Duration, as_default: bool) {
        self.engine.timeout = timeout;
        if as_default {
            self.handler.set_default_timeout(timeout);
        }
    }

    /// Unlock the transport and return the session's error status
    pub fn unlock_return_error(self) -> AtResult<()> {
        self.last_error()
    }
}

impl Drop for AtSession<'_> {
    fn drop(&mut self) {
        self.engine.timeout = self.handler.default_timeout();
    }
}

/// Mutable engine state, guarded by the handler's mutex
struct Engine {
    stream: Box<dyn Transport>,
    rx: Vec<u8>,
    timeout: Duration,
    debug: bool,
    last_error: Option<AtError>,
    cmd: String,
    params: usize,
    info: VecDeque<String>,
    final_seen: bool,
    deadline: Instant,
}

impl Engine {
    fn new(stream: Box<dyn Transport>) -> Self {
        Self {
            stream,
            rx: Vec::with_capacity(READ_CHUNK),
            timeout: DEFAULT_AT_TIMEOUT,
            debug: false,
            last_error: None,
            cmd: String::new(),
            params: 0,
            info: VecDeque::new(),
            final_seen: true,
            deadline: Instant::now(),
        }
    }

    /// Record an error; the first one sticks
    fn set_error(&mut self, id: &TransportId, error: AtError) {
        if self.last_error.is_none() {
            debug!(transport = %id, "AT error: {}", error);
            self.last_error = Some(error);
        }
    }

    fn separator(&mut self) {
        if self.params > 0 {
            self.cmd.push(',');
        }
        self.params += 1;
    }

    fn flush(&mut self, id: &TransportId) {
        if !self.rx.is_empty() {
            trace!(transport = %id, "Flushing {} buffered bytes", self.rx.len());
            self.rx.clear();
        }

        let mut buf = [0u8; READ_CHUNK];
        while let Ok(n) = self.stream.read(&mut buf) {
            if n == 0 {
                break;
            }
            trace!(transport = %id, "Flushed {} bytes", n);
        }
    }

    fn send(&mut self, id: &TransportId) {
        if self.last_error.is_some() {
            return;
        }

        self.log_line(id, ">", &self.cmd);

        let mut line = Vec::with_capacity(self.cmd.len() + 1);
        line.extend_from_slice(self.cmd.as_bytes());
        line.extend_from_slice(command::TERMINATOR.as_bytes());

        let result = self
            .stream
            .write_all(&line)
            .and_then(|()| self.stream.flush());
        if let Err(e) = result {
            self.set_error(id, e.into());
            return;
        }

        self.final_seen = false;
        self.info.clear();
        self.deadline = Instant::now() + self.timeout;
    }

    fn resp_start(&mut self, id: &TransportId, prefix: &str) {
        if self.last_error.is_some() {
            return;
        }
        self.info.clear();

        while !self.final_seen {
            let line = match self.read_line(id) {
                Ok(line) => line,
                Err(e) => {
                    self.set_error(id, e);
                    return;
                }
            };

            if let Some(result) = final_result(&line) {
                self.final_seen = true;
                if let Err(e) = result {
                    self.set_error(id, e);
                }
                return;
            }

            if line == self.cmd {
                trace!(transport = %id, "Skipping echo");
                continue;
            }

            if prefix.is_empty() {
                self.info.push_back(line);
                return;
            }

            if let Some(rest) = line.strip_prefix(prefix) {
                self.info = split_params(rest);
                return;
            }

            trace!(transport = %id, "Skipping unrelated line: {}", line);
        }
    }

    fn resp_stop(&mut self, id: &TransportId) {
        self.info.clear();
        if self.last_error.is_some() {
            return;
        }

        while !self.final_seen {
            let line = match self.read_line(id) {
                Ok(line) => line,
                Err(e) => {
                    self.set_error(id, e);
                    return;
                }
            };

            if let Some(result) = final_result(&line) {
                self.final_seen = true;
                if let Err(e) = result {
                    self.set_error(id, e);
                }
            }
        }
    }

    /// Read one non-empty line, waiting until the exchange deadline
    fn read_line(&mut self, id: &TransportId) -> AtResult<String> {
        loop {
            if let Some(pos) = self.rx.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.rx.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw).trim().to_string();
                if line.is_empty() {
                    continue;
                }
                self.log_line(id, "<", &line);
                return Ok(line);
            }

            if Instant::now() >= self.deadline {
                return Err(AtError::Timeout(self.timeout.as_millis() as u64));
            }

            let mut buf = [0u8; READ_CHUNK];
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(AtError::Io("transport closed".into())),
                Ok(n) => self.rx.extend_from_slice(&buf[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn log_line(&self, id: &TransportId, direction: &str, line: &str) {
        if self.debug {
            debug!(transport = %id, "AT{} {}", direction, line);
        } else {
            trace!(transport = %id, "AT{} {}", direction, line);
        }
    }
}

fn as_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Classify a line as a final result code
fn final_result(line: &str) -> Option<AtResult<()>> {
    if line == command::OK {
        return Some(Ok(()));
    }
    if line == command::ERROR {
        return Some(Err(AtError::Device));
    }
    if let Some(code) = line.strip_prefix(command::CME_ERROR) {
        return Some(Err(code
            .trim()
            .parse()
            .map(AtError::Cme)
            .unwrap_or(AtError::Device)));
    }
    if let Some(code) = line.strip_prefix(command::CMS_ERROR) {
        return Some(Err(code
            .trim()
            .parse()
            .map(AtError::Cms)
            .unwrap_or(AtError::Device)));
    }
    None
}

/// Split an information line into parameters on commas outside quotes
fn split_params(rest: &str) -> VecDeque<String> {
    let mut params = VecDeque::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in rest.chars() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                params.push_back(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    params.push_back(current.trim().to_string());

    params
}
