//! Half-duplex AT command channel.
//!
//! One [`AtClient`] per modem device. The wire protocol tolerates exactly
//! one outstanding command, so `exec` serializes callers behind a mutex —
//! a second concurrent call queues until the first reply (or timeout) is in.
//!
//! Unsolicited result codes (URCs) can arrive at any moment, including
//! between a command and its reply. Lines matching a registered
//! subscription are handed to their handler and never attributed to the
//! pending command.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::response::AtResponse;
use crate::transport::{AtTransport, TransportError};

/// Terminal status lines ending a command's reply.
const TERMINAL_OK: &str = "OK";
const TERMINAL_ERROR: &str = "ERROR";

/// Command channel failures.
#[derive(Debug, Error)]
pub enum AtError {
    /// No terminal line (and fewer than the hinted lines) within the timeout.
    #[error("command {command:?} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    /// The serial channel is down.
    #[error("transport down: {0}")]
    TransportDown(String),
    /// The modem answered with a terminal `ERROR` status.
    #[error("command {command:?} rejected: {status}")]
    CommandFailed { command: String, status: String },
    /// Accumulated reply text exceeded the response byte budget. Fatal to
    /// this call; never retried automatically.
    #[error("response budget of {budget} bytes exhausted")]
    BufferExhausted { budget: usize },
}

/// Handler invoked on the receive path for a matching unsolicited line.
/// Must not block — it runs while a command reply may be pending.
pub type UrcHandler = Box<dyn Fn(&str) + Send>;

/// A registered unsolicited-notification subscription.
pub struct UrcSubscription {
    /// Leading keyword of the notification line.
    pub prefix: String,
    /// Line terminator on the wire; retained for transports that do not
    /// pre-split lines. With a line-splitting transport it is `\r\n`.
    pub terminator: String,
    pub handler: UrcHandler,
}

impl UrcSubscription {
    pub fn new(prefix: &str, handler: UrcHandler) -> Self {
        UrcSubscription {
            prefix: prefix.to_string(),
            terminator: "\r\n".to_string(),
            handler,
        }
    }

    fn matches(&self, line: &str) -> bool {
        line.starts_with(&self.prefix)
    }
}

struct Inner {
    transport: Box<dyn AtTransport>,
    urcs: Vec<UrcSubscription>,
}

/// Serialized command/reply channel to one modem.
pub struct AtClient {
    name: String,
    inner: Mutex<Inner>,
    /// Default response byte budget, sized from the device's receive buffer.
    default_budget: usize,
}

impl AtClient {
    pub fn new(
        name: &str,
        transport: Box<dyn AtTransport>,
        recv_buf_capacity: usize,
        urcs: Vec<UrcSubscription>,
    ) -> Self {
        AtClient {
            name: name.to_string(),
            inner: Mutex::new(Inner { transport, urcs }),
            default_budget: recv_buf_capacity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute one command with the client's default byte budget.
    pub fn exec(
        &self,
        command: &str,
        line_hint: usize,
        timeout: Duration,
    ) -> Result<AtResponse, AtError> {
        self.exec_with_budget(command, line_hint, timeout, self.default_budget)
    }

    /// Execute one command, blocking until `line_hint` meaningful lines
    /// arrive (when the hint is non-zero) or a terminal `OK`/`ERROR` line,
    /// whichever first, bounded by `timeout`.
    pub fn exec_with_budget(
        &self,
        command: &str,
        line_hint: usize,
        timeout: Duration,
        byte_budget: usize,
    ) -> Result<AtResponse, AtError> {
        // Exclusive transport access for the whole exchange: at most one
        // command outstanding on the half-duplex wire.
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Inner { transport, urcs } = &mut *inner;

        trace!(client = %self.name, command, "sending");
        transport
            .send_line(command)
            .map_err(|e| map_transport(e, command, timeout))?;

        let deadline = Instant::now() + timeout;
        let mut resp = AtResponse::new(byte_budget, line_hint, timeout);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AtError::Timeout {
                    command: command.to_string(),
                    timeout,
                });
            }

            let line = transport
                .read_line(remaining)
                .map_err(|e| map_transport(e, command, timeout))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // Modem echo of the command itself (pre-ATE0).
            if line == command {
                continue;
            }
            if let Some(sub) = urcs.iter().find(|s| s.matches(line)) {
                debug!(client = %self.name, line, "URC dispatched");
                (sub.handler)(line);
                continue;
            }
            if line == TERMINAL_OK {
                return Ok(resp);
            }
            if line == TERMINAL_ERROR || line.starts_with("+CME ERROR") {
                return Err(AtError::CommandFailed {
                    command: command.to_string(),
                    status: line.to_string(),
                });
            }

            if !resp.push_line(line) {
                warn!(client = %self.name, command, budget = byte_budget, "response budget exhausted");
                return Err(AtError::BufferExhausted {
                    budget: byte_budget,
                });
            }
            if line_hint > 0 && resp.line_count() >= line_hint {
                return Ok(resp);
            }
        }
    }

    /// Block until a line matching `boot_keyword` arrives, up to `window`.
    ///
    /// Used once per bring-up attempt to observe the modem's boot-ready
    /// notification. Other URC subscriptions still fire while waiting.
    pub fn wait_ready(&self, boot_keyword: &str, window: Duration) -> Result<(), AtError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Inner { transport, urcs } = &mut *inner;
        let deadline = Instant::now() + window;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AtError::Timeout {
                    command: format!("<await {boot_keyword}>"),
                    timeout: window,
                });
            }
            let line = transport
                .read_line(remaining)
                .map_err(|e| map_transport(e, boot_keyword, window))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(sub) = urcs.iter().find(|s| s.matches(line)) {
                (sub.handler)(line);
            }
            if line.starts_with(boot_keyword) {
                debug!(client = %self.name, line, "boot notification received");
                return Ok(());
            }
        }
    }
}

fn map_transport(err: TransportError, command: &str, timeout: Duration) -> AtError {
    match err {
        TransportError::TimedOut => AtError::Timeout {
            command: command.to_string(),
            timeout,
        },
        TransportError::Closed(msg) => AtError::TransportDown(msg),
    }
}
