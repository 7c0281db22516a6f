//! Serial transport seam.
//!
//! The real UART/USB glue lives outside this workspace; the driver only
//! needs "send one line, read one line within a timeout". Tests implement
//! this trait with a scripted endpoint (`mlink-sim`).

use std::time::Duration;

use thiserror::Error;

/// Failures at the serial boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No complete line arrived within the allotted time.
    #[error("transport read timed out")]
    TimedOut,
    /// The channel is unusable (device unplugged, port closed, write error).
    #[error("transport closed: {0}")]
    Closed(String),
}

/// A line-oriented serial channel to the modem.
///
/// The transport owns wire framing: it appends the `\r\n` terminator on
/// send and strips terminators on read. Blank lines may be returned and
/// are filtered by the caller.
pub trait AtTransport: Send {
    /// Send a single command line; `line` is the bare command text.
    fn send_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// Block for the next received line, up to `timeout`.
    fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError>;
}
