//! # mlink-sim
//!
//! Deterministic fakes for driver tests: a scripted AT transport that
//! replays canned exchanges, and a recording power pin.
//!
//! A script is an ordered list of steps. A step with an expected command
//! fires when that exact command is sent; a step with an empty expectation
//! is unsolicited wire text (boot notifications) that becomes readable as
//! soon as the reader drains everything before it. Anything off-script
//! reads as a timeout, which is exactly what a confused modem looks like.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mlink_at::{AtTransport, TransportError};
use mlink_modem::PowerPin;
use tracing::trace;

struct Step {
    /// Exact command that triggers this step; empty for unsolicited text.
    expect: String,
    replies: Vec<String>,
}

/// Replays a canned command/reply script.
pub struct ScriptedTransport {
    script: VecDeque<Step>,
    wire: VecDeque<String>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: bool,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        ScriptedTransport {
            script: VecDeque::new(),
            wire: VecDeque::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: false,
        }
    }

    /// Append a step: when `command` is sent, `replies` become readable.
    pub fn expect(mut self, command: &str, replies: &[&str]) -> Self {
        self.script.push_back(Step {
            expect: command.to_string(),
            replies: replies.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Append unsolicited wire text, e.g. the boot-ready notification.
    /// Readable once every earlier step has been consumed.
    pub fn unsolicited(mut self, lines: &[&str]) -> Self {
        self.script.push_back(Step {
            expect: String::new(),
            replies: lines.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Simulate a dead serial channel from here on.
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    /// Shared log of every command sent, in order. Clone before boxing.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.sent.clone()
    }

    fn promote_unsolicited(&mut self) {
        while self
            .script
            .front()
            .is_some_and(|step| step.expect.is_empty())
        {
            let step = self.script.pop_front();
            if let Some(step) = step {
                self.wire.extend(step.replies);
            }
        }
    }
}

impl AtTransport for ScriptedTransport {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed("scripted channel closed".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.to_string());
        self.promote_unsolicited();
        if self
            .script
            .front()
            .is_some_and(|step| step.expect == line)
        {
            let step = self.script.pop_front();
            if let Some(step) = step {
                trace!(command = line, "script step matched");
                self.wire.extend(step.replies);
            }
        } else {
            trace!(command = line, "off-script command, no reply");
        }
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<String, TransportError> {
        if self.closed {
            return Err(TransportError::Closed("scripted channel closed".into()));
        }
        if self.wire.is_empty() {
            self.promote_unsolicited();
        }
        self.wire.pop_front().ok_or(TransportError::TimedOut)
    }
}

/// Pin level transitions, in the order they were driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinEvent {
    High,
    Low,
}

/// A power pin that records every edge it is driven through.
pub struct RecordingPin {
    events: Arc<Mutex<Vec<PinEvent>>>,
}

impl Default for RecordingPin {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPin {
    pub fn new() -> Self {
        RecordingPin {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared event log. Clone before handing the pin to a device.
    pub fn events(&self) -> Arc<Mutex<Vec<PinEvent>>> {
        self.events.clone()
    }
}

impl PowerPin for RecordingPin {
    fn set_high(&self) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PinEvent::High);
    }

    fn set_low(&self) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PinEvent::Low);
    }

    fn is_high(&self) -> bool {
        matches!(
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .last(),
            Some(PinEvent::High)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEO: Duration = Duration::from_millis(50);

    #[test]
    fn steps_fire_in_order() {
        let mut t = ScriptedTransport::new()
            .expect("ATE0", &["OK"])
            .expect("AT+CSQ", &["+CSQ: 18,99", "OK"]);

        t.send_line("ATE0").unwrap();
        assert_eq!(t.read_line(TIMEO).unwrap(), "OK");
        t.send_line("AT+CSQ").unwrap();
        assert_eq!(t.read_line(TIMEO).unwrap(), "+CSQ: 18,99");
        assert_eq!(t.read_line(TIMEO).unwrap(), "OK");
    }

    #[test]
    fn off_script_commands_time_out() {
        let mut t = ScriptedTransport::new().expect("ATE0", &["OK"]);
        t.send_line("AT+CSQ").unwrap();
        assert!(matches!(t.read_line(TIMEO), Err(TransportError::TimedOut)));
        // The expected step is still pending.
        t.send_line("ATE0").unwrap();
        assert_eq!(t.read_line(TIMEO).unwrap(), "OK");
    }

    #[test]
    fn unsolicited_text_readable_without_a_send() {
        let mut t = ScriptedTransport::new()
            .unsolicited(&["READY"])
            .expect("ATE0", &["OK"]);
        assert_eq!(t.read_line(TIMEO).unwrap(), "READY");
        assert!(matches!(t.read_line(TIMEO), Err(TransportError::TimedOut)));
    }

    #[test]
    fn sent_log_survives_the_move() {
        let t = ScriptedTransport::new().expect("ATE0", &["OK"]);
        let log = t.sent_log();
        let mut boxed: Box<dyn AtTransport> = Box::new(t);
        boxed.send_line("ATE0").unwrap();
        assert_eq!(log.lock().unwrap().as_slice(), ["ATE0".to_string()]);
    }

    #[test]
    fn closed_channel_errors_both_ways() {
        let mut t = ScriptedTransport::new().closed();
        assert!(matches!(
            t.send_line("AT"),
            Err(TransportError::Closed(_))
        ));
        assert!(matches!(t.read_line(TIMEO), Err(TransportError::Closed(_))));
    }

    #[test]
    fn recording_pin_keeps_edge_order() {
        let pin = RecordingPin::new();
        let events = pin.events();
        pin.set_high();
        pin.set_low();
        pin.set_high();
        assert!(pin.is_high());
        assert_eq!(
            events.lock().unwrap().as_slice(),
            [PinEvent::High, PinEvent::Low, PinEvent::High]
        );
    }
}
