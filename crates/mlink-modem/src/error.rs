//! Driver error taxonomy.
//!
//! Retryability is a property of the error kind: transport and parse
//! failures are absorbed by the governing retry bound, buffer exhaustion
//! and unsupported operations are surfaced immediately.

use mlink_at::AtError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModemError>;

#[derive(Debug, Error)]
pub enum ModemError {
    /// Command channel failure: timeout, transport down, modem `ERROR`,
    /// or response-buffer exhaustion (see [`ModemError::retryable`]).
    #[error(transparent)]
    Channel(#[from] AtError),

    /// A reply arrived but the tagged line was missing or malformed.
    #[error("reply line for {keyword} missing or malformed")]
    Parse { keyword: &'static str },

    /// The modem reported the no-signal sentinel pair.
    #[error("no usable signal reported")]
    NoSignal,

    /// Control operation this modem family does not implement.
    #[error("operation {0} not supported by this modem family")]
    Unsupported(&'static str),

    /// The device has not completed bring-up.
    #[error("device {0} is not initialized")]
    NotInitialized(String),

    /// All outer bring-up attempts exhausted; the interface stays down.
    #[error("bring-up failed after {attempts} attempts")]
    BringUpFailed { attempts: u32 },

    /// Modem-reported ping failure, by reply code.
    #[error(transparent)]
    Ping(#[from] PingError),
}

impl ModemError {
    /// Whether the governing retry bound may re-attempt after this error.
    ///
    /// Buffer exhaustion is an allocation-class failure: fatal to the call,
    /// never retried automatically.
    pub fn retryable(&self) -> bool {
        match self {
            ModemError::Channel(AtError::BufferExhausted { .. }) => false,
            ModemError::Channel(_) => true,
            ModemError::Parse { .. } => true,
            ModemError::NoSignal => true,
            ModemError::Unsupported(_)
            | ModemError::NotInitialized(_)
            | ModemError::BringUpFailed { .. }
            | ModemError::Ping(_) => false,
        }
    }
}

/// Modem-native ping reply codes 1–5. Code 0 is success and never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PingError {
    #[error("DNS resolution failed")]
    DnsResolveFailed,
    #[error("DNS resolution timed out")]
    DnsResolveTimeout,
    #[error("ping response error")]
    ResponseError,
    #[error("ping response timed out")]
    ResponseTimeout,
    #[error("ping failed with modem code {0}")]
    Other(i64),
}

impl PingError {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => PingError::DnsResolveFailed,
            2 => PingError::DnsResolveTimeout,
            3 => PingError::ResponseError,
            4 => PingError::ResponseTimeout,
            other => PingError::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn buffer_exhaustion_is_fatal() {
        let err = ModemError::Channel(AtError::BufferExhausted { budget: 64 });
        assert!(!err.retryable());
    }

    #[test]
    fn timeout_and_parse_are_retryable() {
        let err = ModemError::Channel(AtError::Timeout {
            command: "AT+CSQ".into(),
            timeout: Duration::from_secs(1),
        });
        assert!(err.retryable());
        assert!(ModemError::Parse { keyword: "+CSQ:" }.retryable());
        assert!(ModemError::NoSignal.retryable());
    }

    #[test]
    fn ping_codes_map_to_distinct_kinds() {
        assert_eq!(PingError::from_code(1), PingError::DnsResolveFailed);
        assert_eq!(PingError::from_code(2), PingError::DnsResolveTimeout);
        assert_eq!(PingError::from_code(3), PingError::ResponseError);
        assert_eq!(PingError::from_code(4), PingError::ResponseTimeout);
        assert_eq!(PingError::from_code(5), PingError::Other(5));
    }
}
