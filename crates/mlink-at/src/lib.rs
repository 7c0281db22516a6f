//! # mlink-at
//!
//! AT command plumbing for the mlink cellular modem driver: a serial line
//! transport seam, a bounded response container, a positional response
//! parser, and a half-duplex command channel with URC dispatch.
//!
//! The modem speaks a line-oriented request/reply protocol with at most one
//! command in flight. [`AtClient`] enforces that invariant; everything above
//! it (bring-up, supervision, control ops) lives in `mlink-modem`.

pub mod client;
pub mod parser;
pub mod response;
pub mod transport;

pub use client::{AtClient, AtError, UrcSubscription};
pub use parser::{scan_line, FieldSpec, FieldValue};
pub use response::AtResponse;
pub use transport::{AtTransport, TransportError};
