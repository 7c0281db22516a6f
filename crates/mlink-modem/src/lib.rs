//! # mlink-modem
//!
//! Bring-up and link management for ML307R-class cellular modems over an
//! AT command channel.
//!
//! A registered [`ModemDevice`] is power-cycled and walked through the
//! bring-up sequence (boot notification, echo off, capability probe, SIM
//! check, signal check, network info) with bounded retries at every level.
//! Once `Ready`, a [`LinkSupervisor`] thread polls the PDP state and keeps
//! the published [`NetInterface`] honest, and the control dispatcher
//! serves out-of-band operations (power, signal, ping, netstat).

pub mod bringup;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod netif;
pub mod netinfo;
pub mod power;
pub mod retry;
pub mod supervisor;

pub use bringup::{BringUpState, SignalQuality, BOOT_KEYWORD};
pub use config::ModemConfig;
pub use control::{ControlOp, ControlOutcome, NetstatEntry, PingReport, PingRequest};
pub use device::{DeviceSpec, ModemDevice, ModemRegistry};
pub use error::{ModemError, PingError, Result};
pub use netif::{NetInterface, NetifRegistry, NetifState, HWADDR_LEN};
pub use netinfo::{hwaddr_from_identity, NetworkInfo};
pub use power::{PowerController, PowerPin};
pub use retry::{Backoff, RetryPolicy};
pub use supervisor::LinkSupervisor;
