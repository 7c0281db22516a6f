//! Control-plane dispatcher.
//!
//! Out-of-band operations routed by name: power cycling, signal query,
//! ping, connection listing. The modem family implements a subset; the
//! rest answer [`ModemError::Unsupported`] so callers can distinguish
//! "not wired" from "failed".

use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use mlink_at::FieldSpec;
use tracing::{debug, error, info, warn};

use crate::bringup::{self, SignalQuality};
use crate::device::ModemDevice;
use crate::error::{ModemError, PingError, Result};

/// A ping request with the modem's native bounds applied.
#[derive(Debug, Clone)]
pub struct PingRequest {
    pub host: String,
    /// Per-echo timeout in seconds, modem range 1–255.
    pub timeout_s: u8,
    /// Echo count, modem range 1–10.
    pub count: u8,
}

impl PingRequest {
    pub fn new(host: &str, timeout_s: u8, count: u8) -> Self {
        PingRequest {
            host: host.to_string(),
            timeout_s: timeout_s.max(1),
            count: count.clamp(1, 10),
        }
    }
}

/// Successful ping reply fields, straight from the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReport {
    pub addr: Ipv4Addr,
    pub bytes: u32,
    pub time_ms: u32,
    pub ttl: u32,
}

/// One row of the modem's connection table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetstatEntry {
    pub proto: String,
    pub remote_addr: Ipv4Addr,
    pub remote_port: u16,
    /// Connection state 2 is "internet up" in the modem's table.
    pub link_up: bool,
}

/// Operations the dispatcher routes.
#[derive(Debug, Clone)]
pub enum ControlOp {
    PowerOn,
    PowerOff,
    SignalQuery,
    Ping(PingRequest),
    Netstat,
    Reset,
    LowPower,
    Sleep,
    Wake,
    NetConnect,
    NetDisconnect,
    WifiConfig,
    Gps,
    FirmwareVersion,
}

/// What a routed operation produced.
#[derive(Debug, Clone)]
pub enum ControlOutcome {
    PoweredOn,
    PoweredOff,
    Signal(SignalQuality),
    Ping(PingReport),
    Netstat(Vec<NetstatEntry>),
}

impl ModemDevice {
    /// Route one control operation.
    pub fn control(self: &std::sync::Arc<Self>, op: ControlOp) -> Result<ControlOutcome> {
        match op {
            ControlOp::PowerOn => {
                self.power().power_on();
                thread::sleep(Duration::from_millis(self.config().control_power_on_delay_ms));
                if !self.is_initialized() {
                    self.reinitialize()?;
                }
                Ok(ControlOutcome::PoweredOn)
            }
            ControlOp::PowerOff => {
                self.deinit();
                Ok(ControlOutcome::PoweredOff)
            }
            ControlOp::SignalQuery => {
                let quality = bringup::query_signal(self.client(), self.config())?;
                Ok(ControlOutcome::Signal(quality))
            }
            ControlOp::Ping(req) => Ok(ControlOutcome::Ping(self.ping(&req)?)),
            ControlOp::Netstat => Ok(ControlOutcome::Netstat(self.netstat()?)),
            ControlOp::Reset => Err(ModemError::Unsupported("reset")),
            ControlOp::LowPower => Err(ModemError::Unsupported("low-power")),
            ControlOp::Sleep => Err(ModemError::Unsupported("sleep")),
            ControlOp::Wake => Err(ModemError::Unsupported("wake")),
            ControlOp::NetConnect => Err(ModemError::Unsupported("net-connect")),
            ControlOp::NetDisconnect => Err(ModemError::Unsupported("net-disconnect")),
            ControlOp::WifiConfig => Err(ModemError::Unsupported("wifi-config")),
            ControlOp::Gps => Err(ModemError::Unsupported("gps")),
            ControlOp::FirmwareVersion => Err(ModemError::Unsupported("firmware-version")),
        }
    }

    fn reinitialize(self: &std::sync::Arc<Self>) -> Result<()> {
        if self.config().async_bring_up {
            let worker = self.clone();
            thread::Builder::new()
                .name(format!("{}-init", self.name()))
                .spawn(move || {
                    if let Err(err) = bringup::run_bring_up(&worker) {
                        error!(device = %worker.name(), %err, "background bring-up failed");
                    }
                })
                .expect("spawn bring-up thread");
            Ok(())
        } else {
            bringup::run_bring_up(self)
        }
    }

    /// Ping through the modem. Names resolve via the modem's DNS first;
    /// resolution failure falls back to passing the name straight through
    /// and letting the modem report the outcome code.
    fn ping(&self, req: &PingRequest) -> Result<PingReport> {
        self.ensure_initialized()?;
        let cfg = self.config();

        let target = if req.host.parse::<Ipv4Addr>().is_ok() {
            req.host.clone()
        } else {
            match self.resolve_host(&req.host) {
                Some(addr) => addr.to_string(),
                None => {
                    debug!(host = %req.host, "resolution failed, pinging by name");
                    req.host.clone()
                }
            }
        };

        // The ping verdict is the first tagged line; there is no terminal
        // OK after the echo replies.
        let command = format!("AT+MPING=\"{}\", {}, {}", target, req.timeout_s, req.count);
        let resp = self.client().exec(
            &command,
            1,
            Duration::from_millis(cfg.ping_timeout_ms),
        )?;

        let code = resp
            .parse_by_keyword("+MPING:", &[FieldSpec::Int])
            .and_then(|f| f.first().and_then(|v| v.as_int()))
            .ok_or(ModemError::Parse { keyword: "+MPING:" })?;
        if code != 0 {
            let err = PingError::from_code(code);
            warn!(device = %self.name(), code, %err, "ping failed");
            return Err(err.into());
        }

        let fields = resp
            .parse_by_keyword(
                "+MPING:",
                &[
                    FieldSpec::Int,
                    FieldSpec::Token,
                    FieldSpec::Int,
                    FieldSpec::Int,
                    FieldSpec::Int,
                ],
            )
            .ok_or(ModemError::Parse { keyword: "+MPING:" })?;
        let addr = fields
            .get(1)
            .and_then(|f| f.as_text())
            .and_then(|s| s.trim_matches('"').parse::<Ipv4Addr>().ok())
            .ok_or(ModemError::Parse { keyword: "+MPING:" })?;
        // Reply fields are non-negative by grammar; anything else is a
        // malformed line, not a value to wrap.
        let (bytes, time_ms, ttl) = match (
            fields.get(2).and_then(|f| f.as_int()).map(u32::try_from),
            fields.get(3).and_then(|f| f.as_int()).map(u32::try_from),
            fields.get(4).and_then(|f| f.as_int()).map(u32::try_from),
        ) {
            (Some(Ok(b)), Some(Ok(t)), Some(Ok(l))) => (b, t, l),
            _ => return Err(ModemError::Parse { keyword: "+MPING:" }),
        };
        info!(device = %self.name(), %addr, bytes, time_ms, ttl, "ping reply");
        Ok(PingReport {
            addr,
            bytes,
            time_ms,
            ttl,
        })
    }

    /// Resolve a name via the modem's DNS. Returns `None` on any failure;
    /// the caller decides whether that is fatal.
    fn resolve_host(&self, host: &str) -> Option<Ipv4Addr> {
        let cfg = self.config();
        let timeout = Duration::from_millis(cfg.resolve_timeout_ms);
        // Nudge context activation first; the reply itself is not used.
        self.client().exec("AT+CGACT?", 0, cfg.cmd_timeout()).ok()?;
        let resp = self
            .client()
            .exec(&format!("AT+MDNSGIP=\"{host}\""), 4, timeout)
            .ok()?;
        let fields =
            resp.parse_by_keyword("+MDNSGIP:", &[FieldSpec::SkipToken, FieldSpec::Quoted])?;
        let addr = fields
            .first()
            .and_then(|f| f.as_text())
            .and_then(|s| s.parse::<Ipv4Addr>().ok())?;
        debug!(host, %addr, "name resolved");
        Some(addr)
    }

    /// List the modem's connection table. Malformed rows are skipped, not
    /// fatal.
    fn netstat(&self) -> Result<Vec<NetstatEntry>> {
        self.ensure_initialized()?;
        let cfg = self.config();
        let resp = self.client().exec(
            "AT+MIPSTATE?",
            0,
            Duration::from_millis(cfg.netstat_timeout_ms),
        )?;

        let mut entries = Vec::new();
        for line in resp.lines() {
            if !line.starts_with("+MIPSTATE:") {
                continue;
            }
            let fields = mlink_at::scan_line(
                line,
                "+MIPSTATE:",
                &[
                    FieldSpec::SkipInt,
                    FieldSpec::Quoted,
                    FieldSpec::Quoted,
                    FieldSpec::Int,
                    FieldSpec::Int,
                ],
            );
            let parsed = fields.as_ref().and_then(|f| {
                let proto = f.first()?.as_text()?.to_string();
                let remote_addr = f.get(1)?.as_text()?.parse::<Ipv4Addr>().ok()?;
                let remote_port = u16::try_from(f.get(2)?.as_int()?).ok()?;
                let state = f.get(3)?.as_int()?;
                Some(NetstatEntry {
                    proto,
                    remote_addr,
                    remote_port,
                    link_up: state == 2,
                })
            });
            match parsed {
                Some(entry) => entries.push(entry),
                None => warn!(device = %self.name(), line, "skipping malformed connection row"),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_request_bounds() {
        let req = PingRequest::new("example.org", 0, 0);
        assert_eq!(req.timeout_s, 1);
        assert_eq!(req.count, 1);
        let req = PingRequest::new("example.org", 255, 30);
        assert_eq!(req.timeout_s, 255);
        assert_eq!(req.count, 10);
        let req = PingRequest::new("example.org", 10, 4);
        assert_eq!((req.timeout_s, req.count), (10, 4));
    }
}
