//! Bring-up state machine.
//!
//! One attempt is a straight-line pass: power cycle, boot notification,
//! echo off, capability probe, SIM check, signal check, network info,
//! supervisor start. Any step failing restarts the whole pass from the
//! power cycle, up to the configured outer ceiling. Per-step retry budgets
//! absorb transient noise inside a pass; the outer loop absorbs cold-boot
//! flakiness across passes.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mlink_at::{AtClient, FieldSpec};
use tracing::{debug, error, info, warn};

use crate::config::ModemConfig;
use crate::device::ModemDevice;
use crate::error::{ModemError, Result};
use crate::netinfo;
use crate::retry::{retry, RetryPolicy};

/// Boot-ready notification keyword.
pub const BOOT_KEYWORD: &str = "READY";

/// Where a device currently is in its bring-up lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpState {
    PoweringOff,
    PoweringOn,
    AwaitingBootUrc,
    EchoDisable,
    CapabilityProbe,
    SimCheck,
    SignalCheck,
    NetworkInfoResolve,
    LinkSupervisorStart,
    Ready,
    Failed,
}

impl BringUpState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BringUpState::PoweringOff => "powering-off",
            BringUpState::PoweringOn => "powering-on",
            BringUpState::AwaitingBootUrc => "awaiting-boot",
            BringUpState::EchoDisable => "echo-disable",
            BringUpState::CapabilityProbe => "capability-probe",
            BringUpState::SimCheck => "sim-check",
            BringUpState::SignalCheck => "signal-check",
            BringUpState::NetworkInfoResolve => "network-info",
            BringUpState::LinkSupervisorStart => "supervisor-start",
            BringUpState::Ready => "ready",
            BringUpState::Failed => "failed",
        }
    }
}

/// Raw signal reading from the modem: RSSI index and bit-error-rate index.
/// Unscaled; `99` in a field means "not known or not detectable".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    pub rssi: i64,
    pub ber: i64,
}

impl SignalQuality {
    /// The `99,99` pair is the no-signal sentinel. A `99` in one field
    /// alone is a usable (if partial) reading.
    pub fn is_no_signal(&self) -> bool {
        self.rssi == 99 && self.ber == 99
    }
}

/// Single signal-quality query. The sentinel pair maps to
/// [`ModemError::NoSignal`]; retry budgets live with the caller.
pub fn query_signal(client: &AtClient, cfg: &ModemConfig) -> Result<SignalQuality> {
    let resp = client.exec(
        "AT+CSQ",
        0,
        Duration::from_millis(cfg.signal_check_timeout_ms),
    )?;
    let fields = resp
        .parse_by_keyword("+CSQ:", &[FieldSpec::Int, FieldSpec::Int])
        .ok_or(ModemError::Parse { keyword: "+CSQ:" })?;
    let (rssi, ber) = match (
        fields.first().and_then(|f| f.as_int()),
        fields.get(1).and_then(|f| f.as_int()),
    ) {
        (Some(rssi), Some(ber)) => (rssi, ber),
        _ => return Err(ModemError::Parse { keyword: "+CSQ:" }),
    };
    let quality = SignalQuality { rssi, ber };
    if quality.is_no_signal() {
        return Err(ModemError::NoSignal);
    }
    Ok(quality)
}

/// Drive bring-up to `Ready`, power-cycling and restarting on failure up
/// to the configured outer ceiling. On exhaustion the device lands in
/// `Failed` with its interface down.
pub fn run_bring_up(device: &Arc<ModemDevice>) -> Result<()> {
    let cfg = device.config();
    for pass in 0..cfg.outer_retry_limit {
        if pass > 0 {
            warn!(device = %device.name(), pass, "restarting bring-up");
        }
        match bring_up_attempt(device) {
            Ok(()) => {
                info!(device = %device.name(), pass, "bring-up complete");
                device.set_state(BringUpState::Ready);
                return Ok(());
            }
            Err(err) if !err.retryable() => {
                error!(device = %device.name(), %err, "bring-up failed, not retryable");
                device.set_state(BringUpState::Failed);
                device.netif().mark_down();
                return Err(err);
            }
            Err(err) => {
                debug!(device = %device.name(), pass, %err, "bring-up pass failed");
            }
        }
    }
    error!(
        device = %device.name(),
        attempts = cfg.outer_retry_limit,
        "bring-up exhausted, giving up"
    );
    device.set_state(BringUpState::Failed);
    device.netif().mark_down();
    Err(ModemError::BringUpFailed {
        attempts: cfg.outer_retry_limit,
    })
}

/// One full pass of the sequence. Every `?` here throws the pass back to
/// the power cycle.
fn bring_up_attempt(device: &Arc<ModemDevice>) -> Result<()> {
    let cfg = device.config();
    let client = device.client();

    device.set_state(BringUpState::PoweringOff);
    device.power().power_off();
    thread::sleep(Duration::from_millis(cfg.power_off_hold_ms));

    device.set_state(BringUpState::PoweringOn);
    device.power().power_on();
    thread::sleep(Duration::from_millis(cfg.power_on_settle_ms));

    device.set_state(BringUpState::AwaitingBootUrc);
    client.wait_ready(
        BOOT_KEYWORD,
        Duration::from_millis(cfg.boot_ready_window_ms),
    )?;

    device.set_state(BringUpState::EchoDisable);
    client.exec("ATE0", 0, cfg.cmd_timeout())?;

    device.set_state(BringUpState::CapabilityProbe);
    probe_capabilities(client, cfg)?;

    device.set_state(BringUpState::SimCheck);
    check_sim(client, cfg)?;

    device.set_state(BringUpState::SignalCheck);
    let quality = retry(
        RetryPolicy::fixed(
            cfg.signal_check_attempts,
            Duration::from_millis(cfg.signal_check_delay_ms),
        ),
        |_| query_signal(client, cfg),
    )?;
    info!(device = %device.name(), rssi = quality.rssi, ber = quality.ber, "signal acquired");

    device.set_state(BringUpState::NetworkInfoResolve);
    netinfo::resolve_and_publish(client, cfg, device.netif())?;

    device.set_state(BringUpState::LinkSupervisorStart);
    device.start_supervisor();

    // Interface status first, then the initialized flag: observers that see
    // the flag must find the interface already up.
    device.netif().set_up(true);
    device.netif().set_link_up(true);
    device.set_initialized(true);
    Ok(())
}

/// Firmware/model identification lines, logged for the field record.
fn probe_capabilities(client: &AtClient, cfg: &ModemConfig) -> Result<()> {
    let resp = client.exec("ATI", 4, cfg.cmd_timeout())?;
    for line in resp.lines() {
        info!(ident = line, "modem identification");
    }
    Ok(())
}

/// SIM presence via ICCID. A missing or unreadable SIM answers `ERROR`
/// until the card interface settles, hence the paced budget.
fn check_sim(client: &AtClient, cfg: &ModemConfig) -> Result<()> {
    let policy = RetryPolicy::fixed(
        cfg.sim_check_attempts,
        Duration::from_millis(cfg.sim_check_delay_ms),
    );
    let iccid = retry(policy, |_| {
        let resp = client.exec(
            "AT+ICCID",
            0,
            Duration::from_millis(cfg.sim_check_timeout_ms),
        )?;
        resp.parse_by_keyword("+ICCID:", &[FieldSpec::Token])
            .and_then(|fields| {
                fields
                    .first()
                    .and_then(|f| f.as_text())
                    .map(str::to_string)
            })
            .ok_or(ModemError::Parse { keyword: "+ICCID:" })
    })?;
    info!(iccid, "SIM present");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_pair_is_no_signal() {
        assert!(SignalQuality { rssi: 99, ber: 99 }.is_no_signal());
        assert!(!SignalQuality { rssi: 10, ber: 99 }.is_no_signal());
        assert!(!SignalQuality { rssi: 99, ber: 0 }.is_no_signal());
        assert!(!SignalQuality { rssi: 18, ber: 0 }.is_no_signal());
    }

    #[test]
    fn state_names_are_stable() {
        assert_eq!(BringUpState::Ready.as_str(), "ready");
        assert_eq!(BringUpState::AwaitingBootUrc.as_str(), "awaiting-boot");
        assert_eq!(BringUpState::Failed.as_str(), "failed");
    }
}
