//! Driver configuration.
//!
//! Every retry ceiling, delay and timeout the bring-up machine and the link
//! supervisor use is a field here, defaulting to the values the hardware
//! was qualified with. A partial TOML file overrides individual fields.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Timing and retry parameters for one modem device.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModemConfig {
    /// Outer bring-up attempts (full power cycles) before giving up.
    /// Effectively "retry until an external stop" at the default.
    pub outer_retry_limit: u32,
    /// Hold after driving the power pin off, before powering back on.
    pub power_off_hold_ms: u64,
    /// Settle after driving the power pin on, before protocol attempts.
    pub power_on_settle_ms: u64,
    /// Delay after a dispatcher-initiated power-on before re-initializing.
    pub control_power_on_delay_ms: u64,
    /// Window for the modem's boot-ready notification.
    pub boot_ready_window_ms: u64,
    /// Default per-command reply timeout.
    pub cmd_timeout_ms: u64,

    /// SIM presence check (ICCID) attempts and pacing.
    pub sim_check_attempts: u32,
    pub sim_check_delay_ms: u64,
    pub sim_check_timeout_ms: u64,

    /// Signal-quality check attempts and pacing.
    pub signal_check_attempts: u32,
    pub signal_check_delay_ms: u64,
    pub signal_check_timeout_ms: u64,

    /// IP-address resolution attempts (no delay between).
    pub ipaddr_attempts: u32,
    /// DNS resolution attempts with ramped backoff: (attempt+1) × step.
    pub dns_attempts: u32,
    pub dns_backoff_step_ms: u64,
    /// Reply timeout for the address/identity queries.
    pub info_timeout_ms: u64,

    /// Link supervisor poll cadence and per-poll reply timeout.
    pub link_poll_interval_ms: u64,
    pub link_timeout_ms: u64,

    /// Name-resolution reply window for ping targets (network dependent,
    /// up to 14 s on live networks).
    pub resolve_timeout_ms: u64,
    pub ping_timeout_ms: u64,
    pub netstat_timeout_ms: u64,

    /// Published interface MTU.
    pub mtu: u32,
    /// Run bring-up on a dedicated thread instead of the caller's.
    pub async_bring_up: bool,
}

impl Default for ModemConfig {
    fn default() -> Self {
        ModemConfig {
            outer_retry_limit: 32_000,
            power_off_hold_ms: 400,
            power_on_settle_ms: 1000,
            control_power_on_delay_ms: 500,
            boot_ready_window_ms: 5000,
            cmd_timeout_ms: 1000,

            sim_check_attempts: 10,
            sim_check_delay_ms: 1000,
            sim_check_timeout_ms: 10_000,

            signal_check_attempts: 10,
            signal_check_delay_ms: 2000,
            signal_check_timeout_ms: 3000,

            ipaddr_attempts: 10,
            dns_attempts: 10,
            dns_backoff_step_ms: 500,
            info_timeout_ms: 600,

            link_poll_interval_ms: 30_000,
            link_timeout_ms: 3000,

            resolve_timeout_ms: 14_000,
            ping_timeout_ms: 5000,
            netstat_timeout_ms: 5000,

            mtu: 1500,
            async_bring_up: false,
        }
    }
}

impl ModemConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid modem config")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading modem config {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn cmd_timeout(&self) -> Duration {
        Duration::from_millis(self.cmd_timeout_ms)
    }

    pub fn info_timeout(&self) -> Duration {
        Duration::from_millis(self.info_timeout_ms)
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }
}
