//! Link supervisor.
//!
//! One named thread per initialized device polls the modem's PDP state on
//! a fixed cadence and publishes link transitions to the interface. A
//! crossbeam channel doubles as the stop signal: `recv_timeout` sleeps the
//! poll interval and wakes immediately when the owner drops or stops the
//! supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use mlink_at::{AtClient, FieldSpec};
use tracing::{debug, error, info};

use crate::config::ModemConfig;
use crate::error::{ModemError, Result};
use crate::netif::NetInterface;

/// Handle to one device's polling thread.
pub struct LinkSupervisor {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl LinkSupervisor {
    /// Spawn the poll thread. The supervisor only reports; it never
    /// re-initializes the device.
    pub fn spawn(
        name: &str,
        client: Arc<AtClient>,
        netif: Arc<NetInterface>,
        initialized: Arc<AtomicBool>,
        cfg: &ModemConfig,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let poll = Duration::from_millis(cfg.link_poll_interval_ms);
        let timeout = cfg.link_timeout();
        let device_name = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("{name}-link"))
            .spawn(move || {
                info!(device = %device_name, interval = ?poll, "link supervisor started");
                loop {
                    match stop_rx.recv_timeout(poll) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    if !initialized.load(Ordering::SeqCst) {
                        error!(device = %device_name, "device no longer initialized, supervisor exiting");
                        break;
                    }
                    match check_link_status(&client, timeout) {
                        Ok(link_up) => {
                            if link_up != netif.is_link_up() {
                                info!(device = %device_name, link_up, "link transition");
                                netif.set_link_up(link_up);
                            }
                        }
                        // One missed poll is not a link verdict.
                        Err(err) => {
                            debug!(device = %device_name, %err, "link poll failed, skipping cycle");
                        }
                    }
                }
                info!(device = %device_name, "link supervisor stopped");
            })
            .expect("spawn link supervisor thread");

        LinkSupervisor {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the thread and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LinkSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One poll: PDP call state (advisory) then context activation (verdict).
/// The activation line must parse; the call line may be absent.
pub fn check_link_status(client: &AtClient, timeout: Duration) -> Result<bool> {
    let resp = client.exec("AT+MIPCALL?", 0, timeout)?;
    if let Some(fields) = resp.parse_by_keyword("+MIPCALL:", &[FieldSpec::Int]) {
        if let Some(call_stat) = fields.first().and_then(|f| f.as_int()) {
            debug!(call_stat, "PDP call state");
        }
    }

    let resp = client.exec("AT+CGACT?", 0, timeout)?;
    let fields = resp
        .parse_by_keyword("+CGACT:", &[FieldSpec::Int, FieldSpec::SkipInt])
        .ok_or(ModemError::Parse { keyword: "+CGACT:" })?;
    let state = fields
        .first()
        .and_then(|f| f.as_int())
        .ok_or(ModemError::Parse { keyword: "+CGACT:" })?;
    Ok(state == 1)
}
