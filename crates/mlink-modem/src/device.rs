//! Device object and process-wide registry.
//!
//! A [`ModemDevice`] ties together one command channel, one published
//! interface, the power controller and the bring-up lifecycle state.
//! Registration wires everything up and runs bring-up, either on the
//! caller's thread or on a dedicated one.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use arc_swap::ArcSwap;
use mlink_at::{AtClient, AtTransport, UrcSubscription};
use tracing::{error, info, warn};

use crate::bringup::{self, BringUpState};
use crate::config::ModemConfig;
use crate::error::{ModemError, Result};
use crate::netif::{NetInterface, NetifRegistry};
use crate::power::{PowerController, PowerPin};
use crate::supervisor::LinkSupervisor;

/// Everything board wiring decides about one device.
pub struct DeviceSpec {
    /// Device and interface name, e.g. `ml0`.
    pub name: String,
    /// Serial channel the device sits on, e.g. `uart2`. Informational.
    pub channel: String,
    pub power_pin: Option<Box<dyn PowerPin>>,
    pub status_pin: Option<Box<dyn PowerPin>>,
    /// Receive buffer size; bounds accumulated reply bytes per command.
    pub recv_buf_capacity: usize,
}

/// One managed modem.
pub struct ModemDevice {
    name: String,
    channel: String,
    client: Arc<AtClient>,
    netif: Arc<NetInterface>,
    power: Mutex<PowerController>,
    initialized: Arc<AtomicBool>,
    state: ArcSwap<BringUpState>,
    supervisor: Mutex<Option<LinkSupervisor>>,
    config: ModemConfig,
}

impl ModemDevice {
    /// Wire up a device without running bring-up. Registration normally
    /// does both; this is the seam the registry (and tests) build on.
    pub fn new(
        spec: DeviceSpec,
        transport: Box<dyn AtTransport>,
        netif: Arc<NetInterface>,
        config: ModemConfig,
    ) -> Arc<Self> {
        let urc_name = spec.name.clone();
        let urcs = vec![UrcSubscription::new(
            "+MIPURC:",
            Box::new(move |line| {
                info!(device = %urc_name, line, "unsolicited notification");
            }),
        )];
        let client = Arc::new(AtClient::new(
            &spec.channel,
            transport,
            spec.recv_buf_capacity,
            urcs,
        ));
        let power = PowerController::new(&spec.name, spec.power_pin, spec.status_pin);

        Arc::new(ModemDevice {
            name: spec.name,
            channel: spec.channel,
            client,
            netif,
            power: Mutex::new(power),
            initialized: Arc::new(AtomicBool::new(false)),
            state: ArcSwap::from_pointee(BringUpState::PoweringOff),
            supervisor: Mutex::new(None),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn client(&self) -> &Arc<AtClient> {
        &self.client
    }

    pub fn netif(&self) -> &Arc<NetInterface> {
        &self.netif
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    pub(crate) fn power(&self) -> MutexGuard<'_, PowerController> {
        self.power.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub(crate) fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }

    pub fn state(&self) -> BringUpState {
        **self.state.load()
    }

    pub(crate) fn set_state(&self, state: BringUpState) {
        self.state.store(Arc::new(state));
    }

    /// Guards operations that assume a completed bring-up.
    pub(crate) fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ModemError::NotInitialized(self.name.clone()))
        }
    }

    pub(crate) fn start_supervisor(self: &Arc<Self>) {
        let mut slot = self.supervisor.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }
        *slot = Some(LinkSupervisor::spawn(
            &self.name,
            self.client.clone(),
            self.netif.clone(),
            self.initialized.clone(),
            &self.config,
        ));
    }

    pub(crate) fn stop_supervisor(&self) {
        let mut slot = self.supervisor.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut sup) = slot.take() {
            sup.stop();
        }
    }

    /// Push a DNS server to the modem and mirror it on the interface.
    pub fn set_dns_server(&self, slot: usize, server: std::net::Ipv4Addr) -> Result<()> {
        self.client.exec(
            &format!("AT+MDNSCFG=\"{server}\""),
            0,
            self.config.cmd_timeout(),
        )?;
        self.netif.set_dns_server(slot, server);
        Ok(())
    }

    /// Orderly teardown: supervisor out first, then the initialized flag,
    /// then the interface, then power. Observers never see an initialized
    /// device with a dead supervisor or a powered interface marked up.
    pub fn deinit(&self) {
        info!(device = %self.name, "deinitializing");
        self.stop_supervisor();
        self.set_initialized(false);
        self.netif.mark_down();
        self.power().power_off();
        self.set_state(BringUpState::PoweringOff);
    }
}

impl fmt::Debug for ModemDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModemDevice")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("state", &self.state())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

/// Process-wide device registry, with its interface registry alongside.
#[derive(Default)]
pub struct ModemRegistry {
    devices: Mutex<HashMap<String, Arc<ModemDevice>>>,
    netifs: NetifRegistry,
}

impl ModemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn netifs(&self) -> &NetifRegistry {
        &self.netifs
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModemDevice>> {
        let map = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        map.get(name).cloned()
    }

    /// Unregister and tear down a device. The interface registration stays
    /// (external consumers may still hold it) but ends marked down.
    pub fn remove(&self, name: &str) -> Option<Arc<ModemDevice>> {
        let device = {
            let mut map = self.devices.lock().unwrap_or_else(|e| e.into_inner());
            map.remove(name)
        }?;
        device.deinit();
        Some(device)
    }

    /// Register a device and run bring-up per its configuration.
    ///
    /// First registration under a name wins; a duplicate returns the
    /// existing device and drops the new transport. With synchronous
    /// bring-up a failure propagates, but the device stays registered for
    /// later control-path power cycles.
    pub fn register(
        &self,
        spec: DeviceSpec,
        transport: Box<dyn AtTransport>,
        config: ModemConfig,
    ) -> Result<Arc<ModemDevice>> {
        let async_bring_up = config.async_bring_up;
        // Check and insert under one lock acquisition: two racing
        // registrations of the same name must converge on one device.
        let device = {
            let mut map = self.devices.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = map.get(&spec.name) {
                warn!(device = %spec.name, "already registered");
                return Ok(existing.clone());
            }
            let netif = self.netifs.register(&spec.name, config.mtu);
            let device = ModemDevice::new(spec, transport, netif, config);
            map.insert(device.name().to_string(), device.clone());
            device
        };

        if async_bring_up {
            let worker = device.clone();
            thread::Builder::new()
                .name(format!("{}-init", device.name()))
                .spawn(move || {
                    if let Err(err) = bringup::run_bring_up(&worker) {
                        error!(device = %worker.name(), %err, "background bring-up failed");
                    }
                })
                .expect("spawn bring-up thread");
        } else {
            bringup::run_bring_up(&device)?;
        }
        Ok(device)
    }
}
