//! Published network-interface state.
//!
//! Two writers touch an interface — the info extractor during bring-up and
//! the link supervisor in steady state — while external networking
//! consumers read it concurrently. State lives behind an `ArcSwap`: every
//! mutation installs a fully-built record in one atomic store, so a reader
//! holding a snapshot never observes a torn or partially-updated record.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::debug;

/// Pseudo hardware address length (derived from the 15-digit identity).
pub const HWADDR_LEN: usize = 8;

/// One immutable published record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetifState {
    pub up: bool,
    pub link_up: bool,
    pub dhcp: bool,
    pub mtu: u32,
    pub hwaddr: Option<[u8; HWADDR_LEN]>,
    pub ip: Option<Ipv4Addr>,
    pub dns: [Option<Ipv4Addr>; 2],
}

impl NetifState {
    fn new(mtu: u32) -> Self {
        NetifState {
            up: false,
            link_up: false,
            dhcp: false,
            mtu,
            hwaddr: None,
            ip: None,
            dns: [None, None],
        }
    }
}

/// A registered network interface.
pub struct NetInterface {
    name: String,
    state: ArcSwap<NetifState>,
}

impl NetInterface {
    pub fn new(name: &str, mtu: u32) -> Self {
        NetInterface {
            name: name.to_string(),
            state: ArcSwap::from_pointee(NetifState::new(mtu)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consistent point-in-time view of the whole record.
    pub fn snapshot(&self) -> Arc<NetifState> {
        self.state.load_full()
    }

    pub fn is_up(&self) -> bool {
        self.state.load().up
    }

    pub fn is_link_up(&self) -> bool {
        self.state.load().link_up
    }

    fn update(&self, mutate: impl Fn(&mut NetifState)) {
        self.state.rcu(|old| {
            let mut next = (**old).clone();
            mutate(&mut next);
            next
        });
    }

    pub fn set_up(&self, up: bool) {
        debug!(netif = %self.name, up, "status change");
        self.update(|s| s.up = up);
    }

    pub fn set_link_up(&self, link_up: bool) {
        debug!(netif = %self.name, link_up, "link change");
        self.update(|s| s.link_up = link_up);
    }

    pub fn set_dhcp(&self, dhcp: bool) {
        self.update(|s| s.dhcp = dhcp);
    }

    pub fn set_dns_server(&self, slot: usize, server: Ipv4Addr) {
        if slot < 2 {
            self.update(|s| s.dns[slot] = Some(server));
        }
    }

    /// Install hardware address, IP and DNS servers in one store. Readers
    /// see either the previous record or the complete new one.
    pub fn publish_addresses(
        &self,
        hwaddr: [u8; HWADDR_LEN],
        ip: Ipv4Addr,
        dns: [Option<Ipv4Addr>; 2],
    ) {
        debug!(netif = %self.name, %ip, "publishing address record");
        self.update(|s| {
            s.hwaddr = Some(hwaddr);
            s.ip = Some(ip);
            s.dns = dns;
            s.dhcp = true;
        });
    }

    /// Take the interface down: status and link in one store.
    pub fn mark_down(&self) {
        self.update(|s| {
            s.up = false;
            s.link_up = false;
        });
    }
}

/// Process-owned interface registry; register-by-name is idempotent.
#[derive(Default)]
pub struct NetifRegistry {
    inner: Mutex<HashMap<String, Arc<NetInterface>>>,
}

impl NetifRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing registration when the name is already taken.
    pub fn register(&self, name: &str, mtu: u32) -> Arc<NetInterface> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(name.to_string())
            .or_insert_with(|| Arc::new(NetInterface::new(name, mtu)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<NetInterface>> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_interface_is_down() {
        let netif = NetInterface::new("ml0", 1500);
        let s = netif.snapshot();
        assert!(!s.up && !s.link_up && !s.dhcp);
        assert_eq!(s.mtu, 1500);
        assert!(s.hwaddr.is_none() && s.ip.is_none());
    }

    #[test]
    fn publish_is_all_or_nothing() {
        let netif = NetInterface::new("ml0", 1500);
        let before = netif.snapshot();

        netif.publish_addresses(
            [86, 67, 14, 5, 86, 67, 25, 4],
            "10.188.32.7".parse().unwrap(),
            [Some("183.230.126.224".parse().unwrap()), None],
        );

        // The pre-publish snapshot is immutable; the new one is complete.
        assert!(before.ip.is_none());
        let after = netif.snapshot();
        assert_eq!(after.ip, Some("10.188.32.7".parse().unwrap()));
        assert!(after.hwaddr.is_some());
        assert!(after.dhcp);
        assert_eq!(after.dns[0], Some("183.230.126.224".parse().unwrap()));
        assert_eq!(after.dns[1], None);
    }

    #[test]
    fn mark_down_clears_status_and_link() {
        let netif = NetInterface::new("ml0", 1500);
        netif.set_up(true);
        netif.set_link_up(true);
        netif.mark_down();
        let s = netif.snapshot();
        assert!(!s.up && !s.link_up);
    }

    #[test]
    fn dns_slot_bounds_checked() {
        let netif = NetInterface::new("ml0", 1500);
        netif.set_dns_server(5, "1.1.1.1".parse().unwrap());
        assert_eq!(netif.snapshot().dns, [None, None]);
        netif.set_dns_server(1, "1.1.1.1".parse().unwrap());
        assert_eq!(netif.snapshot().dns[1], Some("1.1.1.1".parse().unwrap()));
    }

    #[test]
    fn registry_register_is_idempotent() {
        let reg = NetifRegistry::new();
        let a = reg.register("ml0", 1500);
        let b = reg.register("ml0", 9000);
        assert!(Arc::ptr_eq(&a, &b), "same name returns same interface");
        assert_eq!(b.snapshot().mtu, 1500, "existing registration wins");
        assert!(reg.get("ml0").is_some());
        assert!(reg.get("nope").is_none());
    }
}
