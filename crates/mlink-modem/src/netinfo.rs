//! Network info extraction.
//!
//! After signal check passes, the modem is interrogated for its 15-digit
//! identity number (pseudo hardware address source), its PDP address and
//! its DNS servers, and the results are published to the interface in one
//! atomic record.
//!
//! Retry pacing is deliberately asymmetric: address resolution re-asks
//! immediately, DNS resolution ramps `(attempt+1) × 500 ms` because each
//! pass re-issues the priority configuration write first.

use std::net::Ipv4Addr;
use std::time::Duration;

use mlink_at::{AtClient, FieldSpec};
use tracing::{debug, info, warn};

use crate::config::ModemConfig;
use crate::error::{ModemError, Result};
use crate::netif::{NetInterface, HWADDR_LEN};
use crate::retry::{retry, RetryPolicy};

/// Digits in the modem identity number.
pub const IDENTITY_LEN: usize = 15;

/// Everything the extractor resolves for one bring-up pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub hwaddr: [u8; HWADDR_LEN],
    pub ip: Ipv4Addr,
    pub dns: [Option<Ipv4Addr>; 2],
}

/// Pack a 15-digit identity into an 8-byte pseudo hardware address.
///
/// Digit pairs become one byte each (`d0*10 + d1`, …); the trailing 15th
/// digit stands alone in the last byte. Deterministic and order-preserving;
/// anything but exactly 15 ASCII digits yields `None`.
pub fn hwaddr_from_identity(identity: &str) -> Option<[u8; HWADDR_LEN]> {
    let bytes = identity.as_bytes();
    if bytes.len() != IDENTITY_LEN || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let mut hwaddr = [0u8; HWADDR_LEN];
    for (i, slot) in hwaddr.iter_mut().enumerate() {
        let j = i * 2;
        *slot = if j + 1 < IDENTITY_LEN {
            (bytes[j] - b'0') * 10 + (bytes[j + 1] - b'0')
        } else {
            bytes[j] - b'0'
        };
    }
    Some(hwaddr)
}

/// Resolve identity, IP address and DNS servers. Exhausting either address
/// budget fails the whole bring-up attempt.
pub fn resolve(client: &AtClient, cfg: &ModemConfig) -> Result<NetworkInfo> {
    let hwaddr = query_hwaddr(client, cfg)?;
    let ip = query_ip_addr(client, cfg)?;
    let dns = query_dns_servers(client, cfg)?;
    Ok(NetworkInfo { hwaddr, ip, dns })
}

/// Resolve and publish to the interface as one atomic record.
pub fn resolve_and_publish(
    client: &AtClient,
    cfg: &ModemConfig,
    netif: &NetInterface,
) -> Result<()> {
    let info = resolve(client, cfg)?;
    info!(
        netif = %netif.name(),
        ip = %info.ip,
        dns0 = ?info.dns[0],
        dns1 = ?info.dns[1],
        "network info resolved"
    );
    netif.publish_addresses(info.hwaddr, info.ip, info.dns);
    Ok(())
}

fn query_hwaddr(client: &AtClient, cfg: &ModemConfig) -> Result<[u8; HWADDR_LEN]> {
    let resp = client.exec("AT+GSN=1", 0, cfg.info_timeout())?;
    let fields = resp
        .parse_by_keyword("+GSN:", &[FieldSpec::Token])
        .ok_or(ModemError::Parse { keyword: "+GSN:" })?;
    let identity = fields
        .first()
        .and_then(|f| f.as_text())
        .ok_or(ModemError::Parse { keyword: "+GSN:" })?;
    debug!(identity, "modem identity number");
    hwaddr_from_identity(identity).ok_or(ModemError::Parse { keyword: "+GSN:" })
}

fn query_ip_addr(client: &AtClient, cfg: &ModemConfig) -> Result<Ipv4Addr> {
    retry(RetryPolicy::immediate(cfg.ipaddr_attempts), |_| {
        let resp = client.exec("AT+CGPADDR=1", 2, cfg.info_timeout())?;
        let fields = resp
            .parse_by_keyword("+CGPADDR:", &[FieldSpec::SkipInt, FieldSpec::Quoted])
            .ok_or(ModemError::Parse {
                keyword: "+CGPADDR:",
            })?;
        parse_ipv4(fields.first().and_then(|f| f.as_text()), "+CGPADDR:")
    })
}

fn query_dns_servers(client: &AtClient, cfg: &ModemConfig) -> Result<[Option<Ipv4Addr>; 2]> {
    let policy = RetryPolicy::ramped(
        cfg.dns_attempts,
        Duration::from_millis(cfg.dns_backoff_step_ms),
    );
    retry(policy, |attempt| {
        // Prefer IPv4 results before asking; the write is rate-limited by
        // the ramped backoff.
        if attempt > 0 {
            debug!(attempt, "re-trying DNS resolution");
        }
        client.exec("AT+MDNSCFG=\"priority\",0", 0, cfg.info_timeout())?;
        let resp = client.exec("AT+MDNSCFG=\"ip\"", 0, cfg.info_timeout())?;
        let fields = resp
            .parse_by_keyword(
                "+MDNSCFG:",
                &[
                    FieldSpec::SkipQuoted,
                    FieldSpec::Quoted,
                    FieldSpec::SkipToken,
                    FieldSpec::Quoted,
                ],
            )
            .ok_or(ModemError::Parse {
                keyword: "+MDNSCFG:",
            })?;

        let primary = parse_ipv4(fields.first().and_then(|f| f.as_text()), "+MDNSCFG:")?;
        let secondary = fields
            .get(1)
            .and_then(|f| f.as_text())
            .and_then(|s| match s.parse::<Ipv4Addr>() {
                Ok(addr) => Some(addr),
                Err(_) => {
                    warn!(server = s, "ignoring malformed secondary DNS server");
                    None
                }
            });
        Ok([Some(primary), secondary])
    })
}

fn parse_ipv4(text: Option<&str>, keyword: &'static str) -> Result<Ipv4Addr> {
    text.and_then(|s| s.parse::<Ipv4Addr>().ok())
        .ok_or(ModemError::Parse { keyword })
}
