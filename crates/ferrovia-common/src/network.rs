//! Pool address validation and IPv4 helpers

use crate::error::Error;
use crate::models::Pool;
use crate::Result;
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

fn parse_ipv4(value: &str) -> Result<Ipv4Addr> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidAddress(value.to_string()))
}

/// Check whether `candidate` may be handed out from `pool`.
///
/// The address must sit inside the pool network *and* inside the inclusive
/// `[start_address, end_address]` range. Unparseable addresses or prefix
/// lengths are errors rather than `false`.
pub fn validate_address(candidate: &str, pool: &Pool) -> Result<bool> {
    let ip = parse_ipv4(candidate)?;
    let base = parse_ipv4(&pool.net_address)?;
    let network = Ipv4Network::new(base, pool.netmask).map_err(|e| {
        Error::InvalidNetwork(format!("{}/{}: {}", pool.net_address, pool.netmask, e))
    })?;
    let start = parse_ipv4(&pool.start_address)?;
    let end = parse_ipv4(&pool.end_address)?;

    if !network.contains(ip) {
        return Ok(false);
    }

    Ok(ip >= start && ip <= end)
}

/// Dotted-quad netmask for a prefix length (`24` -> `255.255.255.0`)
pub fn netmask_from_prefix(prefix: u8) -> Result<Ipv4Addr> {
    Ipv4Network::new(Ipv4Addr::UNSPECIFIED, prefix)
        .map(|net| net.mask())
        .map_err(|e| Error::InvalidNetwork(format!("/{}: {}", prefix, e)))
}

/// Normalize a MAC address to lowercase, colon separated form
pub fn normalize_mac(mac: &str) -> Result<String> {
    let parts: Vec<&str> = mac.split(|c| c == ':' || c == '-').collect();
    if parts.len() != 6 {
        return Err(Error::InvalidMac(mac.to_string()));
    }

    let mut octets = Vec::with_capacity(6);
    for part in parts {
        let octet =
            u8::from_str_radix(part, 16).map_err(|_| Error::InvalidMac(mac.to_string()))?;
        octets.push(format!("{:02x}", octet));
    }

    Ok(octets.join(":"))
}
