//! Network gate
//!
//! A static IP allow-list consulted before any credential is looked at.
//!
//! The forwarding header used by [`resolve_client_ip`] is set by whoever sent
//! the request. Only enable `trust_forwarded_header` behind a proxy that
//! overwrites it; the gate cannot tell a spoofed header from a real one.

use std::collections::HashSet;
use std::net::IpAddr;

/// IP allow-list
#[derive(Debug, Clone, Default)]
pub struct NetworkGate {
    allowed: HashSet<IpAddr>,
}

impl NetworkGate {
    /// Create a gate admitting exactly the given addresses
    pub fn new(allowed: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Whether a caller address passes the gate
    ///
    /// An unknown address never passes.
    pub fn allows(&self, addr: Option<IpAddr>) -> bool {
        match addr {
            Some(ip) => self.allowed.contains(&normalize(ip)),
            None => false,
        }
    }

    /// Number of allowed addresses
    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    /// Whether the allow-list is empty
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// Map IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) to plain IPv4
fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

/// Effective client address of a request
///
/// With `trust_forwarded` set, the first entry of an `X-Forwarded-For` value
/// wins when it parses as an IP literal. Otherwise the socket peer is used.
pub fn resolve_client_ip(forwarded_for: Option<&str>, peer: IpAddr, trust_forwarded: bool) -> IpAddr {
    if !trust_forwarded {
        return normalize(peer);
    }

    forwarded_for
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
        .map(normalize)
        .unwrap_or_else(|| normalize(peer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn localhost_gate() -> NetworkGate {
        NetworkGate::new(["127.0.0.1".parse().unwrap()])
    }

    #[test]
    fn test_gate_allows_listed_address() {
        assert!(localhost_gate().allows(Some(IpAddr::V4(Ipv4Addr::LOCALHOST))));
    }

    #[test]
    fn test_gate_denies_other_addresses() {
        let gate = localhost_gate();
        for addr in ["127.0.0.2", "10.0.0.1", "::1", "192.168.1.10"] {
            assert!(!gate.allows(Some(addr.parse().unwrap())), "{}", addr);
        }
    }

    #[test]
    fn test_gate_denies_unknown_address() {
        assert!(!localhost_gate().allows(None));
    }

    #[test]
    fn test_gate_accepts_mapped_ipv4() {
        let mapped = IpAddr::V6(Ipv4Addr::LOCALHOST.to_ipv6_mapped());
        assert!(localhost_gate().allows(Some(mapped)));
    }

    #[test]
    fn test_empty_gate_denies_everything() {
        let gate = NetworkGate::default();
        assert!(gate.is_empty());
        assert!(!gate.allows(Some(IpAddr::V4(Ipv4Addr::LOCALHOST))));
    }

    #[test]
    fn test_resolve_prefers_first_forwarded_entry() {
        let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        let ip = resolve_client_ip(Some("203.0.113.7, 10.0.0.1"), peer, true);
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_resolve_ignores_header_when_untrusted() {
        let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        let ip = resolve_client_ip(Some("127.0.0.1"), peer, false);
        assert_eq!(ip, peer);
    }

    #[test]
    fn test_resolve_falls_back_to_peer() {
        let peer = IpAddr::V6(Ipv6Addr::LOCALHOST);
        assert_eq!(resolve_client_ip(None, peer, true), peer);
        assert_eq!(resolve_client_ip(Some("garbage"), peer, true), peer);
        assert_eq!(resolve_client_ip(Some(""), peer, true), peer);
    }
}
