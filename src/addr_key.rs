//! Canonical `host:port` keys used for queue dedup, derived from a
//! [`NetAddress`]. Onion addresses are the interesting case: bitcoind packs a
//! Tor v2 key hash into the tail of an IPv6 address inside
//! `FD87:D87E:EB43::/48`; everything else is a plain IPv4/IPv6 literal.

use std::fmt;
use std::net::Ipv6Addr;

use crate::wire::types::NetAddress;

/// First 6 bytes of the onioncat range `FD87:D87E:EB43::/48`.
const ONION_PREFIX: [u8; 6] = [0xFD, 0x87, 0xD8, 0x7E, 0xEB, 0x43];

/// A canonical, comparable `host:port` string. Cheap to clone, hashes and
/// compares as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(String);

impl Endpoint {
    /// Wraps an already-canonical `host:port` string, e.g. a CLI `--seed`
    /// flag or a DNS-resolved `ip:port`. Does not validate or reformat it.
    pub fn new(host_port: impl Into<String>) -> Self {
        Endpoint(host_port.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    fn is_onion(ip: &Ipv6Addr) -> bool {
        ip.octets()[..6] == ONION_PREFIX
    }

    /// NetAddress → Endpoint. Total and deterministic: every 16-byte IP has
    /// exactly one canonical rendering here.
    pub fn from_net_address(addr: &NetAddress) -> Self {
        if Self::is_onion(&addr.ip) {
            let suffix = &addr.ip.octets()[6..16];
            let mut encoded = base32::encode(base32::Alphabet::RFC4648 { padding: false }, suffix);
            encoded.make_ascii_lowercase();
            Endpoint(format!("{}.onion:{}", encoded, addr.port))
        } else if let Some(v4) = addr.ip.to_ipv4_mapped() {
            Endpoint(format!("{}:{}", v4, addr.port))
        } else {
            Endpoint(format!("[{}]:{}", addr.ip, addr.port))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn onion_ip(suffix: [u8; 10]) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets[..6].copy_from_slice(&ONION_PREFIX);
        octets[6..].copy_from_slice(&suffix);
        Ipv6Addr::from(octets)
    }

    #[test]
    fn ipv4_mapped_renders_as_dotted_quad() {
        let ip = Ipv6Addr::from([0, 0, 0, 0, 0, 0xFFFF, 0x0102, 0x0304]);
        let addr = NetAddress::new(ip, 8333, 1, 0);
        assert_eq!(Endpoint::from_net_address(&addr).as_str(), "1.2.3.4:8333");
    }

    #[test]
    fn plain_ipv6_renders_bracketed() {
        let ip = Ipv6Addr::LOCALHOST;
        let addr = NetAddress::new(ip, 8333, 1, 0);
        assert_eq!(Endpoint::from_net_address(&addr).as_str(), "[::1]:8333");
    }

    #[test]
    fn onion_renders_lowercase_base32_host() {
        let suffix = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99];
        let addr = NetAddress::new(onion_ip(suffix), 8333, 1, 0);
        let endpoint = Endpoint::from_net_address(&addr);
        assert!(endpoint.as_str().ends_with(".onion:8333"));
        assert_eq!(endpoint.as_str(), endpoint.as_str().to_lowercase());
    }

    proptest! {
        #[test]
        fn onion_round_trip_is_deterministic(suffix in any::<[u8; 10]>()) {
            let addr = NetAddress::new(onion_ip(suffix), 8333, 0, 0);
            let a = Endpoint::from_net_address(&addr);
            let b = Endpoint::from_net_address(&addr);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn address_key_is_total(octets in any::<[u8; 16]>(), port in any::<u16>()) {
            let addr = NetAddress::new(Ipv6Addr::from(octets), port, 0, 0);
            // Must not panic and must always produce a non-empty key.
            prop_assert!(!Endpoint::from_net_address(&addr).as_str().is_empty());
        }
    }
}
