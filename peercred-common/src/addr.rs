use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// One endpoint of an inet connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Addr {
    pub ip: IpAddr,
    pub port: u16,
}

impl Addr {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Same endpoint with an IPv4-mapped IPv6 address (`::ffff:a.b.c.d`)
    /// folded back to plain IPv4.
    ///
    /// Dual-stack sockets show up in `/proc/net/tcp6` with mapped addresses
    /// while callers usually report the IPv4 form, so comparisons go through
    /// this.
    pub fn canonical(self) -> Self {
        let ip = match self.ip {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            },
            v4 => v4,
        };
        Self { ip, port: self.port }
    }
}

impl From<SocketAddr> for Addr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl From<Addr> for SocketAddr {
    fn from(addr: Addr) -> Self {
        SocketAddr::new(addr.ip, addr.port)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        SocketAddr::from(*self).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_canonical_unmaps_ipv4() {
        let mapped = Addr::new(IpAddr::V6(Ipv4Addr::new(10, 0, 0, 7).to_ipv6_mapped()), 443);
        assert_eq!(mapped.canonical(), Addr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 443));
    }

    #[test]
    fn test_canonical_keeps_native_addresses() {
        let v4 = Addr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 80);
        let v6 = Addr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 80);
        assert_eq!(v4.canonical(), v4);
        assert_eq!(v6.canonical(), v6);
    }

    #[test]
    fn test_display() {
        assert_eq!(Addr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 900).to_string(), "127.0.0.1:900");
        assert_eq!(Addr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 900).to_string(), "[::1]:900");
    }
}
