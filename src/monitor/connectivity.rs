use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

/// Whether the host can reach the network right now. Polling passes are
/// skipped silently while offline.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Asks the OS for a route to public addresses. Connecting a UDP socket
/// sends nothing; it only fails when no interface can carry the traffic.
/// Online means at least one target is routable, so IPv6-only and
/// IPv4-only hosts both count.
pub struct RouteProbe {
    targets: Vec<SocketAddr>,
}

impl RouteProbe {
    pub fn new(targets: Vec<SocketAddr>) -> Self {
        Self { targets }
    }

    fn routable(target: SocketAddr) -> bool {
        let any: IpAddr = match target {
            SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };
        let Ok(socket) = UdpSocket::bind((any, 0)) else {
            return false;
        };
        if socket.connect(target).is_err() {
            return false;
        }
        socket
            .local_addr()
            .map(|addr| !addr.ip().is_unspecified() && !addr.ip().is_loopback())
            .unwrap_or(false)
    }
}

impl Default for RouteProbe {
    fn default() -> Self {
        Self::new(vec![
            SocketAddr::from((Ipv4Addr::new(1, 1, 1, 1), 53)),
            SocketAddr::from((Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1111), 53)),
        ])
    }
}

impl Connectivity for RouteProbe {
    fn is_online(&self) -> bool {
        self.targets.iter().any(|target| Self::routable(*target))
    }
}

/// For hosts where probing makes no sense, and for tests.
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_online() {
        assert!(AlwaysOnline.is_online());
    }

    #[test]
    fn test_loopback_targets_count_as_offline() {
        let probe = RouteProbe::new(vec![
            SocketAddr::from((Ipv4Addr::LOCALHOST, 53)),
            SocketAddr::from((Ipv6Addr::LOCALHOST, 53)),
        ]);
        assert!(!probe.is_online());
        assert!(!RouteProbe::new(Vec::new()).is_online());
    }

    #[test]
    fn test_default_probes_both_families() {
        let probe = RouteProbe::default();
        assert!(probe.targets.iter().any(SocketAddr::is_ipv4));
        assert!(probe.targets.iter().any(SocketAddr::is_ipv6));
    }
}
