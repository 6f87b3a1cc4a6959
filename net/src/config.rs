//! Interface configuration handed to [`NetStack::new`](crate::stack::NetStack::new).

use crate::dns::DNS_DEFAULT_LOCAL_PORT;
use crate::types::{Ipv4Addr, MacAddr};

/// Static IPv4 settings, used when DHCP is off or until a lease arrives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StaticIpv4 {
    pub addr: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub router: Ipv4Addr,
    pub dns: Ipv4Addr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetConfig {
    pub mac: MacAddr,
    pub ipv4: StaticIpv4,
    pub dhcp: bool,
    /// Local UDP port of the DNS resolver.
    pub dns_port: u16,
}

impl NetConfig {
    /// DHCP on, no static address.
    pub const fn new(mac: MacAddr) -> Self {
        Self {
            mac,
            ipv4: StaticIpv4 {
                addr: Ipv4Addr::UNSPECIFIED,
                netmask: Ipv4Addr::UNSPECIFIED,
                router: Ipv4Addr::UNSPECIFIED,
                dns: Ipv4Addr::UNSPECIFIED,
            },
            dhcp: true,
            dns_port: DNS_DEFAULT_LOCAL_PORT,
        }
    }

    /// Fixed address; also turns DHCP off.
    pub const fn with_static_ip(
        mut self,
        addr: Ipv4Addr,
        netmask: Ipv4Addr,
        router: Ipv4Addr,
        dns: Ipv4Addr,
    ) -> Self {
        self.ipv4 = StaticIpv4 {
            addr,
            netmask,
            router,
            dns,
        };
        self.dhcp = false;
        self
    }

    pub const fn with_dhcp(mut self, enabled: bool) -> Self {
        self.dhcp = enabled;
        self
    }

    pub const fn with_dns_port(mut self, port: u16) -> Self {
        self.dns_port = port;
        self
    }
}
