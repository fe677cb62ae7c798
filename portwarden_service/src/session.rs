use std::net::Ipv4Addr;

/// Mutable record of the mapping's standing, rewritten by every maintenance
/// cycle. `active` alone decides whether teardown attempts a delete.
#[derive(Debug, Clone, Default)]
pub struct MappingSession {
    /// Whether the gateway held the mapping as of the last cycle
    pub active: bool,
    /// LAN address the mapping forwards to, as last resolved
    pub lan_addr: Option<Ipv4Addr>,
    /// Gateway-reported WAN address; informational
    pub external_ip: Option<Ipv4Addr>,
}
