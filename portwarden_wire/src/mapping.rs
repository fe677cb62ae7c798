use igd::PortMappingProtocol;
use std::fmt::Formatter;
use std::net::Ipv4Addr;

/// Immutable description of the one mapping a run maintains on the gateway.
#[derive(Debug, Clone)]
pub struct MappingSpec {
    /// LAN-side port traffic is forwarded to
    pub internal_port: u16,
    /// WAN-side port the gateway listens on
    pub external_port: u16,
    pub protocol: PortMappingProtocol,
    /// Label stored with the mapping on the gateway
    pub description: String,
    /// Source restriction; `None` forwards traffic from any remote host
    pub remote_host: Option<Ipv4Addr>,
    /// Requested lease in seconds; 0 requests a mapping with no automatic expiry
    pub lease_duration_secs: u32,
}

impl MappingSpec {
    /// A mapping forwarding the same port number on both sides, open to any
    /// remote host, with no lease expiry.
    pub fn same_port(
        port: u16,
        protocol: PortMappingProtocol,
        description: impl Into<String>,
    ) -> Self {
        Self {
            internal_port: port,
            external_port: port,
            protocol,
            description: description.into(),
            remote_host: None,
            lease_duration_secs: 0,
        }
    }
}

impl std::fmt::Display for MappingSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> :{}",
            self.protocol, self.external_port, self.internal_port
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::mapping::MappingSpec;
    use igd::PortMappingProtocol;
    use rstest::rstest;

    #[rstest]
    #[case(PortMappingProtocol::TCP, "TCP 3306 -> :3306")]
    #[case(PortMappingProtocol::UDP, "UDP 3306 -> :3306")]
    fn test_same_port_defaults(
        #[case] protocol: PortMappingProtocol,
        #[case] rendered: &str,
    ) {
        let spec = MappingSpec::same_port(3306, protocol, "db forward");
        assert_eq!(spec.internal_port, 3306);
        assert_eq!(spec.external_port, 3306);
        assert_eq!(spec.remote_host, None);
        assert_eq!(spec.lease_duration_secs, 0);
        assert_eq!(spec.to_string(), rendered);
    }
}
