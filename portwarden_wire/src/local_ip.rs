use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

// Any routable address works here; nothing is ever sent to it
const PROBE_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);

/// Best-effort lookup of the IPv4 address this host routes out of. Binding an
/// unspecified socket and connecting it makes the kernel pick the outbound
/// source address without putting a packet on the wire.
pub async fn routed_local_ipv4() -> Option<Ipv4Addr> {
    let socket = match UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)).await
    {
        Ok(socket) => socket,
        Err(err) => {
            log::debug!(target: "portwarden", "failed to bind to unspecified address: {}", err);
            return None;
        }
    };

    if let Err(err) = socket.connect(PROBE_ADDR).await {
        log::debug!(target: "portwarden", "failed to connect to probe address: {}", err);
        return None;
    }

    match socket.local_addr() {
        Ok(SocketAddr::V4(addr)) => Some(*addr.ip()),
        Ok(addr) => {
            log::debug!(target: "portwarden", "routed lookup yielded non-IPv4 address {}", addr);
            None
        }
        Err(err) => {
            log::debug!(target: "portwarden", "failed to read local socket address: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::local_ip::routed_local_ipv4;

    #[tokio::test]
    async fn test_routed_local_ipv4() {
        portwarden_logging::setup_log();
        // Hosts without a default route legitimately yield nothing
        if let Some(ip) = routed_local_ipv4().await {
            log::trace!(target: "portwarden", "routed local address: {}", ip);
            assert!(!ip.is_unspecified());
        }
    }
}
