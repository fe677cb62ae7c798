use crate::error::WireError;
use crate::local_ip;
use crate::mapping::MappingSpec;
use async_trait::async_trait;
use igd::SearchOptions;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Address information every resolved gateway exposes.
pub trait GatewayEndpoint {
    /// Address of this host that mapped traffic is forwarded to
    fn lan_addr(&self) -> Ipv4Addr;
    /// LAN-side endpoint of the gateway's control service
    fn endpoint(&self) -> SocketAddrV4;
}

/// The capability surface the mapping keeper consumes. Discovery, gateway
/// resolution and the individual mapping actions are separate operations so
/// each step of a maintenance cycle stays observable.
#[async_trait]
pub trait UpnpClient: Send + Sync {
    /// Raw device candidate yielded by discovery, before IGD validation
    type Device: Send;
    /// A validated, action-ready internet gateway
    type Gateway: GatewayEndpoint + Send + Sync;

    /// Searches the local network for IGD candidates. An empty list is a
    /// search that completed without finding anything, not a failure.
    async fn discover(
        &self,
        timeout: Duration,
        local_interface: Option<Ipv4Addr>,
    ) -> Result<Vec<Self::Device>, WireError>;

    /// Selects a usable gateway from the discovered candidates.
    async fn resolve_gateway(&self, devices: Vec<Self::Device>)
        -> Result<Self::Gateway, WireError>;

    /// Queries the gateway's WAN address. Informational only; callers must
    /// treat failure as non-fatal.
    async fn external_ip(&self, gateway: &Self::Gateway) -> Result<Ipv4Addr, WireError>;

    async fn add_port_mapping(
        &self,
        gateway: &Self::Gateway,
        spec: &MappingSpec,
    ) -> Result<(), WireError>;

    async fn delete_port_mapping(
        &self,
        gateway: &Self::Gateway,
        spec: &MappingSpec,
    ) -> Result<(), WireError>;
}

/// Production [`UpnpClient`] backed by the `igd` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgdClient;

/// Gateway resolved by [`IgdClient`]; lives for a single cycle.
pub struct IgdGateway {
    inner: igd::aio::Gateway,
    lan_addr: Ipv4Addr,
}

impl GatewayEndpoint for IgdGateway {
    fn lan_addr(&self) -> Ipv4Addr {
        self.lan_addr
    }

    fn endpoint(&self) -> SocketAddrV4 {
        self.inner.addr
    }
}

#[async_trait]
impl UpnpClient for IgdClient {
    type Device = igd::aio::Gateway;
    type Gateway = IgdGateway;

    async fn discover(
        &self,
        timeout: Duration,
        local_interface: Option<Ipv4Addr>,
    ) -> Result<Vec<Self::Device>, WireError> {
        let mut options = SearchOptions {
            timeout: Some(timeout),
            ..Default::default()
        };
        if let Some(ip) = local_interface {
            options.bind_addr = SocketAddr::new(IpAddr::V4(ip), 0);
        }

        // The igd search folds "nothing answered" into its error type, so a
        // quiet network surfaces as a discovery error here; both outcomes are
        // transient to callers
        match igd::aio::search_gateway(options).await {
            Ok(gateway) => Ok(vec![gateway]),
            Err(err) => Err(WireError::Discovery(err.to_string())),
        }
    }

    async fn resolve_gateway(
        &self,
        devices: Vec<Self::Device>,
    ) -> Result<Self::Gateway, WireError> {
        let inner = devices.into_iter().next().ok_or_else(|| {
            WireError::NoGateway("no IGD candidates to resolve".to_string())
        })?;
        // The internal client of the mapping is whatever address this host
        // currently routes out of; resolved fresh so an address change on the
        // LAN is picked up by the next cycle
        let lan_addr = local_ip::routed_local_ipv4()
            .await
            .ok_or(WireError::LocalIpAddrFail)?;
        Ok(IgdGateway { inner, lan_addr })
    }

    async fn external_ip(&self, gateway: &Self::Gateway) -> Result<Ipv4Addr, WireError> {
        gateway
            .inner
            .get_external_ip()
            .await
            .map_err(|err| WireError::Upnp(err.to_string()))
    }

    async fn add_port_mapping(
        &self,
        gateway: &Self::Gateway,
        spec: &MappingSpec,
    ) -> Result<(), WireError> {
        if spec.remote_host.is_some() {
            return Err(WireError::Upnp(
                "the IGD backend cannot restrict a mapping to a single remote host".to_string(),
            ));
        }

        gateway
            .inner
            .add_port(
                spec.protocol,
                spec.external_port,
                SocketAddrV4::new(gateway.lan_addr, spec.internal_port),
                spec.lease_duration_secs,
                &spec.description,
            )
            .await
            .map_err(|err| match err {
                igd::AddPortError::PortInUse => WireError::MappingConflict(err.to_string()),
                err => WireError::Upnp(err.to_string()),
            })
    }

    async fn delete_port_mapping(
        &self,
        gateway: &Self::Gateway,
        spec: &MappingSpec,
    ) -> Result<(), WireError> {
        gateway
            .inner
            .remove_port(spec.protocol, spec.external_port)
            .await
            .map_err(|err| WireError::Upnp(err.to_string()))
    }
}
