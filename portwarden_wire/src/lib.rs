//! Gateway-facing wire support for holding a UPnP port mapping open across residential NATs
#![forbid(unsafe_code)]
pub mod exports {
    pub use igd;
    pub use igd::PortMappingProtocol;
}

pub mod error;
pub mod local_ip;
pub mod mapping;
pub mod upnp;

pub use error::WireError;
pub use mapping::MappingSpec;
pub use upnp::{GatewayEndpoint, IgdClient, UpnpClient};
