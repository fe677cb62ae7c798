use portwarden_wire::exports::PortMappingProtocol;
use portwarden_wire::MappingSpec;
use std::time::Duration;

/// Port forwarded on both sides of the mapping
pub const MAPPED_PORT: u16 = 3306;
/// Label the mapping carries on the gateway
pub const MAPPING_DESCRIPTION: &str = "portwarden service mapping";
/// How often the mapping is re-asserted
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10 * 60);
/// Discovery budget for a normal maintenance cycle
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Discovery budget for the teardown pass; must fit inside the stop wait-hint
pub const SHUTDOWN_DISCOVERY_TIMEOUT: Duration = Duration::from_millis(2_000);

/// The mapping this build maintains: TCP 3306 on both sides, any remote host,
/// no lease expiry.
pub fn default_mapping_spec() -> MappingSpec {
    MappingSpec::same_port(MAPPED_PORT, PortMappingProtocol::TCP, MAPPING_DESCRIPTION)
}

/// Run timings for the keeper. The shipped defaults are fixed; the builder
/// methods exist so tests can compress the schedule.
#[derive(Debug, Clone)]
pub struct KeeperSettings {
    pub maintenance_interval: Duration,
    pub discovery_timeout: Duration,
    pub shutdown_discovery_timeout: Duration,
}

impl Default for KeeperSettings {
    fn default() -> Self {
        Self {
            maintenance_interval: MAINTENANCE_INTERVAL,
            discovery_timeout: DISCOVERY_TIMEOUT,
            shutdown_discovery_timeout: SHUTDOWN_DISCOVERY_TIMEOUT,
        }
    }
}

impl KeeperSettings {
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_shutdown_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_discovery_timeout = timeout;
        self
    }
}
