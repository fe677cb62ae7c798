use crate::session::MappingSession;
use portwarden_wire::{MappingSpec, UpnpClient};
use std::time::Duration;

/// Owns the add/conflict/retry policy for the tracked mapping.
pub struct PortMappingManager {
    spec: MappingSpec,
}

impl PortMappingManager {
    pub fn new(spec: MappingSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &MappingSpec {
        &self.spec
    }

    /// Asserts the mapping on the resolved gateway, returning whether the
    /// gateway holds it afterwards. A conflicting entry is remediated exactly
    /// once per cycle: delete the occupant, then a single retry. Every other
    /// failure waits for the next scheduled cycle.
    pub async fn assert_mapping<C: UpnpClient>(&self, client: &C, gateway: &C::Gateway) -> bool {
        match client.add_port_mapping(gateway, &self.spec).await {
            Ok(()) => {
                log::info!(target: "portwarden", "mapping asserted: {}", self.spec);
                true
            }
            Err(err) if err.is_conflict() => {
                log::warn!(
                    target: "portwarden",
                    "conflicting mapping entry reported ({}); deleting and retrying once",
                    err
                );
                if let Err(delete_err) = client.delete_port_mapping(gateway, &self.spec).await {
                    log::warn!(
                        target: "portwarden",
                        "delete of conflicting mapping failed ({}); retrying add anyway",
                        delete_err
                    );
                }
                match client.add_port_mapping(gateway, &self.spec).await {
                    Ok(()) => {
                        log::info!(target: "portwarden", "mapping asserted on retry: {}", self.spec);
                        true
                    }
                    Err(retry_err) => {
                        log::warn!(
                            target: "portwarden",
                            "add mapping failed on retry: {}",
                            retry_err
                        );
                        false
                    }
                }
            }
            Err(err) => {
                log::warn!(target: "portwarden", "add mapping failed: {}", err);
                false
            }
        }
    }
}

/// One best-effort teardown pass: if the last cycle left the mapping active,
/// re-discover the gateway within `discovery_timeout` and issue a single
/// delete. Nothing in here escalates; shutdown proceeds regardless.
pub async fn reconcile_on_shutdown<C: UpnpClient>(
    client: &C,
    spec: &MappingSpec,
    session: &MappingSession,
    discovery_timeout: Duration,
) {
    if !session.active {
        log::debug!(target: "portwarden", "no active mapping; skipping teardown delete");
        return;
    }

    log::info!(target: "portwarden", "removing {} before shutdown", spec);
    let devices = match client.discover(discovery_timeout, None).await {
        Ok(devices) => devices,
        Err(err) => {
            log::warn!(target: "portwarden", "teardown discovery failed: {}", err);
            return;
        }
    };
    if devices.is_empty() {
        log::warn!(target: "portwarden", "teardown discovery found no devices");
        return;
    }
    let gateway = match client.resolve_gateway(devices).await {
        Ok(gateway) => gateway,
        Err(err) => {
            log::warn!(target: "portwarden", "no usable gateway for teardown: {}", err);
            return;
        }
    };

    match client.delete_port_mapping(&gateway, spec).await {
        Ok(()) => log::info!(target: "portwarden", "mapping removed: {}", spec),
        Err(err) => log::warn!(target: "portwarden", "teardown delete failed: {}", err),
    }
}
