use crate::config::KeeperSettings;
use crate::mapping::PortMappingManager;
use crate::session::MappingSession;
use crate::signal::{StopSignal, WaitOutcome};
use portwarden_wire::{GatewayEndpoint, UpnpClient};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// What the maintenance loop left behind when it exited.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub session: MappingSession,
    /// Code of the wait-primitive failure that aborted the loop, if any
    pub wait_error: Option<i32>,
}

/// Single cooperative loop driving the periodic maintenance cycles. The stop
/// signal is observed at the top of every cycle and again during the
/// inter-cycle wait; discovery state never survives from one cycle into the
/// next, so a rebooted or replaced gateway is picked up within one interval.
pub struct MaintenanceWorker<C: UpnpClient, S: StopSignal> {
    client: Arc<C>,
    signal: S,
    manager: PortMappingManager,
    settings: KeeperSettings,
    local_interface: Option<Ipv4Addr>,
}

impl<C: UpnpClient, S: StopSignal> MaintenanceWorker<C, S> {
    pub fn new(
        client: Arc<C>,
        signal: S,
        manager: PortMappingManager,
        settings: KeeperSettings,
        local_interface: Option<Ipv4Addr>,
    ) -> Self {
        Self {
            client,
            signal,
            manager,
            settings,
            local_interface,
        }
    }

    /// Runs cycles until the stop signal fires or the wait primitive fails.
    pub async fn run(self) -> WorkerOutcome {
        let mut session = MappingSession::default();
        let mut wait_error = None;

        loop {
            if self.signal.is_set() {
                log::trace!(target: "portwarden", "stop signal set; leaving maintenance loop");
                break;
            }

            self.run_cycle(&mut session).await;

            match self
                .signal
                .wait_timeout(self.settings.maintenance_interval)
                .await
            {
                WaitOutcome::TimedOut => {}
                WaitOutcome::Signaled => {
                    log::trace!(target: "portwarden", "stop signal fired during inter-cycle wait");
                    break;
                }
                WaitOutcome::Error(code) => {
                    log::error!(
                        target: "portwarden",
                        "inter-cycle wait failed with code {}; aborting loop",
                        code
                    );
                    wait_error = Some(code);
                    break;
                }
            }
        }

        WorkerOutcome {
            session,
            wait_error,
        }
    }

    async fn run_cycle(&self, session: &mut MappingSession) {
        log::trace!(
            target: "portwarden",
            "maintenance cycle starting (discovery source: {})",
            self.local_interface
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "default interface".to_string())
        );

        let devices = match self
            .client
            .discover(self.settings.discovery_timeout, self.local_interface)
            .await
        {
            Ok(devices) => devices,
            Err(err) => {
                log::warn!(target: "portwarden", "gateway discovery failed: {}", err);
                session.active = false;
                return;
            }
        };
        if devices.is_empty() {
            log::debug!(target: "portwarden", "discovery completed with no IGD devices");
            session.active = false;
            return;
        }

        let gateway = match self.client.resolve_gateway(devices).await {
            Ok(gateway) => gateway,
            Err(err) => {
                log::warn!(
                    target: "portwarden",
                    "no usable IGD among discovered devices: {}",
                    err
                );
                session.active = false;
                return;
            }
        };
        log::debug!(
            target: "portwarden",
            "IGD resolved (control {}, lan {})",
            gateway.endpoint(),
            gateway.lan_addr()
        );

        match self.client.external_ip(&gateway).await {
            Ok(ip) => {
                log::info!(target: "portwarden", "external IP: {}", ip);
                session.external_ip = Some(ip);
            }
            Err(err) => {
                log::debug!(target: "portwarden", "external IP unavailable: {}", err);
            }
        }

        session.lan_addr = Some(gateway.lan_addr());
        session.active = self.manager.assert_mapping(&*self.client, &gateway).await;
        log::trace!(
            target: "portwarden",
            "maintenance cycle finished (active: {})",
            session.active
        );
    }
}
