use crate::config::KeeperSettings;
use crate::host::{
    AcceptedControls, ControlHandler, ControlRequest, ServiceHost, ServiceState, StatusReport,
};
use crate::mapping::{self, PortMappingManager};
use crate::signal::{CancellationSignal, StopSignal};
use crate::worker::MaintenanceWorker;
use parking_lot::Mutex;
use portwarden_wire::{MappingSpec, UpnpClient};
use std::sync::Arc;
use std::time::Duration;

/// Wait hint advertised while the cancellation machinery is being set up
const START_PENDING_HINT: Duration = Duration::from_secs(10);
/// Wait hint advertised when a stop/shutdown request arrives
const CONTROL_STOP_PENDING_HINT: Duration = Duration::from_secs(5);
/// Wait hint advertised for the teardown pass after the loop exits
const EXIT_STOP_PENDING_HINT: Duration = Duration::from_secs(3);

/// Shared mutable service state: host handle, last reported status, and the
/// stop signal once it exists. The control handler holds a reference to this
/// and nothing else.
pub struct ServiceContext<H: ServiceHost> {
    host: Arc<H>,
    status: Mutex<StatusReport>,
    signal: Mutex<Option<CancellationSignal>>,
}

impl<H: ServiceHost> ServiceContext<H> {
    fn new(host: Arc<H>) -> Self {
        Self {
            host,
            status: Mutex::new(StatusReport::stopped(crate::host::EXIT_OK)),
            signal: Mutex::new(None),
        }
    }

    fn report(
        &self,
        state: ServiceState,
        accepted: AcceptedControls,
        checkpoint: u32,
        wait_hint: Duration,
    ) {
        let report = {
            let mut status = self.status.lock();
            let report = StatusReport {
                state,
                accepted,
                checkpoint,
                wait_hint,
                exit_code: status.exit_code,
            };
            *status = report;
            report
        };
        if let Err(err) = self.host.report_status(report) {
            log::warn!(target: "portwarden", "status report not accepted by host: {}", err);
        }
    }

    /// Re-reports the current status without mutating it.
    fn report_current(&self) {
        let report = *self.status.lock();
        if let Err(err) = self.host.report_status(report) {
            log::warn!(target: "portwarden", "status report not accepted by host: {}", err);
        }
    }

    fn set_exit_code(&self, code: i32) {
        self.status.lock().exit_code = code;
    }

    fn exit_code(&self) -> i32 {
        self.status.lock().exit_code
    }

    /// Entry point for asynchronous control requests. Touches only the stop
    /// signal and status reporting; worker state stays with the worker.
    fn handle_control(&self, request: ControlRequest) {
        match request {
            ControlRequest::Stop | ControlRequest::Shutdown => {
                log::info!(target: "portwarden", "{:?} control request received", request);
                self.report(
                    ServiceState::StopPending,
                    AcceptedControls::NONE,
                    1,
                    CONTROL_STOP_PENDING_HINT,
                );
                match &*self.signal.lock() {
                    Some(signal) => signal.set(),
                    None => {
                        log::warn!(target: "portwarden", "stop requested before the stop signal existed")
                    }
                }
            }
            ControlRequest::Interrogate => self.report_current(),
            ControlRequest::Other(code) => {
                log::trace!(target: "portwarden", "ignoring unsupported control request {}", code);
            }
        }
    }
}

/// Top-level lifecycle state machine. Owns the run: registers the control
/// handler, brings the status through START_PENDING → RUNNING, hosts the
/// maintenance loop to completion, and settles teardown before reporting
/// STOPPED with the run's exit code.
pub struct ServiceController<H, C>
where
    H: ServiceHost + 'static,
    C: UpnpClient + 'static,
{
    host: Arc<H>,
    client: Arc<C>,
    spec: MappingSpec,
    settings: KeeperSettings,
}

impl<H, C> ServiceController<H, C>
where
    H: ServiceHost + 'static,
    C: UpnpClient + 'static,
{
    pub fn new(host: Arc<H>, client: Arc<C>, spec: MappingSpec, settings: KeeperSettings) -> Self {
        Self {
            host,
            client,
            spec,
            settings,
        }
    }

    /// Runs the full service lifecycle and returns the exit code for the
    /// process host.
    pub async fn run(self) -> i32 {
        let ctx = Arc::new(ServiceContext::new(self.host.clone()));

        let handler: ControlHandler = {
            let ctx = ctx.clone();
            Arc::new(move |request| ctx.handle_control(request))
        };
        if let Err(err) = self.host.register_control_handler(handler) {
            log::error!(target: "portwarden", "control handler registration failed: {}", err);
            ctx.set_exit_code(err.code);
            ctx.report(ServiceState::Stopped, AcceptedControls::NONE, 0, Duration::ZERO);
            return err.code;
        }

        ctx.report(
            ServiceState::StartPending,
            AcceptedControls::NONE,
            1,
            START_PENDING_HINT,
        );

        let signal = match self.host.create_stop_signal() {
            Ok(signal) => signal,
            Err(err) => {
                log::error!(target: "portwarden", "stop signal creation failed: {}", err);
                ctx.set_exit_code(err.code);
                ctx.report(ServiceState::Stopped, AcceptedControls::NONE, 0, Duration::ZERO);
                return err.code;
            }
        };
        *ctx.signal.lock() = Some(signal.clone());

        ctx.report(
            ServiceState::Running,
            AcceptedControls::STOP_AND_SHUTDOWN,
            0,
            Duration::ZERO,
        );

        // Resolved once per run; without it discovery uses the default interface
        let local_interface = portwarden_wire::local_ip::routed_local_ipv4().await;
        match local_interface {
            Some(ip) => {
                log::info!(target: "portwarden", "multicast source for discovery: {}", ip)
            }
            None => {
                log::warn!(target: "portwarden", "local address lookup failed; discovery will use the default interface")
            }
        }

        let worker = MaintenanceWorker::new(
            self.client.clone(),
            signal.clone(),
            PortMappingManager::new(self.spec.clone()),
            self.settings.clone(),
            local_interface,
        );
        let outcome = worker.run().await;
        if let Some(code) = outcome.wait_error {
            ctx.set_exit_code(code);
        }

        ctx.report(
            ServiceState::StopPending,
            AcceptedControls::NONE,
            1,
            EXIT_STOP_PENDING_HINT,
        );

        mapping::reconcile_on_shutdown(
            &*self.client,
            &self.spec,
            &outcome.session,
            self.settings.shutdown_discovery_timeout,
        )
        .await;

        // The run is over; drop the context's signal handle before the final report
        *ctx.signal.lock() = None;

        let code = ctx.exit_code();
        ctx.report(ServiceState::Stopped, AcceptedControls::NONE, 0, Duration::ZERO);
        code
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{default_mapping_spec, KeeperSettings};
    use crate::controller::ServiceController;
    use crate::host::{ControlRequest, ServiceState};
    use crate::test_utils::{upnp_err, MockHost, MockUpnpClient, WireCall};
    use std::sync::Arc;
    use std::time::Duration;

    fn controller_with(
        host: Arc<MockHost>,
        client: Arc<MockUpnpClient>,
    ) -> ServiceController<MockHost, MockUpnpClient> {
        ServiceController::new(
            host,
            client,
            default_mapping_spec(),
            KeeperSettings::default().with_maintenance_interval(Duration::from_secs(600)),
        )
    }

    async fn run_and_stop(
        host: Arc<MockHost>,
        client: Arc<MockUpnpClient>,
    ) -> i32 {
        let controller = controller_with(host.clone(), client);
        let handle = tokio::spawn(controller.run());
        // let the run reach the inter-cycle wait before stopping it
        tokio::time::sleep(Duration::from_millis(50)).await;
        host.send(ControlRequest::Stop);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("controller did not stop")
            .unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_reports_in_order() {
        portwarden_logging::setup_log();
        let host = Arc::new(MockHost::default());
        let client = Arc::new(MockUpnpClient::default());
        let code = run_and_stop(host.clone(), client).await;

        assert_eq!(code, 0);
        let states = host.states();
        assert_eq!(
            states,
            vec![
                ServiceState::StartPending,
                ServiceState::Running,
                ServiceState::StopPending, // control handler
                ServiceState::StopPending, // loop exit
                ServiceState::Stopped,
            ]
        );
        assert_eq!(host.last_report().unwrap().exit_code, 0);
    }

    #[tokio::test]
    async fn test_stop_triggers_one_teardown_delete_when_active() {
        portwarden_logging::setup_log();
        let host = Arc::new(MockHost::default());
        let client = Arc::new(MockUpnpClient::default());
        let code = run_and_stop(host.clone(), client.clone()).await;

        assert_eq!(code, 0);
        // one cycle asserted the mapping, teardown deleted it once
        assert_eq!(client.count(WireCall::AddMapping), 1);
        assert_eq!(client.count(WireCall::DeleteMapping), 1);
        assert_eq!(client.count(WireCall::Discover), 2);
    }

    #[tokio::test]
    async fn test_no_teardown_delete_when_inactive() {
        portwarden_logging::setup_log();
        let host = Arc::new(MockHost::default());
        let client = Arc::new(MockUpnpClient::default());
        client.script_add(Err(upnp_err("ActionNotAuthorized")));
        let code = run_and_stop(host.clone(), client.clone()).await;

        assert_eq!(code, 0);
        assert_eq!(client.count(WireCall::Discover), 1);
        assert_eq!(client.count(WireCall::DeleteMapping), 0);
    }

    #[tokio::test]
    async fn test_teardown_failure_leaves_exit_code_untouched() {
        portwarden_logging::setup_log();
        let host = Arc::new(MockHost::default());
        let client = Arc::new(MockUpnpClient::default());
        client.script_delete(Err(upnp_err("NoSuchEntryInArray")));
        let code = run_and_stop(host.clone(), client.clone()).await;

        assert_eq!(code, 0);
        assert_eq!(client.count(WireCall::DeleteMapping), 1);
        assert_eq!(host.last_report().unwrap().exit_code, 0);
    }

    #[tokio::test]
    async fn test_registration_failure_stops_before_any_work() {
        portwarden_logging::setup_log();
        let host = Arc::new(MockHost::default());
        host.fail_registration(1063, "no dispatcher available");
        let client = Arc::new(MockUpnpClient::default());
        let code = controller_with(host.clone(), client.clone()).run().await;

        assert_eq!(code, 1063);
        assert_eq!(host.states(), vec![ServiceState::Stopped]);
        assert_eq!(host.last_report().unwrap().exit_code, 1063);
        assert!(client.calls().is_empty());
        assert!(!host.has_handler());
    }

    #[tokio::test]
    async fn test_signal_creation_failure_stops_before_running() {
        portwarden_logging::setup_log();
        let host = Arc::new(MockHost::default());
        host.fail_signal_creation(1450, "no system resources");
        let client = Arc::new(MockUpnpClient::default());
        let code = controller_with(host.clone(), client.clone()).run().await;

        assert_eq!(code, 1450);
        assert_eq!(
            host.states(),
            vec![ServiceState::StartPending, ServiceState::Stopped]
        );
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_interrogate_rereports_without_transition() {
        portwarden_logging::setup_log();
        let host = Arc::new(MockHost::default());
        let client = Arc::new(MockUpnpClient::default());
        let controller = controller_with(host.clone(), client);
        let handle = tokio::spawn(controller.run());
        tokio::time::sleep(Duration::from_millis(50)).await;

        host.send(ControlRequest::Interrogate);
        let running_reports = host
            .reports()
            .iter()
            .filter(|r| r.state == ServiceState::Running)
            .count();
        assert_eq!(running_reports, 2);

        host.send(ControlRequest::Stop);
        let code = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("controller did not stop")
            .unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_unknown_controls_are_ignored() {
        portwarden_logging::setup_log();
        let host = Arc::new(MockHost::default());
        let client = Arc::new(MockUpnpClient::default());
        let controller = controller_with(host.clone(), client);
        let handle = tokio::spawn(controller.run());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let reports_before = host.reports().len();
        host.send(ControlRequest::Other(129));
        assert_eq!(host.reports().len(), reports_before);

        host.send(ControlRequest::Stop);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("controller did not stop")
            .unwrap();
    }
}
