use crate::host::{ControlHandler, ControlRequest, HostError, ServiceHost, ServiceState, StatusReport};
use crate::signal::{CancellationSignal, StopSignal, WaitOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use portwarden_wire::{GatewayEndpoint, MappingSpec, UpnpClient, WireError};
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

/// Wire operations observed by the scripted client, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireCall {
    Discover,
    ResolveGateway,
    ExternalIp,
    AddMapping,
    DeleteMapping,
}

pub fn conflict_err() -> WireError {
    WireError::MappingConflict("ConflictInMappingEntry".to_string())
}

pub fn upnp_err(msg: &str) -> WireError {
    WireError::Upnp(msg.to_string())
}

pub fn discovery_err(msg: &str) -> WireError {
    WireError::Discovery(msg.to_string())
}

pub fn no_gateway_err() -> WireError {
    WireError::NoGateway("no valid IGD among candidates".to_string())
}

#[derive(Debug, Clone, Copy)]
pub struct MockGateway {
    pub lan: Ipv4Addr,
    pub control: SocketAddrV4,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            lan: Ipv4Addr::new(192, 168, 1, 23),
            control: SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 1), 1900),
        }
    }
}

impl GatewayEndpoint for MockGateway {
    fn lan_addr(&self) -> Ipv4Addr {
        self.lan
    }

    fn endpoint(&self) -> SocketAddrV4 {
        self.control
    }
}

/// Scripted [`UpnpClient`]. Queued results are consumed one call at a time;
/// an empty queue means the operation succeeds (one discovered device, a
/// resolvable gateway, a known external address). Every call is journaled.
#[derive(Default)]
pub struct MockUpnpClient {
    calls: Mutex<Vec<WireCall>>,
    discover_script: Mutex<VecDeque<Result<usize, WireError>>>,
    resolve_script: Mutex<VecDeque<Result<(), WireError>>>,
    external_ip_script: Mutex<VecDeque<Result<Ipv4Addr, WireError>>>,
    add_script: Mutex<VecDeque<Result<(), WireError>>>,
    delete_script: Mutex<VecDeque<Result<(), WireError>>>,
}

impl MockUpnpClient {
    pub fn gateway(&self) -> MockGateway {
        MockGateway::default()
    }

    pub fn calls(&self) -> Vec<WireCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: WireCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    /// Queues a discovery outcome; `Ok(n)` yields `n` devices.
    pub fn script_discover(&self, result: Result<usize, WireError>) {
        self.discover_script.lock().push_back(result);
    }

    pub fn script_resolve(&self, result: Result<(), WireError>) {
        self.resolve_script.lock().push_back(result);
    }

    pub fn script_external_ip(&self, result: Result<Ipv4Addr, WireError>) {
        self.external_ip_script.lock().push_back(result);
    }

    pub fn script_add(&self, result: Result<(), WireError>) {
        self.add_script.lock().push_back(result);
    }

    pub fn script_delete(&self, result: Result<(), WireError>) {
        self.delete_script.lock().push_back(result);
    }
}

#[async_trait]
impl UpnpClient for MockUpnpClient {
    type Device = ();
    type Gateway = MockGateway;

    async fn discover(
        &self,
        _timeout: Duration,
        _local_interface: Option<Ipv4Addr>,
    ) -> Result<Vec<()>, WireError> {
        self.calls.lock().push(WireCall::Discover);
        match self.discover_script.lock().pop_front() {
            Some(Ok(devices)) => Ok(vec![(); devices]),
            Some(Err(err)) => Err(err),
            None => Ok(vec![()]),
        }
    }

    async fn resolve_gateway(&self, devices: Vec<()>) -> Result<MockGateway, WireError> {
        self.calls.lock().push(WireCall::ResolveGateway);
        assert!(!devices.is_empty(), "resolution invoked with no devices");
        match self.resolve_script.lock().pop_front() {
            Some(Ok(())) | None => Ok(MockGateway::default()),
            Some(Err(err)) => Err(err),
        }
    }

    async fn external_ip(&self, _gateway: &MockGateway) -> Result<Ipv4Addr, WireError> {
        self.calls.lock().push(WireCall::ExternalIp);
        match self.external_ip_script.lock().pop_front() {
            Some(result) => result,
            None => Ok(Ipv4Addr::new(203, 0, 113, 7)),
        }
    }

    async fn add_port_mapping(
        &self,
        _gateway: &MockGateway,
        _spec: &MappingSpec,
    ) -> Result<(), WireError> {
        self.calls.lock().push(WireCall::AddMapping);
        self.add_script.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn delete_port_mapping(
        &self,
        _gateway: &MockGateway,
        _spec: &MappingSpec,
    ) -> Result<(), WireError> {
        self.calls.lock().push(WireCall::DeleteMapping);
        self.delete_script.lock().pop_front().unwrap_or(Ok(()))
    }
}

/// Recording [`ServiceHost`]: keeps every status report and hands control
/// requests to the registered handler on demand.
#[derive(Default)]
pub struct MockHost {
    reports: Mutex<Vec<StatusReport>>,
    handler: Mutex<Option<ControlHandler>>,
    registration_failure: Mutex<Option<HostError>>,
    signal_failure: Mutex<Option<HostError>>,
}

impl MockHost {
    pub fn fail_registration(&self, code: i32, message: &str) {
        *self.registration_failure.lock() = Some(HostError::new(code, message));
    }

    pub fn fail_signal_creation(&self, code: i32, message: &str) {
        *self.signal_failure.lock() = Some(HostError::new(code, message));
    }

    /// Delivers a control request the way a host would: through the
    /// registered handler, outside the controller's own task.
    pub fn send(&self, request: ControlRequest) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(request);
        }
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    pub fn reports(&self) -> Vec<StatusReport> {
        self.reports.lock().clone()
    }

    pub fn states(&self) -> Vec<ServiceState> {
        self.reports.lock().iter().map(|r| r.state).collect()
    }

    pub fn last_report(&self) -> Option<StatusReport> {
        self.reports.lock().last().copied()
    }
}

impl ServiceHost for MockHost {
    fn register_control_handler(&self, handler: ControlHandler) -> Result<(), HostError> {
        if let Some(err) = self.registration_failure.lock().take() {
            return Err(err);
        }
        *self.handler.lock() = Some(handler);
        Ok(())
    }

    fn report_status(&self, report: StatusReport) -> Result<(), HostError> {
        self.reports.lock().push(report);
        Ok(())
    }

    fn create_stop_signal(&self) -> Result<CancellationSignal, HostError> {
        if let Some(err) = self.signal_failure.lock().take() {
            return Err(err);
        }
        Ok(CancellationSignal::new())
    }
}

/// Stop signal that lets a fixed number of inter-cycle waits time out before
/// reporting itself signaled, giving tests an exact cycle count.
pub struct CountdownSignal {
    waits_left: Mutex<usize>,
}

impl CountdownSignal {
    pub fn new(waits_before_stop: usize) -> Self {
        Self {
            waits_left: Mutex::new(waits_before_stop),
        }
    }
}

#[async_trait]
impl StopSignal for CountdownSignal {
    fn set(&self) {}

    fn is_set(&self) -> bool {
        false
    }

    async fn wait_timeout(&self, _timeout: Duration) -> WaitOutcome {
        let mut left = self.waits_left.lock();
        if *left == 0 {
            WaitOutcome::Signaled
        } else {
            *left -= 1;
            WaitOutcome::TimedOut
        }
    }
}

/// Stop signal whose timed wait always fails; drives the fatal-wait path.
pub struct FailingSignal {
    pub code: i32,
}

#[async_trait]
impl StopSignal for FailingSignal {
    fn set(&self) {}

    fn is_set(&self) -> bool {
        false
    }

    async fn wait_timeout(&self, _timeout: Duration) -> WaitOutcome {
        WaitOutcome::Error(self.code)
    }
}
