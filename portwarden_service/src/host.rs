use crate::signal::CancellationSignal;
use parking_lot::Mutex;
use std::fmt::Formatter;
use std::sync::Arc;
use std::time::Duration;

/// Exit code for a run that ended without a fatal error
pub const EXIT_OK: i32 = 0;
/// Exit code reported when the process is started without the service dispatch
pub const EXIT_NOT_DISPATCHED: i32 = 1;

/// Control requests delivered asynchronously by the service host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Stop,
    Shutdown,
    /// Asks for the current status to be re-reported, nothing else
    Interrogate,
    Other(u32),
}

/// Lifecycle states reported to the service host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    StartPending,
    Running,
    StopPending,
}

/// Controls the service is willing to accept in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcceptedControls {
    pub stop: bool,
    pub shutdown: bool,
}

impl AcceptedControls {
    pub const NONE: Self = Self {
        stop: false,
        shutdown: false,
    };

    pub const STOP_AND_SHUTDOWN: Self = Self {
        stop: true,
        shutdown: true,
    };
}

impl std::fmt::Display for AcceptedControls {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.stop, self.shutdown) {
            (true, true) => write!(f, "stop|shutdown"),
            (true, false) => write!(f, "stop"),
            (false, true) => write!(f, "shutdown"),
            (false, false) => write!(f, "none"),
        }
    }
}

/// One status report to the host: the state plus its timing contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub state: ServiceState,
    pub accepted: AcceptedControls,
    /// Progress marker for pending states; 0 otherwise
    pub checkpoint: u32,
    /// How long the host should tolerate the pending state
    pub wait_hint: Duration,
    pub exit_code: i32,
}

impl StatusReport {
    pub fn stopped(exit_code: i32) -> Self {
        Self {
            state: ServiceState::Stopped,
            accepted: AcceptedControls::NONE,
            checkpoint: 0,
            wait_hint: Duration::ZERO,
            exit_code,
        }
    }
}

/// Failure reported by the service host surface. The code becomes the process
/// exit code when the failure aborts startup.
#[derive(Debug, Clone)]
pub struct HostError {
    pub code: i32,
    pub message: String,
}

impl HostError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "host error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for HostError {}

/// Callback invoked by the host for each control request. Runs on an
/// unspecified task; implementations touch nothing beyond the stop signal and
/// status reporting.
pub type ControlHandler = Arc<dyn Fn(ControlRequest) + Send + Sync>;

/// The process-lifecycle surface of the hosting environment.
pub trait ServiceHost: Send + Sync {
    /// Registers the callback for asynchronous control requests. Called once,
    /// before any status is reported.
    fn register_control_handler(&self, handler: ControlHandler) -> Result<(), HostError>;

    /// Reports a lifecycle transition. Safe for concurrent invocation.
    fn report_status(&self, report: StatusReport) -> Result<(), HostError>;

    /// Creates the single-shot stop signal for this run.
    fn create_stop_signal(&self) -> Result<CancellationSignal, HostError>;
}

/// Host for foreground console runs: control requests come from process
/// termination signals and status reports go to the log.
#[derive(Default)]
pub struct ConsoleHost {
    last_report: Mutex<Option<StatusReport>>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_report(&self) -> Option<StatusReport> {
        *self.last_report.lock()
    }
}

impl ServiceHost for ConsoleHost {
    fn register_control_handler(&self, handler: ControlHandler) -> Result<(), HostError> {
        let _listener = tokio::spawn(async move {
            wait_for_termination().await;
            log::info!(target: "portwarden", "termination signal received; forwarding stop request");
            handler(ControlRequest::Stop);
        });
        Ok(())
    }

    fn report_status(&self, report: StatusReport) -> Result<(), HostError> {
        *self.last_report.lock() = Some(report);
        log::info!(
            target: "portwarden",
            "service status: {:?} (accepted: {}, checkpoint {}, wait hint {}ms, exit code {})",
            report.state,
            report.accepted,
            report.checkpoint,
            report.wait_hint.as_millis(),
            report.exit_code
        );
        Ok(())
    }

    fn create_stop_signal(&self) -> Result<CancellationSignal, HostError> {
        Ok(CancellationSignal::new())
    }
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                log::warn!(target: "portwarden", "failed to install SIGTERM handler: {}", err);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use crate::host::{
        AcceptedControls, ConsoleHost, ServiceHost, ServiceState, StatusReport,
    };
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case(AcceptedControls::NONE, "none")]
    #[case(AcceptedControls::STOP_AND_SHUTDOWN, "stop|shutdown")]
    #[case(AcceptedControls { stop: true, shutdown: false }, "stop")]
    #[case(AcceptedControls { stop: false, shutdown: true }, "shutdown")]
    fn test_accepted_controls_display(
        #[case] controls: AcceptedControls,
        #[case] rendered: &str,
    ) {
        assert_eq!(controls.to_string(), rendered);
    }

    #[test]
    fn test_console_host_records_last_report() {
        let host = ConsoleHost::new();
        assert!(host.last_report().is_none());

        let report = StatusReport {
            state: ServiceState::Running,
            accepted: AcceptedControls::STOP_AND_SHUTDOWN,
            checkpoint: 0,
            wait_hint: Duration::ZERO,
            exit_code: 0,
        };
        host.report_status(report).unwrap();
        assert_eq!(host.last_report(), Some(report));
    }

    #[test]
    fn test_stopped_report_shape() {
        let report = StatusReport::stopped(5);
        assert_eq!(report.state, ServiceState::Stopped);
        assert_eq!(report.accepted, AcceptedControls::NONE);
        assert_eq!(report.checkpoint, 0);
        assert_eq!(report.exit_code, 5);
    }
}
