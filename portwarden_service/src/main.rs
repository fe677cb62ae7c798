use clap::{Parser, Subcommand};
use portwarden_service::config::{default_mapping_spec, KeeperSettings};
use portwarden_service::controller::ServiceController;
use portwarden_service::host::{ConsoleHost, EXIT_NOT_DISPATCHED};
use portwarden_wire::IgdClient;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "portwarden",
    version,
    about = "Keeps a single UPnP gateway port mapping alive"
)]
struct Cmdline {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the keeper in the foreground under the console host
    Run {
        /// Log file path; defaults to portwarden.log next to the executable
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
}

fn main() {
    let cmdline = Cmdline::parse();
    let code = match cmdline.command {
        Some(Command::Run { log_file }) => run_service(log_file),
        None => print_management_hints(),
    };
    std::process::exit(code);
}

fn run_service(log_file: Option<PathBuf>) -> i32 {
    let log_path = log_file.unwrap_or_else(default_log_path);
    let _log_guard = portwarden_logging::setup_service_log(&log_path);
    log::info!(
        target: "portwarden",
        "portwarden starting (log file: {})",
        log_path.display()
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!(target: "portwarden", "async runtime startup failed: {}", err);
            return err.raw_os_error().unwrap_or(EXIT_NOT_DISPATCHED);
        }
    };

    runtime.block_on(async {
        let host = Arc::new(ConsoleHost::new());
        let client = Arc::new(IgdClient::default());
        let controller = ServiceController::new(
            host,
            client,
            default_mapping_spec(),
            KeeperSettings::default(),
        );
        controller.run().await
    })
}

fn default_log_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("portwarden.log")))
        .unwrap_or_else(|| PathBuf::from("portwarden.log"))
}

/// No mapping work happens on this path; the process only explains how it is
/// meant to be launched and exits.
fn print_management_hints() -> i32 {
    println!("portwarden maintains a gateway port mapping and is meant to run under a service manager.");
    println!();
    match std::env::current_exe() {
        Ok(exe) => {
            println!("Run in the foreground:");
            println!("  {} run", exe.display());
            println!();
            println!("Manage as a systemd unit (portwarden.service with `ExecStart={} run`):", exe.display());
        }
        Err(_) => {
            println!("Run in the foreground:");
            println!("  portwarden run");
            println!();
            println!("Manage as a systemd unit (portwarden.service with `ExecStart=portwarden run`):");
        }
    }
    println!("  Install: sudo systemctl enable portwarden");
    println!("  Start:   sudo systemctl start portwarden");
    println!("  Stop:    sudo systemctl stop portwarden");
    println!("  Delete:  sudo systemctl disable portwarden");
    EXIT_NOT_DISPATCHED
}
