//! Fieldlog CLI - poll a configured port and log acquisition cycles
//!
//! Exit codes: 0 on success, 1 on fatal errors, 130 on user interrupt.

use anyhow::{anyhow, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use fieldlog_core::cli::ExitCodes;
use fieldlog_core::config::{self, PortAction, Settings};
use fieldlog_core::core::bus::{ModbusBus, PortConfig};
use fieldlog_core::core::logger::LogRecord;
use fieldlog_core::core::session::AcquisitionSession;
use fieldlog_core::core::tracker::{SessionState, SessionTracker, TrackerError};
use fieldlog_core::core::transport::{ClientBackend, DefaultClientFactory, SerialParity};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fieldlog CLI
#[derive(Parser, Debug)]
#[command(
    name = "fieldlog",
    author = "Fieldlog Team",
    version,
    about = "Serial register poller and cycle logger",
    long_about = None
)]
struct Cli {
    /// Path to settings TOML (defaults to the user config directory)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a logging cycle on a configured port
    StartCycle(StartCycleArgs),

    /// Manage port configurations
    Ports {
        #[command(subcommand)]
        action: PortsAction,
    },

    /// Show the active session if any
    Status,

    /// Clear active session state (a running process must still be interrupted manually)
    Stop,
}

#[derive(Args, Debug)]
struct StartCycleArgs {
    /// Port id defined in the settings file
    #[arg(long)]
    port_id: String,

    /// Cycle name used in the log filename
    #[arg(long)]
    cycle_name: String,

    /// Number of reads to perform
    #[arg(long, default_value_t = 5)]
    iterations: u32,

    /// Seconds between reads
    #[arg(long, default_value_t = 1.0)]
    interval: f64,

    /// Register start address
    #[arg(long, default_value_t = 0)]
    address: u16,

    /// Number of registers to read
    #[arg(long, default_value_t = 10)]
    count: u16,

    /// Client backend (stub, rtu)
    #[arg(long, default_value = "stub")]
    client: String,

    /// Override port timeout for this run (seconds)
    #[arg(long)]
    timeout: Option<f64>,

    /// Override connect retry count
    #[arg(long)]
    connect_retries: Option<u32>,

    /// Override read retry count
    #[arg(long)]
    read_retries: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum PortsAction {
    /// List configured ports
    List,

    /// Add a new port
    Add(AddPortArgs),

    /// Update an existing port
    Update(UpdatePortArgs),

    /// Remove a port by id
    Remove {
        /// Port id to remove
        #[arg(long)]
        port_id: String,
    },
}

#[derive(Args, Debug)]
struct AddPortArgs {
    /// Unique port id
    #[arg(long)]
    port_id: String,

    /// Device path, e.g. COM3 or /dev/ttyUSB0
    #[arg(long)]
    device: String,

    /// Baud rate
    #[arg(long)]
    baud_rate: u32,

    /// Parity (none, odd, even)
    #[arg(long, default_value = "none")]
    parity: String,

    /// Stop bits (1, 2)
    #[arg(long, default_value_t = 1)]
    stop_bits: u8,

    /// Data bits (5-8)
    #[arg(long, default_value_t = 8)]
    data_bits: u8,

    /// Link timeout in seconds
    #[arg(long, default_value_t = 1.0)]
    timeout: f64,

    /// Seconds between polls
    #[arg(long)]
    poll_interval: Option<f64>,

    /// Unit identifier of the target device
    #[arg(long)]
    unit_id: u8,

    /// Connect retry count
    #[arg(long)]
    connect_retries: Option<u32>,

    /// Seconds between failed connect attempts
    #[arg(long)]
    connect_retry_delay: Option<f64>,

    /// Read retry count
    #[arg(long)]
    read_retries: Option<u32>,

    /// Seconds between failed read attempts
    #[arg(long)]
    read_retry_delay: Option<f64>,
}

impl AddPortArgs {
    fn into_port_config(self) -> anyhow::Result<PortConfig> {
        let parity: SerialParity = self.parity.parse().map_err(|e: String| anyhow!(e))?;

        let mut port = PortConfig::new(&self.port_id, &self.device, self.baud_rate, self.unit_id);
        port.parity = parity;
        port.stop_bits = self.stop_bits;
        port.data_bits = self.data_bits;
        port.timeout_secs = self.timeout;
        if let Some(interval) = self.poll_interval {
            port.poll_interval_secs = interval;
        }
        if let Some(n) = self.connect_retries {
            port.connect_retries = n;
        }
        if let Some(delay) = self.connect_retry_delay {
            port.connect_retry_delay_secs = delay;
        }
        if let Some(n) = self.read_retries {
            port.read_retries = n;
        }
        if let Some(delay) = self.read_retry_delay {
            port.read_retry_delay_secs = delay;
        }
        Ok(port)
    }
}

#[derive(Args, Debug)]
struct UpdatePortArgs {
    /// Port id to update
    #[arg(long)]
    port_id: String,

    /// Device path, e.g. COM3 or /dev/ttyUSB0
    #[arg(long)]
    device: Option<String>,

    /// Baud rate
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Parity (none, odd, even)
    #[arg(long)]
    parity: Option<String>,

    /// Stop bits (1, 2)
    #[arg(long)]
    stop_bits: Option<u8>,

    /// Data bits (5-8)
    #[arg(long)]
    data_bits: Option<u8>,

    /// Link timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Seconds between polls
    #[arg(long)]
    poll_interval: Option<f64>,

    /// Unit identifier of the target device
    #[arg(long)]
    unit_id: Option<u8>,

    /// Connect retry count
    #[arg(long)]
    connect_retries: Option<u32>,

    /// Seconds between failed connect attempts
    #[arg(long)]
    connect_retry_delay: Option<f64>,

    /// Read retry count
    #[arg(long)]
    read_retries: Option<u32>,

    /// Seconds between failed read attempts
    #[arg(long)]
    read_retry_delay: Option<f64>,
}

impl UpdatePortArgs {
    fn apply(&self, port: &mut PortConfig) -> anyhow::Result<()> {
        if let Some(ref device) = self.device {
            port.device = device.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            port.baud_rate = baud_rate;
        }
        if let Some(ref parity) = self.parity {
            port.parity = parity.parse().map_err(|e: String| anyhow!(e))?;
        }
        if let Some(stop_bits) = self.stop_bits {
            port.stop_bits = stop_bits;
        }
        if let Some(data_bits) = self.data_bits {
            port.data_bits = data_bits;
        }
        if let Some(timeout) = self.timeout {
            port.timeout_secs = timeout;
        }
        if let Some(interval) = self.poll_interval {
            port.poll_interval_secs = interval;
        }
        if let Some(unit_id) = self.unit_id {
            port.unit_id = unit_id;
        }
        if let Some(n) = self.connect_retries {
            port.connect_retries = n;
        }
        if let Some(delay) = self.connect_retry_delay {
            port.connect_retry_delay_secs = delay;
        }
        if let Some(n) = self.read_retries {
            port.read_retries = n;
        }
        if let Some(delay) = self.read_retry_delay {
            port.read_retry_delay_secs = delay;
        }
        Ok(())
    }
}

/// How a cycle ended
enum CycleOutcome {
    Completed,
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();

    match run(cli).await {
        Ok(CycleOutcome::Completed) => ExitCode::from(ExitCodes::SUCCESS),
        Ok(CycleOutcome::Interrupted) => {
            tracing::info!("Interrupted by user.");
            ExitCode::from(ExitCodes::INTERRUPTED)
        }
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(ExitCodes::ERROR)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<CycleOutcome> {
    let settings_path = match cli.settings {
        Some(path) => path,
        None => config::default_settings_path()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?,
    };

    match cli.command {
        Commands::StartCycle(args) => start_cycle(&settings_path, args).await,
        Commands::Ports { action } => {
            ports_command(&settings_path, action)?;
            Ok(CycleOutcome::Completed)
        }
        Commands::Status => {
            show_status(&settings_path)?;
            Ok(CycleOutcome::Completed)
        }
        Commands::Stop => {
            stop_session(&settings_path)?;
            Ok(CycleOutcome::Completed)
        }
    }
}

async fn start_cycle(settings_path: &Path, args: StartCycleArgs) -> anyhow::Result<CycleOutcome> {
    let settings = Settings::load(settings_path)?;
    let mut port = settings.port(&args.port_id).cloned().ok_or_else(|| {
        let available: Vec<&str> = settings.ports.iter().map(|p| p.id.as_str()).collect();
        anyhow!(
            "Port id '{}' not found. Available: {}",
            args.port_id,
            available.join(", ")
        )
    })?;
    if !port.enabled {
        bail!("Port id '{}' is disabled in settings.", port.id);
    }

    if let Some(timeout) = args.timeout {
        port.timeout_secs = timeout;
    }
    if let Some(n) = args.connect_retries {
        port.connect_retries = n;
    }
    if let Some(n) = args.read_retries {
        port.read_retries = n;
    }

    let backend: ClientBackend = args.client.parse()?;
    let factory = DefaultClientFactory::new(backend);

    let log_dir = settings.log_dir().to_path_buf();
    let tracker = SessionTracker::for_log_dir(&log_dir);
    match tracker.load() {
        Ok(Some(existing)) => bail!(
            "Session already running: {} on {}, started {}",
            existing.cycle_name,
            existing.port_id,
            existing.started_at
        ),
        Ok(None) => {}
        Err(TrackerError::CorruptState(err)) => {
            tracing::warn!("Ignoring unreadable session state ({err}); treating as no active session");
        }
        Err(err) => return Err(err.into()),
    }

    let mut bus = ModbusBus::new(port.clone(), Box::new(factory));
    bus.connect().await?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let flag = stop_flag.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;
    }

    tracing::info!("Starting cycle '{}' on port '{}'", args.cycle_name, port.id);
    let mut session = AcquisitionSession::new(&args.cycle_name, log_dir.clone());

    let cycle_result = run_cycle(&mut bus, &mut session, &tracker, &port, &args, &stop_flag).await;

    // Teardown runs on every exit path, interrupt and read failure included.
    session.stop();
    if let Err(err) = tracker.clear() {
        tracing::warn!("Could not clear session state: {err}");
    }
    bus.close().await;
    tracing::info!("Session finished. Log written to '{}'", log_dir.display());

    cycle_result
}

async fn run_cycle(
    bus: &mut ModbusBus,
    session: &mut AcquisitionSession,
    tracker: &SessionTracker,
    port: &PortConfig,
    args: &StartCycleArgs,
    stop_flag: &AtomicBool,
) -> anyhow::Result<CycleOutcome> {
    let log_path = session.start()?;
    let started_at = session.started_at().unwrap_or_else(Utc::now);
    tracker.save(&SessionState::new(
        &args.cycle_name,
        &port.id,
        started_at,
        &log_path,
    ))?;

    for i in 0..args.iterations {
        if stop_flag.load(Ordering::SeqCst) {
            return Ok(CycleOutcome::Interrupted);
        }

        let response = bus.read_holding_registers(args.address, args.count).await?;
        let record = LogRecord::new(&port.id, json!({ "holding_registers": response.detail }))
            .with_meta(json!({ "iteration": i }));
        session.log(&record)?;
        tracing::debug!("Logged iteration {}: {:?}", i, response.values);

        tokio::time::sleep(Duration::from_secs_f64(args.interval.max(0.0))).await;
    }

    Ok(CycleOutcome::Completed)
}

fn ports_command(settings_path: &Path, action: PortsAction) -> anyhow::Result<()> {
    match action {
        PortsAction::List => {
            let settings = Settings::load(settings_path)?;
            if settings.ports.is_empty() {
                println!("No ports configured.");
                return Ok(());
            }
            for p in &settings.ports {
                println!(
                    "{}: {} baud={} parity={} stop_bits={} data_bits={} unit_id={}{}",
                    p.id,
                    p.device,
                    p.baud_rate,
                    p.parity.letter(),
                    p.stop_bits,
                    p.data_bits,
                    p.unit_id,
                    if p.enabled { "" } else { " (disabled)" }
                );
            }
        }
        PortsAction::Add(args) => {
            let mut settings = Settings::load(settings_path)?;
            let port = args.into_port_config()?;
            let id = port.id.clone();
            let action = settings.add_or_update_port(port);
            settings.save(settings_path)?;
            let verb = match action {
                PortAction::Added => "added",
                PortAction::Updated => "updated",
            };
            tracing::info!("Port {} {}", id, verb);
        }
        PortsAction::Update(args) => {
            let mut settings = Settings::load(settings_path)?;
            let mut port = settings
                .port(&args.port_id)
                .cloned()
                .ok_or_else(|| anyhow!("Port id '{}' not found.", args.port_id))?;
            args.apply(&mut port)?;
            settings.add_or_update_port(port);
            settings.save(settings_path)?;
            tracing::info!("Port {} updated", args.port_id);
        }
        PortsAction::Remove { port_id } => {
            let mut settings = Settings::load(settings_path)?;
            if !settings.remove_port(&port_id) {
                bail!("Port id '{}' not found.", port_id);
            }
            settings.save(settings_path)?;
            tracing::info!("Port {} removed", port_id);
        }
    }
    Ok(())
}

fn show_status(settings_path: &Path) -> anyhow::Result<()> {
    let settings = Settings::load(settings_path)?;
    let tracker = SessionTracker::for_log_dir(settings.log_dir());
    match tracker.load() {
        Ok(None) => println!("No active session."),
        Ok(Some(state)) => println!(
            "Active session: cycle={}, port={}, started={}, log_file={}",
            state.cycle_name, state.port_id, state.started_at, state.log_file
        ),
        Err(TrackerError::CorruptState(err)) => {
            println!("Session state file is unreadable ({err}); treating as no active session.");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn stop_session(settings_path: &Path) -> anyhow::Result<()> {
    let settings = Settings::load(settings_path)?;
    let tracker = SessionTracker::for_log_dir(settings.log_dir());
    match tracker.load() {
        Ok(None) => println!("No active session."),
        Ok(Some(state)) => {
            tracker.clear()?;
            println!(
                "Cleared session state for cycle={}. This does not stop a running \
                 acquisition process; interrupt it with Ctrl+C.",
                state.cycle_name
            );
        }
        Err(TrackerError::CorruptState(_)) => {
            tracker.clear()?;
            println!("Cleared unreadable session state.");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
