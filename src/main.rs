use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use thermcam::command::IssuedCommand;
use thermcam::plan::plan_duration;
use thermcam::{
    mock_bus, DeviceDescriptor, HeadlessSurface, RecordingCommandSink, ShutdownReason,
    ThermcamConfig, ThermcamEvent, ThermcamService,
};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "thermcam")]
#[command(about = "USB thermal camera session manager")]
#[command(version)]
#[command(long_about = "Watches the USB bus for a thermal camera, asks for access, opens its \
control channel and runs the timed initialization that brings it to a calibrated preview \
with live temperature measurement.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "thermcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the service")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Drive the service with an in-process simulated camera
    #[arg(long, help = "Attach a simulated camera, run the initialization and print its status")]
    simulate: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args);

    info!("Starting thermcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = ThermcamConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let exit_code = if args.simulate {
        run_simulation(config).await?
    } else {
        run_hardware(config).await?
    };

    info!("thermcam exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

/// Attach a simulated camera, wait for the plan to finish and print the
/// resulting status as JSON
async fn run_simulation(config: ThermcamConfig) -> Result<i32> {
    let (backend, bus) = mock_bus();
    let sink = RecordingCommandSink::new();
    let (width, height) = config.preview.resolution;
    let surface = HeadlessSurface::new(width, height);
    let shutdown_timeout = config.system.shutdown_timeout();

    let device = DeviceDescriptor::new(1, config.device.class, config.device.subclass)
        .with_ids(0x0bda, 0x5830);

    let service = ThermcamService::new(config, backend, sink.clone(), surface)?;
    let handle = service.handle();
    let mut events = handle.subscribe();
    let task = tokio::spawn(service.run());

    // the first reply means the watcher is registered
    handle.status().await?;
    info!("Attaching simulated camera {}", device);
    bus.attach(device);

    let wait = plan_duration() + Duration::from_secs(1);
    let outcome = timeout(wait, wait_for_initialization(&mut events))
        .await
        .context("Simulated camera did not finish initializing")?;

    for command in sink.commands() {
        debug!("Issued {}", describe(&command));
    }

    let status = handle.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    handle.shutdown(ShutdownReason::UserRequest).await?;
    let exit_code = timeout(shutdown_timeout, task)
        .await
        .context("Service did not shut down in time")?
        .context("Service task failed")??;

    if let Err(message) = outcome {
        error!("Simulation failed: {}", message);
        return Ok(1);
    }
    Ok(exit_code)
}

async fn wait_for_initialization(
    events: &mut broadcast::Receiver<ThermcamEvent>,
) -> std::result::Result<(), String> {
    loop {
        match events.recv().await {
            Ok(ThermcamEvent::InitializationComplete { .. }) => return Ok(()),
            Ok(ThermcamEvent::Error { message, .. }) => return Err(message),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                return Err("event bus closed".to_string())
            }
        }
    }
}

fn describe(command: &IssuedCommand) -> String {
    match command {
        IssuedCommand::Open { handle_id, format } => format!(
            "open(handle={}, {}x{}, mirror={})",
            handle_id, format.width, format.height, format.mirror
        ),
        IssuedCommand::Close { handle_id } => format!("close(handle={})", handle_id),
        IssuedCommand::SetControl { control, value } => {
            format!("set_control({:?}={:#06x})", control, value)
        }
        IssuedCommand::ChangePalette(index) => format!("change_palette({})", index),
        IssuedCommand::StartPreview(target) => format!(
            "start_preview(surface={}, {}x{})",
            target.surface_id, target.width, target.height
        ),
        IssuedCommand::StopPreview => "stop_preview".to_string(),
        IssuedCommand::StartMeasurement => "start_measurement".to_string(),
        IssuedCommand::StopMeasurement => "stop_measurement".to_string(),
    }
}

/// Watch the real USB bus until SIGINT/SIGTERM.
///
/// Camera commands are only logged; the vendor command library is linked in
/// by the embedding application.
#[cfg(all(feature = "usb", target_os = "linux"))]
async fn run_hardware(config: ThermcamConfig) -> Result<i32> {
    use thermcam::{spawn_signal_handlers, LoggingCommandSink, UsbHotplugBackend};

    let backend = UsbHotplugBackend::new()?;
    let (width, height) = config.preview.resolution;
    let service = ThermcamService::new(
        config,
        backend,
        LoggingCommandSink::new(),
        HeadlessSurface::new(width, height),
    )?;

    spawn_signal_handlers(service.handle());
    let exit_code = service.run().await.map_err(|e| {
        error!("Service error during execution: {}", e);
        e
    })?;
    Ok(exit_code)
}

#[cfg(not(all(feature = "usb", target_os = "linux")))]
async fn run_hardware(_config: ThermcamConfig) -> Result<i32> {
    anyhow::bail!("thermcam was built without USB support; rebuild with `--features usb` or pass --simulate")
}

fn init_logging(args: &Args) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("thermcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# thermcam configuration file");
    println!("# Every key is optional; THERMCAM_<SECTION>__<KEY> environment variables override it");
    println!();
    println!("{}", ThermcamConfig::default().to_toml()?);
    Ok(())
}
