use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use mpro_core::{
    ActionRequest, DeviceRegistry, ErrorKind, MemoryRegion, MiniproDevice, NusbTransport,
    ProgError, ProgEvent, ProgObserver, ProgSession, ProgrammingMode, SizeCheck, TracingObserver,
};
use tracing::{debug, error};

#[derive(Parser, Debug)]
#[command(author, version, about = "MiniPro chip programmer tool (Pure Rust)", long_about = None)]
#[command(group(ArgGroup::new("action").args(["read", "write"])))]
struct Args {
    /// Read memory into FILE
    #[arg(short = 'r', value_name = "FILE")]
    read: Option<PathBuf>,

    /// Write memory from FILE
    #[arg(short = 'w', value_name = "FILE")]
    write: Option<PathBuf>,

    /// Do NOT erase device
    #[arg(short = 'e')]
    skip_erase: bool,

    /// Do NOT disable write-protect
    #[arg(short = 'u')]
    skip_protect_off: bool,

    /// Do NOT enable write-protect
    #[arg(short = 'P')]
    skip_protect_on: bool,

    /// Specify device (use "help" to list devices)
    #[arg(short = 'p', value_name = "DEVICE")]
    device: Option<String>,

    /// Specify memory type: code, data, config
    #[arg(short = 'c', value_name = "TYPE")]
    region: Option<MemoryRegion>,

    /// Use ICSP
    #[arg(short = 'i', conflicts_with = "icsp_no_vcc")]
    icsp: bool,

    /// Use ICSP (without enabling Vcc)
    #[arg(short = 'I')]
    icsp_no_vcc: bool,

    /// Error if file size does not match memory size
    #[arg(short = 's', conflicts_with = "size_silent")]
    size_strict: bool,

    /// No warning message for file size mismatch
    #[arg(short = 'S')]
    size_silent: bool,

    /// Load the device list from a TOML file
    #[arg(long, value_name = "FILE")]
    device_db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn mode(&self) -> ProgrammingMode {
        if self.icsp {
            ProgrammingMode::IcspWithVcc
        } else if self.icsp_no_vcc {
            ProgrammingMode::Icsp
        } else {
            ProgrammingMode::Standard
        }
    }

    fn size_check(&self) -> SizeCheck {
        if self.size_strict {
            SizeCheck::Strict
        } else if self.size_silent {
            SizeCheck::Silent
        } else {
            SizeCheck::Warn
        }
    }

    /// Build the run's request from the action flags.
    fn request(&self) -> Result<ActionRequest, ProgError> {
        let request = match (&self.read, &self.write) {
            (Some(path), _) => ActionRequest::read(path),
            (None, Some(path)) => ActionRequest::write(path),
            (None, None) => return Err(ProgError::usage("No action given (use -r or -w)")),
        };
        Ok(request
            .with_region(self.region.unwrap_or_default())
            .with_size_check(self.size_check())
            .with_mode(self.mode())
            .skipping(self.skip_erase, self.skip_protect_off, self.skip_protect_on))
    }
}

/// Prints step progress on stderr the way a terminal user expects it.
struct ConsoleObserver;

impl ProgObserver for ConsoleObserver {
    fn on_event(&self, event: &ProgEvent) {
        let mut err = std::io::stderr().lock();
        let _ = match event {
            ProgEvent::ProgrammerFound { info } => writeln!(err, "Found Minipro {info}"),
            ProgEvent::ChipIdVerified { chip_id } => writeln!(err, "Chip ID OK: 0x{chip_id:02x}"),
            ProgEvent::StepStarted { operation, target } => write!(err, "{operation} {target}... "),
            ProgEvent::Progress {
                operation,
                target,
                percent,
            } => write!(err, "\r{operation} {target}... {percent:>3}%"),
            ProgEvent::StepFinished { operation, target } => {
                writeln!(err, "\r{operation} {target}... OK  ")
            }
            ProgEvent::Warning { message } => writeln!(err, "Warning: {message}"),
            other => {
                TracingObserver.on_event(other);
                Ok(())
            }
        };
        let _ = err.flush();
    }
}

fn load_registry(args: &Args) -> Result<DeviceRegistry> {
    match &args.device_db {
        Some(path) => DeviceRegistry::load_from_file(path),
        None => Ok(DeviceRegistry::builtin()?),
    }
}

fn run(args: &Args) -> Result<()> {
    let registry = load_registry(args)?;

    if args.device.as_deref() == Some("help") {
        let mut out = std::io::stdout().lock();
        for name in registry.names() {
            writeln!(out, "{name}")?;
        }
        return Ok(());
    }

    let request = args.request()?;
    let name = args
        .device
        .as_deref()
        .ok_or_else(|| ProgError::usage("Device required"))?;
    let device = registry.lookup(name)?.clone();
    debug!(?request, device = %device.name, "Parsed request");

    let transport = NusbTransport::open().context("Couldn't open programmer")?;
    let programmer = MiniproDevice::new(transport, device.clone(), request.mode.icsp_byte());

    let mut session = ProgSession::open(programmer, device, Arc::new(ConsoleObserver))?;
    session.run(&request)?;
    session.close()?;
    Ok(())
}

/// Usage errors exit with 2 like clap's own; everything else with 1.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ProgError>().map(ProgError::kind) {
        Some(ErrorKind::Usage) => 2,
        _ => 1,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}
