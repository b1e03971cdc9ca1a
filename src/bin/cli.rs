//! Serialprobe CLI - Command-line interface
//!
//! Drives negotiation, scans and passive listening from the shell and maps
//! outcomes to exit codes for scripting.

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use serialprobe_core::cli::report;
use serialprobe_core::core::codec::hex as hexfmt;
use serialprobe_core::core::transport::list_ports;
use serialprobe_core::{
    generator, monitor_bauds, negotiate, scan, scan_at, CliResult, Classifier, ConfigError,
    OutputFormat, ScanConfig, ScanControl, SerialConnector,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Serialprobe CLI
#[derive(Parser, Debug)]
#[command(
    name = "serialprobe",
    author,
    version,
    about = "Discover the command protocol of an undocumented serial device",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to serialprobe.toml in the config directory)
    #[arg(short, long, global = true, env = "SERIALPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Stop scanning after this many seconds
    #[arg(long, global = true)]
    max_duration: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    Ports,

    /// Print the candidate frames without opening a port
    Frames {
        /// Append the wake dictionary
        #[arg(long)]
        wake: bool,
    },

    /// Find the baud rate the device answers at
    Negotiate {
        /// Serial port name (e.g., COM3, /dev/ttyUSB0)
        #[arg(short, long)]
        port: Option<String>,

        /// Also try 2400 and 1200 baud
        #[arg(long)]
        extended: bool,

        /// Keep going after the first rate that answers
        #[arg(long)]
        no_early_exit: bool,
    },

    /// Negotiate, then send the whole candidate space
    Scan {
        /// Serial port name
        #[arg(short, long)]
        port: Option<String>,

        /// Skip negotiation and scan at this rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Also try 2400 and 1200 baud during negotiation
        #[arg(long, conflicts_with = "baud")]
        extended: bool,

        /// Stop after negotiation
        #[arg(long, conflicts_with = "baud")]
        no_full_scan: bool,

        /// Append the wake dictionary to the candidate space
        #[arg(long)]
        wake: bool,
    },

    /// Listen without sending anything
    Monitor {
        /// Serial port name
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate (defaults to the first configured rate)
        #[arg(short, long)]
        baud: Option<u32>,

        /// Listen at every configured rate in turn
        #[arg(long, conflicts_with = "baud")]
        all_bauds: bool,

        /// Seconds to listen at each rate
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },

    /// Classify a response given as hex
    Classify {
        /// Response bytes (e.g., "FA F5 00 64" or "4641463530310D0A")
        hex: String,
    },

    /// Print or write the effective configuration
    Config {
        /// Write it to this path
        #[arg(long)]
        write: Option<PathBuf>,
    },

    /// Print the exit code table
    ExitCodes,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return CliResult::invalid_args(e.to_string()).to_exit_code();
        }
    };

    let result = match run(&cli).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            CliResult::error(serialprobe_core::ExitCodes::ERROR, format!("{:#}", e))
        }
    };

    match &result {
        CliResult::Success(Some(msg)) if !cli.quiet => eprintln!("{}", msg),
        CliResult::Error(_, msg) => eprintln!("Error: {}", msg),
        _ => {}
    }
    result.to_exit_code()
}

fn init_logging(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let Some(path) = &cli.log_file else {
        if cli.log_json {
            builder.json().with_writer(std::io::stderr).init();
        } else {
            builder.with_writer(std::io::stderr).init();
        }
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .with_context(|| format!("Invalid log file path: {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

    if cli.log_json {
        builder.json().with_writer(writer).with_ansi(false).init();
    } else {
        builder.with_writer(writer).with_ansi(false).init();
    }
    Ok(Some(guard))
}

fn load_config(cli: &Cli) -> Result<ScanConfig, ConfigError> {
    ScanConfig::load_or_default(cli.config.as_deref())
}

/// Cancellation wired to Ctrl-C and `--max-duration`
fn scan_control(cli: &Cli) -> anyhow::Result<ScanControl> {
    let mut control = ScanControl::new();
    if let Some(secs) = cli.max_duration {
        control = control.with_timeout(Duration::from_secs(secs));
    }
    let handler = control.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("Interrupted, closing port");
        handler.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;
    Ok(control)
}

fn resolve_port(arg: Option<&String>, config: &ScanConfig) -> Option<String> {
    arg.cloned().or_else(|| config.port.clone())
}

fn emit(text: &str) {
    if text.ends_with('\n') {
        print!("{}", text);
    } else {
        println!("{}", text);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<CliResult> {
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => return Ok(CliResult::from(e)),
    };
    let classifier = Classifier::new(config.classifier.clone());

    match &cli.command {
        Commands::Ports => {
            let ports = match list_ports() {
                Ok(ports) => ports,
                Err(e) => return Ok(CliResult::from(e)),
            };
            emit(&report::ports_report(&ports, cli.format)?);
            Ok(CliResult::success())
        }

        Commands::Frames { wake } => {
            let mut generator_config = config.generator.clone();
            generator_config.include_wake_sequences |= *wake;
            let space = generator::generate(&generator_config);
            emit(&report::frames_report(&space, cli.format)?);
            Ok(CliResult::success())
        }

        Commands::Negotiate {
            port,
            extended,
            no_early_exit,
        } => {
            let Some(port) = resolve_port(port.as_ref(), &config) else {
                return Ok(CliResult::invalid_args("No port given (use --port or set `port` in the config)"));
            };
            let mut options = config.negotiation_options();
            if *extended {
                options.baud_rates = config.extended_baud_rates();
            }
            if *no_early_exit {
                options.stop_on_first_response = false;
            }

            let control = scan_control(cli)?;
            let connector = SerialConnector::new(config.timing.poll_interval());
            match negotiate(&connector, &port, &options, &generator::probe_subset(), &control).await {
                Ok(negotiation) => {
                    emit(&report::session_report(&negotiation.session, &classifier, cli.format)?);
                    Ok(CliResult::success_with_message(format!(
                        "Device responded at {} baud",
                        negotiation.baud
                    )))
                }
                Err(e) => {
                    emit(&report::session_report(e.session(), &classifier, cli.format)?);
                    Ok(CliResult::from(&e))
                }
            }
        }

        Commands::Scan {
            port,
            baud,
            extended,
            no_full_scan,
            wake,
        } => {
            let Some(port) = resolve_port(port.as_ref(), &config) else {
                return Ok(CliResult::invalid_args("No port given (use --port or set `port` in the config)"));
            };
            let mut generator_config = config.generator.clone();
            generator_config.include_wake_sequences |= *wake;
            let candidates = generator::generate(&generator_config);

            let control = scan_control(cli)?;
            let connector = SerialConnector::new(config.timing.poll_interval());

            let session = if let Some(baud) = baud {
                match scan_at(
                    &connector,
                    &port,
                    *baud,
                    &config.line,
                    candidates.frames(),
                    &config.executor(),
                    &control,
                )
                .await
                {
                    Ok(session) => session,
                    Err(e) => return Ok(CliResult::from(e)),
                }
            } else {
                let mut options = config.scan_options();
                if *extended {
                    options.negotiation.baud_rates = config.extended_baud_rates();
                }
                if *no_full_scan {
                    options.full_scan = false;
                }
                match scan(
                    &connector,
                    &port,
                    &options,
                    &generator::probe_subset(),
                    &candidates,
                    &control,
                )
                .await
                {
                    Ok(session) => session,
                    Err(e) => {
                        emit(&report::session_report(e.session(), &classifier, cli.format)?);
                        return Ok(CliResult::from(&e));
                    }
                }
            };

            emit(&report::session_report(&session, &classifier, cli.format)?);
            if control.is_cancelled() {
                return Ok(CliResult::cancelled());
            }
            let found = session.successful_frames().len();
            Ok(CliResult::success_with_message(format!(
                "{} of {} probes got a response",
                found,
                session.results().len()
            )))
        }

        Commands::Monitor {
            port,
            baud,
            all_bauds,
            seconds,
        } => {
            let Some(port) = resolve_port(port.as_ref(), &config) else {
                return Ok(CliResult::invalid_args("No port given (use --port or set `port` in the config)"));
            };
            let bauds = if *all_bauds {
                config.baud_rates.clone()
            } else {
                vec![baud.or_else(|| config.baud_rates.first().copied()).unwrap_or(9600)]
            };

            let control = scan_control(cli)?;
            let connector = SerialConnector::new(config.timing.poll_interval());
            let captures = monitor_bauds(
                &connector,
                &port,
                &config.line,
                &bauds,
                Duration::from_secs(*seconds),
                config.timing.poll_interval(),
                &control,
            )
            .await;

            emit(&report::capture_report(&captures, cli.format)?);
            if control.is_cancelled() && cli.max_duration.is_none() {
                return Ok(CliResult::cancelled());
            }
            Ok(CliResult::success())
        }

        Commands::Classify { hex } => {
            let raw = match hexfmt::parse(hex) {
                Ok(raw) => raw,
                Err(e) => return Ok(CliResult::invalid_args(e.to_string())),
            };
            let classified = classifier.classify(&raw);
            emit(&report::classification_report(&raw, &classified, cli.format)?);
            Ok(CliResult::success())
        }

        Commands::Config { write } => {
            let text = match config.to_toml() {
                Ok(text) => text,
                Err(e) => return Ok(CliResult::from(e)),
            };
            if let Some(path) = write {
                if let Err(e) = config.save(path) {
                    return Ok(CliResult::from(e));
                }
                return Ok(CliResult::success_with_message(format!(
                    "Configuration written to {}",
                    path.display()
                )));
            }
            emit(&text);
            Ok(CliResult::success())
        }

        Commands::ExitCodes => {
            emit(&serialprobe_core::cli::exit_code_table());
            Ok(CliResult::success())
        }
    }
}
