mod config;
mod event;
mod metrics;
mod policy;
mod process;
mod procfs;
mod sink;
mod supervisor;
mod threshold;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use config::ConfigFile;
use sink::{EventSink, JsonlSink, NullSink};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use supervisor::Supervisor;
use tracing_subscriber::EnvFilter;

/// Run a program under supervision: sample its memory, CPU time and wall
/// time every tick, log each observation, and kill it when a limit is exceeded.
#[derive(Parser, Debug)]
#[command(name = "procwarden", version, about)]
pub struct Cli {
    /// Program to supervise, followed by its arguments
    #[arg(
        value_name = "PROGRAM",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,

    /// Config file path
    #[arg(short, long, default_value = "procwarden.toml")]
    config: PathBuf,

    /// Event log path (overrides config)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Memory limit in bytes (overrides config)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    memory_limit: Option<u64>,

    /// CPU time limit in milliseconds (overrides config)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    cpu_limit_ms: Option<u64>,

    /// Wall time limit in milliseconds (overrides config)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    wall_limit_ms: Option<u64>,

    /// Sampling interval in milliseconds (overrides config)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: Option<u64>,

    /// Print the resolved settings and exit without running anything
    #[arg(long)]
    dry_run: bool,

    /// Log every sample
    #[arg(short, long)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Parse arguments, rejecting a blank PROGRAM as a usage error.
    fn parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Self::try_parse_from(args)?;
        if cli.program().trim().is_empty() {
            return Err(Self::command().error(
                ErrorKind::InvalidValue,
                "PROGRAM must name a program to run",
            ));
        }
        Ok(cli)
    }

    fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    /// Everything after PROGRAM, passed through untouched.
    fn program_args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }
}

fn init_tracing(cli: &Cli) {
    let default_directive = if cli.verbose {
        "procwarden=debug"
    } else if cli.quiet {
        "procwarden=warn"
    } else {
        "procwarden=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_sink(path: &Path) -> Box<dyn EventSink> {
    match JsonlSink::open(path) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            tracing::warn!(error = %e, "event log unavailable, events will not be recorded");
            Box::new(NullSink)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_from_args(std::env::args_os()).unwrap_or_else(|e| e.exit());
    init_tracing(&cli);
    tracing::debug!(?cli, "parsed CLI arguments");

    let config_file = ConfigFile::new(&cli.config);
    let (settings, policy) = config_file.load_settings();
    let policy = match policy.with_overrides(
        cli.memory_limit,
        cli.cpu_limit_ms,
        cli.wall_limit_ms,
    ) {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };
    let tick_interval = cli
        .tick_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| settings.supervisor.tick_interval());
    let log_path = cli.log_file.clone().unwrap_or(settings.log.path);

    if cli.dry_run {
        println!("procwarden v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file:   {}", config_file.path().display());
        println!("Program:       {}", cli.command.join(" "));
        println!("Memory limit:  {} bytes", policy.memory_limit_bytes());
        println!("CPU limit:     {} ms", policy.cpu_time_limit_ms());
        println!("Wall limit:    {} ms", policy.wall_time_limit_ms());
        println!("Tick interval: {} ms", tick_interval.as_millis());
        println!("Event log:     {}", log_path.display());
        println!("Dry run mode, not running.");
        return ExitCode::SUCCESS;
    }

    let mut supervisor = Supervisor::new(policy, tick_interval, open_sink(&log_path));
    match supervisor.run(cli.program(), cli.program_args()).await {
        Ok(outcome) => {
            if supervisor.dropped_events() > 0 {
                tracing::warn!(
                    dropped = supervisor.dropped_events(),
                    "some events could not be written to the event log"
                );
            }
            println!("{}: {}", cli.program(), outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "could not start supervised program");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
