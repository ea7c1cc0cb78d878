//! `okl`: transpile OKL kernels to backend C++.
//!
//! ```bash
//! okl transpile add.okl --backend cuda -o add.cu --metadata add.json
//! okl normalize add.okl
//! okl backends
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use okl_cli::{
    cli::CliConfig,
    commands::{self, normalize::NormalizeArgs, transpile::TranspileArgs},
    diagnostics::{render_cli_error, setup_error_reporting},
    CliError, Result,
};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "okl",
    version = env!("CARGO_PKG_VERSION"),
    about = "OKL transpiler: annotated C++ kernels to Serial, OpenMP, CUDA, HIP and DPC++"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Set log level (overrides --verbose/--quiet)
    #[arg(long, global = true, value_enum)]
    log: Option<LogLevel>,

    /// Set log output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Configuration file path (defaults to ./okl.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    directory: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Transpile an OKL file for one backend
    Transpile(TranspileArgs),

    /// Rewrite `@attr` markers into standard attributes without transpiling
    Normalize(NormalizeArgs),

    /// List supported backends
    Backends,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        if !render_cli_error(&e) {
            error!("{}", e);
        }
        if cli.verbose > 0 {
            error!(?e, "detailed error context");
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    setup_logging(cli.verbose, cli.quiet, cli.log, cli.log_format);
    setup_error_reporting()?;

    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir).map_err(CliError::Io)?;
    }
    let mut config = CliConfig::load(cli.config.as_deref())?;
    if cli.quiet {
        config.pipeline.debug.print_diagnostics = false;
    }

    match &cli.command {
        Commands::Transpile(args) => commands::transpile_command(args.clone(), &config)?,
        Commands::Normalize(args) => commands::normalize_command(args.clone(), &config)?,
        Commands::Backends => commands::backends_command(&config)?,
    }
    if cli.verbose > 0 {
        info!("Command completed successfully");
    }
    Ok(())
}

fn setup_logging(verbose: u8, quiet: bool, log_level: Option<LogLevel>, log_format: LogFormat) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if let Some(level) = log_level {
        EnvFilter::new(match level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        })
    } else if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let formatter = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_level(true);

    match log_format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(formatter)
                .with(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(formatter.json())
                .with(filter)
                .init();
        }
    }
}
