//! CDX CLI - inspect, convert and analyze channel impulse response containers.

mod analyze;
mod convert;
mod info;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cdx")]
#[command(author, version, about = "Channel impulse response container tool", long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resample a continuous-delay container onto a discrete delay grid
    Convert(convert::ConvertArgs),

    /// Show parameters and links of a container
    Info(info::InfoArgs),

    /// Print per-snapshot statistics of one link as CSV
    Analyze(analyze::AnalyzeArgs),
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    // RUST_LOG wins over the flags
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Convert(args) => convert::run(args),
        Commands::Info(args) => info::run(args),
        Commands::Analyze(args) => analyze::run(args),
    }
}
