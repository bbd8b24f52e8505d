use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "metromc CLI - Metropolis Monte Carlo simulation of particles and rigid molecules in canonical, isobaric, grand-canonical and replica-exchange ensembles.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used for energy sums.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a simulation described by an input file and write its statistics as JSON.
    Run(RunArgs),
    /// Load an input file, build the system and every move, then exit without sampling.
    Validate(ValidateArgs),
}

/// Overrides shared by `run` and `validate`.
#[derive(Args, Debug, Clone, Default)]
pub struct SimulationOverrides {
    /// Override the master random seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Override the number of macro steps.
    #[arg(long, value_name = "INT")]
    pub macro_steps: Option<u64>,

    /// Override the number of micro steps per macro step.
    #[arg(long, value_name = "INT")]
    pub micro_steps: Option<u64>,

    /// Override the number of in-process replicas for parallel tempering.
    #[arg(short, long, value_name = "INT")]
    pub replicas: Option<usize>,

    /// Override how long a replica waits for its partner, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Set a specific configuration value, overriding the input file.
    /// Can be used multiple times. Example: -S simulation.drift-tolerance=1e-6
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the input file in TOML format (system, moves and simulation settings).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the JSON statistics. Printed to stdout when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: SimulationOverrides,
}

/// Arguments for the `validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the input file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    #[command(flatten)]
    pub overrides: SimulationOverrides,
}
