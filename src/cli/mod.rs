use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;
pub mod output;

pub use commands::{check, describe, eval, InputsFile};
pub use output::OutputMode;

#[derive(Parser)]
#[command(name = "lwgraph")]
#[command(version)]
#[command(about = "Evaluate frozen neural network graphs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml, $LWGRAPH_ENV.toml)
    #[arg(short, long, default_value = "config")]
    pub config: PathBuf,

    /// Default output name (overrides model.default_output)
    #[arg(long, global = true)]
    pub default_output: Option<String>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the graph and dry-run every output with zero-filled inputs
    Check {
        /// Graph description (JSON); defaults to model.path
        #[arg(short, long)]
        model: Option<PathBuf>,
        /// Time steps per sequence input (defaults to model.dry_run_steps)
        #[arg(long)]
        steps: Option<usize>,
    },
    /// Evaluate one output for the inputs in a JSON file
    Eval {
        /// Graph description (JSON); defaults to model.path
        #[arg(short, long)]
        model: Option<PathBuf>,
        /// Inputs file: {"inputs": {...}, "sequences": {...}}
        #[arg(short, long)]
        inputs: PathBuf,
        /// Output name; the default output when omitted
        #[arg(short, long)]
        output: Option<String>,
    },
    /// List inputs, nodes and outputs
    Describe {
        /// Graph description (JSON); defaults to model.path
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
}

impl Commands {
    pub fn model(&self) -> Option<&PathBuf> {
        match self {
            Commands::Check { model, .. }
            | Commands::Eval { model, .. }
            | Commands::Describe { model } => model.as_ref(),
        }
    }
}
