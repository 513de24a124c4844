use anyhow::{bail, Context};
use clap::Parser;
use lwgraph::cli::{self, Cli, Commands, OutputMode};
use lwgraph::config::{AppConfig, LoggingConfig};
use lwgraph::ml::NamedGraph;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    if let Err(errors) = settings.validate() {
        bail!("invalid settings:\n  {}", errors.join("\n  "));
    }
    init_logging(&settings.logging);

    let model_path = cli
        .command
        .model()
        .or(settings.model.path.as_ref())
        .context("no model given: pass --model or set model.path")?
        .clone();
    let default_output = cli
        .default_output
        .as_deref()
        .or(settings.model.default_output.as_deref());

    let graph = NamedGraph::from_file(&model_path, default_output)
        .with_context(|| format!("loading model {}", model_path.display()))?;
    info!(model = %model_path.display(), "model loaded");

    let mode = OutputMode::from_json_flag(cli.json);
    match &cli.command {
        Commands::Check { steps, .. } => {
            cli::check(&graph, steps.unwrap_or(settings.model.dry_run_steps))?;
        }
        Commands::Eval { inputs, output, .. } => {
            cli::eval(&graph, inputs, output.as_deref(), mode)?;
        }
        Commands::Describe { .. } => {
            cli::describe(&graph, mode)?;
        }
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,lwgraph={}", config.level)));

    // stdout carries command results; logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
