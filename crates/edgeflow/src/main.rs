mod commands;
mod loader;
mod local;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "edgeflow")]
#[command(about = "Declarative provisioning for edge network security", long_about = None)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Template and parameter inputs shared by every command
#[derive(clap::Args)]
struct Inputs {
    /// Template document (JSON or YAML)
    #[arg(short, long, env = "EDGEFLOW_TEMPLATE")]
    template: PathBuf,

    /// Parameter file (JSON or YAML)
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Single parameter override, NAME=VALUE (VALUE is read as JSON, or as a
    /// plain string when it is not valid JSON)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    overrides: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate parameters and the template without planning
    Validate {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Show the resource graph, its waves and gate decisions
    Graph {
        #[command(flatten)]
        inputs: Inputs,
        /// Print Graphviz DOT instead of text
        #[arg(long)]
        dot: bool,
    },
    /// Compute the convergence plan against recorded state
    Plan {
        #[command(flatten)]
        inputs: Inputs,
        /// State directory (defaults to the engine config's state_dir)
        #[arg(long)]
        state_dir: Option<PathBuf>,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Plan and provision with the local simulated provider
    Apply {
        #[command(flatten)]
        inputs: Inputs,
        /// State directory (defaults to the engine config's state_dir)
        #[arg(long)]
        state_dir: Option<PathBuf>,
        /// Apply without stopping at the plan
        #[arg(short, long)]
        yes: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
        /// Make the local provider reject these nodes
        #[arg(long = "simulate-failure", value_name = "NODE", hide = true)]
        failures: Vec<String>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Validate { inputs } => {
            let (template, params) = inputs.load()?;
            commands::validate::handle(&template, &params)
        }
        Commands::Graph { inputs, dot } => {
            let (template, params) = inputs.load()?;
            commands::graph::handle(&template, &params, dot)
        }
        Commands::Plan {
            inputs,
            state_dir,
            json,
        } => {
            let config = edgeflow_config::load()?;
            let (template, params) = inputs.load()?;
            commands::plan::handle(&config, state_dir, &template, &params, json).await
        }
        Commands::Apply {
            inputs,
            state_dir,
            yes,
            json,
            failures,
        } => {
            let config = edgeflow_config::load()?;
            let (template, params) = inputs.load()?;
            let options = commands::apply::ApplyOptions {
                state_dir,
                yes,
                json,
                failures,
            };
            commands::apply::handle(&config, &template, &params, options).await
        }
        Commands::Version => {
            println!("edgeflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

impl Inputs {
    fn load(&self) -> anyhow::Result<(edgeflow_core::Template, edgeflow_core::RawParameters)> {
        let template = loader::load_template(&self.template)?;
        let mut params = match &self.params {
            Some(path) => loader::load_parameters(path)?,
            None => edgeflow_core::RawParameters::new(),
        };
        for raw in &self.overrides {
            let (name, value) = loader::parse_override(raw)?;
            params.insert(name, value);
        }
        Ok((template, params))
    }
}
