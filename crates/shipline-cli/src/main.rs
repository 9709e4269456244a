//! Shipline CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::BuildspecFormat;

#[derive(Parser)]
#[command(name = "shipline")]
#[command(about = "Declare and synthesize container release stacks", long_about = None)]
struct Cli {
    /// Path to the stack definition
    #[arg(long, global = true, env = "SHIPLINE_CONFIG", default_value = "shipline.kdl")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the stack definition
    Validate,
    /// Write the template, build specification and manifest
    Synth {
        /// Output directory
        #[arg(long, env = "SHIPLINE_OUT_DIR", default_value = "shipline.out")]
        out: PathBuf,
    },
    /// Print the build specification
    Buildspec {
        #[arg(long, value_enum, default_value = "yaml")]
        format: BuildspecFormat,
    },
    /// Show stages, actions and artifact flow
    Describe,
    /// Print build commands with variables expanded for a source version
    Render {
        /// Resolved source version (commit SHA); empty falls back to `latest`
        #[arg(long, default_value = "")]
        source_version: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate => {
            commands::validate(&cli.config)?;
        }
        Commands::Synth { out } => {
            let written = commands::synth::run(&cli.config, &out)?;
            for path in written {
                println!("{}", path.display());
            }
        }
        Commands::Buildspec { format } => {
            print!("{}", commands::buildspec(&cli.config, format)?);
        }
        Commands::Describe => {
            print!("{}", commands::describe::run(&cli.config)?);
        }
        Commands::Render { source_version } => {
            print!("{}", commands::render::run(&cli.config, &source_version)?);
        }
    }

    Ok(())
}
