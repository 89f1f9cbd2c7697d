//! CPU-topology allocation verifier CLI
//!
//! A command-line tool for checking cpuset placements and over-quota
//! tallies locally, and for querying a verifier agent for node audits
//! and available resources.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{check, node};

/// CPU-topology allocation verifier CLI
#[derive(Parser)]
#[command(name = "cpv")]
#[command(
    author,
    version,
    about = "CLI for the CPU-topology allocation verifier",
    long_about = None
)]
pub struct Cli {
    /// Verifier agent URL (can also be set via CPV_AGENT_URL env var)
    #[arg(long, env = "CPV_AGENT_URL")]
    pub agent_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a checker locally
    #[command(subcommand)]
    Check(CheckCommands),

    /// Query a verifier agent about a node
    #[command(subcommand)]
    Node(NodeCommands),
}

#[derive(Subcommand)]
pub enum CheckCommands {
    /// Check a container's cpuset against a placement strategy
    Placement {
        /// Bound logical CPU ids (comma separated)
        #[arg(long, value_delimiter = ',', required = true)]
        cpus: Vec<u32>,

        /// Physical core count of the node
        #[arg(long)]
        cores: u32,

        /// Placement strategy (spread, sameCoreFirst)
        #[arg(long)]
        strategy: String,

        /// Skip the strategy check
        #[arg(long)]
        skip: bool,
    },

    /// Check a node-wide tally against an over-quota ratio
    OverQuota {
        /// Tally entries as CPU=COUNT (comma separated)
        #[arg(long, value_delimiter = ',', value_parser = check::parse_tally_entry)]
        tally: Vec<(u32, u32)>,

        /// Total CPUs on the node
        #[arg(long)]
        cores: u32,

        /// Over-quota ratio (defaults to the config file, then 1.0)
        #[arg(long)]
        ratio: Option<f64>,
    },
}

#[derive(Subcommand)]
pub enum NodeCommands {
    /// Show available CPU, memory and ephemeral storage
    Available {
        /// Node name
        node: String,
    },

    /// Audit every cpuset bound on the node
    Audit {
        /// Node name
        node: String,

        /// Over-quota ratio (agent default if not specified)
        #[arg(long)]
        ratio: Option<f64>,

        /// Physical core count (derived from node capacity if not specified)
        #[arg(long)]
        physical_cores: Option<u32>,

        /// Skip placement strategy checks
        #[arg(long)]
        skip_strategy: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(|f| output::OutputFormat::from_str(f, true).ok())
        })
        .unwrap_or_default();

    let passed = match cli.command {
        Commands::Check(check_cmd) => match check_cmd {
            CheckCommands::Placement {
                cpus,
                cores,
                strategy,
                skip,
            } => check::placement(&cpus, cores, &strategy, skip, cli.verbose, format)?,
            CheckCommands::OverQuota {
                tally,
                cores,
                ratio,
            } => {
                let ratio = ratio.or(config.default_ratio).unwrap_or(1.0);
                check::over_quota(tally, cores, ratio, cli.verbose, format)?
            }
        },
        Commands::Node(node_cmd) => {
            let client = client::ApiClient::new(&config.resolve_agent_url(cli.agent_url))?;
            match node_cmd {
                NodeCommands::Available { node } => {
                    node::show_available(&client, &node, format).await?;
                    true
                }
                NodeCommands::Audit {
                    node,
                    ratio,
                    physical_cores,
                    skip_strategy,
                } => {
                    let query = client::AuditQuery {
                        ratio,
                        physical_cores,
                        skip_strategy,
                    };
                    node::audit(&client, &node, query, cli.verbose, format).await?
                }
            }
        }
    };

    if !passed {
        std::process::exit(1);
    }

    Ok(())
}
