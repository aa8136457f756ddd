use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pullreq::config::ServiceConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "pullreq")]
#[command(version, about = "Pull request reviewer assignment service")]
pub struct Cli {
    /// Force debug logging regardless of configuration
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the TOML configuration file (missing file means defaults)
    #[arg(short, long, global = true, env = "PULLREQ_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// Database path. Overrides the config file and DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Listen address, e.g. 0.0.0.0:8080
        #[arg(short, long)]
        address: Option<String>,

        /// Enable dev mode (CORS permissive for a local front-end)
        #[arg(long)]
        dev: bool,
    },
    /// Create and migrate the database, then exit
    Init,
    /// Populate the database with synthetic teams and pull requests
    Seed {
        /// Number of teams to create
        #[arg(long, default_value = "20")]
        teams: usize,

        /// Members per team
        #[arg(long, default_value = "10")]
        members: usize,

        /// Pull requests to open, each by a random author
        #[arg(long, default_value = "50")]
        pull_requests: usize,
    },
    /// Show the effective configuration and any warnings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::resolve(&cli.config)?;
    if let Some(db_path) = &cli.db_path {
        config.database.path = db_path.clone();
    }
    if let Commands::Serve { address: Some(address), .. } = &cli.command {
        config.server.address = address.clone();
    }

    let level = if cli.verbose {
        "debug"
    } else {
        config.log_level().unwrap_or("info")
    };
    pullreq::logging::init(level, config.log_json)?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    match &cli.command {
        Commands::Serve { dev, .. } => cmd::cmd_serve(&config, *dev).await?,
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Seed {
            teams,
            members,
            pull_requests,
        } => {
            let plan = cmd::SeedPlan {
                teams: *teams,
                members: *members,
                pull_requests: *pull_requests,
            };
            cmd::cmd_seed(&config, plan).await?
        }
        Commands::Config => cmd::cmd_config(&config)?,
    }

    Ok(())
}
