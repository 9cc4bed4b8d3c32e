mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use matchcast::PredictorConfig;

#[derive(Parser)]
#[command(name = "matchcast")]
#[command(about = "Football match outcome predictions from a Poisson model and a random forest")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    InitDb,
    /// Populate a deterministic demo league
    Seed {
        #[arg(long, default_value = "20")]
        teams: usize,
        #[arg(long, default_value = "3")]
        seasons: u32,
        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Train the classifier on finished fixtures
    Train {
        /// Write the trained model to this file
        #[arg(short, long)]
        save: Option<PathBuf>,
    },
    /// Predict a single fixture
    Predict {
        #[arg(long)]
        home: i64,
        #[arg(long)]
        away: i64,
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// Predict every scheduled fixture
    Upcoming {
        #[arg(short, long)]
        model: Option<PathBuf>,
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Show a team's recent form
    Form {
        #[arg(short, long)]
        team: i64,
        /// Also show head to head against this team
        #[arg(short, long)]
        opponent: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = PredictorConfig::from_env()?;

    match cli.command {
        Commands::InitDb => {
            tracing::info!("Initializing database...");
            cli::init_db(&config).await?;
        }
        Commands::Seed { teams, seasons, seed } => {
            tracing::info!("Seeding demo data...");
            cli::seed(&config, teams, seasons, seed).await?;
        }
        Commands::Train { save } => {
            cli::train(&config, save).await?;
        }
        Commands::Predict { home, away, model } => {
            cli::predict(&config, home, away, model).await?;
        }
        Commands::Upcoming { model, limit } => {
            cli::upcoming(&config, model, limit).await?;
        }
        Commands::Form { team, opponent } => {
            cli::form(&config, team, opponent).await?;
        }
    }

    Ok(())
}
