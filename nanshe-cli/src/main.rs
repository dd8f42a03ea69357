use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "nanshe", about = "Adaptive course generation")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Acting user id
    #[arg(short, long, global = true, default_value_t = 1)]
    user: i64,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage provider API credentials
    Auth(commands::auth::AuthArgs),
    /// Generate and inspect capsules
    Capsule(commands::capsule::CapsuleArgs),
    /// Talk to the learning coach
    Coach(commands::coach::CoachArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Record progress and read learner dashboards
    Progress(commands::progress::ProgressArgs),
    /// Seed, query and correct the taxonomy classifier
    Taxonomy(commands::taxonomy::TaxonomyArgs),
    /// Manage learner accounts
    User(commands::user::UserArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Auth(args) => commands::auth::run(args),
        Commands::Capsule(args) => commands::capsule::run(args, cli.user).await,
        Commands::Coach(args) => commands::coach::run(args, cli.user).await,
        Commands::Config(args) => commands::config::run(args),
        Commands::Progress(args) => commands::progress::run(args, cli.user).await,
        Commands::Taxonomy(args) => commands::taxonomy::run(args, cli.user).await,
        Commands::User(args) => commands::user::run(args).await,
    }
}
