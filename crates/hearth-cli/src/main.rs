use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "hearth", version, about = "Hearth household chore tracker CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Household member management
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },
    /// Chore definition and lifecycle
    Chore {
        #[command(subcommand)]
        action: commands::chore::ChoreAction,
    },
    /// Points ledger
    Points {
        #[command(subcommand)]
        action: commands::points::PointsAction,
    },
    /// Completion statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Badge rules and challenges
    Badge {
        #[command(subcommand)]
        action: commands::badge::BadgeAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::User { action } => commands::user::run(action),
        Commands::Chore { action } => commands::chore::run(action),
        Commands::Points { action } => commands::points::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Badge { action } => commands::badge::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
