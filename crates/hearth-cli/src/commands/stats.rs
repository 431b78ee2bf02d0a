//! Completion statistics commands.

use chrono::Utc;
use clap::Subcommand;

use super::{open, CliResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Point statistics per rolling period
    Show {
        /// User ID
        user: String,
    },
    /// Lifetime and daily completion counters
    Counters {
        /// User ID
        user: String,
    },
}

pub fn run(action: StatsAction) -> CliResult {
    let (_store, household) = open()?;

    match action {
        StatsAction::Show { user } => {
            let stats = household.stats(&user, Utc::now());
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::Counters { user } => {
            let counters = household.counters(&user);
            println!("{}", serde_json::to_string_pretty(&counters)?);
        }
    }
    Ok(())
}
