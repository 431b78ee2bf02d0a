//! Points ledger commands.

use chrono::Utc;
use clap::Subcommand;
use hearth_core::PointSource;

use super::{commit, open, CliResult};

#[derive(Subcommand)]
pub enum PointsAction {
    /// Spendable balance for a member
    Balance {
        /// User ID
        user: String,
    },
    /// Ledger entries for a member
    Ledger {
        /// User ID
        user: String,
    },
    /// Manually credit or debit points
    Adjust {
        /// User ID
        user: String,
        /// Signed delta; spends are negative
        delta: i64,
        /// Entry source: bonus, penalty, reward-redemption or manual-adjustment
        #[arg(long, default_value = "manual-adjustment")]
        source: String,
        /// Acting user ID (requires management rights)
        #[arg(long = "as")]
        actor: String,
    },
}

pub fn run(action: PointsAction) -> CliResult {
    let (store, mut household) = open()?;

    match action {
        PointsAction::Balance { user } => {
            println!("{}", household.ledger().balance(&user));
        }
        PointsAction::Ledger { user } => {
            let entries: Vec<_> = household.ledger().for_user(&user).collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        PointsAction::Adjust {
            user,
            delta,
            source,
            actor,
        } => {
            let source = parse_source(&source)?;
            let events = household.adjust_points(&actor, &user, delta, source, Utc::now())?;
            commit(&store, &mut household, events)?;
        }
    }
    Ok(())
}

fn parse_source(s: &str) -> Result<PointSource, String> {
    match s {
        "bonus" => Ok(PointSource::Bonus),
        "penalty" => Ok(PointSource::Penalty),
        "reward-redemption" => Ok(PointSource::RewardRedemption),
        "manual-adjustment" => Ok(PointSource::ManualAdjustment),
        other => Err(format!(
            "unknown source '{other}' (bonus, penalty, reward-redemption, manual-adjustment)"
        )),
    }
}
