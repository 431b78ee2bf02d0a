//! Badge rule and challenge commands.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use hearth_core::{BadgeKind, BadgeRule, Challenge, TrackedScope};

use super::{commit, open, CliResult};

#[derive(Subcommand)]
pub enum BadgeAction {
    /// Add a lifetime-points badge, optionally granting an earn multiplier
    AddCumulative {
        /// Display name
        name: String,
        /// Lifetime earned points required
        #[arg(long)]
        threshold: i64,
        /// Earn-rate multiplier granted once awarded (e.g. 1.5)
        #[arg(long)]
        multiplier: Option<f64>,
        /// Track only these chore IDs (repeatable; default: all assigned)
        #[arg(long = "chore")]
        chores: Vec<String>,
    },
    /// Add a badge for N approvals within a single day
    AddDaily {
        /// Display name
        name: String,
        /// Approvals required within the day
        #[arg(long)]
        min_count: u32,
        /// Track only these chore IDs (repeatable; default: all assigned)
        #[arg(long = "chore")]
        chores: Vec<String>,
    },
    /// Add a badge for N approvals within an explicit window
    AddPeriodic {
        /// Display name
        name: String,
        /// Approvals required within the window
        #[arg(long)]
        min_count: u32,
        /// Window start, RFC 3339
        #[arg(long)]
        start: String,
        /// Window end, RFC 3339
        #[arg(long)]
        end: String,
        /// Track only these chore IDs (repeatable; default: all assigned)
        #[arg(long = "chore")]
        chores: Vec<String>,
    },
    /// Add a badge awarded alongside another rule's award
    AddLinked {
        /// Display name
        name: String,
        /// Rule whose award also grants this badge
        #[arg(long)]
        source: String,
    },
    /// Add a time-boxed challenge
    AddChallenge {
        /// Display name
        name: String,
        /// Approvals required within the window
        #[arg(long)]
        target: u32,
        /// Window start, RFC 3339
        #[arg(long)]
        start: String,
        /// Window end, RFC 3339
        #[arg(long)]
        end: String,
        /// Track only these chore IDs (repeatable; default: all assigned)
        #[arg(long = "chore")]
        chores: Vec<String>,
    },
    /// List badge rules and challenges
    List,
}

pub fn run(action: BadgeAction) -> CliResult {
    let (store, mut household) = open()?;

    match action {
        BadgeAction::AddCumulative {
            name,
            threshold,
            multiplier,
            chores,
        } => add_rule(
            store,
            household,
            name,
            BadgeKind::Cumulative {
                threshold,
                multiplier,
            },
            chores,
        ),
        BadgeAction::AddDaily {
            name,
            min_count,
            chores,
        } => add_rule(
            store,
            household,
            name,
            BadgeKind::Daily { min_count },
            chores,
        ),
        BadgeAction::AddPeriodic {
            name,
            min_count,
            start,
            end,
            chores,
        } => {
            let kind = BadgeKind::Periodic {
                min_count,
                start: parse_instant(&start)?,
                end: parse_instant(&end)?,
            };
            add_rule(store, household, name, kind, chores)
        }
        BadgeAction::AddLinked { name, source } => add_rule(
            store,
            household,
            name,
            BadgeKind::Linked {
                source_rule_id: source,
            },
            Vec::new(),
        ),
        BadgeAction::AddChallenge {
            name,
            target,
            start,
            end,
            chores,
        } => {
            let challenge = Challenge {
                id: new_id("challenge"),
                name,
                target_count: target,
                start: parse_instant(&start)?,
                end: parse_instant(&end)?,
                scope: scope_from(chores),
            };
            let id = challenge.id.clone();
            household.add_challenge(challenge)?;
            commit(&store, &mut household, Vec::new())?;
            println!("Challenge created: {id}");
            Ok(())
        }
        BadgeAction::List => {
            let evaluator = household.gamification();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "rules": evaluator.rules(),
                    "challenges": evaluator.challenges(),
                }))?
            );
            Ok(())
        }
    }
}

fn add_rule(
    store: hearth_core::JsonStore,
    mut household: hearth_core::Household,
    name: String,
    kind: BadgeKind,
    chores: Vec<String>,
) -> CliResult {
    let rule = BadgeRule {
        id: new_id("badge"),
        name,
        kind,
        scope: scope_from(chores),
    };
    let id = rule.id.clone();
    household.add_badge_rule(rule)?;
    commit(&store, &mut household, Vec::new())?;
    println!("Badge rule created: {id}");
    Ok(())
}

/// No `--chore` flags means every assigned chore counts.
fn scope_from(chores: Vec<String>) -> TrackedScope {
    if chores.is_empty() {
        TrackedScope::AllAssigned
    } else {
        TrackedScope::Chores(chores)
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{s}': {e}"))
}
