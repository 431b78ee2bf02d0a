//! CLI command modules and shared snapshot plumbing.
//!
//! Every command is one-shot: load the snapshot, mutate the household,
//! drain any pending gamification awards, save. The debounced batching in
//! `hearth_core::service` only matters for long-running processes.

pub mod badge;
pub mod chore;
pub mod config;
pub mod points;
pub mod stats;
pub mod user;

use chrono::Utc;
use hearth_core::{Config, Event, Household, JsonStore, Persistence};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Load config and snapshot; a missing snapshot means a fresh household.
fn open() -> Result<(JsonStore, Household), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = JsonStore::new(config.snapshot_path()?);
    let household = match store.load()? {
        Some(snapshot) => Household::restore(snapshot, config.timezone())?,
        None => Household::new(config.timezone()),
    };
    Ok((store, household))
}

/// Drain pending award evaluations, persist, and report everything that
/// happened to stdout.
fn commit(store: &JsonStore, household: &mut Household, mut events: Vec<Event>) -> CliResult {
    events.extend(household.drain_gamification(Utc::now()));
    store.save(&household.snapshot())?;
    for event in &events {
        println!("{}", serde_json::to_string_pretty(event)?);
    }
    Ok(())
}
