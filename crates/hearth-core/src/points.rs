//! Append-only points ledger.
//!
//! The ledger is the single source of truth for every point figure in the
//! system. Period totals, lifetime earnings and spendable balances are all
//! derived by folding over it -- nothing keeps an independently mutated
//! running counter that could drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a point delta came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSource {
    Chore,
    Bonus,
    Penalty,
    RewardRedemption,
    ManualAdjustment,
}

impl PointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointSource::Chore => "chore",
            PointSource::Bonus => "bonus",
            PointSource::Penalty => "penalty",
            PointSource::RewardRedemption => "reward_redemption",
            PointSource::ManualAdjustment => "manual_adjustment",
        }
    }
}

/// One immutable ledger record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsEntry {
    /// Monotonic sequence number within the household ledger.
    pub seq: u64,
    pub user_id: String,
    /// Signed delta; spends and penalties are negative.
    pub delta: i64,
    pub source: PointSource,
    pub at: DateTime<Utc>,
}

/// The household's append-only ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointsLedger {
    entries: Vec<PointsEntry>,
    next_seq: u64,
}

impl PointsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The only write path. Manual adjustments flow through here exactly
    /// like chore rewards -- there is no privileged bypass.
    pub fn append(
        &mut self,
        user_id: impl Into<String>,
        delta: i64,
        source: PointSource,
        at: DateTime<Utc>,
    ) -> &PointsEntry {
        let entry = PointsEntry {
            seq: self.next_seq,
            user_id: user_id.into(),
            delta,
            source,
            at,
        };
        self.next_seq += 1;
        self.entries.push(entry);
        self.entries.last().expect("just pushed")
    }

    pub fn entries(&self) -> &[PointsEntry] {
        &self.entries
    }

    pub fn for_user<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a PointsEntry> {
        self.entries.iter().filter(move |e| e.user_id == user_id)
    }

    /// Current spendable balance: sum of all deltas.
    pub fn balance(&self, user_id: &str) -> i64 {
        self.for_user(user_id).map(|e| e.delta).sum()
    }

    /// Lifetime earned points: positive deltas only. This is what cumulative
    /// badges threshold against -- spending never takes a badge back.
    pub fn lifetime_earned(&self, user_id: &str) -> i64 {
        self.for_user(user_id)
            .filter(|e| e.delta > 0)
            .map(|e| e.delta)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
