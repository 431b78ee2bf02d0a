//! Badge, achievement and challenge rule definitions.
//!
//! Rules are static definitions validated at creation; per-user progress
//! lives in [`AwardProgress`] and is maintained by the evaluator.

mod evaluator;

pub use evaluator::{EvalContext, GamificationEvaluator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chore::Chore;
use crate::error::ValidationError;

/// Which chores a rule counts.
///
/// An explicit empty list tracks nothing. It is not a fallback to "all
/// assigned chores" -- that is what `AllAssigned` says explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "chore_ids", rename_all = "snake_case")]
pub enum TrackedScope {
    /// Every chore the user is assigned to.
    AllAssigned,
    /// Exactly these chores.
    Chores(Vec<String>),
}

impl TrackedScope {
    /// Normalize legacy rule data. Older rule records carried a single
    /// "selected chore" field next to an optional explicit list; the single
    /// field becomes a one-element list, an explicit list (empty included)
    /// wins over it, and only a fully unset pair falls back to all assigned.
    pub fn from_legacy(explicit: Option<Vec<String>>, selected: Option<String>) -> Self {
        match (explicit, selected) {
            (Some(list), _) => TrackedScope::Chores(list),
            (None, Some(single)) => TrackedScope::Chores(vec![single]),
            (None, None) => TrackedScope::AllAssigned,
        }
    }

    /// Whether an approval of `chore` by `user_id` counts for this scope.
    pub fn tracks(&self, chore: &Chore, user_id: &str) -> bool {
        match self {
            TrackedScope::AllAssigned => chore.assignees.iter().any(|a| a == user_id),
            TrackedScope::Chores(ids) => ids.iter().any(|id| *id == chore.id),
        }
    }
}

/// Canonical target of a badge rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BadgeKind {
    /// Lifetime earned points (not spendable balance) against a threshold.
    /// The only kind permitted to grant an ongoing earn-rate multiplier.
    Cumulative {
        threshold: i64,
        #[serde(default)]
        multiplier: Option<f64>,
    },
    /// Approvals within the current day; progress resets at midnight.
    Daily { min_count: u32 },
    /// Approvals within an explicit window.
    Periodic {
        min_count: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Awarded as a side effect of another rule's award, never evaluated
    /// on its own.
    Linked { source_rule_id: String },
}

/// A badge or achievement rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeRule {
    pub id: String,
    pub name: String,
    pub kind: BadgeKind,
    pub scope: TrackedScope,
}

impl BadgeRule {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.kind {
            BadgeKind::Cumulative { threshold, multiplier } => {
                if *threshold <= 0 {
                    return Err(ValidationError::InvalidValue {
                        field: "threshold".into(),
                        message: "cumulative threshold must be positive".into(),
                    });
                }
                if let Some(m) = multiplier {
                    if *m <= 0.0 || !m.is_finite() {
                        return Err(ValidationError::InvalidValue {
                            field: "multiplier".into(),
                            message: "earn-rate multiplier must be a positive number".into(),
                        });
                    }
                }
            }
            BadgeKind::Daily { min_count } | BadgeKind::Periodic { min_count, .. }
                if *min_count == 0 =>
            {
                return Err(ValidationError::InvalidValue {
                    field: "min_count".into(),
                    message: "count target must be at least 1".into(),
                });
            }
            BadgeKind::Periodic { start, end, .. } if end <= start => {
                return Err(ValidationError::InvalidWindow {
                    start: *start,
                    end: *end,
                });
            }
            _ => {}
        }
        Ok(())
    }
}

/// A time-boxed challenge. Never evaluated outside `[start, end]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub name: String,
    pub target_count: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub scope: TrackedScope,
}

impl Challenge {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target_count == 0 {
            return Err(ValidationError::InvalidValue {
                field: "target_count".into(),
                message: "challenge target must be at least 1".into(),
            });
        }
        if self.end <= self.start {
            return Err(ValidationError::InvalidWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// Per-(user, rule) progress. Awarded at most once per rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwardProgress {
    /// Current value against the rule's target.
    pub value: i64,
    pub awarded: bool,
    pub awarded_at: Option<DateTime<Utc>>,
}

/// One counted completion, recorded once per approval event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub user_id: String,
    pub chore_id: String,
    pub at: DateTime<Utc>,
}
