//! Per-(user, chore) completion state.
//!
//! `ClaimState` follows strict transitions; the household coordinator is the
//! only writer, so transitions here only describe legality:
//!
//! ```text
//!   PENDING ──claim──> CLAIMED ──approve──> APPROVED ──re-arm──> PENDING
//!      ^                  │ │
//!      │   undo/disapprove┘ └─(shared_all, partial)──> CLAIMED_IN_PART
//!      │
//!   OVERDUE ──reset-and-retry──> PENDING
//!      └────grace elapsed (at_due_date_then_reset)────> MISSED
//! ```
//!
//! `ClaimedInPart` is reachable only for `shared_all` chores while some but
//! not all assignees have claimed. `NotMyTurn` is reachable only under
//! rotation assignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Externally visible state of one assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    Pending,
    Claimed,
    ClaimedInPart,
    Approved,
    Disapproved,
    Overdue,
    Missed,
    NotMyTurn,
}

impl ClaimState {
    /// States a new claim is accepted from. `Approved` is legal only when
    /// the chore allows multiple claims per day; the coordinator checks that.
    pub fn claimable(&self) -> bool {
        matches!(
            self,
            ClaimState::Pending
                | ClaimState::ClaimedInPart
                | ClaimState::Disapproved
                | ClaimState::Overdue
        )
    }

    /// States an approver may act (approve/disapprove) on.
    pub fn reviewable(&self) -> bool {
        matches!(self, ClaimState::Claimed | ClaimState::ClaimedInPart)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimState::Pending => "pending",
            ClaimState::Claimed => "claimed",
            ClaimState::ClaimedInPart => "claimed_in_part",
            ClaimState::Approved => "approved",
            ClaimState::Disapproved => "disapproved",
            ClaimState::Overdue => "overdue",
            ClaimState::Missed => "missed",
            ClaimState::NotMyTurn => "not_my_turn",
        }
    }
}

/// Runtime state for one (user, chore) pair. For `shared_first` chores a
/// single instance keyed by the chore is visible to all assignees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentState {
    pub state: ClaimState,
    /// Denormalized from the chore + recurrence engine.
    pub due_at: DateTime<Utc>,
    pub last_claimed_at: Option<DateTime<Utc>>,
    pub last_approved_at: Option<DateTime<Utc>>,
    /// Same-day repeat claims accumulated while externally `Approved`.
    #[serde(default)]
    pub pending_claim_count: u32,
    /// Consecutive approved completions without a miss or disapproval.
    #[serde(default)]
    pub streak: u32,
}

impl AssignmentState {
    pub fn new(due_at: DateTime<Utc>) -> Self {
        AssignmentState {
            state: ClaimState::Pending,
            due_at,
            last_claimed_at: None,
            last_approved_at: None,
            pending_claim_count: 0,
            streak: 0,
        }
    }

    /// Whether this assignment was already approved on the given local day.
    pub fn approved_on(&self, day: chrono::NaiveDate, tz: chrono::FixedOffset) -> bool {
        self.last_approved_at
            .map(|at| at.with_timezone(&tz).date_naive() == day)
            .unwrap_or(false)
    }
}

/// Per-user lifetime and per-day counters maintained by the state machine.
///
/// The daily slice resets at midnight rollover. `disapprovals_total` is only
/// bumped by an approver's disapprove -- an assignee undoing their own claim
/// lands back in the same `Pending` state without touching it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionCounters {
    pub approvals_total: u64,
    pub approvals_today: u64,
    pub disapprovals_total: u64,
    pub missed_total: u64,
}

impl CompletionCounters {
    pub fn reset_daily(&mut self) {
        self.approvals_today = 0;
    }
}
