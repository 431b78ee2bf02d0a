use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assignment::ClaimState;
use crate::points::PointSource;

/// Every state change in the household produces an Event.
/// The gamification evaluator subscribes to these; a UI layer polls them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ChoreClaimed {
        chore_id: String,
        user_id: String,
        /// Externally visible state after the claim (shared chores may
        /// surface `ClaimedInPart` rather than `Claimed`).
        state: ClaimState,
        at: DateTime<Utc>,
    },
    /// Assignee took back their own claim. Does not touch disapproval
    /// counters -- that is the whole difference from `ChoreDisapproved`.
    ClaimUndone {
        chore_id: String,
        user_id: String,
        at: DateTime<Utc>,
    },
    ChoreApproved {
        chore_id: String,
        user_id: String,
        approved_by: String,
        points_awarded: i64,
        at: DateTime<Utc>,
    },
    ChoreDisapproved {
        chore_id: String,
        user_id: String,
        disapproved_by: String,
        at: DateTime<Utc>,
    },
    ChoreSkipped {
        chore_id: String,
        user_id: String,
        next_due: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    AssignmentReset {
        chore_id: String,
        user_id: String,
        at: DateTime<Utc>,
    },
    ChoreOverdue {
        chore_id: String,
        user_id: String,
        due_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    ChoreMissed {
        chore_id: String,
        user_id: String,
        at: DateTime<Utc>,
    },
    /// Rotation cycle temporarily opened to every assignee.
    CycleOpened {
        chore_id: String,
        opened_by: String,
        at: DateTime<Utc>,
    },
    PointsAdjusted {
        user_id: String,
        delta: i64,
        source: PointSource,
        at: DateTime<Utc>,
    },
    BadgeAwarded {
        rule_id: String,
        user_id: String,
        at: DateTime<Utc>,
    },
    ChallengeAwarded {
        challenge_id: String,
        user_id: String,
        at: DateTime<Utc>,
    },
    MidnightRollover {
        at: DateTime<Utc>,
    },
}

impl Event {
    /// The user whose gamification progress this event can affect, if any.
    pub fn affected_user(&self) -> Option<&str> {
        match self {
            Event::ChoreClaimed { user_id, .. }
            | Event::ClaimUndone { user_id, .. }
            | Event::ChoreApproved { user_id, .. }
            | Event::ChoreDisapproved { user_id, .. }
            | Event::ChoreSkipped { user_id, .. }
            | Event::AssignmentReset { user_id, .. }
            | Event::ChoreOverdue { user_id, .. }
            | Event::ChoreMissed { user_id, .. }
            | Event::PointsAdjusted { user_id, .. }
            | Event::BadgeAwarded { user_id, .. }
            | Event::ChallengeAwarded { user_id, .. } => Some(user_id),
            Event::CycleOpened { .. } | Event::MidnightRollover { .. } => None,
        }
    }
}
