//! Chore definitions and their policy enums.
//!
//! A `Chore` is the static definition; the per-user runtime state lives in
//! `assignment`. All policy combination rules are enforced here, at
//! definition time, so the state machine never has to re-check them.

use std::collections::HashMap;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::recurrence::RecurrenceRule;

/// Whether a chore requires one, the first, or all assignees to complete it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionCriteria {
    /// Every assignee has their own independent instance.
    Independent,
    /// One shared instance; done only when every assignee has claimed.
    SharedAll,
    /// One shared instance; the first claimant wins.
    SharedFirst,
}

impl CompletionCriteria {
    pub fn is_shared(&self) -> bool {
        !matches!(self, CompletionCriteria::Independent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionCriteria::Independent => "independent",
            CompletionCriteria::SharedAll => "shared_all",
            CompletionCriteria::SharedFirst => "shared_first",
        }
    }
}

/// What happens when a pending chore sails past its due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverdueHandling {
    /// Overdue detection off; the chore just stays pending.
    Disabled,
    /// Mark overdue, then re-arm to pending at the reset boundary.
    ResetAndRetry,
    /// Mark overdue after the due date, then missed at the reset boundary.
    /// Only valid with the midnight reset types.
    AtDueDateThenReset,
}

/// When a completed chore unblocks for new claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalReset {
    /// Re-arm immediately after approval.
    UponCompletion,
    /// Stay locked until the midnight rollover.
    AtMidnightOnce,
    /// Stay locked until midnight, but permit same-day re-claims when the
    /// chore allows multiple claims per day.
    AtMidnightMulti,
}

impl ApprovalReset {
    pub fn is_midnight(&self) -> bool {
        matches!(
            self,
            ApprovalReset::AtMidnightOnce | ApprovalReset::AtMidnightMulti
        )
    }
}

/// What the midnight reset does with still-claimed (unreviewed) instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingClaimAction {
    LeavePending,
    ForceApprove,
    ForceDisapprove,
}

/// A recurring household task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chore {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Points awarded per approved completion
    pub points: i64,
    /// Assigned member ids
    pub assignees: Vec<String>,
    /// One / first / all completion semantics
    pub criteria: CompletionCriteria,
    /// Recurrence rule
    pub recurrence: RecurrenceRule,
    /// Overdue handling policy
    pub overdue: OverdueHandling,
    /// Approval-reset policy
    pub approval_reset: ApprovalReset,
    /// Midnight action for unreviewed claims
    pub pending_claim_action: PendingClaimAction,
    /// Permit repeat claims on an already-approved instance the same day
    #[serde(default)]
    pub allow_multiple_claims_per_day: bool,
    /// Rotation turn order over the assignee list (shared_first only)
    #[serde(default)]
    pub rotation: bool,
    /// Per-user applicable weekdays, 0=Sun .. 6=Sat (independent only)
    #[serde(default)]
    pub weekday_overrides: HashMap<String, Vec<u8>>,
    /// Per-user due-date overrides (independent only)
    #[serde(default)]
    pub due_overrides: HashMap<String, DateTime<Utc>>,
    /// Per-user daily-multi slot overrides (independent only)
    #[serde(default)]
    pub slot_overrides: HashMap<String, Vec<NaiveTime>>,
    /// First due date for new assignments
    pub due_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Chore {
    /// Create a chore with the permissive defaults; callers adjust fields
    /// and must pass `validate()` before the chore enters the household.
    pub fn new(name: impl Into<String>, points: i64, due_at: DateTime<Utc>) -> Self {
        Chore {
            id: format!("chore-{}", uuid::Uuid::new_v4()),
            name: name.into(),
            points,
            assignees: Vec::new(),
            criteria: CompletionCriteria::Independent,
            recurrence: RecurrenceRule::Daily,
            overdue: OverdueHandling::Disabled,
            approval_reset: ApprovalReset::UponCompletion,
            pending_claim_action: PendingClaimAction::LeavePending,
            allow_multiple_claims_per_day: false,
            rotation: false,
            weekday_overrides: HashMap::new(),
            due_overrides: HashMap::new(),
            slot_overrides: HashMap::new(),
            due_at,
            created_at: Utc::now(),
        }
    }

    /// The per-user due date, honoring overrides for independent chores.
    /// Shared chores always have exactly one shared due date.
    pub fn due_for(&self, user_id: &str) -> DateTime<Utc> {
        if self.criteria == CompletionCriteria::Independent {
            if let Some(due) = self.due_overrides.get(user_id) {
                return *due;
            }
        }
        self.due_at
    }

    /// The recurrence rule as it applies to one user: an independent chore's
    /// per-user slot override replaces the chore-level daily-multi slots.
    pub fn recurrence_for(&self, user_id: &str) -> RecurrenceRule {
        if self.criteria == CompletionCriteria::Independent
            && matches!(self.recurrence, RecurrenceRule::DailyMulti { .. })
        {
            if let Some(slots) = self.slot_overrides.get(user_id) {
                return RecurrenceRule::DailyMulti {
                    times: slots.clone(),
                };
            }
        }
        self.recurrence.clone()
    }

    /// Whether this chore applies to `user_id` on the given local weekday.
    /// Without a weekday override every day applies.
    pub fn applies_on(&self, user_id: &str, weekday: Weekday) -> bool {
        if self.criteria != CompletionCriteria::Independent {
            return true;
        }
        match self.weekday_overrides.get(user_id) {
            Some(days) => days.contains(&(weekday.num_days_from_sunday() as u8)),
            None => true,
        }
    }

    /// Reject unsupported policy and override combinations.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "name".into(),
                message: "chore name must not be empty".into(),
            });
        }
        if self.assignees.is_empty() {
            return Err(ValidationError::EmptyCollection(format!(
                "assignees of chore '{}'",
                self.name
            )));
        }
        self.recurrence.validate()?;

        if self.criteria.is_shared() && self.has_per_user_overrides() {
            return Err(ValidationError::OverridesOnSharedChore {
                chore: self.name.clone(),
                criteria: self.criteria.as_str().into(),
            });
        }
        if self.overdue == OverdueHandling::AtDueDateThenReset
            && !self.approval_reset.is_midnight()
        {
            return Err(ValidationError::PolicyConflict(
                "overdue handling 'at_due_date_then_reset' requires an at_midnight reset type"
                    .into(),
            ));
        }
        if self.rotation && self.criteria != CompletionCriteria::SharedFirst {
            return Err(ValidationError::PolicyConflict(
                "rotation assignment requires 'shared_first' completion criteria".into(),
            ));
        }
        for (user, days) in &self.weekday_overrides {
            if days.is_empty() {
                return Err(ValidationError::EmptyCollection(format!(
                    "weekday_overrides[{user}]"
                )));
            }
            if days.iter().any(|d| *d > 6) {
                return Err(ValidationError::InvalidValue {
                    field: format!("weekday_overrides[{user}]"),
                    message: "weekdays are 0=Sun .. 6=Sat".into(),
                });
            }
        }
        if !self.slot_overrides.is_empty()
            && !matches!(self.recurrence, RecurrenceRule::DailyMulti { .. })
        {
            return Err(ValidationError::PolicyConflict(
                "slot overrides require a daily_multi recurrence".into(),
            ));
        }
        for (user, slots) in &self.slot_overrides {
            if slots.is_empty() {
                return Err(ValidationError::EmptyCollection(format!(
                    "slot_overrides[{user}]"
                )));
            }
        }
        Ok(())
    }

    fn has_per_user_overrides(&self) -> bool {
        !self.weekday_overrides.is_empty()
            || !self.due_overrides.is_empty()
            || !self.slot_overrides.is_empty()
    }
}
