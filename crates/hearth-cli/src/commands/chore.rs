//! Chore definition and lifecycle commands.

use chrono::{DateTime, NaiveTime, Utc};
use clap::Subcommand;
use hearth_core::recurrence::IntervalUnit;
use hearth_core::{
    ApprovalReset, Chore, CompletionCriteria, OverdueHandling, PendingClaimAction, RecurrenceRule,
};

use super::{commit, open, CliResult};

#[derive(Subcommand)]
pub enum ChoreAction {
    /// Define a new chore
    Add {
        /// Display name
        name: String,
        /// Points per approved completion
        #[arg(long, default_value = "10")]
        points: i64,
        /// First due date, RFC 3339 (default: now)
        #[arg(long)]
        due: Option<String>,
        /// Assignee user ID (repeatable)
        #[arg(long = "assign", required = true)]
        assignees: Vec<String>,
        /// Completion criteria: independent, shared-all or shared-first
        #[arg(long, default_value = "independent")]
        criteria: String,
        /// Recurrence: none, daily, weekly, monthly or yearly
        #[arg(long, default_value = "daily")]
        recurrence: String,
        /// Fixed-offset recurrence instead: repeat every N units
        #[arg(long)]
        every: Option<u32>,
        /// Unit for --every: hours or days
        #[arg(long, default_value = "days")]
        unit: String,
        /// Measure --every from completion time rather than due date
        #[arg(long)]
        from_complete: bool,
        /// Daily time slots, comma-separated HH:MM (overrides --recurrence)
        #[arg(long)]
        times: Option<String>,
        /// Overdue handling: disabled, reset-and-retry or at-due-date-then-reset
        #[arg(long, default_value = "disabled")]
        overdue: String,
        /// Approval reset: upon-completion, at-midnight-once or at-midnight-multi
        #[arg(long, default_value = "upon-completion")]
        approval_reset: String,
        /// Midnight action for unreviewed claims: leave, force-approve or
        /// force-disapprove
        #[arg(long, default_value = "leave")]
        pending_claim_action: String,
        /// Permit repeat claims after approval on the same day
        #[arg(long)]
        allow_multiple: bool,
        /// Rotate turns through the assignee list (shared-first only)
        #[arg(long)]
        rotation: bool,
    },
    /// List chores
    List,
    /// Per-user assignment state
    Show {
        /// Chore ID
        id: String,
        /// User ID
        user: String,
    },
    /// Claim a chore as done
    Claim {
        /// Chore ID
        id: String,
        /// Acting user ID
        #[arg(long = "as")]
        actor: String,
    },
    /// Withdraw a claim
    UndoClaim {
        /// Chore ID
        id: String,
        /// Acting user ID
        #[arg(long = "as")]
        actor: String,
    },
    /// Approve a claim and award points
    Approve {
        /// Chore ID
        id: String,
        /// Claimant user ID
        target: String,
        /// Approving user ID
        #[arg(long = "as")]
        actor: String,
    },
    /// Reject a claim
    Disapprove {
        /// Chore ID
        id: String,
        /// Claimant user ID
        target: String,
        /// Reviewing user ID
        #[arg(long = "as")]
        actor: String,
    },
    /// Skip the current occurrence
    Skip {
        /// Chore ID
        id: String,
        /// User whose assignment is skipped
        target: String,
        /// Acting user ID
        #[arg(long = "as")]
        actor: String,
    },
    /// Reset an assignment to pending
    Reset {
        /// Chore ID
        id: String,
        /// User whose assignment is reset
        target: String,
        /// Acting user ID
        #[arg(long = "as")]
        actor: String,
    },
    /// Allow out-of-turn claims on a rotation chore until the next approval
    OpenCycle {
        /// Chore ID
        id: String,
        /// Acting user ID
        #[arg(long = "as")]
        actor: String,
    },
}

pub fn run(action: ChoreAction) -> CliResult {
    let (store, mut household) = open()?;
    let now = Utc::now();

    match action {
        ChoreAction::Add {
            name,
            points,
            due,
            assignees,
            criteria,
            recurrence,
            every,
            unit,
            from_complete,
            times,
            overdue,
            approval_reset,
            pending_claim_action,
            allow_multiple,
            rotation,
        } => {
            let due_at = match due {
                Some(s) => DateTime::parse_from_rfc3339(&s)
                    .map_err(|e| format!("invalid --due value '{s}': {e}"))?
                    .with_timezone(&Utc),
                None => now,
            };
            let mut chore = Chore::new(name, points, due_at);
            chore.assignees = assignees;
            chore.criteria = parse_criteria(&criteria)?;
            chore.recurrence = parse_recurrence(&recurrence, every, &unit, from_complete, times)?;
            chore.overdue = parse_overdue(&overdue)?;
            chore.approval_reset = parse_approval_reset(&approval_reset)?;
            chore.pending_claim_action = parse_pending_action(&pending_claim_action)?;
            chore.allow_multiple_claims_per_day = allow_multiple;
            chore.rotation = rotation;

            let id = chore.id.clone();
            let rendered = serde_json::to_string_pretty(&chore)?;
            household.add_chore(chore)?;
            commit(&store, &mut household, Vec::new())?;
            println!("Chore created: {id}");
            println!("{rendered}");
        }
        ChoreAction::List => {
            let chores: Vec<_> = household.chores().collect();
            println!("{}", serde_json::to_string_pretty(&chores)?);
        }
        ChoreAction::Show { id, user } => match household.assignment_view(&id, &user) {
            Some(view) => println!("{}", serde_json::to_string_pretty(&view)?),
            None => return Err(format!("no assignment of chore '{id}' for user '{user}'").into()),
        },
        ChoreAction::Claim { id, actor } => {
            let events = household.claim(&actor, &id, now)?;
            commit(&store, &mut household, events)?;
        }
        ChoreAction::UndoClaim { id, actor } => {
            let events = household.undo_claim(&actor, &id, now)?;
            commit(&store, &mut household, events)?;
        }
        ChoreAction::Approve { id, target, actor } => {
            let events = household.approve(&actor, &id, &target, now)?;
            commit(&store, &mut household, events)?;
        }
        ChoreAction::Disapprove { id, target, actor } => {
            let events = household.disapprove(&actor, &id, &target, now)?;
            commit(&store, &mut household, events)?;
        }
        ChoreAction::Skip { id, target, actor } => {
            let events = household.skip(&actor, &id, &target, now)?;
            commit(&store, &mut household, events)?;
        }
        ChoreAction::Reset { id, target, actor } => {
            let events = household.reset_assignment(&actor, &id, &target, now)?;
            commit(&store, &mut household, events)?;
        }
        ChoreAction::OpenCycle { id, actor } => {
            let events = household.open_cycle(&actor, &id, now)?;
            commit(&store, &mut household, events)?;
        }
    }
    Ok(())
}

fn parse_criteria(s: &str) -> Result<CompletionCriteria, String> {
    match s {
        "independent" => Ok(CompletionCriteria::Independent),
        "shared-all" => Ok(CompletionCriteria::SharedAll),
        "shared-first" => Ok(CompletionCriteria::SharedFirst),
        other => Err(format!(
            "unknown criteria '{other}' (independent, shared-all, shared-first)"
        )),
    }
}

fn parse_recurrence(
    base: &str,
    every: Option<u32>,
    unit: &str,
    from_complete: bool,
    times: Option<String>,
) -> Result<RecurrenceRule, String> {
    if let Some(list) = times {
        let slots = list
            .split(',')
            .map(|t| NaiveTime::parse_from_str(t.trim(), "%H:%M"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid --times value '{list}': {e}"))?;
        return Ok(RecurrenceRule::DailyMulti { times: slots });
    }
    if let Some(every) = every {
        let unit = match unit {
            "hours" => IntervalUnit::Hours,
            "days" => IntervalUnit::Days,
            other => return Err(format!("unknown unit '{other}' (hours, days)")),
        };
        return Ok(if from_complete {
            RecurrenceRule::CustomFromComplete { every, unit }
        } else {
            RecurrenceRule::Custom { every, unit }
        });
    }
    match base {
        "none" => Ok(RecurrenceRule::None),
        "daily" => Ok(RecurrenceRule::Daily),
        "weekly" => Ok(RecurrenceRule::Weekly),
        "monthly" => Ok(RecurrenceRule::Monthly),
        "yearly" => Ok(RecurrenceRule::Yearly),
        other => Err(format!(
            "unknown recurrence '{other}' (none, daily, weekly, monthly, yearly)"
        )),
    }
}

fn parse_overdue(s: &str) -> Result<OverdueHandling, String> {
    match s {
        "disabled" => Ok(OverdueHandling::Disabled),
        "reset-and-retry" => Ok(OverdueHandling::ResetAndRetry),
        "at-due-date-then-reset" => Ok(OverdueHandling::AtDueDateThenReset),
        other => Err(format!(
            "unknown overdue handling '{other}' (disabled, reset-and-retry, at-due-date-then-reset)"
        )),
    }
}

fn parse_approval_reset(s: &str) -> Result<ApprovalReset, String> {
    match s {
        "upon-completion" => Ok(ApprovalReset::UponCompletion),
        "at-midnight-once" => Ok(ApprovalReset::AtMidnightOnce),
        "at-midnight-multi" => Ok(ApprovalReset::AtMidnightMulti),
        other => Err(format!(
            "unknown approval reset '{other}' (upon-completion, at-midnight-once, at-midnight-multi)"
        )),
    }
}

fn parse_pending_action(s: &str) -> Result<PendingClaimAction, String> {
    match s {
        "leave" => Ok(PendingClaimAction::LeavePending),
        "force-approve" => Ok(PendingClaimAction::ForceApprove),
        "force-disapprove" => Ok(PendingClaimAction::ForceDisapprove),
        other => Err(format!(
            "unknown pending claim action '{other}' (leave, force-approve, force-disapprove)"
        )),
    }
}
