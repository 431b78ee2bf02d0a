//! The single owner of all mutable household state.
//!
//! Every mutation flows through a `Household` method and is serialized by
//! the service layer's command queue; there are no concurrent writers and no
//! ambient globals. Methods validate, authorize, apply, and return the
//! domain events produced -- a rejection leaves state exactly as it was.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assignment::{AssignmentState, ClaimState, CompletionCounters};
use crate::chore::{ApprovalReset, Chore, CompletionCriteria, OverdueHandling, PendingClaimAction};
use crate::error::{CoreError, Result, ValidationError};
use crate::events::Event;
use crate::gamification::{BadgeRule, Challenge, EvalContext, GamificationEvaluator};
use crate::interfaces::{ActionKind, Authorize, CapabilityAuthorizer};
use crate::points::{PointSource, PointsLedger};
use crate::recurrence::RecurrenceEngine;
use crate::stats::{stats_for, Period, PeriodStats};
use crate::user::User;

/// Current canonical snapshot shape. Older snapshots are migrated before
/// they reach `Household::restore`.
pub const SNAPSHOT_VERSION: u32 = 3;

/// Runtime assignment state for one chore.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChoreAssignments {
    /// Independent and shared_all chores: one sub-state per assignee.
    PerUser { states: BTreeMap<String, AssignmentState> },
    /// shared_first chores: a single instance visible to all assignees.
    Shared {
        state: AssignmentState,
        claimed_by: Option<String>,
        /// Index into the assignee list for rotation chores.
        turn: usize,
        /// Temporarily lets any assignee claim regardless of turn.
        cycle_open: bool,
    },
}

/// Serialized form of the full household state. This is the post-migration
/// canonical shape; the engine accepts nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub snapshot_version: u32,
    pub users: HashMap<String, User>,
    pub chores: HashMap<String, Chore>,
    pub assignments: BTreeMap<String, ChoreAssignments>,
    pub ledger: PointsLedger,
    pub counters: BTreeMap<String, CompletionCounters>,
    pub gamification: GamificationEvaluator,
}

/// Read-only per-user view of one assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentView {
    pub chore_id: String,
    pub user_id: String,
    pub state: ClaimState,
    pub due_at: DateTime<Utc>,
    pub streak: u32,
    pub pending_claim_count: u32,
}

pub struct Household {
    users: HashMap<String, User>,
    chores: HashMap<String, Chore>,
    assignments: BTreeMap<String, ChoreAssignments>,
    ledger: PointsLedger,
    counters: BTreeMap<String, CompletionCounters>,
    gamification: GamificationEvaluator,
    recurrence: RecurrenceEngine,
    authorizer: Box<dyn Authorize>,
}

impl Household {
    pub fn new(tz: FixedOffset) -> Self {
        Self::with_authorizer(tz, Box::new(CapabilityAuthorizer))
    }

    pub fn with_authorizer(tz: FixedOffset, authorizer: Box<dyn Authorize>) -> Self {
        Household {
            users: HashMap::new(),
            chores: HashMap::new(),
            assignments: BTreeMap::new(),
            ledger: PointsLedger::new(),
            counters: BTreeMap::new(),
            gamification: GamificationEvaluator::default(),
            recurrence: RecurrenceEngine::new(tz),
            authorizer,
        }
    }

    /// Rebuild from a canonical snapshot.
    pub fn restore(snapshot: EntitySnapshot, tz: FixedOffset) -> Result<Self> {
        if snapshot.snapshot_version != SNAPSHOT_VERSION {
            return Err(CoreError::Snapshot(format!(
                "expected snapshot version {SNAPSHOT_VERSION}, got {}",
                snapshot.snapshot_version
            )));
        }
        Ok(Household {
            users: snapshot.users,
            chores: snapshot.chores,
            assignments: snapshot.assignments,
            ledger: snapshot.ledger,
            counters: snapshot.counters,
            gamification: snapshot.gamification,
            recurrence: RecurrenceEngine::new(tz),
            authorizer: Box::new(CapabilityAuthorizer),
        })
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            snapshot_version: SNAPSHOT_VERSION,
            users: self.users.clone(),
            chores: self.chores.clone(),
            assignments: self.assignments.clone(),
            ledger: self.ledger.clone(),
            counters: self.counters.clone(),
            gamification: self.gamification.clone(),
        }
    }

    // ── Registration ─────────────────────────────────────────────────

    pub fn add_user(&mut self, user: User) -> Result<()> {
        if user.name.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "name".into(),
                message: "user name must not be empty".into(),
            }
            .into());
        }
        info!(user_id = %user.id, name = %user.name, "user added");
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    /// Remove a member. Their id is never reused; ledger history stays.
    pub fn remove_user(&mut self, user_id: &str) -> Result<()> {
        self.users
            .remove(user_id)
            .ok_or_else(|| CoreError::NotFound {
                kind: "user",
                id: user_id.into(),
            })?;
        for chore in self.chores.values_mut() {
            chore.assignees.retain(|a| a != user_id);
        }
        for assignments in self.assignments.values_mut() {
            if let ChoreAssignments::PerUser { states } = assignments {
                states.remove(user_id);
            }
        }
        Ok(())
    }

    /// Validate and register a chore, seeding its assignment state.
    pub fn add_chore(&mut self, chore: Chore) -> Result<()> {
        chore.validate()?;
        for assignee in &chore.assignees {
            let user = self.user(assignee)?;
            if !user.can_be_assigned {
                return Err(ValidationError::InvalidValue {
                    field: "assignees".into(),
                    message: format!("user '{}' cannot be assigned chores", user.name),
                }
                .into());
            }
        }
        let assignments = match chore.criteria {
            CompletionCriteria::SharedFirst => ChoreAssignments::Shared {
                state: AssignmentState::new(chore.due_at),
                claimed_by: None,
                turn: 0,
                cycle_open: false,
            },
            _ => ChoreAssignments::PerUser {
                states: chore
                    .assignees
                    .iter()
                    .map(|a| (a.clone(), AssignmentState::new(chore.due_for(a))))
                    .collect(),
            },
        };
        info!(chore_id = %chore.id, name = %chore.name, "chore added");
        self.assignments.insert(chore.id.clone(), assignments);
        self.chores.insert(chore.id.clone(), chore);
        Ok(())
    }

    pub fn add_badge_rule(&mut self, rule: BadgeRule) -> Result<()> {
        rule.validate()?;
        self.gamification.add_rule(rule);
        Ok(())
    }

    pub fn add_challenge(&mut self, challenge: Challenge) -> Result<()> {
        challenge.validate()?;
        self.gamification.add_challenge(challenge);
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn chores(&self) -> impl Iterator<Item = &Chore> {
        self.chores.values()
    }

    pub fn ledger(&self) -> &PointsLedger {
        &self.ledger
    }

    pub fn gamification(&self) -> &GamificationEvaluator {
        &self.gamification
    }

    pub fn counters(&self, user_id: &str) -> CompletionCounters {
        self.counters.get(user_id).cloned().unwrap_or_default()
    }

    pub fn stats(&self, user_id: &str, now: DateTime<Utc>) -> BTreeMap<Period, PeriodStats> {
        stats_for(&self.ledger, user_id, now, self.recurrence.tz())
    }

    /// The state of one assignment as seen by one user.
    pub fn assignment_view(&self, chore_id: &str, user_id: &str) -> Option<AssignmentView> {
        let chore = self.chores.get(chore_id)?;
        if !chore.assignees.iter().any(|a| a == user_id) {
            return None;
        }
        match self.assignments.get(chore_id)? {
            ChoreAssignments::PerUser { states } => {
                let sub = states.get(user_id)?;
                let state = match chore.criteria {
                    CompletionCriteria::SharedAll => shared_all_overall(states),
                    _ => sub.state,
                };
                Some(AssignmentView {
                    chore_id: chore_id.into(),
                    user_id: user_id.into(),
                    state,
                    due_at: sub.due_at,
                    streak: sub.streak,
                    pending_claim_count: sub.pending_claim_count,
                })
            }
            ChoreAssignments::Shared {
                state,
                turn,
                cycle_open,
                ..
            } => {
                let visible = if chore.rotation
                    && state.state == ClaimState::Pending
                    && !cycle_open
                    && turn_holder(chore, *turn) != Some(user_id)
                {
                    ClaimState::NotMyTurn
                } else {
                    state.state
                };
                Some(AssignmentView {
                    chore_id: chore_id.into(),
                    user_id: user_id.into(),
                    state: visible,
                    due_at: state.due_at,
                    streak: state.streak,
                    pending_claim_count: state.pending_claim_count,
                })
            }
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Claim a chore as the acting user.
    pub fn claim(
        &mut self,
        actor_id: &str,
        chore_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        self.authorize(actor_id, ActionKind::Claim, actor_id)?;
        let chore = self.chore(chore_id)?.clone();
        if !chore.assignees.iter().any(|a| a == actor_id) {
            return Err(CoreError::Authorization {
                actor: actor_id.into(),
                action: ActionKind::Claim.as_str().into(),
            });
        }
        let tz = self.recurrence.tz();
        let today = now.with_timezone(&tz).date_naive();

        let state_after = match self.assignments_mut(chore_id)? {
            ChoreAssignments::PerUser { states } => {
                let sub = states
                    .get_mut(actor_id)
                    .ok_or_else(|| CoreError::NotFound {
                        kind: "assignment",
                        id: format!("{chore_id}/{actor_id}"),
                    })?;
                if sub.state == ClaimState::Approved {
                    if !chore.allow_multiple_claims_per_day {
                        return Err(invalid(sub.state, "claim"));
                    }
                    // Externally still approved; the repeat claim queues.
                    sub.pending_claim_count += 1;
                    sub.last_claimed_at = Some(now);
                } else {
                    if sub.approved_on(today, tz) && !chore.allow_multiple_claims_per_day {
                        return Err(invalid(sub.state, "claim"));
                    }
                    if !sub.state.claimable() {
                        return Err(invalid(sub.state, "claim"));
                    }
                    sub.state = ClaimState::Claimed;
                    sub.last_claimed_at = Some(now);
                }
                match chore.criteria {
                    CompletionCriteria::SharedAll => shared_all_overall(states),
                    _ => states[actor_id].state,
                }
            }
            ChoreAssignments::Shared {
                state,
                claimed_by,
                turn,
                cycle_open,
            } => {
                if chore.rotation && !*cycle_open && turn_holder(&chore, *turn) != Some(actor_id)
                {
                    return Err(invalid(ClaimState::NotMyTurn, "claim"));
                }
                if state.state == ClaimState::Approved {
                    if !chore.allow_multiple_claims_per_day
                        || claimed_by.as_deref() != Some(actor_id)
                    {
                        return Err(invalid(state.state, "claim"));
                    }
                    state.pending_claim_count += 1;
                    state.last_claimed_at = Some(now);
                } else {
                    if state.approved_on(today, tz) && !chore.allow_multiple_claims_per_day {
                        return Err(invalid(state.state, "claim"));
                    }
                    if !state.state.claimable() {
                        return Err(invalid(state.state, "claim"));
                    }
                    // First claimant wins; the instance is claimed for all.
                    state.state = ClaimState::Claimed;
                    state.last_claimed_at = Some(now);
                    *claimed_by = Some(actor_id.to_string());
                }
                state.state
            }
        };

        info!(chore_id, user_id = actor_id, state = state_after.as_str(), "chore claimed");
        Ok(vec![Event::ChoreClaimed {
            chore_id: chore_id.into(),
            user_id: actor_id.into(),
            state: state_after,
            at: now,
        }])
    }

    /// Assignee takes back their own claim. Lands in the same state as a
    /// disapproval but never touches disapproval statistics.
    pub fn undo_claim(
        &mut self,
        actor_id: &str,
        chore_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        self.authorize(actor_id, ActionKind::UndoClaim, actor_id)?;
        self.chore(chore_id)?;

        match self.assignments_mut(chore_id)? {
            ChoreAssignments::PerUser { states } => {
                let sub = states
                    .get_mut(actor_id)
                    .ok_or_else(|| CoreError::NotFound {
                        kind: "assignment",
                        id: format!("{chore_id}/{actor_id}"),
                    })?;
                if sub.state == ClaimState::Approved && sub.pending_claim_count > 0 {
                    sub.pending_claim_count -= 1;
                } else if sub.state == ClaimState::Claimed {
                    sub.state = ClaimState::Pending;
                } else {
                    return Err(invalid(sub.state, "undo claim"));
                }
            }
            ChoreAssignments::Shared {
                state, claimed_by, ..
            } => {
                if claimed_by.as_deref() != Some(actor_id) {
                    return Err(invalid(state.state, "undo claim"));
                }
                if state.state == ClaimState::Approved && state.pending_claim_count > 0 {
                    state.pending_claim_count -= 1;
                } else if state.state == ClaimState::Claimed {
                    state.state = ClaimState::Pending;
                    *claimed_by = None;
                } else {
                    return Err(invalid(state.state, "undo claim"));
                }
            }
        }

        info!(chore_id, user_id = actor_id, "claim undone");
        Ok(vec![Event::ClaimUndone {
            chore_id: chore_id.into(),
            user_id: actor_id.into(),
            at: now,
        }])
    }

    /// Approve a claim, awarding points and re-arming per policy.
    pub fn approve(
        &mut self,
        actor_id: &str,
        chore_id: &str,
        target_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        self.authorize(actor_id, ActionKind::Approve, target_user_id)?;
        let chore = self.chore(chore_id)?.clone();
        let mut events = Vec::new();

        match chore.criteria {
            CompletionCriteria::Independent => {
                // A queued same-day repeat claim pays out again without a
                // state transition.
                let repeat_claim = {
                    let sub = self.per_user_sub(chore_id, target_user_id)?;
                    if sub.state.reviewable() {
                        false
                    } else if sub.state == ClaimState::Approved && sub.pending_claim_count > 0 {
                        true
                    } else {
                        return Err(invalid(sub.state, "approve"));
                    }
                };
                events.push(self.award_approval(&chore, target_user_id, actor_id, now));
                let next = self.next_due_after(&chore, chore_id, target_user_id, now);
                let sub = self.per_user_sub_mut(chore_id, target_user_id)?;
                sub.last_approved_at = Some(now);
                if repeat_claim {
                    sub.pending_claim_count -= 1;
                } else {
                    sub.state = ClaimState::Approved;
                    sub.streak += 1;
                    if chore.approval_reset == ApprovalReset::UponCompletion {
                        if let Some(due) = next {
                            sub.due_at = due;
                            sub.state = ClaimState::Pending;
                        }
                    }
                }
            }
            CompletionCriteria::SharedAll => {
                // The shared instance approves as a whole, only once every
                // assignee has claimed.
                let claimants: Vec<String> = match self.assignments_mut(chore_id)? {
                    ChoreAssignments::PerUser { states } => {
                        let overall = shared_all_overall(states);
                        if overall != ClaimState::Claimed {
                            return Err(invalid(overall, "approve"));
                        }
                        states
                            .iter()
                            .filter(|(_, s)| s.state == ClaimState::Claimed)
                            .map(|(u, _)| u.clone())
                            .collect()
                    }
                    ChoreAssignments::Shared { .. } => {
                        return Err(CoreError::NotFound {
                            kind: "assignment",
                            id: chore_id.into(),
                        })
                    }
                };
                for user_id in &claimants {
                    events.push(self.award_approval(&chore, user_id, actor_id, now));
                    let next = self.next_due_after(&chore, chore_id, user_id, now);
                    let sub = self.per_user_sub_mut(chore_id, user_id)?;
                    sub.state = ClaimState::Approved;
                    sub.streak += 1;
                    sub.last_approved_at = Some(now);
                    if chore.approval_reset == ApprovalReset::UponCompletion {
                        if let Some(due) = next {
                            sub.due_at = due;
                            sub.state = ClaimState::Pending;
                        }
                    }
                }
            }
            CompletionCriteria::SharedFirst => {
                let (claimant, repeat_claim) = match self.assignments_mut(chore_id)? {
                    ChoreAssignments::Shared {
                        state, claimed_by, ..
                    } => {
                        let claimant =
                            claimed_by.clone().ok_or_else(|| CoreError::NotFound {
                                kind: "claimant",
                                id: chore_id.into(),
                            })?;
                        if state.state.reviewable() {
                            (claimant, false)
                        } else if state.state == ClaimState::Approved
                            && state.pending_claim_count > 0
                        {
                            (claimant, true)
                        } else {
                            return Err(invalid(state.state, "approve"));
                        }
                    }
                    ChoreAssignments::PerUser { .. } => {
                        return Err(CoreError::NotFound {
                            kind: "assignment",
                            id: chore_id.into(),
                        })
                    }
                };
                events.push(self.award_approval(&chore, &claimant, actor_id, now));
                let next = self
                    .recurrence
                    .next_due(&chore.recurrence, self.shared_due(chore_id)?, now);
                if let ChoreAssignments::Shared {
                    state,
                    claimed_by,
                    turn,
                    cycle_open,
                } = self.assignments_mut(chore_id)?
                {
                    state.last_approved_at = Some(now);
                    if repeat_claim {
                        state.pending_claim_count -= 1;
                    } else {
                        state.state = ClaimState::Approved;
                        state.streak += 1;
                        if chore.rotation {
                            // Approving advances the turn; an open cycle
                            // closes again.
                            *turn = (*turn + 1) % chore.assignees.len().max(1);
                            *cycle_open = false;
                        }
                        if chore.approval_reset == ApprovalReset::UponCompletion {
                            if let Some(due) = next {
                                state.due_at = due;
                                state.state = ClaimState::Pending;
                                *claimed_by = None;
                            }
                        }
                    }
                }
            }
        }
        Ok(events)
    }

    /// Approver rejects a claim: disapproval statistics increment, the
    /// streak resets and the instance re-arms to pending.
    pub fn disapprove(
        &mut self,
        actor_id: &str,
        chore_id: &str,
        target_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        self.authorize(actor_id, ActionKind::Disapprove, target_user_id)?;
        self.chore(chore_id)?;

        let rejected_user = match self.assignments_mut(chore_id)? {
            ChoreAssignments::PerUser { states } => {
                let sub = states
                    .get_mut(target_user_id)
                    .ok_or_else(|| CoreError::NotFound {
                        kind: "assignment",
                        id: format!("{chore_id}/{target_user_id}"),
                    })?;
                if !sub.state.reviewable() {
                    return Err(invalid(sub.state, "disapprove"));
                }
                sub.state = ClaimState::Pending;
                sub.streak = 0;
                target_user_id.to_string()
            }
            ChoreAssignments::Shared {
                state, claimed_by, ..
            } => {
                if !state.state.reviewable() {
                    return Err(invalid(state.state, "disapprove"));
                }
                let claimant = claimed_by.take().ok_or_else(|| CoreError::NotFound {
                    kind: "claimant",
                    id: chore_id.into(),
                })?;
                state.state = ClaimState::Pending;
                state.streak = 0;
                claimant
            }
        };

        self.counters
            .entry(rejected_user.clone())
            .or_default()
            .disapprovals_total += 1;
        self.gamification.mark_dirty(&rejected_user);
        info!(chore_id, user_id = %rejected_user, by = actor_id, "chore disapproved");
        Ok(vec![Event::ChoreDisapproved {
            chore_id: chore_id.into(),
            user_id: rejected_user,
            disapproved_by: actor_id.into(),
            at: now,
        }])
    }

    /// Manual point adjustment. Flows through the same ledger append path as
    /// every other delta.
    pub fn adjust_points(
        &mut self,
        actor_id: &str,
        target_user_id: &str,
        delta: i64,
        source: PointSource,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        self.authorize(actor_id, ActionKind::AdjustPoints, target_user_id)?;
        self.user(target_user_id)?;
        self.ledger.append(target_user_id, delta, source, now);
        self.gamification.mark_dirty(target_user_id);
        info!(user_id = target_user_id, delta, source = source.as_str(), "points adjusted");
        Ok(vec![Event::PointsAdjusted {
            user_id: target_user_id.into(),
            delta,
            source,
            at: now,
        }])
    }

    /// Advance an assignment past its current due date without points.
    pub fn skip(
        &mut self,
        actor_id: &str,
        chore_id: &str,
        target_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        self.authorize(actor_id, ActionKind::Skip, target_user_id)?;
        let chore = self.chore(chore_id)?.clone();
        let recurrence = self.recurrence;

        let next_due = match self.assignments_mut(chore_id)? {
            ChoreAssignments::PerUser { states } => {
                let sub = states
                    .get_mut(target_user_id)
                    .ok_or_else(|| CoreError::NotFound {
                        kind: "assignment",
                        id: format!("{chore_id}/{target_user_id}"),
                    })?;
                let next = next_due_for(&recurrence, &chore, target_user_id, sub.due_at, now);
                sub.state = ClaimState::Pending;
                if let Some(due) = next {
                    sub.due_at = due;
                }
                next
            }
            ChoreAssignments::Shared {
                state,
                claimed_by,
                turn,
                ..
            } => {
                let next = next_due_for(&recurrence, &chore, target_user_id, state.due_at, now);
                state.state = ClaimState::Pending;
                *claimed_by = None;
                if chore.rotation {
                    // Skipping passes the turn along.
                    *turn = (*turn + 1) % chore.assignees.len().max(1);
                }
                if let Some(due) = next {
                    state.due_at = due;
                }
                next
            }
        };

        info!(chore_id, user_id = target_user_id, "chore skipped");
        Ok(vec![Event::ChoreSkipped {
            chore_id: chore_id.into(),
            user_id: target_user_id.into(),
            next_due,
            at: now,
        }])
    }

    /// Force an assignment back to pending at its configured due date.
    pub fn reset_assignment(
        &mut self,
        actor_id: &str,
        chore_id: &str,
        target_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        self.authorize(actor_id, ActionKind::ResetAssignment, target_user_id)?;
        let chore = self.chore(chore_id)?.clone();

        match self.assignments_mut(chore_id)? {
            ChoreAssignments::PerUser { states } => {
                let sub = states
                    .get_mut(target_user_id)
                    .ok_or_else(|| CoreError::NotFound {
                        kind: "assignment",
                        id: format!("{chore_id}/{target_user_id}"),
                    })?;
                *sub = AssignmentState::new(chore.due_for(target_user_id));
            }
            ChoreAssignments::Shared {
                state,
                claimed_by,
                cycle_open,
                ..
            } => {
                *state = AssignmentState::new(chore.due_at);
                *claimed_by = None;
                *cycle_open = false;
            }
        }

        Ok(vec![Event::AssignmentReset {
            chore_id: chore_id.into(),
            user_id: target_user_id.into(),
            at: now,
        }])
    }

    /// Temporarily allow any assignee of a rotation chore to claim.
    pub fn open_cycle(
        &mut self,
        actor_id: &str,
        chore_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        self.authorize(actor_id, ActionKind::OpenCycle, actor_id)?;
        let chore = self.chore(chore_id)?;
        if !chore.rotation {
            return Err(ValidationError::PolicyConflict(
                "open cycle requires a rotation chore".into(),
            )
            .into());
        }
        if let ChoreAssignments::Shared { cycle_open, .. } = self.assignments_mut(chore_id)? {
            *cycle_open = true;
        }
        Ok(vec![Event::CycleOpened {
            chore_id: chore_id.into(),
            opened_by: actor_id.into(),
            at: now,
        }])
    }

    // ── Periodic drivers ─────────────────────────────────────────────

    /// Minute-scale tick: overdue detection. Joins the same serialized
    /// mutation path as user actions; never runs from a timer directly.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        let chore_ids: Vec<String> = self.chores.keys().cloned().collect();
        for chore_id in chore_ids {
            let chore = self.chores[&chore_id].clone();
            if chore.overdue == OverdueHandling::Disabled {
                continue;
            }
            let Some(assignments) = self.assignments.get_mut(&chore_id) else {
                continue;
            };
            match assignments {
                ChoreAssignments::PerUser { states } => {
                    for (user_id, sub) in states.iter_mut() {
                        if sub.state == ClaimState::Pending && now > sub.due_at {
                            sub.state = ClaimState::Overdue;
                            events.push(Event::ChoreOverdue {
                                chore_id: chore_id.clone(),
                                user_id: user_id.clone(),
                                due_at: sub.due_at,
                                at: now,
                            });
                            self.gamification.mark_dirty(user_id);
                        }
                    }
                }
                ChoreAssignments::Shared { state, .. } => {
                    if state.state == ClaimState::Pending && now > state.due_at {
                        state.state = ClaimState::Overdue;
                        for user_id in &chore.assignees {
                            events.push(Event::ChoreOverdue {
                                chore_id: chore_id.clone(),
                                user_id: user_id.clone(),
                                due_at: state.due_at,
                                at: now,
                            });
                            self.gamification.mark_dirty(user_id);
                        }
                    }
                }
            }
        }
        events
    }

    /// Once-daily rollover: daily counters reset, policy-driven re-arming,
    /// overdue resolution, then a global gamification recompute.
    pub fn midnight_rollover(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        for counters in self.counters.values_mut() {
            counters.reset_daily();
        }

        let chore_ids: Vec<String> = self.chores.keys().cloned().collect();
        for chore_id in chore_ids {
            let chore = self.chores[&chore_id].clone();
            events.extend(self.rollover_chore(&chore, &chore_id, now));
        }

        let all_users: Vec<String> = self.users.keys().cloned().collect();
        self.gamification
            .mark_all_dirty(all_users.iter().map(|s| s.as_str()));
        events.push(Event::MidnightRollover { at: now });
        info!(events = events.len(), "midnight rollover");
        events
    }

    /// Drain the debounced gamification queue. Called by the service layer
    /// once the debounce window elapses.
    pub fn drain_gamification(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let ctx = EvalContext {
            ledger: &self.ledger,
            chores: &self.chores,
            now,
            tz: self.recurrence.tz(),
        };
        self.gamification.drain(&ctx)
    }

    pub fn has_pending_evaluations(&self) -> bool {
        self.gamification.has_dirty()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn rollover_chore(&mut self, chore: &Chore, chore_id: &str, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        let recurrence = self.recurrence;
        let mut outcomes = RolloverOutcomes::default();

        if let Some(assignments) = self.assignments.get_mut(chore_id) {
            match assignments {
                ChoreAssignments::PerUser { states } => {
                    for (user_id, sub) in states.iter_mut() {
                        rollover_sub(chore, user_id, sub, now, &recurrence, &mut outcomes);
                    }
                }
                ChoreAssignments::Shared {
                    state,
                    claimed_by,
                    turn,
                    cycle_open,
                } => {
                    let claimant = claimed_by.clone().unwrap_or_default();
                    let before = state.state;
                    rollover_sub(chore, &claimant, state, now, &recurrence, &mut outcomes);
                    if state.state == ClaimState::Pending && before != ClaimState::Pending {
                        *claimed_by = None;
                        // A force-approved claim completes a rotation turn;
                        // a normal approval already advanced it.
                        if chore.rotation
                            && before.reviewable()
                            && chore.pending_claim_action == PendingClaimAction::ForceApprove
                        {
                            *turn = (*turn + 1) % chore.assignees.len().max(1);
                            *cycle_open = false;
                        }
                    }
                }
            }
        }

        for user_id in outcomes.force_approved {
            events.push(self.award_approval(chore, &user_id, "system", now));
        }
        for user_id in outcomes.force_disapproved {
            self.counters
                .entry(user_id.clone())
                .or_default()
                .disapprovals_total += 1;
            self.gamification.mark_dirty(&user_id);
            events.push(Event::ChoreDisapproved {
                chore_id: chore_id.into(),
                user_id,
                disapproved_by: "system".into(),
                at: now,
            });
        }
        for user_id in outcomes.missed {
            self.counters
                .entry(user_id.clone())
                .or_default()
                .missed_total += 1;
            self.gamification.mark_dirty(&user_id);
            events.push(Event::ChoreMissed {
                chore_id: chore_id.into(),
                user_id,
                at: now,
            });
        }
        events
    }

    /// Award points and record the approval for one user. State changes are
    /// the caller's job.
    fn award_approval(
        &mut self,
        chore: &Chore,
        user_id: &str,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> Event {
        let multiplier = self.gamification.multiplier_for(user_id);
        let points = ((chore.points as f64) * multiplier).trunc() as i64;
        self.ledger.append(user_id, points, PointSource::Chore, now);
        let counters = self.counters.entry(user_id.to_string()).or_default();
        counters.approvals_total += 1;
        counters.approvals_today += 1;
        self.gamification.record_approval(user_id, &chore.id, now);
        self.gamification.mark_dirty(user_id);
        info!(chore_id = %chore.id, user_id, points, by = approved_by, "chore approved");
        Event::ChoreApproved {
            chore_id: chore.id.clone(),
            user_id: user_id.into(),
            approved_by: approved_by.into(),
            points_awarded: points,
            at: now,
        }
    }

    fn next_due_after(
        &self,
        chore: &Chore,
        chore_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let due = match self.assignments.get(chore_id)? {
            ChoreAssignments::PerUser { states } => states.get(user_id)?.due_at,
            ChoreAssignments::Shared { state, .. } => state.due_at,
        };
        next_due_for(&self.recurrence, chore, user_id, due, now)
    }

    fn shared_due(&self, chore_id: &str) -> Result<DateTime<Utc>> {
        match self.assignments.get(chore_id) {
            Some(ChoreAssignments::Shared { state, .. }) => Ok(state.due_at),
            _ => Err(CoreError::NotFound {
                kind: "assignment",
                id: chore_id.into(),
            }),
        }
    }

    fn per_user_sub(&self, chore_id: &str, user_id: &str) -> Result<&AssignmentState> {
        match self.assignments.get(chore_id) {
            Some(ChoreAssignments::PerUser { states }) => {
                states.get(user_id).ok_or_else(|| CoreError::NotFound {
                    kind: "assignment",
                    id: format!("{chore_id}/{user_id}"),
                })
            }
            _ => Err(CoreError::NotFound {
                kind: "assignment",
                id: chore_id.into(),
            }),
        }
    }

    fn per_user_sub_mut(&mut self, chore_id: &str, user_id: &str) -> Result<&mut AssignmentState> {
        match self.assignments.get_mut(chore_id) {
            Some(ChoreAssignments::PerUser { states }) => {
                states.get_mut(user_id).ok_or_else(|| CoreError::NotFound {
                    kind: "assignment",
                    id: format!("{chore_id}/{user_id}"),
                })
            }
            _ => Err(CoreError::NotFound {
                kind: "assignment",
                id: chore_id.into(),
            }),
        }
    }

    fn assignments_mut(&mut self, chore_id: &str) -> Result<&mut ChoreAssignments> {
        self.assignments
            .get_mut(chore_id)
            .ok_or_else(|| CoreError::NotFound {
                kind: "assignment",
                id: chore_id.into(),
            })
    }

    fn chore(&self, chore_id: &str) -> Result<&Chore> {
        self.chores.get(chore_id).ok_or_else(|| CoreError::NotFound {
            kind: "chore",
            id: chore_id.into(),
        })
    }

    fn user(&self, user_id: &str) -> Result<&User> {
        self.users.get(user_id).ok_or_else(|| CoreError::NotFound {
            kind: "user",
            id: user_id.into(),
        })
    }

    fn authorize(&self, actor_id: &str, action: ActionKind, target: &str) -> Result<&User> {
        let actor = self.user(actor_id)?;
        if !self.authorizer.is_authorized(actor, action, target) {
            return Err(CoreError::Authorization {
                actor: actor_id.into(),
                action: action.as_str().into(),
            });
        }
        Ok(actor)
    }
}

/// Users collected during a rollover pass whose counter and ledger effects
/// apply afterwards, once the assignment borrow ends.
#[derive(Default)]
struct RolloverOutcomes {
    force_approved: Vec<String>,
    force_disapproved: Vec<String>,
    missed: Vec<String>,
}

fn invalid(from: ClaimState, action: &str) -> CoreError {
    CoreError::InvalidTransition {
        from: from.as_str().into(),
        action: action.into(),
    }
}

fn turn_holder(chore: &Chore, turn: usize) -> Option<&str> {
    if chore.assignees.is_empty() {
        return None;
    }
    Some(chore.assignees[turn % chore.assignees.len()].as_str())
}

/// Overall state of a shared_all chore derived from its sub-states.
fn shared_all_overall(states: &BTreeMap<String, AssignmentState>) -> ClaimState {
    let total = states.len();
    let approved = states
        .values()
        .filter(|s| s.state == ClaimState::Approved)
        .count();
    let claimed_or_approved = states
        .values()
        .filter(|s| matches!(s.state, ClaimState::Claimed | ClaimState::Approved))
        .count();
    if total > 0 && approved == total {
        ClaimState::Approved
    } else if total > 0 && claimed_or_approved == total {
        ClaimState::Claimed
    } else if claimed_or_approved > 0 {
        ClaimState::ClaimedInPart
    } else if states.values().any(|s| s.state == ClaimState::Overdue) {
        ClaimState::Overdue
    } else {
        ClaimState::Pending
    }
}

/// Per-sub rollover transitions shared between per-user and shared
/// assignments. Counter and ledger effects accumulate in `outcomes`.
fn rollover_sub(
    chore: &Chore,
    user_id: &str,
    sub: &mut AssignmentState,
    now: DateTime<Utc>,
    recurrence: &RecurrenceEngine,
    outcomes: &mut RolloverOutcomes,
) {
    match sub.state {
        // Missed instances from the previous rollover re-arm now.
        ClaimState::Missed => {
            rearm(sub, chore, user_id, recurrence, now);
        }
        ClaimState::Overdue => match chore.overdue {
            OverdueHandling::ResetAndRetry => {
                rearm(sub, chore, user_id, recurrence, now);
            }
            OverdueHandling::AtDueDateThenReset => {
                sub.state = ClaimState::Missed;
                sub.streak = 0;
                if !user_id.is_empty() {
                    outcomes.missed.push(user_id.to_string());
                }
            }
            OverdueHandling::Disabled => {}
        },
        ClaimState::Approved if chore.approval_reset.is_midnight() => {
            sub.pending_claim_count = 0;
            rearm(sub, chore, user_id, recurrence, now);
        }
        ClaimState::Claimed | ClaimState::ClaimedInPart
            if chore.approval_reset.is_midnight() =>
        {
            match chore.pending_claim_action {
                PendingClaimAction::LeavePending => {}
                PendingClaimAction::ForceApprove => {
                    if !user_id.is_empty() {
                        outcomes.force_approved.push(user_id.to_string());
                    }
                    sub.last_approved_at = Some(now);
                    sub.streak += 1;
                    // One-shot chores have nothing to re-arm to; they end up
                    // approved, like a manual approval would leave them.
                    sub.state = ClaimState::Approved;
                    rearm(sub, chore, user_id, recurrence, now);
                }
                PendingClaimAction::ForceDisapprove => {
                    if !user_id.is_empty() {
                        outcomes.force_disapproved.push(user_id.to_string());
                    }
                    sub.streak = 0;
                    sub.state = ClaimState::Pending;
                }
            }
        }
        _ => {}
    }
}

/// Re-arm an assignment to pending at its next due date, skipping past
/// instances already behind us and non-applicable weekdays. One-shot
/// chores stay where they are.
fn rearm(
    sub: &mut AssignmentState,
    chore: &Chore,
    user_id: &str,
    recurrence: &RecurrenceEngine,
    now: DateTime<Utc>,
) {
    let rule = chore.recurrence_for(user_id);
    let tz = recurrence.tz();
    let mut due = sub.due_at;
    let mut advanced = false;
    while let Some(next) = recurrence.next_due(&rule, due, now) {
        advanced = true;
        due = next;
        if due > now {
            break;
        }
    }
    if !advanced {
        return;
    }
    // Bounded: a weekday override always names at least one day, but a
    // weekly rule pinned to an excluded weekday never lands on one.
    for _ in 0..366 {
        if chore.applies_on(user_id, due.with_timezone(&tz).weekday()) {
            sub.due_at = due;
            sub.state = ClaimState::Pending;
            return;
        }
        match recurrence.next_due(&rule, due, due) {
            Some(next) => due = next,
            None => return,
        }
    }
}

/// Next due date for one user, honoring per-user slot and weekday
/// overrides. Steps past non-applicable weekdays, bounded to a year.
fn next_due_for(
    recurrence: &RecurrenceEngine,
    chore: &Chore,
    user_id: &str,
    due_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let rule = chore.recurrence_for(user_id);
    let tz = recurrence.tz();
    let mut due = recurrence.next_due(&rule, due_at, completed_at)?;
    for _ in 0..366 {
        if chore.applies_on(user_id, due.with_timezone(&tz).weekday()) {
            return Some(due);
        }
        due = recurrence.next_due(&rule, due, due)?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamification::{BadgeKind, TrackedScope};
    use crate::recurrence::RecurrenceRule;
    use chrono::Duration;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    struct Fixture {
        hh: Household,
        manager: String,
        member: String,
        other: String,
    }

    fn fixture() -> Fixture {
        let mut hh = Household::new(utc());
        let manager = User::new_approver("Kim");
        let member = User::new("Alex");
        let other = User::new("Sam");
        let (m, a, o) = (manager.id.clone(), member.id.clone(), other.id.clone());
        hh.add_user(manager).unwrap();
        hh.add_user(member).unwrap();
        hh.add_user(other).unwrap();
        Fixture {
            hh,
            manager: m,
            member: a,
            other: o,
        }
    }

    fn daily_chore(f: &Fixture, points: i64, due: DateTime<Utc>) -> Chore {
        let mut c = Chore::new("Dishes", points, due);
        c.assignees = vec![f.member.clone()];
        c.recurrence = RecurrenceRule::Daily;
        c
    }

    #[test]
    fn claim_then_approve_awards_points_and_rearms() {
        let mut f = fixture();
        let now = at("2024-03-10T10:00:00Z");
        let due = at("2024-03-10T18:00:00Z");
        let chore = daily_chore(&f, 10, due);
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();

        f.hh.claim(&f.member, &cid, now).unwrap();
        let events = f.hh.approve(&f.manager, &cid, &f.member, now).unwrap();
        assert!(matches!(
            events[0],
            Event::ChoreApproved {
                points_awarded: 10,
                ..
            }
        ));
        assert_eq!(f.hh.ledger().balance(&f.member), 10);
        assert_eq!(f.hh.counters(&f.member).approvals_total, 1);

        // upon_completion re-arms immediately to the next daily instance
        let view = f.hh.assignment_view(&cid, &f.member).unwrap();
        assert_eq!(view.state, ClaimState::Pending);
        assert_eq!(view.due_at, due + Duration::days(1));
        assert_eq!(view.streak, 1);
    }

    #[test]
    fn second_claim_same_day_is_rejected_without_multi() {
        let mut f = fixture();
        let now = at("2024-03-10T10:00:00Z");
        let chore = daily_chore(&f, 10, at("2024-03-10T18:00:00Z"));
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();

        f.hh.claim(&f.member, &cid, now).unwrap();
        f.hh.approve(&f.manager, &cid, &f.member, now).unwrap();

        // Re-armed to pending, but already approved today.
        let err = f.hh.claim(&f.member, &cid, now + Duration::hours(1));
        assert!(matches!(err, Err(CoreError::InvalidTransition { .. })));
        assert_eq!(f.hh.ledger().balance(&f.member), 10);
    }

    #[test]
    fn repeat_claims_queue_when_multi_allowed() {
        let mut f = fixture();
        let now = at("2024-03-10T10:00:00Z");
        let mut chore = daily_chore(&f, 10, at("2024-03-10T18:00:00Z"));
        chore.approval_reset = ApprovalReset::AtMidnightMulti;
        chore.allow_multiple_claims_per_day = true;
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();

        f.hh.claim(&f.member, &cid, now).unwrap();
        f.hh.approve(&f.manager, &cid, &f.member, now).unwrap();
        // Instance stays approved until midnight; the repeat claim queues.
        f.hh.claim(&f.member, &cid, now + Duration::hours(1)).unwrap();
        let view = f.hh.assignment_view(&cid, &f.member).unwrap();
        assert_eq!(view.state, ClaimState::Approved);
        assert_eq!(view.pending_claim_count, 1);

        f.hh.approve(&f.manager, &cid, &f.member, now + Duration::hours(2))
            .unwrap();
        assert_eq!(f.hh.ledger().balance(&f.member), 20);
        assert_eq!(
            f.hh.assignment_view(&cid, &f.member)
                .unwrap()
                .pending_claim_count,
            0
        );
    }

    #[test]
    fn undo_claim_never_touches_disapproval_counters() {
        let mut f = fixture();
        let now = at("2024-03-10T10:00:00Z");
        let chore = daily_chore(&f, 10, at("2024-03-10T18:00:00Z"));
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();

        f.hh.claim(&f.member, &cid, now).unwrap();
        f.hh.undo_claim(&f.member, &cid, now).unwrap();
        assert_eq!(f.hh.counters(&f.member).disapprovals_total, 0);
        assert_eq!(
            f.hh.assignment_view(&cid, &f.member).unwrap().state,
            ClaimState::Pending
        );

        // Same end state through disapproval bumps the counter.
        f.hh.claim(&f.member, &cid, now).unwrap();
        f.hh.disapprove(&f.manager, &cid, &f.member, now).unwrap();
        assert_eq!(f.hh.counters(&f.member).disapprovals_total, 1);
        assert_eq!(
            f.hh.assignment_view(&cid, &f.member).unwrap().state,
            ClaimState::Pending
        );
        assert_eq!(f.hh.ledger().balance(&f.member), 0);
    }

    #[test]
    fn members_cannot_approve() {
        let mut f = fixture();
        let now = at("2024-03-10T10:00:00Z");
        let chore = daily_chore(&f, 10, at("2024-03-10T18:00:00Z"));
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();

        f.hh.claim(&f.member, &cid, now).unwrap();
        let err = f.hh.approve(&f.member, &cid, &f.member, now);
        assert!(matches!(err, Err(CoreError::Authorization { .. })));
        // Rejection left the claim untouched.
        assert_eq!(
            f.hh.assignment_view(&cid, &f.member).unwrap().state,
            ClaimState::Claimed
        );
    }

    #[test]
    fn shared_all_approves_only_when_everyone_claimed() {
        let mut f = fixture();
        let now = at("2024-03-10T10:00:00Z");
        let mut chore = Chore::new("Tidy living room", 6, at("2024-03-10T18:00:00Z"));
        chore.assignees = vec![f.member.clone(), f.other.clone()];
        chore.criteria = CompletionCriteria::SharedAll;
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();

        f.hh.claim(&f.member, &cid, now).unwrap();
        let view = f.hh.assignment_view(&cid, &f.member).unwrap();
        assert_eq!(view.state, ClaimState::ClaimedInPart);

        let err = f.hh.approve(&f.manager, &cid, &f.member, now);
        assert!(matches!(err, Err(CoreError::InvalidTransition { .. })));

        f.hh.claim(&f.other, &cid, now).unwrap();
        let events = f.hh.approve(&f.manager, &cid, &f.member, now).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(f.hh.ledger().balance(&f.member), 6);
        assert_eq!(f.hh.ledger().balance(&f.other), 6);
    }

    #[test]
    fn rotation_enforces_turn_order_until_cycle_opens() {
        let mut f = fixture();
        let now = at("2024-03-10T10:00:00Z");
        let mut chore = Chore::new("Take out trash", 5, at("2024-03-10T18:00:00Z"));
        chore.assignees = vec![f.member.clone(), f.other.clone()];
        chore.criteria = CompletionCriteria::SharedFirst;
        chore.rotation = true;
        chore.recurrence = RecurrenceRule::Daily;
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();

        // Turn 0 belongs to the first assignee.
        assert!(matches!(
            f.hh.claim(&f.other, &cid, now),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(
            f.hh.assignment_view(&cid, &f.other).unwrap().state,
            ClaimState::NotMyTurn
        );

        // Opening the cycle lets the off-turn member claim.
        f.hh.open_cycle(&f.manager, &cid, now).unwrap();
        f.hh.claim(&f.other, &cid, now).unwrap();
        f.hh.undo_claim(&f.other, &cid, now).unwrap();

        f.hh.claim(&f.member, &cid, now).unwrap();
        f.hh.approve(&f.manager, &cid, &f.member, now).unwrap();
        assert_eq!(f.hh.ledger().balance(&f.member), 5);

        // Approval advanced the turn and closed the open cycle; the next
        // day only the other member may claim.
        let tomorrow = now + Duration::days(1);
        assert!(matches!(
            f.hh.claim(&f.member, &cid, tomorrow),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(f.hh.claim(&f.other, &cid, tomorrow).is_ok());
    }

    #[test]
    fn overdue_then_missed_then_rearmed() {
        let mut f = fixture();
        let due = at("2024-03-10T18:00:00Z");
        let mut chore = daily_chore(&f, 10, due);
        chore.overdue = OverdueHandling::AtDueDateThenReset;
        chore.approval_reset = ApprovalReset::AtMidnightOnce;
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();

        // Before due: nothing happens.
        assert!(f.hh.tick(due - Duration::hours(1)).is_empty());

        let events = f.hh.tick(due + Duration::minutes(5));
        assert!(matches!(events[0], Event::ChoreOverdue { .. }));

        // First midnight: overdue resolves to missed.
        let midnight = at("2024-03-11T00:00:00Z");
        let events = f.hh.midnight_rollover(midnight);
        assert!(events.iter().any(|e| matches!(e, Event::ChoreMissed { .. })));
        assert_eq!(f.hh.counters(&f.member).missed_total, 1);
        assert_eq!(
            f.hh.assignment_view(&cid, &f.member).unwrap().state,
            ClaimState::Missed
        );

        // Next midnight: the missed instance re-arms to pending, due ahead.
        let next_midnight = at("2024-03-12T00:00:00Z");
        f.hh.midnight_rollover(next_midnight);
        let view = f.hh.assignment_view(&cid, &f.member).unwrap();
        assert_eq!(view.state, ClaimState::Pending);
        assert!(view.due_at > next_midnight);
    }

    #[test]
    fn force_approve_pays_out_at_midnight() {
        let mut f = fixture();
        let now = at("2024-03-10T20:00:00Z");
        let mut chore = daily_chore(&f, 8, at("2024-03-10T18:00:00Z"));
        chore.approval_reset = ApprovalReset::AtMidnightOnce;
        chore.pending_claim_action = PendingClaimAction::ForceApprove;
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();

        f.hh.claim(&f.member, &cid, now).unwrap();
        let events = f.hh.midnight_rollover(at("2024-03-11T00:00:00Z"));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::ChoreApproved { points_awarded: 8, .. })));
        assert_eq!(f.hh.ledger().balance(&f.member), 8);
        assert_eq!(
            f.hh.assignment_view(&cid, &f.member).unwrap().state,
            ClaimState::Pending
        );
    }

    #[test]
    fn per_user_slot_override_drives_the_next_due_slot() {
        let mut f = fixture();
        let slot = |h: u32| chrono::NaiveTime::from_hms_opt(h, 0, 0).unwrap();
        let mut chore = Chore::new("Feed the cat", 4, at("2024-03-10T08:00:00Z"));
        chore.assignees = vec![f.member.clone(), f.other.clone()];
        chore.recurrence = RecurrenceRule::DailyMulti {
            times: vec![slot(8), slot(20)],
        };
        // One member feeds at midday instead of the household slots.
        chore.slot_overrides.insert(f.member.clone(), vec![slot(12)]);
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();

        let now = at("2024-03-10T08:30:00Z");
        f.hh.claim(&f.member, &cid, now).unwrap();
        f.hh.approve(&f.manager, &cid, &f.member, now).unwrap();
        assert_eq!(
            f.hh.assignment_view(&cid, &f.member).unwrap().due_at,
            at("2024-03-10T12:00:00Z")
        );

        // The other member still follows the chore-level slots.
        f.hh.claim(&f.other, &cid, now).unwrap();
        f.hh.approve(&f.manager, &cid, &f.other, now).unwrap();
        assert_eq!(
            f.hh.assignment_view(&cid, &f.other).unwrap().due_at,
            at("2024-03-10T20:00:00Z")
        );
    }

    #[test]
    fn weekday_override_skips_non_applicable_days_on_rearm() {
        let mut f = fixture();
        // Due Monday 2024-03-04; this member only does Mondays.
        let mut chore = daily_chore(&f, 10, at("2024-03-04T09:00:00Z"));
        chore.approval_reset = ApprovalReset::AtMidnightOnce;
        chore.weekday_overrides.insert(f.member.clone(), vec![1]);
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();

        let now = at("2024-03-04T10:00:00Z");
        f.hh.claim(&f.member, &cid, now).unwrap();
        f.hh.approve(&f.manager, &cid, &f.member, now).unwrap();

        // Locked until midnight, then re-armed to the next Monday rather
        // than Tuesday.
        f.hh.midnight_rollover(at("2024-03-05T00:00:00Z"));
        let view = f.hh.assignment_view(&cid, &f.member).unwrap();
        assert_eq!(view.state, ClaimState::Pending);
        assert_eq!(view.due_at, at("2024-03-11T09:00:00Z"));
    }

    #[test]
    fn awarded_multiplier_scales_chore_points() {
        let mut f = fixture();
        let now = at("2024-03-10T10:00:00Z");
        f.hh.add_badge_rule(BadgeRule {
            id: "b-100".into(),
            name: "Centurion".into(),
            kind: BadgeKind::Cumulative {
                threshold: 100,
                multiplier: Some(2.0),
            },
            scope: TrackedScope::AllAssigned,
        })
        .unwrap();

        f.hh.adjust_points(&f.manager, &f.member, 150, PointSource::Bonus, now)
            .unwrap();
        let events = f.hh.drain_gamification(now);
        assert!(events.iter().any(|e| matches!(e, Event::BadgeAwarded { .. })));

        let chore = daily_chore(&f, 10, at("2024-03-10T18:00:00Z"));
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();
        f.hh.claim(&f.member, &cid, now).unwrap();
        let events = f.hh.approve(&f.manager, &cid, &f.member, now).unwrap();
        assert!(matches!(
            events[0],
            Event::ChoreApproved {
                points_awarded: 20,
                ..
            }
        ));
        assert_eq!(f.hh.ledger().balance(&f.member), 170);
    }

    #[test]
    fn snapshot_round_trip_preserves_state() {
        let mut f = fixture();
        let now = at("2024-03-10T10:00:00Z");
        let chore = daily_chore(&f, 10, at("2024-03-10T18:00:00Z"));
        let cid = chore.id.clone();
        f.hh.add_chore(chore).unwrap();
        f.hh.claim(&f.member, &cid, now).unwrap();
        f.hh.approve(&f.manager, &cid, &f.member, now).unwrap();

        let snap = f.hh.snapshot();
        assert_eq!(snap.snapshot_version, SNAPSHOT_VERSION);
        let restored = Household::restore(snap, utc()).unwrap();
        assert_eq!(restored.ledger().balance(&f.member), 10);
        assert_eq!(restored.counters(&f.member).approvals_total, 1);
        assert_eq!(restored.users().count(), 3);
    }

    #[test]
    fn stale_snapshot_version_is_rejected() {
        let f = fixture();
        let mut snap = f.hh.snapshot();
        snap.snapshot_version = 1;
        assert!(matches!(
            Household::restore(snap, utc()),
            Err(CoreError::Snapshot(_))
        ));
    }
}
