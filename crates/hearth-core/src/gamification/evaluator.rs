//! Event-driven rule evaluation with a debounced dirty set.
//!
//! Mutations never evaluate rules synchronously. They mark the affected user
//! dirty; the household service drains the set in a debounced batch, so
//! evaluation cost is decoupled from event burst rate. Evaluation is
//! idempotent -- an awarded, non-repeatable rule is never re-awarded.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApprovalRecord, AwardProgress, BadgeKind, BadgeRule, Challenge, TrackedScope};
use crate::chore::Chore;
use crate::events::Event;
use crate::points::PointsLedger;

/// Read-only inputs for one evaluation pass.
pub struct EvalContext<'a> {
    pub ledger: &'a PointsLedger,
    pub chores: &'a HashMap<String, Chore>,
    pub now: DateTime<Utc>,
    pub tz: FixedOffset,
}

/// Holds rule definitions, per-user progress and the pending-evaluation set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GamificationEvaluator {
    rules: Vec<BadgeRule>,
    challenges: Vec<Challenge>,
    approvals: Vec<ApprovalRecord>,
    /// rule id -> user id -> progress
    badge_progress: BTreeMap<String, BTreeMap<String, AwardProgress>>,
    /// challenge id -> user id -> progress
    challenge_progress: BTreeMap<String, BTreeMap<String, AwardProgress>>,
    #[serde(default)]
    dirty: BTreeSet<String>,
}

impl GamificationEvaluator {
    pub fn new(rules: Vec<BadgeRule>, challenges: Vec<Challenge>) -> Self {
        GamificationEvaluator {
            rules,
            challenges,
            ..Default::default()
        }
    }

    /// Register a rule after construction. Validation is the caller's job.
    pub fn add_rule(&mut self, rule: BadgeRule) {
        self.rules.push(rule);
    }

    pub fn add_challenge(&mut self, challenge: Challenge) {
        self.challenges.push(challenge);
    }

    pub fn rules(&self) -> &[BadgeRule] {
        &self.rules
    }

    pub fn challenges(&self) -> &[Challenge] {
        &self.challenges
    }

    pub fn badge_progress(&self, rule_id: &str, user_id: &str) -> Option<&AwardProgress> {
        self.badge_progress.get(rule_id)?.get(user_id)
    }

    pub fn challenge_progress(&self, challenge_id: &str, user_id: &str) -> Option<&AwardProgress> {
        self.challenge_progress.get(challenge_id)?.get(user_id)
    }

    /// Record a counted completion. Called once per approval event, before
    /// the user is marked dirty.
    pub fn record_approval(&mut self, user_id: &str, chore_id: &str, at: DateTime<Utc>) {
        self.approvals.push(ApprovalRecord {
            user_id: user_id.into(),
            chore_id: chore_id.into(),
            at,
        });
    }

    /// Add a user to the pending-evaluation set.
    pub fn mark_dirty(&mut self, user_id: &str) {
        self.dirty.insert(user_id.into());
    }

    /// Midnight rollover marks everyone for a global recompute.
    pub fn mark_all_dirty<'a>(&mut self, user_ids: impl IntoIterator<Item = &'a str>) {
        for id in user_ids {
            self.dirty.insert(id.into());
        }
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Drain the pending set: evaluate each dirty user exactly once, clear
    /// the set, and return the award events produced.
    pub fn drain(&mut self, ctx: &EvalContext<'_>) -> Vec<Event> {
        let pending = std::mem::take(&mut self.dirty);
        let mut events = Vec::new();
        for user_id in &pending {
            self.evaluate_user(user_id, ctx, &mut events);
        }
        if !events.is_empty() {
            debug!(awards = events.len(), users = pending.len(), "gamification drain");
        }
        events
    }

    /// The product of earn-rate multipliers from this user's awarded
    /// cumulative badges. 1.0 when none apply.
    pub fn multiplier_for(&self, user_id: &str) -> f64 {
        self.rules
            .iter()
            .filter_map(|rule| match &rule.kind {
                BadgeKind::Cumulative {
                    multiplier: Some(m),
                    ..
                } if self
                    .badge_progress(&rule.id, user_id)
                    .map(|p| p.awarded)
                    .unwrap_or(false) =>
                {
                    Some(*m)
                }
                _ => None,
            })
            .product()
    }

    fn evaluate_user(&mut self, user_id: &str, ctx: &EvalContext<'_>, events: &mut Vec<Event>) {
        // Badge rules, in definition order. Linked rules are skipped here
        // and fire as side effects of their source rule's award.
        let rules = self.rules.clone();
        for rule in &rules {
            let value = match &rule.kind {
                BadgeKind::Linked { .. } => continue,
                BadgeKind::Cumulative { .. } => ctx.ledger.lifetime_earned(user_id),
                BadgeKind::Daily { .. } => {
                    let today = ctx.now.with_timezone(&ctx.tz).date_naive();
                    self.count_approvals(user_id, &rule.scope, ctx, |at| {
                        at.with_timezone(&ctx.tz).date_naive() == today
                    })
                }
                BadgeKind::Periodic { start, end, .. } => {
                    self.count_approvals(user_id, &rule.scope, ctx, |at| at >= *start && at <= *end)
                }
            };

            let target = match &rule.kind {
                BadgeKind::Cumulative { threshold, .. } => *threshold,
                BadgeKind::Daily { min_count } | BadgeKind::Periodic { min_count, .. } => {
                    *min_count as i64
                }
                BadgeKind::Linked { .. } => unreachable!("skipped above"),
            };

            let progress = self
                .badge_progress
                .entry(rule.id.clone())
                .or_default()
                .entry(user_id.to_string())
                .or_default();
            progress.value = value;
            if !progress.awarded && value >= target {
                progress.awarded = true;
                progress.awarded_at = Some(ctx.now);
                events.push(Event::BadgeAwarded {
                    rule_id: rule.id.clone(),
                    user_id: user_id.to_string(),
                    at: ctx.now,
                });
                self.award_linked(&rule.id, user_id, ctx.now, events);
            }
        }

        // Challenges. Anything outside its window is skipped entirely, so a
        // future challenge can never be awarded early.
        let challenges = self.challenges.clone();
        for challenge in &challenges {
            if ctx.now < challenge.start || ctx.now > challenge.end {
                continue;
            }
            let value = self.count_approvals(user_id, &challenge.scope, ctx, |at| {
                at >= challenge.start && at <= challenge.end
            });
            let progress = self
                .challenge_progress
                .entry(challenge.id.clone())
                .or_default()
                .entry(user_id.to_string())
                .or_default();
            progress.value = value;
            if !progress.awarded && value >= challenge.target_count as i64 {
                progress.awarded = true;
                progress.awarded_at = Some(ctx.now);
                events.push(Event::ChallengeAwarded {
                    challenge_id: challenge.id.clone(),
                    user_id: user_id.to_string(),
                    at: ctx.now,
                });
            }
        }
    }

    /// Award every linked rule whose source just fired, recursively (a
    /// linked rule may itself be the source of another).
    fn award_linked(
        &mut self,
        source_rule_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) {
        let linked: Vec<String> = self
            .rules
            .iter()
            .filter(|r| {
                matches!(&r.kind, BadgeKind::Linked { source_rule_id: src } if src == source_rule_id)
            })
            .map(|r| r.id.clone())
            .collect();
        for rule_id in linked {
            let progress = self
                .badge_progress
                .entry(rule_id.clone())
                .or_default()
                .entry(user_id.to_string())
                .or_default();
            if progress.awarded {
                continue;
            }
            progress.awarded = true;
            progress.awarded_at = Some(now);
            events.push(Event::BadgeAwarded {
                rule_id: rule_id.clone(),
                user_id: user_id.to_string(),
                at: now,
            });
            self.award_linked(&rule_id, user_id, now, events);
        }
    }

    fn count_approvals(
        &self,
        user_id: &str,
        scope: &TrackedScope,
        ctx: &EvalContext<'_>,
        in_window: impl Fn(DateTime<Utc>) -> bool,
    ) -> i64 {
        self.approvals
            .iter()
            .filter(|rec| rec.user_id == user_id && in_window(rec.at))
            .filter(|rec| {
                ctx.chores
                    .get(&rec.chore_id)
                    .map(|chore| scope.tracks(chore, user_id))
                    .unwrap_or(false)
            })
            .count() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::PointSource;
    use chrono::Duration;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn chore(id: &str, user: &str) -> Chore {
        let mut c = Chore::new(id, 10, Utc::now());
        c.id = id.to_string();
        c.assignees = vec![user.to_string()];
        c
    }

    fn chores(list: &[Chore]) -> HashMap<String, Chore> {
        list.iter().map(|c| (c.id.clone(), c.clone())).collect()
    }

    fn cumulative(id: &str, threshold: i64) -> BadgeRule {
        BadgeRule {
            id: id.into(),
            name: id.into(),
            kind: BadgeKind::Cumulative {
                threshold,
                multiplier: None,
            },
            scope: TrackedScope::AllAssigned,
        }
    }

    #[test]
    fn cumulative_badge_awards_once_and_survives_spending() {
        let mut eval = GamificationEvaluator::new(vec![cumulative("b-500", 500)], vec![]);
        let mut ledger = PointsLedger::new();
        let now = Utc::now();
        let map = chores(&[]);

        ledger.append("u1", 300, PointSource::Chore, now);
        ledger.append("u1", 250, PointSource::Chore, now);
        eval.mark_dirty("u1");
        let ctx = EvalContext {
            ledger: &ledger,
            chores: &map,
            now,
            tz: utc(),
        };
        let events = eval.drain(&ctx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::BadgeAwarded { .. }));

        // Spend down to 150 and re-evaluate: still awarded, no duplicate.
        ledger.append("u1", -400, PointSource::RewardRedemption, now);
        eval.mark_dirty("u1");
        let ctx = EvalContext {
            ledger: &ledger,
            chores: &map,
            now,
            tz: utc(),
        };
        let events = eval.drain(&ctx);
        assert!(events.is_empty());
        assert!(eval.badge_progress("b-500", "u1").unwrap().awarded);
    }

    #[test]
    fn reevaluation_is_idempotent() {
        let mut eval = GamificationEvaluator::new(vec![cumulative("b", 100)], vec![]);
        let mut ledger = PointsLedger::new();
        let now = Utc::now();
        let map = chores(&[]);
        ledger.append("u1", 150, PointSource::Chore, now);

        for _ in 0..3 {
            eval.mark_dirty("u1");
            let ctx = EvalContext {
                ledger: &ledger,
                chores: &map,
                now,
                tz: utc(),
            };
            let events = eval.drain(&ctx);
            // Only the first pass awards.
            assert!(events.len() <= 1);
        }
        assert!(eval.badge_progress("b", "u1").unwrap().awarded);
    }

    #[test]
    fn drain_clears_the_dirty_set() {
        let mut eval = GamificationEvaluator::new(vec![], vec![]);
        eval.mark_dirty("u1");
        eval.mark_dirty("u2");
        assert!(eval.has_dirty());
        let ledger = PointsLedger::new();
        let map = chores(&[]);
        let ctx = EvalContext {
            ledger: &ledger,
            chores: &map,
            now: Utc::now(),
            tz: utc(),
        };
        eval.drain(&ctx);
        assert!(!eval.has_dirty());
    }

    #[test]
    fn daily_badge_counts_only_today() {
        let rule = BadgeRule {
            id: "daily-2".into(),
            name: "Two a day".into(),
            kind: BadgeKind::Daily { min_count: 2 },
            scope: TrackedScope::AllAssigned,
        };
        let mut eval = GamificationEvaluator::new(vec![rule], vec![]);
        let c = chore("chore-1", "u1");
        let map = chores(&[c]);
        let ledger = PointsLedger::new();
        let now: DateTime<Utc> = "2024-03-15T18:00:00Z".parse().unwrap();

        eval.record_approval("u1", "chore-1", now - Duration::days(1));
        eval.record_approval("u1", "chore-1", now - Duration::hours(2));
        eval.mark_dirty("u1");
        let ctx = EvalContext {
            ledger: &ledger,
            chores: &map,
            now,
            tz: utc(),
        };
        assert!(eval.drain(&ctx).is_empty());
        assert_eq!(eval.badge_progress("daily-2", "u1").unwrap().value, 1);

        eval.record_approval("u1", "chore-1", now - Duration::hours(1));
        eval.mark_dirty("u1");
        let ctx = EvalContext {
            ledger: &ledger,
            chores: &map,
            now,
            tz: utc(),
        };
        let events = eval.drain(&ctx);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn future_challenge_never_awards_early() {
        let challenge = Challenge {
            id: "c-2099".into(),
            name: "Future".into(),
            target_count: 1,
            start: "2099-01-01T00:00:00Z".parse().unwrap(),
            end: "2099-12-31T23:59:59Z".parse().unwrap(),
            scope: TrackedScope::AllAssigned,
        };
        let mut eval = GamificationEvaluator::new(vec![], vec![challenge]);
        let c = chore("chore-1", "u1");
        let map = chores(&[c]);
        let ledger = PointsLedger::new();
        let now = Utc::now();

        // Plenty of qualifying activity today.
        for _ in 0..5 {
            eval.record_approval("u1", "chore-1", now);
        }
        eval.mark_dirty("u1");
        let ctx = EvalContext {
            ledger: &ledger,
            chores: &map,
            now,
            tz: utc(),
        };
        assert!(eval.drain(&ctx).is_empty());
        assert!(eval.challenge_progress("c-2099", "u1").is_none());
    }

    #[test]
    fn empty_explicit_scope_counts_nothing() {
        let rule = BadgeRule {
            id: "scoped".into(),
            name: "Scoped".into(),
            kind: BadgeKind::Daily { min_count: 1 },
            scope: TrackedScope::Chores(vec![]),
        };
        let mut eval = GamificationEvaluator::new(vec![rule], vec![]);
        let c = chore("chore-1", "u1");
        let map = chores(&[c]);
        let ledger = PointsLedger::new();
        let now = Utc::now();

        eval.record_approval("u1", "chore-1", now);
        eval.mark_dirty("u1");
        let ctx = EvalContext {
            ledger: &ledger,
            chores: &map,
            now,
            tz: utc(),
        };
        assert!(eval.drain(&ctx).is_empty());
        assert_eq!(eval.badge_progress("scoped", "u1").unwrap().value, 0);
    }

    #[test]
    fn linked_badge_fires_with_its_source() {
        let source = cumulative("b-src", 100);
        let linked = BadgeRule {
            id: "b-linked".into(),
            name: "Linked".into(),
            kind: BadgeKind::Linked {
                source_rule_id: "b-src".into(),
            },
            scope: TrackedScope::AllAssigned,
        };
        let mut eval = GamificationEvaluator::new(vec![source, linked], vec![]);
        let mut ledger = PointsLedger::new();
        let now = Utc::now();
        let map = chores(&[]);
        ledger.append("u1", 120, PointSource::Chore, now);

        eval.mark_dirty("u1");
        let ctx = EvalContext {
            ledger: &ledger,
            chores: &map,
            now,
            tz: utc(),
        };
        let events = eval.drain(&ctx);
        assert_eq!(events.len(), 2);
        assert!(eval.badge_progress("b-linked", "u1").unwrap().awarded);
    }

    #[test]
    fn multiplier_applies_only_after_award() {
        let rule = BadgeRule {
            id: "b-mult".into(),
            name: "Earner".into(),
            kind: BadgeKind::Cumulative {
                threshold: 100,
                multiplier: Some(1.5),
            },
            scope: TrackedScope::AllAssigned,
        };
        let mut eval = GamificationEvaluator::new(vec![rule], vec![]);
        assert_eq!(eval.multiplier_for("u1"), 1.0);

        let mut ledger = PointsLedger::new();
        let now = Utc::now();
        let map = chores(&[]);
        ledger.append("u1", 150, PointSource::Chore, now);
        eval.mark_dirty("u1");
        let ctx = EvalContext {
            ledger: &ledger,
            chores: &map,
            now,
            tz: utc(),
        };
        eval.drain(&ctx);
        assert_eq!(eval.multiplier_for("u1"), 1.5);
    }
}
