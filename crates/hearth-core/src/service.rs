//! Async household service.
//!
//! A single actor task owns the `Household`; everything else talks to it
//! through a command channel, so every mutation is serialized and there is
//! no lock to hold wrong. The actor also drives the periodic tick, the
//! midnight rollover, and the debounced gamification drain. Snapshot saves
//! are fire-and-forget: a failed save is logged and retried on the next
//! mutation, never surfaced to the caller mid-action.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Offset, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep_until, Duration, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::chore::Chore;
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::gamification::{BadgeRule, Challenge};
use crate::household::{AssignmentView, EntitySnapshot, Household};
use crate::interfaces::{Clock, Notifier, Persistence};
use crate::points::PointSource;
use crate::stats::{Period, PeriodStats};
use crate::storage::Config;
use crate::user::User;

/// Actor timing knobs, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub timezone: chrono::FixedOffset,
    pub tick_interval: Duration,
    /// Quiet window between the last dirtying mutation and the batched
    /// gamification evaluation. Every new mutation restarts it.
    pub debounce: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        ServiceOptions {
            timezone: Utc.fix(),
            tick_interval: Duration::from_secs(60),
            debounce: Duration::from_secs(5),
        }
    }
}

impl ServiceOptions {
    pub fn from_config(config: &Config) -> Self {
        ServiceOptions {
            timezone: config.timezone(),
            tick_interval: Duration::from_secs(config.scheduler.tick_interval_secs.max(1)),
            debounce: Duration::from_secs(config.scheduler.debounce_secs),
        }
    }
}

enum Command {
    AddUser(User, oneshot::Sender<Result<()>>),
    AddChore(Box<Chore>, oneshot::Sender<Result<()>>),
    AddBadgeRule(BadgeRule, oneshot::Sender<Result<()>>),
    AddChallenge(Challenge, oneshot::Sender<Result<()>>),
    Claim {
        actor: String,
        chore: String,
        reply: oneshot::Sender<Result<Vec<Event>>>,
    },
    UndoClaim {
        actor: String,
        chore: String,
        reply: oneshot::Sender<Result<Vec<Event>>>,
    },
    Approve {
        actor: String,
        chore: String,
        target: String,
        reply: oneshot::Sender<Result<Vec<Event>>>,
    },
    Disapprove {
        actor: String,
        chore: String,
        target: String,
        reply: oneshot::Sender<Result<Vec<Event>>>,
    },
    Skip {
        actor: String,
        chore: String,
        target: String,
        reply: oneshot::Sender<Result<Vec<Event>>>,
    },
    ResetAssignment {
        actor: String,
        chore: String,
        target: String,
        reply: oneshot::Sender<Result<Vec<Event>>>,
    },
    OpenCycle {
        actor: String,
        chore: String,
        reply: oneshot::Sender<Result<Vec<Event>>>,
    },
    AdjustPoints {
        actor: String,
        target: String,
        delta: i64,
        source: PointSource,
        reply: oneshot::Sender<Result<Vec<Event>>>,
    },
    Stats {
        user: String,
        reply: oneshot::Sender<BTreeMap<Period, PeriodStats>>,
    },
    Balance {
        user: String,
        reply: oneshot::Sender<i64>,
    },
    View {
        chore: String,
        user: String,
        reply: oneshot::Sender<Option<AssignmentView>>,
    },
    Snapshot(oneshot::Sender<EntitySnapshot>),
}

/// Cloneable handle to the household actor.
#[derive(Clone)]
pub struct HouseholdService {
    tx: mpsc::Sender<Command>,
}

impl HouseholdService {
    /// Spawn the actor task and return a handle to it. The actor stops and
    /// writes a final snapshot once every handle is dropped. All timestamps
    /// come from `clock`, so tests can drive the scheduler deterministically.
    pub fn spawn(
        household: Household,
        persistence: Arc<dyn Persistence>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        options: ServiceOptions,
    ) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(run(household, rx, persistence, notifier, clock, options));
        HouseholdService { tx }
    }

    pub async fn add_user(&self, user: User) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddUser(user, reply), rx).await?
    }

    pub async fn add_chore(&self, chore: Chore) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddChore(Box::new(chore), reply), rx).await?
    }

    pub async fn add_badge_rule(&self, rule: BadgeRule) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddBadgeRule(rule, reply), rx).await?
    }

    pub async fn add_challenge(&self, challenge: Challenge) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddChallenge(challenge, reply), rx).await?
    }

    pub async fn claim(&self, actor: &str, chore: &str) -> Result<Vec<Event>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Claim {
                actor: actor.into(),
                chore: chore.into(),
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn undo_claim(&self, actor: &str, chore: &str) -> Result<Vec<Event>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::UndoClaim {
                actor: actor.into(),
                chore: chore.into(),
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn approve(&self, actor: &str, chore: &str, target: &str) -> Result<Vec<Event>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Approve {
                actor: actor.into(),
                chore: chore.into(),
                target: target.into(),
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn disapprove(&self, actor: &str, chore: &str, target: &str) -> Result<Vec<Event>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Disapprove {
                actor: actor.into(),
                chore: chore.into(),
                target: target.into(),
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn skip(&self, actor: &str, chore: &str, target: &str) -> Result<Vec<Event>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Skip {
                actor: actor.into(),
                chore: chore.into(),
                target: target.into(),
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn reset_assignment(
        &self,
        actor: &str,
        chore: &str,
        target: &str,
    ) -> Result<Vec<Event>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::ResetAssignment {
                actor: actor.into(),
                chore: chore.into(),
                target: target.into(),
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn open_cycle(&self, actor: &str, chore: &str) -> Result<Vec<Event>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::OpenCycle {
                actor: actor.into(),
                chore: chore.into(),
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn adjust_points(
        &self,
        actor: &str,
        target: &str,
        delta: i64,
        source: PointSource,
    ) -> Result<Vec<Event>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::AdjustPoints {
                actor: actor.into(),
                target: target.into(),
                delta,
                source,
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn stats(&self, user: &str) -> Result<BTreeMap<Period, PeriodStats>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Stats {
                user: user.into(),
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn balance(&self, user: &str) -> Result<i64> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Balance {
                user: user.into(),
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn assignment_view(&self, chore: &str, user: &str) -> Result<Option<AssignmentView>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::View {
                chore: chore.into(),
                user: user.into(),
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn snapshot(&self) -> Result<EntitySnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply), rx).await
    }

    async fn send<R>(&self, cmd: Command, rx: oneshot::Receiver<R>) -> Result<R> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| CoreError::ServiceUnavailable)?;
        rx.await.map_err(|_| CoreError::ServiceUnavailable)
    }
}

async fn run(
    mut household: Household,
    mut rx: mpsc::Receiver<Command>,
    persistence: Arc<dyn Persistence>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    options: ServiceOptions,
) {
    let mut ticker = interval(options.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_day = clock.now().with_timezone(&options.timezone).date_naive();
    let mut debounce_deadline: Option<Instant> = None;

    loop {
        // Placeholder deadline while no drain is pending; the branch guard
        // keeps it from ever firing.
        let deadline = debounce_deadline.unwrap_or_else(|| Instant::now() + options.tick_interval);
        tokio::select! {
            maybe = rx.recv() => {
                let Some(cmd) = maybe else { break };
                if handle(&mut household, cmd, notifier.as_ref(), clock.now()) {
                    if household.has_pending_evaluations() {
                        debounce_deadline = Some(Instant::now() + options.debounce);
                    }
                    persist(&household, &persistence);
                }
            }
            _ = ticker.tick() => {
                let now = clock.now();
                let mut events = household.tick(now);
                let today = now.with_timezone(&options.timezone).date_naive();
                if today != last_day {
                    last_day = today;
                    events.extend(household.midnight_rollover(now));
                }
                if !events.is_empty() {
                    dispatch(&events, notifier.as_ref());
                    persist(&household, &persistence);
                }
                if household.has_pending_evaluations() {
                    debounce_deadline = Some(Instant::now() + options.debounce);
                }
            }
            _ = sleep_until(deadline), if debounce_deadline.is_some() => {
                debounce_deadline = None;
                let events = household.drain_gamification(clock.now());
                if !events.is_empty() {
                    dispatch(&events, notifier.as_ref());
                    persist(&household, &persistence);
                }
            }
        }
    }

    // Last handle dropped: flush a final snapshot synchronously.
    if let Err(e) = persistence.save(&household.snapshot()) {
        warn!(error = %e, "final snapshot save failed");
    }
    info!("household service stopped");
}

/// Apply one command at the given timestamp. Returns whether household
/// state changed.
fn handle(
    household: &mut Household,
    cmd: Command,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
) -> bool {
    match cmd {
        Command::AddUser(user, reply) => {
            let result = household.add_user(user);
            let mutated = result.is_ok();
            let _ = reply.send(result);
            mutated
        }
        Command::AddChore(chore, reply) => {
            let result = household.add_chore(*chore);
            let mutated = result.is_ok();
            let _ = reply.send(result);
            mutated
        }
        Command::AddBadgeRule(rule, reply) => {
            let result = household.add_badge_rule(rule);
            let mutated = result.is_ok();
            let _ = reply.send(result);
            mutated
        }
        Command::AddChallenge(challenge, reply) => {
            let result = household.add_challenge(challenge);
            let mutated = result.is_ok();
            let _ = reply.send(result);
            mutated
        }
        Command::Claim { actor, chore, reply } => {
            respond(household.claim(&actor, &chore, now), reply, notifier)
        }
        Command::UndoClaim { actor, chore, reply } => {
            respond(household.undo_claim(&actor, &chore, now), reply, notifier)
        }
        Command::Approve {
            actor,
            chore,
            target,
            reply,
        } => respond(
            household.approve(&actor, &chore, &target, now),
            reply,
            notifier,
        ),
        Command::Disapprove {
            actor,
            chore,
            target,
            reply,
        } => respond(
            household.disapprove(&actor, &chore, &target, now),
            reply,
            notifier,
        ),
        Command::Skip {
            actor,
            chore,
            target,
            reply,
        } => respond(
            household.skip(&actor, &chore, &target, now),
            reply,
            notifier,
        ),
        Command::ResetAssignment {
            actor,
            chore,
            target,
            reply,
        } => respond(
            household.reset_assignment(&actor, &chore, &target, now),
            reply,
            notifier,
        ),
        Command::OpenCycle { actor, chore, reply } => {
            respond(household.open_cycle(&actor, &chore, now), reply, notifier)
        }
        Command::AdjustPoints {
            actor,
            target,
            delta,
            source,
            reply,
        } => respond(
            household.adjust_points(&actor, &target, delta, source, now),
            reply,
            notifier,
        ),
        Command::Stats { user, reply } => {
            let _ = reply.send(household.stats(&user, now));
            false
        }
        Command::Balance { user, reply } => {
            let _ = reply.send(household.ledger().balance(&user));
            false
        }
        Command::View { chore, user, reply } => {
            let _ = reply.send(household.assignment_view(&chore, &user));
            false
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(household.snapshot());
            false
        }
    }
}

fn respond(
    result: Result<Vec<Event>>,
    reply: oneshot::Sender<Result<Vec<Event>>>,
    notifier: &dyn Notifier,
) -> bool {
    let mutated = result.is_ok();
    if let Ok(events) = &result {
        dispatch(events, notifier);
    }
    let _ = reply.send(result);
    mutated
}

/// Notify the affected user of each event. Failures never propagate; the
/// notifier contract is fire-and-forget.
fn dispatch(events: &[Event], notifier: &dyn Notifier) {
    for event in events {
        let Some(user_id) = event.affected_user() else {
            continue;
        };
        match serde_json::to_value(event) {
            Ok(context) => notifier.notify(user_id, template_key(event), &context),
            Err(e) => warn!(error = %e, "event serialization for notification failed"),
        }
    }
}

fn template_key(event: &Event) -> &'static str {
    match event {
        Event::ChoreClaimed { .. } => "chore_claimed",
        Event::ClaimUndone { .. } => "claim_undone",
        Event::ChoreApproved { .. } => "chore_approved",
        Event::ChoreDisapproved { .. } => "chore_disapproved",
        Event::ChoreSkipped { .. } => "chore_skipped",
        Event::AssignmentReset { .. } => "assignment_reset",
        Event::ChoreOverdue { .. } => "chore_overdue",
        Event::ChoreMissed { .. } => "chore_missed",
        Event::CycleOpened { .. } => "cycle_opened",
        Event::PointsAdjusted { .. } => "points_adjusted",
        Event::BadgeAwarded { .. } => "badge_awarded",
        Event::ChallengeAwarded { .. } => "challenge_awarded",
        Event::MidnightRollover { .. } => "midnight_rollover",
    }
}

/// Fire-and-forget snapshot save off the actor thread.
fn persist(household: &Household, persistence: &Arc<dyn Persistence>) {
    let snapshot = household.snapshot();
    let persistence = Arc::clone(persistence);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = persistence.save(&snapshot) {
            warn!(error = %e, "snapshot save failed; state stays in memory");
        }
    });
}
