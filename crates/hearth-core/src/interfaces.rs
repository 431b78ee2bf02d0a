//! Trait seams for external collaborators.
//!
//! Persistence, notification transport, authorization lookup and the clock
//! are all consumed through these traits; the engine never talks to a
//! concrete backend directly. Save and notify failures are logged by the
//! caller and never enter the mutation path.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::household::EntitySnapshot;
use crate::user::User;

/// Supplies current time. Tests swap in a fixed clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Snapshot persistence. The engine treats `save` failures as logged and
/// non-fatal; in-memory state stays authoritative until process restart.
pub trait Persistence: Send + Sync {
    fn load(&self) -> Result<Option<EntitySnapshot>>;
    fn save(&self, snapshot: &EntitySnapshot) -> Result<()>;
}

/// Fire-and-forget notification dispatch.
pub trait Notifier: Send + Sync {
    fn notify(&self, user_id: &str, template_key: &str, context: &serde_json::Value);
}

/// Notifier that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _user_id: &str, _template_key: &str, _context: &serde_json::Value) {}
}

/// The mutation being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Claim,
    Approve,
    Disapprove,
    UndoClaim,
    AdjustPoints,
    Skip,
    ResetAssignment,
    OpenCycle,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Claim => "claim",
            ActionKind::Approve => "approve",
            ActionKind::Disapprove => "disapprove",
            ActionKind::UndoClaim => "undo claim",
            ActionKind::AdjustPoints => "adjust points",
            ActionKind::Skip => "skip",
            ActionKind::ResetAssignment => "reset assignment",
            ActionKind::OpenCycle => "open cycle",
        }
    }
}

/// Consulted before any transition is accepted. A rejection leaves state
/// untouched and bumps no statistics.
pub trait Authorize: Send + Sync {
    fn is_authorized(&self, actor: &User, action: ActionKind, target_user_id: &str) -> bool;
}

/// Default authorizer: answers derive from the member's capability flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityAuthorizer;

impl Authorize for CapabilityAuthorizer {
    fn is_authorized(&self, actor: &User, action: ActionKind, target_user_id: &str) -> bool {
        match action {
            // Members act on their own claims only.
            ActionKind::Claim | ActionKind::UndoClaim => {
                actor.can_be_assigned && actor.id == target_user_id
            }
            ActionKind::Approve | ActionKind::Disapprove => actor.can_approve,
            // Skipping your own instance is fine; skipping someone else's
            // needs management rights.
            ActionKind::Skip => actor.id == target_user_id || actor.can_manage,
            ActionKind::AdjustPoints | ActionKind::ResetAssignment | ActionKind::OpenCycle => {
                actor.can_manage
            }
        }
    }
}
