//! # Hearth Core Library
//!
//! This library provides the core business logic for Hearth, a household
//! chore tracker. It implements a CLI-first philosophy where all operations
//! are available via a standalone CLI binary, with any GUI being a thin
//! layer over the same core library.
//!
//! ## Architecture
//!
//! - **Household Engine**: A state machine over chore assignments; the
//!   caller (or the async service) periodically invokes `tick()` for
//!   overdue detection and `midnight_rollover()` at local day boundaries
//! - **Storage**: JSON snapshot persistence with format migrations and
//!   TOML-based configuration
//! - **Gamification**: Debounced badge and challenge evaluation over the
//!   points ledger and approval history
//! - **Service**: A tokio actor that owns the household, serializes
//!   mutations, and drives the schedule
//!
//! ## Key Components
//!
//! - [`Household`]: Chore lifecycle state machine and points accounting
//! - [`HouseholdService`]: Async handle to the household actor
//! - [`JsonStore`]: Snapshot persistence
//! - [`Config`]: Application configuration management
//! - [`Authorize`]: Trait for pluggable permission policies

pub mod assignment;
pub mod chore;
pub mod error;
pub mod events;
pub mod gamification;
pub mod household;
pub mod interfaces;
pub mod points;
pub mod recurrence;
pub mod service;
pub mod stats;
pub mod storage;
pub mod user;

pub use assignment::{AssignmentState, ClaimState, CompletionCounters};
pub use chore::{ApprovalReset, Chore, CompletionCriteria, OverdueHandling, PendingClaimAction};
pub use error::{ConfigError, CoreError, Result, ValidationError};
pub use events::Event;
pub use gamification::{BadgeKind, BadgeRule, Challenge, GamificationEvaluator, TrackedScope};
pub use household::{AssignmentView, EntitySnapshot, Household, SNAPSHOT_VERSION};
pub use interfaces::{
    ActionKind, Authorize, CapabilityAuthorizer, Clock, Notifier, NullNotifier, Persistence,
    SystemClock,
};
pub use points::{PointSource, PointsLedger};
pub use recurrence::{RecurrenceEngine, RecurrenceRule};
pub use service::{HouseholdService, ServiceOptions};
pub use stats::{Period, PeriodStats};
pub use storage::{Config, JsonStore};
pub use user::User;
