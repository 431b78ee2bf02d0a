//! Household members and their capability flags.

use serde::{Deserialize, Serialize};

/// A household member.
///
/// Roles are non-exclusive capability flags: a member may both complete
/// chores and approve other members' claims. Everything references users by
/// id so renames never break history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier. Never reused after deletion.
    pub id: String,
    /// Display name.
    pub name: String,
    /// May approve or disapprove claims.
    pub can_approve: bool,
    /// May edit chores, rules and other members.
    pub can_manage: bool,
    /// May be assigned chores.
    pub can_be_assigned: bool,
}

impl User {
    /// Create a new assignable member with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        User {
            id: format!("user-{}", uuid::Uuid::new_v4()),
            name: name.into(),
            can_approve: false,
            can_manage: false,
            can_be_assigned: true,
        }
    }

    /// Create a new member with approval and management rights.
    pub fn new_approver(name: impl Into<String>) -> Self {
        User {
            can_approve: true,
            can_manage: true,
            ..User::new(name)
        }
    }
}
