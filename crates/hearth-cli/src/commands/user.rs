//! Household member management commands.

use clap::Subcommand;
use hearth_core::User;

use super::{commit, open, CliResult};

#[derive(Subcommand)]
pub enum UserAction {
    /// Add a household member
    Add {
        /// Display name
        name: String,
        /// Grant approval and management rights
        #[arg(long)]
        approver: bool,
        /// Member cannot be assigned chores (a parent who only reviews)
        #[arg(long)]
        no_assign: bool,
    },
    /// List household members
    List,
    /// Remove a member. Ledger history is retained.
    Remove {
        /// User ID
        id: String,
    },
}

pub fn run(action: UserAction) -> CliResult {
    let (store, mut household) = open()?;

    match action {
        UserAction::Add {
            name,
            approver,
            no_assign,
        } => {
            let mut user = if approver {
                User::new_approver(name)
            } else {
                User::new(name)
            };
            if no_assign {
                user.can_be_assigned = false;
            }
            let id = user.id.clone();
            let rendered = serde_json::to_string_pretty(&user)?;
            household.add_user(user)?;
            commit(&store, &mut household, Vec::new())?;
            println!("User created: {id}");
            println!("{rendered}");
        }
        UserAction::List => {
            let users: Vec<_> = household.users().collect();
            println!("{}", serde_json::to_string_pretty(&users)?);
        }
        UserAction::Remove { id } => {
            household.remove_user(&id)?;
            commit(&store, &mut household, Vec::new())?;
            println!("User removed: {id}");
        }
    }
    Ok(())
}
