//! Snapshot format migrations.
//!
//! Migrations are pure `Value -> Value` transforms applied in order before
//! deserialization, so an old snapshot never has to round-trip through an
//! old set of Rust types. `snapshot_version` tracks the format; snapshots
//! written by a newer build are refused rather than guessed at.

use serde_json::{json, Value};

use crate::error::{CoreError, Result};
use crate::gamification::TrackedScope;
use crate::household::SNAPSHOT_VERSION;

/// Bring a raw snapshot document up to the current format.
///
/// # Errors
/// Returns an error if the snapshot claims a version newer than this build
/// understands.
pub fn migrate(mut snapshot: Value) -> Result<Value> {
    let version = snapshot
        .get("snapshot_version")
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;
    if version > SNAPSHOT_VERSION {
        return Err(CoreError::Snapshot(format!(
            "snapshot version {version} is newer than supported {SNAPSHOT_VERSION}"
        )));
    }

    if version < 2 {
        migrate_v2(&mut snapshot)?;
    }
    if version < 3 {
        migrate_v3(&mut snapshot);
    }

    if let Some(obj) = snapshot.as_object_mut() {
        obj.insert("snapshot_version".into(), json!(SNAPSHOT_VERSION));
    }
    Ok(snapshot)
}

/// v2: badge rules and challenges move from the legacy pair of scope fields
/// (`tracked_chore_ids` list + `selected_chore_id` single) to the tagged
/// `scope` object. [`TrackedScope::from_legacy`] owns the precedence rules.
fn migrate_v2(snapshot: &mut Value) -> Result<()> {
    let Some(gamification) = snapshot.get_mut("gamification") else {
        return Ok(());
    };
    for key in ["rules", "challenges"] {
        let Some(items) = gamification.get_mut(key).and_then(Value::as_array_mut) else {
            continue;
        };
        for item in items {
            let Some(obj) = item.as_object_mut() else {
                continue;
            };
            if obj.contains_key("scope") {
                continue;
            }
            let explicit = match obj.remove("tracked_chore_ids") {
                Some(Value::Array(ids)) => Some(
                    ids.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                ),
                _ => None,
            };
            let selected = match obj.remove("selected_chore_id") {
                Some(Value::String(id)) => Some(id),
                _ => None,
            };
            let scope = TrackedScope::from_legacy(explicit, selected);
            obj.insert("scope".into(), serde_json::to_value(&scope)?);
        }
    }
    Ok(())
}

/// v3: the per-user completion counter map becomes part of the snapshot.
/// Older snapshots start with empty counters; totals rebuild over time.
fn migrate_v3(snapshot: &mut Value) {
    if let Some(obj) = snapshot.as_object_mut() {
        obj.entry("counters").or_insert_with(|| json!({}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamification::TrackedScope;
    use crate::household::EntitySnapshot;

    fn v1_snapshot() -> Value {
        json!({
            "snapshot_version": 1,
            "users": {},
            "chores": {},
            "assignments": {},
            "ledger": { "entries": [], "next_seq": 0 },
            "gamification": {
                "rules": [
                    {
                        "id": "b-1",
                        "name": "Early bird",
                        "kind": { "kind": "daily", "min_count": 1 },
                        "selected_chore_id": "chore-1"
                    },
                    {
                        "id": "b-2",
                        "name": "Scoped",
                        "kind": { "kind": "daily", "min_count": 2 },
                        "tracked_chore_ids": [],
                        "selected_chore_id": "chore-9"
                    },
                    {
                        "id": "b-3",
                        "name": "Everything",
                        "kind": { "kind": "cumulative", "threshold": 100 }
                    }
                ],
                "challenges": [],
                "approvals": [],
                "badge_progress": {},
                "challenge_progress": {}
            }
        })
    }

    #[test]
    fn v1_snapshot_migrates_to_current_and_deserializes() {
        let migrated = migrate(v1_snapshot()).unwrap();
        assert_eq!(
            migrated["snapshot_version"].as_u64(),
            Some(SNAPSHOT_VERSION as u64)
        );
        let snapshot: EntitySnapshot = serde_json::from_value(migrated).unwrap();

        let rules = snapshot.gamification.rules();
        assert_eq!(
            rules[0].scope,
            TrackedScope::Chores(vec!["chore-1".into()])
        );
        // The explicit empty list wins over the single selected chore.
        assert_eq!(rules[1].scope, TrackedScope::Chores(vec![]));
        assert_eq!(rules[2].scope, TrackedScope::AllAssigned);
        assert!(snapshot.counters.is_empty());
    }

    #[test]
    fn migration_is_idempotent() {
        let once = migrate(v1_snapshot()).unwrap();
        let twice = migrate(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_version_field_is_treated_as_v1() {
        let mut value = v1_snapshot();
        value.as_object_mut().unwrap().remove("snapshot_version");
        let migrated = migrate(value).unwrap();
        assert_eq!(
            migrated["snapshot_version"].as_u64(),
            Some(SNAPSHOT_VERSION as u64)
        );
    }

    #[test]
    fn future_version_is_refused() {
        let value = json!({ "snapshot_version": SNAPSHOT_VERSION + 1 });
        assert!(matches!(migrate(value), Err(CoreError::Snapshot(_))));
    }
}
