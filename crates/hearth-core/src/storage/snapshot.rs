//! JSON snapshot persistence.
//!
//! The whole household state persists as a single JSON document. Writes go
//! to a sibling temp file first and rename into place, so a crash mid-write
//! leaves the previous snapshot intact. Loads run the migration pipeline
//! before deserializing.

use std::io::ErrorKind;
use std::path::PathBuf;

use serde_json::Value;

use super::migrations;
use crate::error::Result;
use crate::household::EntitySnapshot;
use crate::interfaces::Persistence;

/// File-backed snapshot store.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonStore { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Persistence for JsonStore {
    fn load(&self) -> Result<Option<EntitySnapshot>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let raw: Value = serde_json::from_str(&content)?;
        let migrated = migrations::migrate(raw)?;
        let snapshot: EntitySnapshot = serde_json::from_value(migrated)?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &EntitySnapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
