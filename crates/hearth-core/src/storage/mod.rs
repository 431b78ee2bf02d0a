mod config;
pub mod migrations;
mod snapshot;

pub use config::Config;
pub use snapshot::JsonStore;

use std::path::PathBuf;

use crate::error::Result;

/// Returns `~/.config/hearth[-dev]/` based on HEARTH_ENV.
///
/// Set HEARTH_ENV=dev to keep development data separate.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("HEARTH_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("hearth-dev")
    } else {
        base_dir.join("hearth")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
