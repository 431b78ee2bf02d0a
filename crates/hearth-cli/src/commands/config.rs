//! Configuration management commands.

use clap::Subcommand;
use hearth_core::Config;

use super::CliResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "timezone_offset_minutes")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match get(&config, &key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            set(&mut config, &key, &value)?;
            config.save()?;
            println!("ok");
        }
        ConfigAction::List => {
            let config = Config::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}

fn get(config: &Config, key: &str) -> Option<String> {
    match key {
        "timezone_offset_minutes" => Some(config.timezone_offset_minutes.to_string()),
        "tick_interval_secs" => Some(config.scheduler.tick_interval_secs.to_string()),
        "debounce_secs" => Some(config.scheduler.debounce_secs.to_string()),
        "snapshot_path" => Some(
            config
                .snapshot_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ),
        _ => None,
    }
}

fn set(config: &mut Config, key: &str, value: &str) -> Result<(), String> {
    match key {
        "timezone_offset_minutes" => {
            config.timezone_offset_minutes = value
                .parse()
                .map_err(|_| format!("invalid minutes offset: {value}"))?;
        }
        "tick_interval_secs" => {
            config.scheduler.tick_interval_secs = value
                .parse()
                .map_err(|_| format!("invalid seconds value: {value}"))?;
        }
        "debounce_secs" => {
            config.scheduler.debounce_secs = value
                .parse()
                .map_err(|_| format!("invalid seconds value: {value}"))?;
        }
        "snapshot_path" => {
            config.snapshot_path = if value.is_empty() {
                None
            } else {
                Some(value.into())
            };
        }
        _ => return Err(format!("unknown key: {key}")),
    }
    Ok(())
}
