//! Session policy settings.
//!
//! Loaded from a TOML file and then overridden by `TRAINFLOW__*`
//! environment variables. Unknown keys in the file are rejected; unparsable
//! environment values are ignored with a warning.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::AdvancePolicy;
use crate::error::{TrainingError, TrainingResult};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "TRAINFLOW__";

/// Policy switches for one training session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeSettings {
    /// Start the next module as soon as one completes. When false the
    /// session waits for `continue_to_next_module`.
    pub auto_advance: bool,
    /// A critical mistake resets all progress.
    pub reset_on_critical_error: bool,
    /// Attempting a locked action warns instead of blocking.
    pub allow_mistakes_with_warning: bool,
    /// Enables the administrative `skip_to`. Not for production flows.
    pub allow_skip: bool,
    /// Buffer size of streams returned by `events()`.
    pub event_stream_capacity: usize,
    /// Bound of the command queue of a `SessionHost`.
    pub host_queue_capacity: usize,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            auto_advance: true,
            reset_on_critical_error: false,
            allow_mistakes_with_warning: false,
            allow_skip: false,
            event_stream_capacity: 256,
            host_queue_capacity: 1024,
        }
    }
}

impl VolumeSettings {
    /// Parses settings from TOML text. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a settings error if the text is not valid settings TOML.
    pub fn from_toml_str(raw: &str) -> TrainingResult<Self> {
        toml::from_str(raw).map_err(|e| TrainingError::settings(format!("parse settings: {e}")))
    }

    /// Reads `path`, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a settings error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> TrainingResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| TrainingError::settings(format!("read '{}': {e}", path.display())))?;
        let mut settings = Self::from_toml_str(&raw)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Defaults plus environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env_overrides();
        settings
    }

    /// Applies `TRAINFLOW__*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Applies `TRAINFLOW__*` overrides from any key/value source.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name.to_ascii_uppercase().as_str() {
                "AUTO_ADVANCE" => set_flag(&mut self.auto_advance, name, value),
                "RESET_ON_CRITICAL_ERROR" => set_flag(&mut self.reset_on_critical_error, name, value),
                "ALLOW_MISTAKES_WITH_WARNING" => {
                    set_flag(&mut self.allow_mistakes_with_warning, name, value);
                }
                "ALLOW_SKIP" => set_flag(&mut self.allow_skip, name, value),
                "EVENT_STREAM_CAPACITY" => set_capacity(&mut self.event_stream_capacity, name, value),
                "HOST_QUEUE_CAPACITY" => set_capacity(&mut self.host_queue_capacity, name, value),
                _ => {}
            }
        }
    }

    /// Engine switches derived from these settings.
    #[must_use]
    pub const fn advance_policy(&self) -> AdvancePolicy {
        AdvancePolicy {
            auto_advance: self.auto_advance,
        }
    }
}

fn set_flag(slot: &mut bool, name: &str, raw: &str) {
    match parse_bool(raw) {
        Some(v) => *slot = v,
        None => warn!(key = name, value = raw, "ignoring unparsable boolean override"),
    }
}

fn set_capacity(slot: &mut usize, name: &str, raw: &str) {
    match raw.trim().parse::<usize>() {
        Ok(v) if v > 0 => *slot = v,
        _ => warn!(key = name, value = raw, "ignoring invalid capacity override"),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
