//! Program serialization helpers.
//!
//! Serde already provides JSON serialization. This module centralizes the
//! convenience helpers used by hosts and tools and keeps formatting stable.

use std::fs;
use std::path::Path;

use crate::error::{TrainingError, TrainingResult};

use super::program::ProgramConfig;

/// Serialize a program to pretty JSON.
pub fn to_json_pretty(program: &ProgramConfig) -> TrainingResult<String> {
    serde_json::to_string_pretty(program).map_err(|e| TrainingError::Serialization {
        message: format!("serialize program: {e}"),
    })
}

/// Deserialize a program from JSON.
///
/// Callers should then invoke `program.compile(..)`, which validates.
pub fn from_json(s: &str) -> TrainingResult<ProgramConfig> {
    serde_json::from_str::<ProgramConfig>(s).map_err(|e| TrainingError::Serialization {
        message: format!("deserialize program: {e}"),
    })
}

/// Reads and deserializes a program file.
pub fn load_program(path: impl AsRef<Path>) -> TrainingResult<ProgramConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| TrainingError::Serialization {
        message: format!("read '{}': {e}", path.display()),
    })?;
    from_json(&raw)
}
