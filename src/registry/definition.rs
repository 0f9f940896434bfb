use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LimitError;
use crate::ledger::Slot;

/// A named concurrency ceiling for one tag.
///
/// `id`, `created_at` and `updated_at` are assigned by the registry; callers
/// only choose `tag`, `ceiling` and `metadata`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitDefinition {
    /// Generated identifier.
    pub id: Uuid,
    /// Unique tag the limit applies to.
    pub tag: String,
    /// Maximum simultaneous slots; `0` = unlimited.
    pub ceiling: u32,
    /// Free-form metadata, an empty JSON object by default.
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl LimitDefinition {
    /// Builds a fresh definition stamped at `now`.
    pub(crate) fn new(tag: &str, ceiling: u32, metadata: Option<serde_json::Value>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag: tag.to_string(),
            ceiling,
            metadata: metadata.unwrap_or_else(empty_object),
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the tag is unaccounted (`ceiling == 0`).
    #[inline]
    pub fn is_unlimited(&self) -> bool {
        self.ceiling == 0
    }
}

/// A definition joined with the slots currently held under it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitSnapshot {
    pub definition: LimitDefinition,
    /// Live holders, oldest grant first. Always empty for unlimited tags.
    pub active_slots: Vec<Slot>,
}

/// Validates a caller-supplied tag.
pub(crate) fn check_tag(tag: &str) -> Result<(), LimitError> {
    if tag.trim().is_empty() {
        return Err(LimitError::invalid("tag must not be empty"));
    }
    Ok(())
}

/// Validates a caller-supplied ceiling.
pub(crate) fn check_ceiling(ceiling: i64) -> Result<u32, LimitError> {
    if ceiling < 0 {
        return Err(LimitError::invalid(format!(
            "ceiling must be >= 0, got {ceiling}"
        )));
    }
    u32::try_from(ceiling)
        .map_err(|_| LimitError::invalid(format!("ceiling {ceiling} exceeds {}", u32::MAX)))
}
