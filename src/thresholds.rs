//! Threshold registry: safe `[min, max]` band per monitored parameter.
//!
//! The table is built once at startup (built-in defaults, optionally replaced
//! by a JSON file) and shared read-only afterwards.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ThresholdError;

// ---

/// Safe band for one parameter. Either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Threshold {
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Width of the band when both bounds are known.
    pub fn range(&self) -> Option<f64> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some(max - min),
            _ => None,
        }
    }
}

/// Parameter name to safe band. Iteration order is by parameter name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdTable {
    entries: BTreeMap<String, Threshold>,
}

impl ThresholdTable {
    // ---
    /// Empty table.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, parameter: impl Into<String>, threshold: Threshold) -> &mut Self {
        self.entries.insert(parameter.into(), threshold);
        self
    }

    pub fn get(&self, parameter: &str) -> Option<&Threshold> {
        self.entries.get(parameter)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Threshold)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a table from a JSON object such as
    /// `{"pH": {"min": 6.5, "max": 8}, "turbidity": {"max": 10}}`.
    ///
    /// Entries that are not objects, or that carry no numeric bound, are
    /// skipped with a warning.
    pub fn from_json(raw: &Value) -> Result<Self, ThresholdError> {
        // ---
        let object = raw.as_object().ok_or(ThresholdError::NotAnObject)?;
        let mut table = Self::new();

        for (parameter, entry) in object {
            let Some(bounds) = entry.as_object() else {
                warn!(%parameter, "Skipping threshold entry: expected an object, got {}", entry);
                continue;
            };
            let threshold = Threshold {
                min: bounds.get("min").and_then(Value::as_f64),
                max: bounds.get("max").and_then(Value::as_f64),
            };
            if threshold.min.is_none() && threshold.max.is_none() {
                warn!(%parameter, "Skipping threshold entry without numeric min or max");
                continue;
            }
            if let (Some(min), Some(max)) = (threshold.min, threshold.max) {
                if min > max {
                    warn!(%parameter, min, max, "Skipping threshold entry with min above max");
                    continue;
                }
            }
            table.insert(parameter.clone(), threshold);
        }

        Ok(table)
    }

    /// Load an override table from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ThresholdError> {
        let text = std::fs::read_to_string(path)?;
        let raw: Value = serde_json::from_str(&text)?;
        Self::from_json(&raw)
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        default_thresholds()
    }
}

/// Built-in safe bands.
pub fn default_thresholds() -> ThresholdTable {
    // ---
    let mut table = ThresholdTable::new();
    table
        .insert("pH", Threshold::between(6.5, 8.0))
        .insert("temperature", Threshold::between(24.0, 30.0))
        .insert("salinity", Threshold::between(0.0, 35.0))
        .insert("tds", Threshold::between(60.0, 90.0));
    table
}
