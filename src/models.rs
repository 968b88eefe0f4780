//! Data models shared by the classifier, the monitor and the HTTP routes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::thresholds::Threshold;

// ---

/// One timestamped observation as stored by the sensor ingestion side.
///
/// Parameter values are kept as raw JSON so that a bad field only costs that
/// one parameter during classification instead of the whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    // ---
    /// ISO-8601 observation time. Epoch milliseconds and `{seconds, nanoseconds}`
    /// objects are normalized to RFC 3339 on the way in.
    #[serde(
        default,
        deserialize_with = "lenient_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub datetime: Option<String>,

    #[serde(
        rename = "isRaining",
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_raining: Option<bool>,

    /// `pH`, `temperature`, `salinity`, `turbidity` and anything else the
    /// sensor reports.
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

/// Why a parameter value could not be used.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueIssue {
    Missing,
    NotNumeric(Value),
}

impl SensorReading {
    // ---
    /// Builder-style helper used by tests and by the `/alert` route.
    pub fn with_value(mut self, parameter: &str, value: f64) -> Self {
        self.values.insert(parameter.to_string(), Value::from(value));
        self
    }

    /// Numeric value of `parameter`, coercing numeric strings.
    pub fn numeric(&self, parameter: &str) -> Result<f64, ValueIssue> {
        // ---
        match self.values.get(parameter) {
            None | Some(Value::Null) => Err(ValueIssue::Missing),
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ValueIssue::NotNumeric(Value::Number(n.clone()))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ValueIssue::NotNumeric(Value::String(s.clone()))),
            Some(other) => Err(ValueIssue::NotNumeric(other.clone())),
        }
    }

    /// Observation time, if `datetime` parses. Naive timestamps are taken as UTC.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        // ---
        let raw = self.datetime.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

/// Accepts `true/false`, `0/1` and their string spellings. Anything else is `None`.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Observation time in whatever shape the ingestion side stored it.
/// Unrecognized shapes become `None` so the parameter values still classify.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let raw = Option::<Value>::deserialize(deserializer)?;
    let parsed = match &raw {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => return Ok(Some(s.clone())),
        Some(Value::Number(n)) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        Some(Value::Object(map)) => map.get("seconds").and_then(Value::as_i64).and_then(|secs| {
            let nanos = map.get("nanoseconds").and_then(Value::as_u64).unwrap_or(0);
            DateTime::<Utc>::from_timestamp(secs, u32::try_from(nanos).ok()?)
        }),
        Some(_) => None,
    };
    match parsed {
        Some(dt) => Ok(Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true))),
        None => {
            warn!("Unrecognized reading datetime, ignoring it: {}", raw.unwrap_or_default());
            Ok(None)
        }
    }
}

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where a value sits relative to its safe band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Zone {
    CriticalLow,
    CriticalHigh,
    /// Inside the band, within 5% of its width from the minimum.
    NearMin,
    /// Inside the band, within 5% of its width from the maximum.
    NearMax,
    /// Within 2 units of the minimum.
    Dropping,
    /// Within 2 units of the maximum.
    Rising,
    Normal,
    Raining,
}

impl Zone {
    pub fn severity(self) -> Severity {
        match self {
            Zone::CriticalLow | Zone::CriticalHigh => Severity::Error,
            Zone::NearMin | Zone::NearMax | Zone::Dropping | Zone::Rising => Severity::Warning,
            Zone::Raining => Severity::Info,
            Zone::Normal => Severity::Normal,
        }
    }
}

/// Derived, ephemeral alert produced by one classification pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    // ---
    pub parameter: String,
    #[serde(rename = "type")]
    pub severity: Severity,
    pub zone: Zone,
    pub title: String,
    pub message: String,
    pub value: f64,
    pub threshold: Threshold,
    /// Observation time of the reading; `None` when the reading carried none.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Alert {
    /// True for values outside the safe band.
    pub fn is_breach(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// The alert a caller should surface first. Ties keep the earliest entry.
pub fn most_severe(alerts: &[Alert]) -> Option<&Alert> {
    // ---
    alerts
        .iter()
        .filter(|a| a.severity > Severity::Normal)
        .fold(None, |best: Option<&Alert>, a| match best {
            Some(b) if b.severity >= a.severity => Some(b),
            _ => Some(a),
        })
}
