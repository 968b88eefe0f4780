//! Alert classification.
//!
//! Turns the latest sensor reading into one alert per monitored parameter.
//! Zones are checked in a fixed order and the first match wins:
//!
//! 1. outside the band (`error`)
//! 2. inside the band but within 5% of its width from a bound (`warning`)
//! 3. within 2 units of a bound (`warning`)
//! 4. otherwise `normal`
//!
//! A raining flag adds one extra `info` alert. Classification is pure: the
//! same reading and table always produce the same alerts.

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{Alert, SensorReading, ValueIssue, Zone};
use crate::thresholds::{Threshold, ThresholdTable};

// ---

/// Fraction of the band width, measured inward from each bound, that counts as "near".
pub const WARNING_ZONE_FRACTION: f64 = 0.05;

/// Absolute distance from a bound that counts as drifting towards it.
pub const PROXIMITY_UNITS: f64 = 2.0;

/// Parameter name used for the rain notice.
pub const RAIN_PARAMETER: &str = "isRaining";

/// Classify one reading against the threshold table.
///
/// Parameters missing from the reading, or whose value is not numeric, are
/// skipped. The result follows the table's iteration order, with the rain
/// notice (if any) last.
pub fn classify(reading: &SensorReading, thresholds: &ThresholdTable) -> Vec<Alert> {
    // ---
    let timestamp = reading.timestamp();
    let mut alerts = Vec::with_capacity(thresholds.len() + 1);

    for (parameter, threshold) in thresholds.iter() {
        if !reading.values.contains_key(parameter) {
            debug!(%parameter, "Parameter not present in reading, skipping");
            continue;
        }
        let value = match reading.numeric(parameter) {
            Ok(v) => v,
            Err(ValueIssue::Missing) => {
                warn!(%parameter, "Reading has a null value, skipping parameter");
                continue;
            }
            Err(ValueIssue::NotNumeric(raw)) => {
                warn!(%parameter, "Reading value {} is not numeric, skipping parameter", raw);
                continue;
            }
        };

        let zone = zone_for(value, threshold);
        let (title, message) = describe(parameter, zone, value, threshold);
        alerts.push(Alert {
            parameter: parameter.to_string(),
            severity: zone.severity(),
            zone,
            title,
            message,
            value,
            threshold: *threshold,
            timestamp,
        });
    }

    if reading.is_raining == Some(true) {
        alerts.push(Alert {
            parameter: RAIN_PARAMETER.to_string(),
            severity: Zone::Raining.severity(),
            zone: Zone::Raining,
            title: "Rain Detected".to_string(),
            message: "Rainfall detected at the monitoring site; salinity and turbidity may shift"
                .to_string(),
            value: 1.0,
            threshold: Threshold::default(),
            timestamp,
        });
    }

    alerts
}

/// Classify a raw sensor document.
///
/// Anything that is not a JSON object, or does not decode as a reading,
/// yields no alerts.
pub fn classify_document(document: &Value, thresholds: &ThresholdTable) -> Vec<Alert> {
    // ---
    if !document.is_object() {
        warn!("Sensor document is not an object, skipping: {}", document);
        return Vec::new();
    }
    match serde_json::from_value::<SensorReading>(document.clone()) {
        Ok(reading) => classify(&reading, thresholds),
        Err(e) => {
            warn!("Sensor document could not be decoded, skipping: {}", e);
            Vec::new()
        }
    }
}

/// Zone of `value` within `threshold`, first match wins.
pub fn zone_for(value: f64, threshold: &Threshold) -> Zone {
    // ---
    if let Some(min) = threshold.min {
        if value < min {
            return Zone::CriticalLow;
        }
    }
    if let Some(max) = threshold.max {
        if value > max {
            return Zone::CriticalHigh;
        }
    }

    if let (Some(min), Some(max), Some(range)) = (threshold.min, threshold.max, threshold.range())
    {
        let margin = range * WARNING_ZONE_FRACTION;
        if value <= min + margin {
            return Zone::NearMin;
        }
        if value >= max - margin {
            return Zone::NearMax;
        }
    }

    if let Some(min) = threshold.min {
        if value - min <= PROXIMITY_UNITS {
            return Zone::Dropping;
        }
    }
    if let Some(max) = threshold.max {
        if max - value <= PROXIMITY_UNITS {
            return Zone::Rising;
        }
    }

    Zone::Normal
}

fn unit(parameter: &str) -> &'static str {
    match parameter {
        "temperature" => "°C",
        "salinity" => " ppt",
        "turbidity" => " NTU",
        "tds" => " ppm",
        _ => "",
    }
}

fn describe(parameter: &str, zone: Zone, value: f64, threshold: &Threshold) -> (String, String) {
    // ---
    let u = unit(parameter);
    let min = threshold.min.unwrap_or_default();
    let max = threshold.max.unwrap_or_default();

    match zone {
        Zone::CriticalLow => (
            format!("{parameter} Low"),
            format!("{parameter} is {value:.2}{u}, below the safe minimum of {min:.2}{u}"),
        ),
        Zone::CriticalHigh => (
            format!("{parameter} High"),
            format!("{parameter} is {value:.2}{u}, above the safe maximum of {max:.2}{u}"),
        ),
        Zone::NearMin => (
            format!("{parameter} Near Minimum"),
            format!("{parameter} is {value:.2}{u}, close to the safe minimum of {min:.2}{u}"),
        ),
        Zone::NearMax => (
            format!("{parameter} Near Maximum"),
            format!("{parameter} is {value:.2}{u}, close to the safe maximum of {max:.2}{u}"),
        ),
        Zone::Dropping => (
            format!("{parameter} Dropping"),
            format!("{parameter} is {value:.2}{u}, approaching the safe minimum of {min:.2}{u}"),
        ),
        Zone::Rising => (
            format!("{parameter} Rising"),
            format!("{parameter} is {value:.2}{u}, approaching the safe maximum of {max:.2}{u}"),
        ),
        Zone::Normal | Zone::Raining => (
            format!("{parameter} Normal"),
            format!("{parameter} is {value:.2}{u}, within the safe range"),
        ),
    }
}
