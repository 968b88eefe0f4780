//! Notification envelopes and the stock middleware.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::Alert;

// ---

/// Who an envelope is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Target {
    /// A single device push token.
    Token(String),
    /// Every subscriber of the provider's broadcast channel.
    Broadcast,
}

/// The packet handed to a provider. Retries resend the same envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub target: Target,
}

impl Envelope {
    // ---
    pub fn to_token(
        token: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: Map::new(),
            target: Target::Token(token.into()),
        }
    }

    pub fn broadcast(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: Map::new(),
            target: Target::Broadcast,
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    /// Merge a caller-supplied data object. Non-object values are ignored.
    pub fn with_data_object(mut self, extra: Option<Value>) -> Self {
        if let Some(Value::Object(map)) = extra {
            self.data.extend(map);
        }
        self
    }

    /// Same content, addressed to `token`.
    pub fn retarget(&self, token: &str) -> Self {
        Self {
            target: Target::Token(token.to_string()),
            ..self.clone()
        }
    }

    pub fn token(&self) -> Option<&str> {
        match &self.target {
            Target::Token(t) => Some(t),
            Target::Broadcast => None,
        }
    }

    /// Data with every value rendered as a string, as push gateways require.
    pub fn string_data(&self) -> Map<String, Value> {
        self.data
            .iter()
            .map(|(k, v)| {
                let s = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), Value::String(s))
            })
            .collect()
    }
}

/// Reminder payload accepted by the `/maintenance` route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderData {
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Notification kinds this relay knows how to build.
pub const NOTIFICATION_TYPES: [&str; 4] = ["custom", "broadcast", "sensor_alert", "maintenance"];

/// Push notification describing one classified alert.
///
/// Addressed as a broadcast; callers [`Envelope::retarget`] it per device.
pub fn alert_envelope(alert: &Alert) -> Envelope {
    // ---
    let mut envelope = Envelope::broadcast(
        format!("Water Quality Alert: {}", alert.title),
        alert.message.clone(),
    )
    .with_data("type", "sensor_alert")
    .with_data("parameter", alert.parameter.clone())
    .with_data("severity", alert.severity.to_string())
    .with_data("value", alert.value);

    if let Some(ts) = alert.timestamp {
        envelope = envelope.with_data(
            "readingTime",
            ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    envelope
}

/// Push notification for a maintenance reminder, addressed as a broadcast.
pub fn maintenance_envelope(reminder: &ReminderData) -> Envelope {
    // ---
    let body = match (&reminder.message, &reminder.due_date) {
        (Some(message), _) => message.clone(),
        (None, Some(due)) => format!("{} is due on {}", reminder.task, due),
        (None, None) => format!("{} is due", reminder.task),
    };

    let mut envelope = Envelope::broadcast("Maintenance Reminder", body)
        .with_data("type", "maintenance")
        .with_data("task", reminder.task.clone());
    if let Some(due) = &reminder.due_date {
        envelope = envelope.with_data("dueDate", due.clone());
    }
    if let Some(location) = &reminder.location {
        envelope = envelope.with_data("location", location.clone());
    }
    envelope
}

/// Middleware: stamp the dispatch time into `data.sentAt`.
pub fn stamp_sent_at(envelope: Envelope) -> Envelope {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    envelope.with_data("sentAt", now)
}

/// Middleware: render every data value as a string.
pub fn stringify_data(mut envelope: Envelope) -> Envelope {
    envelope.data = envelope.string_data();
    envelope
}
