//! Delivery backends.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::envelope::{Envelope, Target};
use crate::error::ProviderError;

// ---

/// Outcome of one successful provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delivery {
    pub message_id: Option<String>,
}

/// A pluggable delivery backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Deliver `envelope` once. Retrying is the dispatcher's job.
    async fn send(&self, envelope: &Envelope) -> Result<Delivery, ProviderError>;
}

/// Firebase Cloud Messaging, legacy HTTP endpoint.
pub struct FcmProvider {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
    broadcast_topic: String,
}

impl FcmProvider {
    pub fn new(endpoint: impl Into<String>, server_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            server_key: server_key.into(),
            broadcast_topic: "/topics/all".to_string(),
        }
    }

    fn payload(&self, envelope: &Envelope) -> Value {
        // ---
        let to = match &envelope.target {
            Target::Token(token) => token.as_str(),
            Target::Broadcast => self.broadcast_topic.as_str(),
        };
        json!({
            "to": to,
            "priority": "high",
            "notification": {
                "title": envelope.title,
                "body": envelope.body,
                "sound": "default"
            },
            "data": envelope.string_data()
        })
    }
}

/// Pull the message id out of a gateway reply, or the per-recipient error.
fn parse_fcm_reply(reply: &Value) -> Result<Delivery, ProviderError> {
    // ---
    // topic sends answer {"message_id": 123}
    if let Some(id) = reply.get("message_id") {
        return Ok(Delivery {
            message_id: Some(id.to_string().trim_matches('"').to_string()),
        });
    }

    let first = reply
        .get("results")
        .and_then(Value::as_array)
        .and_then(|r| r.first());

    match first {
        Some(result) => {
            if let Some(id) = result.get("message_id").and_then(Value::as_str) {
                Ok(Delivery {
                    message_id: Some(id.to_string()),
                })
            } else {
                let error = result
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                Err(ProviderError::Rejected(error.to_string()))
            }
        }
        None => Err(ProviderError::Rejected(format!(
            "unexpected gateway reply: {reply}"
        ))),
    }
}

#[async_trait]
impl Provider for FcmProvider {
    async fn send(&self, envelope: &Envelope) -> Result<Delivery, ProviderError> {
        // ---
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&self.payload(envelope))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("HTTP {status}: {text}")));
        }

        let reply: Value = response.json().await?;
        debug!("FCM reply: {}", reply);
        parse_fcm_reply(&reply)
    }
}

/// POSTs the envelope as JSON to a fixed URL.
pub struct WebhookProvider {
    client: reqwest::Client,
    url: String,
}

impl WebhookProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Provider for WebhookProvider {
    async fn send(&self, envelope: &Envelope) -> Result<Delivery, ProviderError> {
        // ---
        let response = self.client.post(&self.url).json(envelope).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected(format!("HTTP {status}")));
        }
        Ok(Delivery {
            message_id: Some(uuid::Uuid::new_v4().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_fcm_payload_targets() {
        // ---
        let fcm = FcmProvider::new("http://localhost/fcm", "secret");

        let direct = fcm.payload(&Envelope::to_token("tok-1", "T", "B").with_data("n", 5));
        assert_eq!(direct["to"], "tok-1");
        assert_eq!(direct["notification"]["title"], "T");
        assert_eq!(direct["data"]["n"], "5");

        let all = fcm.payload(&Envelope::broadcast("T", "B"));
        assert_eq!(all["to"], "/topics/all");
    }

    #[test]
    fn test_parse_fcm_reply() {
        // ---
        let ok = json!({"success": 1, "failure": 0, "results": [{"message_id": "0:abc"}]});
        assert_eq!(
            parse_fcm_reply(&ok).unwrap().message_id.as_deref(),
            Some("0:abc")
        );

        let topic = json!({"message_id": 6123});
        assert_eq!(
            parse_fcm_reply(&topic).unwrap().message_id.as_deref(),
            Some("6123")
        );

        let rejected = json!({"success": 0, "failure": 1, "results": [{"error": "NotRegistered"}]});
        match parse_fcm_reply(&rejected) {
            Err(ProviderError::Rejected(msg)) => assert_eq!(msg, "NotRegistered"),
            other => panic!("expected rejection, got {other:?}"),
        }

        assert!(parse_fcm_reply(&json!({})).is_err());
    }
}
