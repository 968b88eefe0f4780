//! Device token registry.
//!
//! A token store keeps at most one [`TokenRecord`] per push token. Two
//! backends share the [`TokenStore`] contract: a JSON file rewritten
//! atomically on every mutation, and a Postgres table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

mod file;
mod postgres;

pub use file::FileTokenStore;
pub use postgres::PgTokenStore;

// ---

/// One registered push destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    // ---
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Metadata supplied on registration. Absent fields leave stored values alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub device_info: Option<Value>,
}

impl TokenRecord {
    /// Fresh record first seen at `now`.
    pub fn new(token: &str, metadata: TokenMetadata, now: DateTime<Utc>) -> Self {
        Self {
            token: token.to_string(),
            user_id: metadata.user_id,
            platform: metadata.platform,
            device_info: metadata.device_info,
            created_at: now,
            last_seen: now,
        }
    }

    /// Merge re-registration metadata, keeping `created_at`.
    pub fn refresh(&mut self, metadata: TokenMetadata, now: DateTime<Utc>) {
        if metadata.user_id.is_some() {
            self.user_id = metadata.user_id;
        }
        if metadata.platform.is_some() {
            self.platform = metadata.platform;
        }
        if metadata.device_info.is_some() {
            self.device_info = metadata.device_info;
        }
        self.last_seen = now;
    }
}

/// Durable registry of push tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Create or refresh the record for `token`.
    async fn upsert(&self, token: &str, metadata: TokenMetadata)
        -> Result<TokenRecord, StoreError>;

    /// Every known record. Read failures are logged and reported as empty.
    async fn list(&self) -> Vec<TokenRecord>;

    /// Forget `token`. Unknown tokens are not an error.
    async fn remove(&self, token: &str) -> Result<(), StoreError>;

    /// Short backend name for logs and status output.
    fn backend(&self) -> &'static str;
}

/// Reject empty or whitespace-only tokens.
pub fn validate_token(token: &str) -> Result<&str, StoreError> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidToken(token.to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_validate_token() {
        // ---
        assert_eq!(validate_token(" abc ").unwrap(), "abc");
        assert!(matches!(validate_token(""), Err(StoreError::InvalidToken(_))));
        assert!(matches!(validate_token("   "), Err(StoreError::InvalidToken(_))));
    }

    #[test]
    fn test_refresh_merges_and_keeps_created_at() {
        // ---
        let t0 = Utc::now();
        let mut record = TokenRecord::new(
            "tok",
            TokenMetadata {
                user_id: Some("u1".into()),
                platform: Some("android".into()),
                device_info: None,
            },
            t0,
        );

        let t1 = t0 + Duration::minutes(5);
        record.refresh(
            TokenMetadata {
                platform: Some("ios".into()),
                device_info: Some(json!({"model": "X"})),
                ..Default::default()
            },
            t1,
        );

        assert_eq!(record.created_at, t0);
        assert_eq!(record.last_seen, t1);
        assert_eq!(record.user_id.as_deref(), Some("u1"));
        assert_eq!(record.platform.as_deref(), Some("ios"));
        assert_eq!(record.device_info, Some(json!({"model": "X"})));
    }

    #[test]
    fn test_record_json_shape() {
        // ---
        let record = TokenRecord::new("tok", TokenMetadata::default(), Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value.get("lastSeen").is_some());
        assert!(value.get("userId").is_none());
    }
}
