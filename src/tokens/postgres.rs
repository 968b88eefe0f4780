//! Postgres token store.
//!
//! Each mutation is a single statement, so the database provides the
//! record-level atomicity the file store gets from its mutex.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info};

use super::{validate_token, TokenMetadata, TokenRecord, TokenStore};
use crate::error::StoreError;

// ---

#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    token: String,
    user_id: Option<String>,
    platform: Option<String>,
    /// JSON text; kept as TEXT so the column needs no extension types.
    device_info: Option<String>,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl From<TokenRow> for TokenRecord {
    fn from(row: TokenRow) -> Self {
        // ---
        let device_info = row.device_info.and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| debug!(token = %row.token, "Ignoring undecodable device_info: {}", e))
                .ok()
        });
        TokenRecord {
            token: row.token,
            user_id: row.user_id,
            platform: row.platform,
            device_info,
            created_at: row.created_at,
            last_seen: row.last_seen,
        }
    }
}

pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    /// Wrap a pool whose schema was prepared by [`crate::schema::create_schema`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn upsert(
        &self,
        token: &str,
        metadata: TokenMetadata,
    ) -> Result<TokenRecord, StoreError> {
        // ---
        let token = validate_token(token)?;
        let device_info = metadata
            .device_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Utc::now();

        let row: TokenRow = sqlx::query_as(
            r#"
            INSERT INTO device_tokens (token, user_id, platform, device_info, created_at, last_seen)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (token) DO UPDATE SET
                user_id     = COALESCE(EXCLUDED.user_id, device_tokens.user_id),
                platform    = COALESCE(EXCLUDED.platform, device_tokens.platform),
                device_info = COALESCE(EXCLUDED.device_info, device_tokens.device_info),
                last_seen   = EXCLUDED.last_seen
            RETURNING token, user_id, platform, device_info, created_at, last_seen
            "#,
        )
        .bind(token)
        .bind(&metadata.user_id)
        .bind(&metadata.platform)
        .bind(&device_info)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        info!(%token, "Upserted device token");
        Ok(row.into())
    }

    async fn list(&self) -> Vec<TokenRecord> {
        // ---
        let rows: Result<Vec<TokenRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT token, user_id, platform, device_info, created_at, last_seen
            FROM device_tokens
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => rows.into_iter().map(TokenRecord::from).collect(),
            Err(e) => {
                error!("Failed to read device tokens, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    async fn remove(&self, token: &str) -> Result<(), StoreError> {
        // ---
        let result = sqlx::query("DELETE FROM device_tokens WHERE token = $1")
            .bind(token.trim())
            .execute(&self.pool)
            .await?;
        debug!(%token, removed = result.rows_affected(), "Remove device token");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
