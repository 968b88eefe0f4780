//! Database schema management for the Postgres token store.
//!
//! Applied once on startup from `main.rs` when `DATABASE_URL` is set.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the `device_tokens` table if it is missing (idempotent).
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_tokens (
            token        TEXT        PRIMARY KEY,
            user_id      TEXT,
            platform     TEXT,
            device_info  TEXT,
            created_at   TIMESTAMPTZ NOT NULL,
            last_seen    TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_device_tokens_user_id
            ON device_tokens (user_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
