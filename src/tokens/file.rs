//! JSON file token store.
//!
//! The whole record set lives in one JSON array. Every mutation reads the
//! file, applies the change and writes a temp file that is renamed over the
//! original, all under one async mutex, so readers never see a partial file
//! and concurrent callers in this process never lose updates.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{validate_token, TokenMetadata, TokenRecord, TokenStore};
use crate::error::StoreError;

// ---

pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    // ---
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record set. A missing or blank file is an empty store.
    async fn read_all(&self) -> Result<Vec<TokenRecord>, StoreError> {
        // ---
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the record set: write `<file>.tmp`, flush it, rename over the store.
    async fn write_all(&self, records: &[TokenRecord]) -> Result<(), StoreError> {
        // ---
        let json = serde_json::to_vec_pretty(records)?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tokens.json".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &self.path).await
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = %tmp_path.display(), "Could not remove temp file: {}", cleanup);
                }
            }
            return Err(e.into());
        }
        debug!(path = %self.path.display(), count = records.len(), "Token store written");
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn upsert(
        &self,
        token: &str,
        metadata: TokenMetadata,
    ) -> Result<TokenRecord, StoreError> {
        // ---
        let token = validate_token(token)?;
        let _guard = self.write_lock.lock().await;

        // An unreadable store is reported rather than overwritten.
        let mut records = self.read_all().await?;
        let now = Utc::now();

        let record = match records.iter_mut().find(|r| r.token == token) {
            Some(existing) => {
                existing.refresh(metadata, now);
                debug!(%token, "Refreshed existing device token");
                existing.clone()
            }
            None => {
                let record = TokenRecord::new(token, metadata, now);
                records.push(record.clone());
                info!(%token, total = records.len(), "Registered new device token");
                record
            }
        };

        self.write_all(&records).await?;
        Ok(record)
    }

    async fn list(&self) -> Vec<TokenRecord> {
        // ---
        match self.read_all().await {
            Ok(records) => records,
            Err(e) => {
                error!(path = %self.path.display(), "Failed to read token store, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    async fn remove(&self, token: &str) -> Result<(), StoreError> {
        // ---
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        let before = records.len();
        records.retain(|r| r.token != token.trim());

        if records.len() == before {
            debug!(%token, "Token not registered, nothing to remove");
            return Ok(());
        }
        self.write_all(&records).await?;
        info!(%token, remaining = records.len(), "Removed device token");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
