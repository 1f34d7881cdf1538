//! File-backed store: one JSON record per user
//!
//! Layout: `<data_dir>/users/<token>.json`. Every mutation happens under that
//! user's async mutex and is committed with a temp-file write, fsync and
//! rename, so a crash never leaves a partially-applied record and concurrent
//! triggers (scheduled check vs. inbound command) cannot lose updates.
//! Mutations on different users run fully in parallel.

use rand::RngCore;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use async_trait::async_trait;
use chrono::Utc;

use super::{ConfigStore, StoreError, TradeJournal, UserRecord};
use crate::types::{round2, ClosedPosition, CloseReason, Position, WatchlistEntry};

pub struct FileStore {
    users_dir: PathBuf,
    /// token -> record, each behind its own mutex (per-user serialization)
    users: RwLock<HashMap<String, Arc<Mutex<UserRecord>>>>,
    /// identity -> token; the mutex also serializes user creation
    identities: Mutex<HashMap<String, String>>,
    journal: Option<TradeJournal>,
}

impl FileStore {
    /// Open the store rooted at `data_dir`, loading every existing user
    /// record. `journal` enables the closed-trade CSV log.
    pub fn open(data_dir: &Path, journal: Option<TradeJournal>) -> Result<Self, StoreError> {
        let users_dir = data_dir.join("users");
        fs::create_dir_all(&users_dir)?;

        let mut users = HashMap::new();
        let mut identities = HashMap::new();
        for entry in fs::read_dir(&users_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = fs::read_to_string(&path)?;
            match serde_json::from_str::<UserRecord>(&text) {
                Ok(record) => {
                    identities.insert(record.identity.clone(), record.token.clone());
                    users.insert(record.token.clone(), Arc::new(Mutex::new(record)));
                }
                Err(e) => {
                    // A malformed record is skipped, not fatal for the rest
                    warn!(path = %path.display(), error = %e, "Skipping unreadable user record");
                }
            }
        }

        info!(users = users.len(), dir = %users_dir.display(), "File store opened");
        Ok(Self {
            users_dir,
            users: RwLock::new(users),
            identities: Mutex::new(identities),
            journal,
        })
    }

    fn record_path(&self, token: &str) -> PathBuf {
        self.users_dir.join(format!("{}.json", token))
    }

    /// All-or-nothing commit: temp file, fsync, rename over the old record
    fn persist(&self, record: &UserRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.token);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(record)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Run a read-modify-write against one user's record under its mutex.
    /// On persist failure the in-memory record is rolled back so later reads
    /// never see an uncommitted state.
    async fn with_user<T>(
        &self,
        token: &str,
        mutate: impl FnOnce(&mut UserRecord) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let handle = {
            let users = self.users.read().await;
            users.get(token).cloned().ok_or(StoreError::UnknownUser)?
        };
        let mut record = handle.lock().await;
        let committed = record.clone();
        let out = mutate(&mut record)?;
        if let Err(e) = self.persist(&record) {
            *record = committed;
            return Err(e);
        }
        Ok(out)
    }

    /// Shared read of one user's record (None for unknown tokens)
    async fn read_user<T>(
        &self,
        token: &str,
        read: impl FnOnce(&UserRecord) -> T,
    ) -> Option<T> {
        let handle = {
            let users = self.users.read().await;
            users.get(token).cloned()?
        };
        let record = handle.lock().await;
        Some(read(&record))
    }

    fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn create_user(&self, identity: &str) -> Result<String, StoreError> {
        // Held across check-and-insert so two first-contact events for the
        // same identity cannot both create a record.
        let mut identities = self.identities.lock().await;
        if let Some(token) = identities.get(identity) {
            return Ok(token.clone());
        }

        let record = UserRecord {
            token: Self::generate_token(),
            identity: identity.to_string(),
            created_at: Utc::now(),
            watchlist: Vec::new(),
            positions: Vec::new(),
            history: Vec::new(),
        };
        self.persist(&record)?;

        let token = record.token.clone();
        identities.insert(identity.to_string(), token.clone());
        self.users
            .write()
            .await
            .insert(token.clone(), Arc::new(Mutex::new(record)));
        info!(identity = %identity, "Created user");
        Ok(token)
    }

    async fn token_for_identity(&self, identity: &str) -> Result<Option<String>, StoreError> {
        Ok(self.identities.lock().await.get(identity).cloned())
    }

    async fn identity_for(&self, token: &str) -> Result<String, StoreError> {
        self.read_user(token, |r| r.identity.clone())
            .await
            .ok_or(StoreError::UnknownUser)
    }

    async fn user_tokens(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.users.read().await.keys().cloned().collect())
    }

    async fn get_watchlist(&self, token: &str) -> Result<Vec<WatchlistEntry>, StoreError> {
        // Unknown token reads as an empty watchlist by contract
        Ok(self
            .read_user(token, |r| r.watchlist.clone())
            .await
            .unwrap_or_default())
    }

    async fn set_watchlist(
        &self,
        token: &str,
        mut entries: Vec<WatchlistEntry>,
    ) -> Result<(), StoreError> {
        for entry in &mut entries {
            entry.normalize();
        }
        self.with_user(token, move |record| {
            record.watchlist = entries;
            Ok(())
        })
        .await
    }

    async fn get_open_position(
        &self,
        token: &str,
        ticker: &str,
    ) -> Result<Option<Position>, StoreError> {
        self.read_user(token, |r| r.open_position(ticker).cloned())
            .await
            .ok_or(StoreError::UnknownUser)
    }

    async fn open_positions(&self, token: &str) -> Result<Vec<Position>, StoreError> {
        self.read_user(token, |r| r.positions.clone())
            .await
            .ok_or(StoreError::UnknownUser)
    }

    async fn history(&self, token: &str) -> Result<Vec<ClosedPosition>, StoreError> {
        self.read_user(token, |r| r.history.clone())
            .await
            .ok_or(StoreError::UnknownUser)
    }

    async fn add_position(&self, token: &str, mut position: Position) -> Result<(), StoreError> {
        position.ticker = position.ticker.to_uppercase();
        self.with_user(token, move |record| {
            if record.open_position(&position.ticker).is_some() {
                return Err(StoreError::DuplicateOpenPosition(position.ticker.clone()));
            }
            record.positions.push(position);
            Ok(())
        })
        .await
    }

    async fn close_position(
        &self,
        token: &str,
        ticker: &str,
        exit_price: f64,
        reason: CloseReason,
    ) -> Result<ClosedPosition, StoreError> {
        let ticker = ticker.to_uppercase();
        let closed = self
            .with_user(token, move |record| {
                let idx = record
                    .positions
                    .iter()
                    .position(|p| p.ticker.eq_ignore_ascii_case(&ticker))
                    .ok_or_else(|| StoreError::NoOpenPosition(ticker.clone()))?;
                let position = record.positions.remove(idx);
                let closed = ClosedPosition {
                    pnl_pct: round2((exit_price / position.entry_price - 1.0) * 100.0),
                    id: position.id,
                    ticker: position.ticker,
                    entry_price: position.entry_price,
                    entry_at: position.entry_at,
                    stop_loss: position.stop_loss,
                    target: position.target,
                    exit_price,
                    exit_at: Utc::now(),
                    reason,
                };
                record.history.push(closed.clone());
                Ok(closed)
            })
            .await?;

        if let Some(journal) = &self.journal {
            // Journal is an analysis artifact; a failed append never fails the close
            if let Err(e) = journal.append(token, &closed) {
                warn!(ticker = %closed.ticker, error = %e, "Failed to journal closed trade");
            }
        }
        Ok(closed)
    }
}
