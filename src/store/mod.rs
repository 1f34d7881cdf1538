//! Durable per-user configuration and position store
//!
//! [`ConfigStore`] is the only owner of durable state: each user's watchlist,
//! open positions and closed-trade history live in a single record keyed by
//! an unguessable capability token. Implementations must make every mutation
//! durable before returning and must serialize mutations per user so that a
//! scheduled check and an inbound command can never interleave into a lost
//! update. [`file::FileStore`] is the bundled implementation.

pub mod file;
pub mod journal;

pub use file::FileStore;
pub use journal::TradeJournal;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ClosedPosition, CloseReason, Position, WatchlistEntry};

/// Store-level failures. Validation variants surface immediately to the
/// caller; `Io`/`Serde` mean the mutation did not take effect.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown user token")]
    UnknownUser,
    #[error("an open position already exists for {0}")]
    DuplicateOpenPosition(String),
    #[error("no open position for {0}")]
    NoOpenPosition(String),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One user's durable record. The watchlist keeps insertion order; history is
/// append-only in close order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Capability token (doubles as the record key)
    pub token: String,
    /// Stable transport-level identity (e.g. a chat id)
    pub identity: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub watchlist: Vec<WatchlistEntry>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub history: Vec<ClosedPosition>,
}

impl UserRecord {
    /// Case-insensitive open-position lookup
    pub fn open_position(&self, ticker: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.ticker.eq_ignore_ascii_case(ticker))
    }

    /// Case-insensitive watchlist lookup
    pub fn watchlist_entry(&self, ticker: &str) -> Option<&WatchlistEntry> {
        self.watchlist
            .iter()
            .find(|e| e.ticker.eq_ignore_ascii_case(ticker))
    }
}

/// Contract every store implementation honors: per-user serialized,
/// durable-before-return mutations; reads reflect the last committed write.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Idempotent: an existing identity gets its existing token back
    async fn create_user(&self, identity: &str) -> Result<String, StoreError>;

    /// Identity resolution for inbound transports
    async fn token_for_identity(&self, identity: &str) -> Result<Option<String>, StoreError>;

    /// Transport identity for outbound notifications
    async fn identity_for(&self, token: &str) -> Result<String, StoreError>;

    /// All known user tokens (iteration surface for bulk checks)
    async fn user_tokens(&self) -> Result<Vec<String>, StoreError>;

    /// Insertion-ordered watchlist; empty for an unknown token
    async fn get_watchlist(&self, token: &str) -> Result<Vec<WatchlistEntry>, StoreError>;

    /// Atomic full replacement of the watchlist
    async fn set_watchlist(
        &self,
        token: &str,
        entries: Vec<WatchlistEntry>,
    ) -> Result<(), StoreError>;

    /// Case-insensitive on ticker
    async fn get_open_position(
        &self,
        token: &str,
        ticker: &str,
    ) -> Result<Option<Position>, StoreError>;

    async fn open_positions(&self, token: &str) -> Result<Vec<Position>, StoreError>;

    async fn history(&self, token: &str) -> Result<Vec<ClosedPosition>, StoreError>;

    /// Rejects a second OPEN position for the same (user, ticker)
    async fn add_position(&self, token: &str, position: Position) -> Result<(), StoreError>;

    /// Close the OPEN position for `ticker`: compute realized P&L, append to
    /// history, remove from the active set. Returns the closed snapshot.
    async fn close_position(
        &self,
        token: &str,
        ticker: &str,
        exit_price: f64,
        reason: CloseReason,
    ) -> Result<ClosedPosition, StoreError>;
}
