//! Position lifecycle - WATCHING -> OPEN -> CLOSED per (user, ticker)
//!
//! Transitions run through the [`ConfigStore`] so the per-user locking of the
//! store is the only serialization point. History is terminal; a ticker
//! re-enters only through a fresh WATCHING -> OPEN transition producing an
//! unrelated position.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::store::{ConfigStore, StoreError};
use crate::types::{round2, ClosedPosition, CloseReason, ExitRules, Position};

/// Applied when a watchlist entry leaves stop/target percentages unset
pub const DEFAULT_STOP_LOSS_PCT: f64 = 15.0;
pub const DEFAULT_TARGET_PCT: f64 = 30.0;

/// Local validation failures plus pass-through store errors. Validation
/// variants are surfaced to the caller and never retried.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0} is not in the watchlist")]
    UnknownTicker(String),
    #[error("a position is already open for {0}")]
    AlreadyOpen(String),
    #[error("no open position for {0}")]
    NoOpenPosition(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Compute absolute stop-loss and target prices from the configured exit
/// percentages and an entry price, rounded to cents.
pub fn stop_and_target(entry_price: f64, rules: &ExitRules) -> (f64, f64) {
    let stop_pct = crate::types::threshold(rules.stop_loss_pct).unwrap_or(DEFAULT_STOP_LOSS_PCT);
    let target_pct = crate::types::threshold(rules.target_pct).unwrap_or(DEFAULT_TARGET_PCT);
    (
        round2(entry_price * (1.0 - stop_pct / 100.0)),
        round2(entry_price * (1.0 + target_pct / 100.0)),
    )
}

/// Drives position state transitions for one store
#[derive(Clone)]
pub struct PositionLifecycle {
    store: Arc<dyn ConfigStore>,
}

impl PositionLifecycle {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// WATCHING -> OPEN. The ticker must be configured in the watchlist and
    /// must not already have an open position. Stop and target prices are
    /// fixed at entry from the entry's exit rules.
    pub async fn open(
        &self,
        token: &str,
        ticker: &str,
        entry_price: f64,
        now: DateTime<Utc>,
    ) -> Result<Position, LifecycleError> {
        let ticker = ticker.to_uppercase();
        let watchlist = self.store.get_watchlist(token).await?;
        let entry_cfg = watchlist
            .iter()
            .find(|e| e.ticker.eq_ignore_ascii_case(&ticker))
            .ok_or_else(|| LifecycleError::UnknownTicker(ticker.clone()))?;

        if self.store.get_open_position(token, &ticker).await?.is_some() {
            return Err(LifecycleError::AlreadyOpen(ticker));
        }

        let (stop_loss, target) = stop_and_target(entry_price, &entry_cfg.exit_rules);
        let position = Position {
            id: uuid::Uuid::new_v4().to_string(),
            ticker: ticker.clone(),
            entry_price,
            entry_at: now,
            stop_loss,
            target,
        };

        // The store re-checks the open-position invariant under the user lock
        match self.store.add_position(token, position.clone()).await {
            Ok(()) => {}
            Err(StoreError::DuplicateOpenPosition(t)) => {
                return Err(LifecycleError::AlreadyOpen(t))
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            ticker = %position.ticker,
            entry = position.entry_price,
            stop = position.stop_loss,
            target = position.target,
            "Opened position"
        );
        Ok(position)
    }

    /// OPEN -> CLOSED. The closed snapshot is appended to history and the
    /// active position removed in one store mutation.
    pub async fn close(
        &self,
        token: &str,
        ticker: &str,
        exit_price: f64,
        reason: CloseReason,
    ) -> Result<ClosedPosition, LifecycleError> {
        let closed = match self
            .store
            .close_position(token, ticker, exit_price, reason)
            .await
        {
            Ok(c) => c,
            Err(StoreError::NoOpenPosition(t)) => return Err(LifecycleError::NoOpenPosition(t)),
            Err(e) => return Err(e.into()),
        };

        info!(
            ticker = %closed.ticker,
            reason = %closed.reason,
            pnl_pct = closed.pnl_pct,
            "Closed position"
        );
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;
    use crate::types::WatchlistEntry;
    use std::path::PathBuf;

    fn temp_data_dir(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "stockmon_lifecycle_{}_{}",
            test_name,
            uuid::Uuid::new_v4()
        ))
    }

    async fn setup(dir: &PathBuf) -> (PositionLifecycle, Arc<FileStore>, String) {
        let store = Arc::new(FileStore::open(dir, None).unwrap());
        let token = store.create_user("u").await.unwrap();
        let mut entry = WatchlistEntry::new("PLTR");
        entry.exit_rules.stop_loss_pct = Some(15.0);
        entry.exit_rules.target_pct = Some(30.0);
        store.set_watchlist(&token, vec![entry]).await.unwrap();
        (
            PositionLifecycle::new(store.clone() as Arc<dyn ConfigStore>),
            store,
            token,
        )
    }

    #[tokio::test]
    async fn open_computes_stop_and_target_prices() {
        let dir = temp_data_dir("stop_target");
        let (lifecycle, _store, token) = setup(&dir).await;

        let position = lifecycle.open(&token, "pltr", 100.0, Utc::now()).await.unwrap();
        assert_eq!(position.ticker, "PLTR");
        assert_eq!(position.stop_loss, 85.0);
        assert_eq!(position.target, 130.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn default_exit_percentages_apply_when_unset() {
        let (stop, target) = stop_and_target(200.0, &ExitRules::default());
        assert_eq!(stop, 170.0); // -15%
        assert_eq!(target, 260.0); // +30%
    }

    #[tokio::test]
    async fn open_requires_watchlist_membership() {
        let dir = temp_data_dir("unknown_ticker");
        let (lifecycle, _store, token) = setup(&dir).await;

        let err = lifecycle
            .open(&token, "TSLA", 250.0, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownTicker(t) if t == "TSLA"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn open_rejects_second_position() {
        let dir = temp_data_dir("already_open");
        let (lifecycle, _store, token) = setup(&dir).await;

        lifecycle.open(&token, "PLTR", 25.0, Utc::now()).await.unwrap();
        let err = lifecycle
            .open(&token, "PLTR", 26.0, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyOpen(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn manual_close_round_trip() {
        let dir = temp_data_dir("manual_close");
        let (lifecycle, store, token) = setup(&dir).await;

        lifecycle.open(&token, "PLTR", 100.0, Utc::now()).await.unwrap();
        let closed = lifecycle
            .close(&token, "PLTR", 112.0, CloseReason::Manual)
            .await
            .unwrap();
        assert_eq!(closed.reason, CloseReason::Manual);
        assert_eq!(closed.pnl_pct, 12.0);

        assert!(store.get_open_position(&token, "PLTR").await.unwrap().is_none());
        let err = lifecycle
            .close(&token, "PLTR", 112.0, CloseReason::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NoOpenPosition(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn removed_from_watchlist_keeps_open_position() {
        // Watchlist membership and position existence are independent
        let dir = temp_data_dir("independent");
        let (lifecycle, store, token) = setup(&dir).await;

        lifecycle.open(&token, "PLTR", 25.0, Utc::now()).await.unwrap();
        store.set_watchlist(&token, Vec::new()).await.unwrap();

        assert!(store.get_open_position(&token, "PLTR").await.unwrap().is_some());
        // Exit still works without the watchlist entry
        lifecycle
            .close(&token, "PLTR", 30.0, CloseReason::Manual)
            .await
            .unwrap();

        let _ = std::fs::remove_dir_all(&dir);
    }
}
