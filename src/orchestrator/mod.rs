//! Check orchestrator - runs scheduled and on-demand market checks
//!
//! For every user with a non-empty watchlist: fetch a snapshot per ticker
//! (bounded by a timeout; a failed ticker is skipped, never fatal), then run
//! the exit branch when a position is open, otherwise the entry branch, and
//! the alert branch when entry does not fire. Notifications are
//! fire-and-forget: a failed send never rolls back a transition, it is just
//! not counted in `alerts_sent`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::lifecycle::{LifecycleError, PositionLifecycle};
use crate::market::{MarketData, MarketError};
use crate::notify::Notifier;
use crate::signal::{evaluate_alerts, evaluate_entry, evaluate_exit, EntryEvaluation, ExitDecision};
use crate::store::{ConfigStore, StoreError};
use crate::types::{CheckAction, ClosedPosition, CloseReason, Position, Snapshot, WatchlistEntry};

/// Failures of the manual enter/exit commands
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("market data unavailable: {0}")]
    Market(#[from] MarketError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-ticker outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct TickerResult {
    pub ticker: String,
    pub action: CheckAction,
    /// Current P&L percent for HOLD/EXIT outcomes
    pub pnl_pct: Option<f64>,
}

/// Aggregated outcome of a check run
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub started_at: DateTime<Utc>,
    /// Notifications the transport confirmed
    pub alerts_sent: usize,
    pub results: Vec<TickerResult>,
}

pub struct CheckOrchestrator {
    store: Arc<dyn ConfigStore>,
    market: Arc<dyn MarketData>,
    notifier: Arc<dyn Notifier>,
    lifecycle: PositionLifecycle,
    fetch_timeout: Duration,
}

impl CheckOrchestrator {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        market: Arc<dyn MarketData>,
        notifier: Arc<dyn Notifier>,
        fetch_timeout: Duration,
    ) -> Self {
        let lifecycle = PositionLifecycle::new(store.clone());
        Self {
            store,
            market,
            notifier,
            lifecycle,
            fetch_timeout,
        }
    }

    /// Bulk check across every user with a non-empty watchlist. One user's
    /// failure is logged and never aborts the others.
    pub async fn run_all(&self) -> CheckReport {
        let started_at = Utc::now();
        let mut alerts_sent = 0;
        let mut results = Vec::new();

        let tokens = match self.store.user_tokens().await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "Could not list users for bulk check");
                Vec::new()
            }
        };

        for token in tokens {
            match self.check_user(&token).await {
                Ok(report) => {
                    alerts_sent += report.alerts_sent;
                    results.extend(report.results);
                }
                Err(e) => warn!(error = %e, "User check failed, continuing with others"),
            }
        }

        info!(
            tickers = results.len(),
            alerts_sent, "Bulk check complete"
        );
        CheckReport {
            started_at,
            alerts_sent,
            results,
        }
    }

    /// Check one user's watchlist. Per-ticker snapshot failures (including
    /// timeouts) skip the ticker and continue.
    pub async fn check_user(&self, token: &str) -> Result<CheckReport, StoreError> {
        let started_at = Utc::now();
        let watchlist = self.store.get_watchlist(token).await?;
        let mut alerts_sent = 0;
        let mut results = Vec::new();

        if watchlist.is_empty() {
            return Ok(CheckReport {
                started_at,
                alerts_sent,
                results,
            });
        }
        let identity = self.store.identity_for(token).await?;

        for entry in &watchlist {
            let snapshot = match self.fetch_bounded(&entry.ticker).await {
                Some(s) => s,
                None => continue,
            };

            let outcome = if let Some(position) =
                self.store.get_open_position(token, &entry.ticker).await?
            {
                self.run_exit_branch(token, &identity, entry, &position, &snapshot)
                    .await
            } else {
                self.run_entry_branch(token, &identity, entry, &snapshot)
                    .await
            };

            match outcome {
                Ok((result, sent)) => {
                    alerts_sent += sent;
                    results.push(result);
                }
                Err(e) => {
                    warn!(ticker = %entry.ticker, error = %e, "Ticker check failed, skipping");
                }
            }
        }

        Ok(CheckReport {
            started_at,
            alerts_sent,
            results,
        })
    }

    /// Manual WATCHING -> OPEN. Fetches the entry price when none is given.
    pub async fn enter_manual(
        &self,
        token: &str,
        ticker: &str,
        price: Option<f64>,
    ) -> Result<Position, CommandError> {
        let price = match price {
            Some(p) => p,
            None => self.market.fetch_snapshot(ticker).await?.price,
        };
        let position = self.lifecycle.open(token, ticker, price, Utc::now()).await?;

        let identity = self.store.identity_for(token).await?;
        self.send(
            &identity,
            &format!("<b>ENTERED</b> {} @ ${}", position.ticker, position.entry_price),
        )
        .await;
        Ok(position)
    }

    /// Manual OPEN -> CLOSED. The exit price is fetched; if the fetch fails
    /// the position closes flat at its entry price.
    pub async fn exit_manual(
        &self,
        token: &str,
        ticker: &str,
    ) -> Result<ClosedPosition, CommandError> {
        let open = self
            .store
            .get_open_position(token, ticker)
            .await?
            .ok_or_else(|| LifecycleError::NoOpenPosition(ticker.to_uppercase()))?;

        let price = match self.fetch_bounded(ticker).await {
            Some(s) => s.price,
            None => open.entry_price,
        };
        let closed = self
            .lifecycle
            .close(token, ticker, price, CloseReason::Manual)
            .await?;

        let identity = self.store.identity_for(token).await?;
        self.send(
            &identity,
            &format!(
                "<b>EXITED</b> {} @ ${}\nP&amp;L: {:+.1}%",
                closed.ticker, closed.exit_price, closed.pnl_pct
            ),
        )
        .await;
        Ok(closed)
    }

    async fn run_exit_branch(
        &self,
        token: &str,
        identity: &str,
        entry: &WatchlistEntry,
        position: &Position,
        snapshot: &Snapshot,
    ) -> Result<(TickerResult, usize), LifecycleError> {
        match evaluate_exit(snapshot, &entry.exit_rules, position, Utc::now()) {
            ExitDecision::Exit {
                reason,
                pnl_pct,
                message,
            } => {
                let closed = self
                    .lifecycle
                    .close(token, &entry.ticker, snapshot.price, reason)
                    .await?;
                let text = format!(
                    "<b>EXIT</b> - {}\n\n{}\n\nEntry: ${} -> ${}",
                    closed.ticker, message, closed.entry_price, closed.exit_price
                );
                let sent = self.send(identity, &text).await as usize;
                Ok((
                    TickerResult {
                        ticker: closed.ticker,
                        action: CheckAction::Exit,
                        pnl_pct: Some(pnl_pct),
                    },
                    sent,
                ))
            }
            ExitDecision::Hold { pnl_pct } => Ok((
                TickerResult {
                    ticker: entry.ticker.clone(),
                    action: CheckAction::Hold,
                    pnl_pct: Some(pnl_pct),
                },
                0,
            )),
        }
    }

    async fn run_entry_branch(
        &self,
        token: &str,
        identity: &str,
        entry: &WatchlistEntry,
        snapshot: &Snapshot,
    ) -> Result<(TickerResult, usize), LifecycleError> {
        let evaluation = evaluate_entry(snapshot, &entry.entry_rules);
        if evaluation.passed {
            let position = self
                .lifecycle
                .open(token, &entry.ticker, snapshot.price, Utc::now())
                .await?;
            let text = entry_message(entry, snapshot, &evaluation, &position);
            let sent = self.send(identity, &text).await as usize;
            return Ok((
                TickerResult {
                    ticker: position.ticker,
                    action: CheckAction::EntrySignal,
                    pnl_pct: None,
                },
                sent,
            ));
        }

        let alerts = evaluate_alerts(snapshot, &entry.alerts);
        let mut sent = 0;
        if !alerts.is_empty() {
            let text = format!(
                "<b>{}</b> ${}\n{}",
                entry.ticker,
                snapshot.price,
                alerts.join("\n")
            );
            sent = self.send(identity, &text).await as usize;
        }
        Ok((
            TickerResult {
                ticker: entry.ticker.clone(),
                action: CheckAction::Watch,
                pnl_pct: None,
            },
            sent,
        ))
    }

    /// Snapshot fetch under the configured timeout. None means the ticker is
    /// treated as failed for this run.
    async fn fetch_bounded(&self, ticker: &str) -> Option<Snapshot> {
        match timeout(self.fetch_timeout, self.market.fetch_snapshot(ticker)).await {
            Ok(Ok(snapshot)) => Some(snapshot),
            Ok(Err(e)) => {
                warn!(ticker = %ticker, error = %e, "Snapshot fetch failed");
                None
            }
            Err(_) => {
                warn!(ticker = %ticker, timeout_ms = self.fetch_timeout.as_millis() as u64, "Snapshot fetch timed out");
                None
            }
        }
    }

    /// True when the transport confirmed the send
    async fn send(&self, identity: &str, message: &str) -> bool {
        match self.notifier.notify(identity, message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Notification failed");
                false
            }
        }
    }
}

fn entry_message(
    entry: &WatchlistEntry,
    snapshot: &Snapshot,
    evaluation: &EntryEvaluation,
    position: &Position,
) -> String {
    let checks: Vec<&str> = evaluation
        .checks
        .iter()
        .map(|c| c.description.as_str())
        .collect();
    format!(
        "<b>ENTRY SIGNAL</b> - {}\n\n${} ({:+.1}%)\n{}\n\n{}\n\nEntry: ${}\nStop: ${} | Target: ${}",
        entry.ticker,
        snapshot.price,
        snapshot.daily_change_pct,
        entry.thesis.as_deref().unwrap_or(""),
        checks.join(" | "),
        position.entry_price,
        position.stop_loss,
        position.target
    )
}
