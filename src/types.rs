//! Core types used throughout Stockmon
//!
//! Defines the watchlist configuration schema, market snapshots,
//! open/closed positions and per-run check results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Round to 2 decimal places (display/persistence precision for prices and percentages)
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Normalize an optional threshold: zero or absent means "not checked".
///
/// The configuration schema treats a 0 value the same as a missing key, so a
/// deliberately-zero threshold is not representable. Negative values stay
/// active (used by `daily_change_below`).
pub fn threshold(v: Option<f64>) -> Option<f64> {
    v.filter(|x| *x != 0.0)
}

/// Point-in-time market data for one ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Ticker symbol (as requested, uppercase)
    pub ticker: String,
    /// Last close price
    pub price: f64,
    /// Previous session close
    pub prev_close: f64,
    /// Daily change vs previous close, in percent (e.g. 3.0 = +3%)
    pub daily_change_pct: f64,
    /// Last session volume
    pub volume: u64,
    /// 5-day high
    pub high_5d: f64,
    /// 5-day low
    pub low_5d: f64,
}

/// Entry rule thresholds. A value of zero or an absent key disables the check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryRules {
    /// Price must break above this level (strict)
    pub breakout_above: Option<f64>,
    /// Daily change must be at least this percent (inclusive)
    pub min_daily_change_pct: Option<f64>,
    /// Session volume must be at least this (inclusive)
    pub min_volume: Option<u64>,
}

impl EntryRules {
    /// True when no rule is configured; such a set trivially passes evaluation.
    pub fn is_empty(&self) -> bool {
        threshold(self.breakout_above).is_none()
            && threshold(self.min_daily_change_pct).is_none()
            && self.min_volume.filter(|v| *v != 0).is_none()
    }
}

/// Exit rule thresholds for an open position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitRules {
    /// Loss magnitude in percent that triggers a stop (positive number, e.g. 15)
    pub stop_loss_pct: Option<f64>,
    /// Gain in percent that triggers a target exit (e.g. 30)
    pub target_pct: Option<f64>,
    /// Maximum calendar days to hold
    pub max_hold_days: Option<i64>,
}

/// Standalone alert thresholds, independent of entry/exit rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertRules {
    /// Alert when price is above this level
    pub price_above: Option<f64>,
    /// Alert when price is below this level
    pub price_below: Option<f64>,
    /// Alert when daily change exceeds this percent
    pub daily_change_above: Option<f64>,
    /// Alert when daily change falls below this percent (configured negative)
    pub daily_change_below: Option<f64>,
}

/// One ticker's monitoring configuration within a user's watchlist
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistEntry {
    /// Ticker symbol, uppercase (natural key within the watchlist)
    pub ticker: String,
    /// Display name
    pub name: Option<String>,
    /// Free-text investment thesis
    pub thesis: Option<String>,
    /// Free-text catalyst/event notes
    pub catalyst: Option<String>,
    pub entry_rules: EntryRules,
    pub exit_rules: ExitRules,
    pub alerts: AlertRules,
}

impl WatchlistEntry {
    pub fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_uppercase(),
            ..Default::default()
        }
    }

    /// Uppercase the ticker in place (applied on every watchlist write)
    pub fn normalize(&mut self) {
        self.ticker = self.ticker.trim().to_uppercase();
    }
}

/// Terminal reason for a closed position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    StopLoss,
    Target,
    MaxDays,
    Manual,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "STOP_LOSS"),
            CloseReason::Target => write!(f, "TARGET"),
            CloseReason::MaxDays => write!(f, "MAX_DAYS"),
            CloseReason::Manual => write!(f, "MANUAL"),
        }
    }
}

/// An open trade for a (user, ticker) pair.
///
/// A stored `Position` is OPEN by definition; closing converts it into a
/// [`ClosedPosition`] appended to the user's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique position id
    pub id: String,
    /// Ticker symbol, uppercase
    pub ticker: String,
    /// Entry fill price
    pub entry_price: f64,
    /// Entry timestamp
    pub entry_at: DateTime<Utc>,
    /// Absolute stop-loss price computed at entry
    pub stop_loss: f64,
    /// Absolute target price computed at entry
    pub target: f64,
}

impl Position {
    /// Unrealized P&L in percent at the given price (full precision)
    pub fn pnl_pct_at(&self, price: f64) -> f64 {
        (price / self.entry_price - 1.0) * 100.0
    }
}

/// A closed trade, immutable once appended to history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub id: String,
    pub ticker: String,
    pub entry_price: f64,
    pub entry_at: DateTime<Utc>,
    pub stop_loss: f64,
    pub target: f64,
    /// Exit fill price
    pub exit_price: f64,
    /// Exit timestamp
    pub exit_at: DateTime<Utc>,
    /// Why the position closed
    pub reason: CloseReason,
    /// Realized P&L in percent, rounded to 2 decimals
    pub pnl_pct: f64,
}

/// Per-ticker outcome tag of a check run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckAction {
    EntrySignal,
    Exit,
    Hold,
    Watch,
}

impl fmt::Display for CheckAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckAction::EntrySignal => write!(f, "ENTRY_SIGNAL"),
            CheckAction::Exit => write!(f, "EXIT"),
            CheckAction::Hold => write!(f, "HOLD"),
            CheckAction::Watch => write!(f, "WATCH"),
        }
    }
}

/// Wrapper for the user-facing YAML document (`watchlist:` root key)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WatchlistDoc {
    watchlist: Vec<WatchlistEntry>,
}

/// Parse a watchlist from the user-facing YAML document.
///
/// Every entry must carry a non-empty ticker; tickers are uppercased.
pub fn watchlist_from_yaml(text: &str) -> anyhow::Result<Vec<WatchlistEntry>> {
    let doc: WatchlistDoc =
        serde_yaml::from_str(text).map_err(|e| anyhow::anyhow!("invalid YAML: {}", e))?;
    let mut entries = doc.watchlist;
    for entry in &mut entries {
        entry.normalize();
        if entry.ticker.is_empty() {
            anyhow::bail!("every watchlist entry must have a ticker");
        }
    }
    Ok(entries)
}

/// Serialize a watchlist back to the user-facing YAML document
pub fn watchlist_to_yaml(entries: &[WatchlistEntry]) -> anyhow::Result<String> {
    let doc = WatchlistDoc {
        watchlist: entries.to_vec(),
    };
    Ok(serde_yaml::to_string(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_rounds_to_cents() {
        assert_eq!(round2(84.999), 85.0);
        assert_eq!(round2(-16.004), -16.0);
        assert_eq!(round2(31.0), 31.0);
    }

    #[test]
    fn zero_threshold_is_unset() {
        assert_eq!(threshold(Some(0.0)), None);
        assert_eq!(threshold(None), None);
        assert_eq!(threshold(Some(7.5)), Some(7.5));
        // Negative thresholds stay active (daily_change_below)
        assert_eq!(threshold(Some(-7.0)), Some(-7.0));
    }

    #[test]
    fn empty_entry_rules_detected() {
        assert!(EntryRules::default().is_empty());
        assert!(EntryRules {
            breakout_above: Some(0.0),
            min_daily_change_pct: None,
            min_volume: Some(0),
        }
        .is_empty());
        assert!(!EntryRules {
            breakout_above: Some(12.5),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn yaml_watchlist_round_trip() {
        let text = r#"
watchlist:
  - ticker: "pltr"
    name: "Palantir"
    thesis: "Gov AI contracts"
    entry_rules:
      breakout_above: 25.50
      min_daily_change_pct: 3.0
      min_volume: 1000000
    exit_rules:
      stop_loss_pct: 15
      target_pct: 30
      max_hold_days: 30
    alerts:
      daily_change_above: 7
      daily_change_below: -7
  - ticker: "SOFI"
"#;
        let entries = watchlist_from_yaml(text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ticker, "PLTR");
        assert_eq!(entries[0].entry_rules.breakout_above, Some(25.50));
        assert_eq!(entries[0].exit_rules.max_hold_days, Some(30));
        assert_eq!(entries[0].alerts.daily_change_below, Some(-7.0));
        assert_eq!(entries[1].ticker, "SOFI");
        assert!(entries[1].entry_rules.is_empty());

        let yaml = watchlist_to_yaml(&entries).unwrap();
        let reparsed = watchlist_from_yaml(&yaml).unwrap();
        assert_eq!(reparsed, entries);
    }

    #[test]
    fn yaml_rejects_missing_ticker() {
        let text = "watchlist:\n  - name: \"no symbol\"\n";
        assert!(watchlist_from_yaml(text).is_err());
    }

    #[test]
    fn close_reason_labels() {
        assert_eq!(CloseReason::StopLoss.to_string(), "STOP_LOSS");
        assert_eq!(CloseReason::MaxDays.to_string(), "MAX_DAYS");
        assert_eq!(CheckAction::EntrySignal.to_string(), "ENTRY_SIGNAL");
    }
}
