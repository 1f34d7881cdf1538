//! Append-only CSV journal of closed trades
//!
//! One row per close, for offline analysis outside the per-user JSON records.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::types::ClosedPosition;

/// Flattened closed-trade row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTradeRecord {
    pub closed_at: i64,
    pub token: String,
    pub ticker: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl_pct: f64,
    pub reason: String,
    pub entry_at: i64,
}

/// CSV journal writer. Appends are serialized behind a mutex; the file gets a
/// header only when newly created.
pub struct TradeJournal {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TradeJournal {
    /// Open (or create) the journal at `<data_dir>/trades/closed.csv`
    pub fn open(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join("trades");
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create journal dir {}", dir.display()))?;
        Ok(Self {
            path: dir.join("closed.csv"),
            lock: Mutex::new(()),
        })
    }

    /// Append one closed trade
    pub fn append(&self, token: &str, closed: &ClosedPosition) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let new_file = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open journal {}", self.path.display()))?;

        let mut writer = WriterBuilder::new().has_headers(new_file).from_writer(file);
        writer.serialize(ClosedTradeRecord {
            closed_at: closed.exit_at.timestamp_millis(),
            token: token.to_string(),
            ticker: closed.ticker.clone(),
            entry_price: closed.entry_price,
            exit_price: closed.exit_price,
            pnl_pct: closed.pnl_pct,
            reason: closed.reason.to_string(),
            entry_at: closed.entry_at.timestamp_millis(),
        })?;
        writer.flush().context("Failed to flush journal")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CloseReason;
    use chrono::Utc;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("stockmon_journal_{}_{}", name, uuid::Uuid::new_v4()))
    }

    fn closed(ticker: &str, pnl: f64) -> ClosedPosition {
        ClosedPosition {
            id: uuid::Uuid::new_v4().to_string(),
            ticker: ticker.to_string(),
            entry_price: 100.0,
            entry_at: Utc::now(),
            stop_loss: 85.0,
            target: 130.0,
            exit_price: 100.0 * (1.0 + pnl / 100.0),
            exit_at: Utc::now(),
            reason: CloseReason::Manual,
            pnl_pct: pnl,
        }
    }

    #[test]
    fn appends_rows_with_single_header() {
        let dir = temp_dir("append");
        fs::create_dir_all(&dir).unwrap();

        let journal = TradeJournal::open(&dir).unwrap();
        journal.append("tok1", &closed("PLTR", 12.5)).unwrap();
        journal.append("tok1", &closed("SOFI", -4.0)).unwrap();

        let text = fs::read_to_string(dir.join("trades").join("closed.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3, "header plus two rows");
        assert!(lines[0].starts_with("closed_at,token,ticker"));
        assert!(lines[1].contains("PLTR"));
        assert!(lines[2].contains("SOFI"));

        let _ = fs::remove_dir_all(&dir);
    }
}
