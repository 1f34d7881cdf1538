//! Scheduled check loop and market-hours gate
//!
//! The scheduler is policy over the orchestrator: a tick outside the
//! configured market window is skipped with a log line, not an error. Retry
//! of failed work is the next tick, never an inline loop.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ScheduleConfig;
use crate::orchestrator::CheckOrchestrator;

/// Trading window gate (hours in UTC, close exclusive)
#[derive(Debug, Clone, Copy)]
pub struct MarketHours {
    pub open_hour_utc: u32,
    pub close_hour_utc: u32,
    pub weekdays_only: bool,
}

impl MarketHours {
    pub fn from_config(cfg: &ScheduleConfig) -> Self {
        Self {
            open_hour_utc: cfg.open_hour_utc,
            close_hour_utc: cfg.close_hour_utc,
            weekdays_only: cfg.weekdays_only,
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if self.weekdays_only
            && matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
        {
            return false;
        }
        (self.open_hour_utc..self.close_hour_utc).contains(&now.hour())
    }
}

/// Run bulk checks on a fixed interval until the task is dropped
pub async fn run_loop(
    orchestrator: Arc<CheckOrchestrator>,
    hours: MarketHours,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let now = Utc::now();
        if !hours.is_open(now) {
            debug!(time = %now.format("%Y-%m-%d %H:%M"), "Market closed, skipping check");
            continue;
        }
        let report = orchestrator.run_all().await;
        info!(
            alerts_sent = report.alerts_sent,
            tickers = report.results.len(),
            "Scheduled check finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hours() -> MarketHours {
        MarketHours {
            open_hour_utc: 14,
            close_hour_utc: 21,
            weekdays_only: true,
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn open_during_weekday_session() {
        // 2026-08-26 is a Wednesday
        assert!(hours().is_open(utc(2026, 8, 26, 14, 0)));
        assert!(hours().is_open(utc(2026, 8, 26, 20, 59)));
    }

    #[test]
    fn closed_outside_session_hours() {
        assert!(!hours().is_open(utc(2026, 8, 26, 13, 59)));
        assert!(!hours().is_open(utc(2026, 8, 26, 21, 0)));
    }

    #[test]
    fn closed_on_weekends() {
        // 2026-08-29/30 are Saturday/Sunday
        assert!(!hours().is_open(utc(2026, 8, 29, 15, 0)));
        assert!(!hours().is_open(utc(2026, 8, 30, 15, 0)));
    }

    #[test]
    fn weekend_gate_can_be_disabled() {
        let mut h = hours();
        h.weekdays_only = false;
        assert!(h.is_open(utc(2026, 8, 29, 15, 0)));
    }
}
