//! Signal engine - pure evaluation of entry/exit/alert rules
//!
//! Every function here is side-effect-free over a market [`Snapshot`] and a
//! rule set. Thresholds of zero or absent never block (see
//! [`crate::types::threshold`]); exit conditions are evaluated in a fixed
//! order (stop-loss, then target, then max-hold-days) and the first match
//! wins.

use chrono::{DateTime, Utc};

use crate::types::{
    round2, threshold, AlertRules, CloseReason, EntryRules, ExitRules, Position, Snapshot,
};

/// One configured entry check with its outcome
#[derive(Debug, Clone, PartialEq)]
pub struct EntryCheck {
    pub description: String,
    pub passed: bool,
}

/// Result of evaluating entry rules against a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct EntryEvaluation {
    /// AND across configured checks only; trivially true for an empty set
    pub passed: bool,
    /// One entry per configured rule, in rule-declaration order
    pub checks: Vec<EntryCheck>,
}

/// Outcome of evaluating exit rules for an open position
#[derive(Debug, Clone, PartialEq)]
pub enum ExitDecision {
    Exit {
        reason: CloseReason,
        /// Realized P&L percent, rounded to 2 decimals
        pnl_pct: f64,
        /// Human-readable trigger line for notifications
        message: String,
    },
    Hold {
        /// Unrealized P&L percent, rounded to 2 decimals
        pnl_pct: f64,
    },
}

/// Evaluate entry rules. Unconfigured rules contribute no check; an empty
/// rule set passes trivially, so a rule-less ticker signals entry on its
/// very first check (manual curation of entry rules is expected).
pub fn evaluate_entry(snapshot: &Snapshot, rules: &EntryRules) -> EntryEvaluation {
    let mut checks = Vec::new();
    let mut passed = true;

    if let Some(level) = threshold(rules.breakout_above) {
        let ok = snapshot.price > level;
        checks.push(EntryCheck {
            description: format!("Breakout >${}: {}", level, tick(ok)),
            passed: ok,
        });
        passed = passed && ok;
    }

    if let Some(min_change) = threshold(rules.min_daily_change_pct) {
        let ok = snapshot.daily_change_pct >= min_change;
        checks.push(EntryCheck {
            description: format!("Change >={}%: {}", min_change, tick(ok)),
            passed: ok,
        });
        passed = passed && ok;
    }

    if let Some(min_volume) = rules.min_volume.filter(|v| *v != 0) {
        let ok = snapshot.volume >= min_volume;
        checks.push(EntryCheck {
            description: format!("Volume >={}: {}", min_volume, tick(ok)),
            passed: ok,
        });
        passed = passed && ok;
    }

    EntryEvaluation { passed, checks }
}

/// Evaluate exit rules for an open position.
///
/// Comparisons use full-precision P&L; only the reported value is rounded.
/// Days held is the floor calendar-day difference between `now` and entry.
pub fn evaluate_exit(
    snapshot: &Snapshot,
    rules: &ExitRules,
    position: &Position,
    now: DateTime<Utc>,
) -> ExitDecision {
    let pnl_pct = position.pnl_pct_at(snapshot.price);
    let days_held = (now - position.entry_at).num_days();

    if let Some(stop) = threshold(rules.stop_loss_pct) {
        if pnl_pct <= -stop {
            return ExitDecision::Exit {
                reason: CloseReason::StopLoss,
                pnl_pct: round2(pnl_pct),
                message: format!("STOP LOSS: {:.1}%", pnl_pct),
            };
        }
    }

    if let Some(target) = threshold(rules.target_pct) {
        if pnl_pct >= target {
            return ExitDecision::Exit {
                reason: CloseReason::Target,
                pnl_pct: round2(pnl_pct),
                message: format!("TARGET: +{:.1}%", pnl_pct),
            };
        }
    }

    if let Some(max_days) = rules.max_hold_days.filter(|d| *d != 0) {
        if days_held >= max_days {
            return ExitDecision::Exit {
                reason: CloseReason::MaxDays,
                pnl_pct: round2(pnl_pct),
                message: format!("TIMEOUT after {} days: {:+.1}%", days_held, pnl_pct),
            };
        }
    }

    ExitDecision::Hold {
        pnl_pct: round2(pnl_pct),
    }
}

/// Evaluate standalone alerts. Checks are independent; zero, one or many may
/// fire in a single call, in field-declaration order.
pub fn evaluate_alerts(snapshot: &Snapshot, rules: &AlertRules) -> Vec<String> {
    let mut alerts = Vec::new();

    if let Some(level) = threshold(rules.price_above) {
        if snapshot.price > level {
            alerts.push(format!("Above ${}", level));
        }
    }
    if let Some(level) = threshold(rules.price_below) {
        if snapshot.price < level {
            alerts.push(format!("Below ${}", level));
        }
    }
    if let Some(change) = threshold(rules.daily_change_above) {
        if snapshot.daily_change_pct > change {
            alerts.push(format!("Pump {:+.1}%", snapshot.daily_change_pct));
        }
    }
    // Configured when negative, matching the original schema
    if let Some(change) = rules.daily_change_below.filter(|c| *c < 0.0) {
        if snapshot.daily_change_pct < change {
            alerts.push(format!("Dump {:.1}%", snapshot.daily_change_pct));
        }
    }

    alerts
}

fn tick(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "FAIL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snap(price: f64, change: f64, volume: u64) -> Snapshot {
        Snapshot {
            ticker: "TEST".to_string(),
            price,
            prev_close: price / (1.0 + change / 100.0),
            daily_change_pct: change,
            volume,
            high_5d: price * 1.1,
            low_5d: price * 0.9,
        }
    }

    fn open_position(entry_price: f64, days_ago: i64) -> Position {
        Position {
            id: "p1".to_string(),
            ticker: "TEST".to_string(),
            entry_price,
            entry_at: Utc::now() - Duration::days(days_ago),
            stop_loss: entry_price * 0.85,
            target: entry_price * 1.30,
        }
    }

    #[test]
    fn empty_rules_trivially_pass() {
        let eval = evaluate_entry(&snap(10.0, -5.0, 100), &EntryRules::default());
        assert!(eval.passed);
        assert!(eval.checks.is_empty());
    }

    #[test]
    fn zeroed_rules_behave_like_unset() {
        let rules = EntryRules {
            breakout_above: Some(0.0),
            min_daily_change_pct: Some(0.0),
            min_volume: Some(0),
        };
        let eval = evaluate_entry(&snap(10.0, -5.0, 100), &rules);
        assert!(eval.passed);
        assert!(eval.checks.is_empty());
    }

    #[test]
    fn entry_is_and_over_configured_checks() {
        let rules = EntryRules {
            breakout_above: Some(100.0),
            min_daily_change_pct: Some(3.0),
            min_volume: Some(1_000_000),
        };
        let eval = evaluate_entry(&snap(105.0, 4.0, 2_000_000), &rules);
        assert!(eval.passed);
        assert_eq!(eval.checks.len(), 3);

        // Volume too low blocks even with the other two passing
        let eval = evaluate_entry(&snap(105.0, 4.0, 500_000), &rules);
        assert!(!eval.passed);
        assert!(eval.checks[0].passed && eval.checks[1].passed && !eval.checks[2].passed);
    }

    #[test]
    fn min_change_boundary_is_inclusive() {
        let rules = EntryRules {
            min_daily_change_pct: Some(3.0),
            ..Default::default()
        };
        assert!(!evaluate_entry(&snap(10.0, 2.9, 0), &rules).passed);
        assert!(evaluate_entry(&snap(10.0, 3.0, 0), &rules).passed);
    }

    #[test]
    fn breakout_is_strict() {
        let rules = EntryRules {
            breakout_above: Some(50.0),
            ..Default::default()
        };
        assert!(!evaluate_entry(&snap(50.0, 0.1, 0), &rules).passed);
        assert!(evaluate_entry(&snap(50.01, 0.1, 0), &rules).passed);
    }

    #[test]
    fn stop_loss_fires_at_minus_16() {
        let rules = ExitRules {
            stop_loss_pct: Some(15.0),
            target_pct: Some(30.0),
            max_hold_days: Some(30),
        };
        let decision = evaluate_exit(&snap(84.0, -1.0, 0), &rules, &open_position(100.0, 2), Utc::now());
        match decision {
            ExitDecision::Exit {
                reason, pnl_pct, ..
            } => {
                assert_eq!(reason, CloseReason::StopLoss);
                assert_eq!(pnl_pct, -16.0);
            }
            other => panic!("expected stop-loss exit, got {:?}", other),
        }
    }

    #[test]
    fn target_checked_before_max_days() {
        let rules = ExitRules {
            stop_loss_pct: Some(15.0),
            target_pct: Some(30.0),
            max_hold_days: Some(30),
        };
        let decision = evaluate_exit(&snap(131.0, 1.0, 0), &rules, &open_position(100.0, 5), Utc::now());
        match decision {
            ExitDecision::Exit {
                reason, pnl_pct, ..
            } => {
                assert_eq!(reason, CloseReason::Target);
                assert_eq!(pnl_pct, 31.0);
            }
            other => panic!("expected target exit, got {:?}", other),
        }
    }

    #[test]
    fn stop_loss_precedes_target_when_both_match() {
        // stop 1% and target -5%: an absurd config where a -3% move satisfies
        // both the stop (pnl <= -1) and the target (pnl >= -5); order wins.
        let rules = ExitRules {
            stop_loss_pct: Some(1.0),
            target_pct: Some(-5.0),
            max_hold_days: None,
        };
        let decision = evaluate_exit(&snap(97.0, -3.0, 0), &rules, &open_position(100.0, 0), Utc::now());
        assert!(matches!(
            decision,
            ExitDecision::Exit {
                reason: CloseReason::StopLoss,
                ..
            }
        ));
    }

    #[test]
    fn max_days_fires_on_boundary() {
        let rules = ExitRules {
            max_hold_days: Some(30),
            ..Default::default()
        };
        let hold = evaluate_exit(&snap(101.0, 0.5, 0), &rules, &open_position(100.0, 29), Utc::now());
        assert!(matches!(hold, ExitDecision::Hold { .. }));

        let exit = evaluate_exit(&snap(101.0, 0.5, 0), &rules, &open_position(100.0, 30), Utc::now());
        assert!(matches!(
            exit,
            ExitDecision::Exit {
                reason: CloseReason::MaxDays,
                ..
            }
        ));
    }

    #[test]
    fn hold_reports_rounded_pnl() {
        let rules = ExitRules {
            stop_loss_pct: Some(15.0),
            target_pct: Some(30.0),
            max_hold_days: None,
        };
        let decision = evaluate_exit(
            &snap(102.346, 1.0, 0),
            &rules,
            &open_position(100.0, 1),
            Utc::now(),
        );
        match decision {
            ExitDecision::Hold { pnl_pct } => assert_eq!(pnl_pct, 2.35),
            other => panic!("expected hold, got {:?}", other),
        }
    }

    #[test]
    fn unset_alerts_never_fire() {
        let alerts = evaluate_alerts(&snap(10.0, 99.0, 0), &AlertRules::default());
        assert!(alerts.is_empty());
    }

    #[test]
    fn multiple_alerts_fire_together() {
        let rules = AlertRules {
            price_above: Some(100.0),
            price_below: None,
            daily_change_above: Some(7.0),
            daily_change_below: Some(-7.0),
        };
        let alerts = evaluate_alerts(&snap(120.0, 8.5, 0), &rules);
        assert_eq!(alerts.len(), 2);
        assert!(alerts[0].contains("Above"));
        assert!(alerts[1].contains("Pump"));
    }

    #[test]
    fn change_below_requires_negative_threshold() {
        // A positive daily_change_below is treated as unconfigured
        let rules = AlertRules {
            daily_change_below: Some(5.0),
            ..Default::default()
        };
        assert!(evaluate_alerts(&snap(10.0, 1.0, 0), &rules).is_empty());

        let rules = AlertRules {
            daily_change_below: Some(-7.0),
            ..Default::default()
        };
        let alerts = evaluate_alerts(&snap(10.0, -8.2, 0), &rules);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("Dump"));
    }
}
