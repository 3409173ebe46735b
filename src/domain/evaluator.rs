//! Rule evaluator
//!
//! Pure function over `(rules, snapshot, starting_balance)`. No I/O, no
//! clock reads; all time comes from the snapshot's broker-local timestamp.
//! Breach ordering in the returned list matches the check order below.

use chrono::Datelike;

use crate::domain::rules::{BreachCode, BreachLevel, PropRules, RuleBreach};
use crate::domain::snapshot::AccountSnapshot;

/// Evaluate every rule against one snapshot. The snapshot's day-start
/// fields must already be stamped by the anchor tracker.
pub fn evaluate(
    rules: &PropRules,
    snapshot: &AccountSnapshot,
    starting_balance: f64,
) -> Vec<RuleBreach> {
    let mut breaches = Vec::new();
    let mut push = |code, level, message, value, threshold| {
        breaches.push(RuleBreach {
            code,
            level,
            message,
            value,
            threshold,
            account_id: snapshot.account_id.clone(),
            observed_at: snapshot.observed_at_server,
        });
    };

    check_daily_drawdown(rules, snapshot, &mut push);
    check_total_drawdown(rules, snapshot, starting_balance, &mut push);
    check_risk_per_trade(rules, snapshot, &mut push);
    check_max_lots(rules, snapshot, &mut push);
    check_max_positions(rules, snapshot, &mut push);
    check_margin_level(rules, snapshot, &mut push);
    check_stop_losses(rules, snapshot, &mut push);
    check_leverage(rules, snapshot, &mut push);

    breaches
}

type Push<'a> = &'a mut dyn FnMut(BreachCode, BreachLevel, String, Option<f64>, Option<f64>);

/// HARD at or past the limit, WARN at or past `warn_buffer * limit`.
fn drawdown_level(pct: f64, limit: f64, warn_buffer: f64) -> Option<BreachLevel> {
    if pct >= limit {
        Some(BreachLevel::Hard)
    } else if pct >= warn_buffer * limit {
        Some(BreachLevel::Warn)
    } else {
        None
    }
}

fn is_weekend(snapshot: &AccountSnapshot) -> bool {
    matches!(
        snapshot.observed_at_server.weekday(),
        chrono::Weekday::Sat | chrono::Weekday::Sun
    )
}

/// Daily drawdown, "whichever is worse": loss measured from the day-start
/// anchor by both realized balance and mark-to-market equity, taking the
/// larger of the two.
fn check_daily_drawdown(rules: &PropRules, snapshot: &AccountSnapshot, push: Push) {
    let limit = rules.max_daily_drawdown_pct;
    if limit <= 0.0 {
        return;
    }
    if rules.trading_days_only && is_weekend(snapshot) {
        return;
    }

    let anchor = snapshot.day_start_anchor();
    if anchor <= 0.0 {
        return;
    }

    let loss_by_equity = (anchor - snapshot.equity).max(0.0);
    let loss_by_balance = (anchor - snapshot.balance).max(0.0);
    let loss = loss_by_equity.max(loss_by_balance);
    let pct = 100.0 * loss / anchor;

    if let Some(level) = drawdown_level(pct, limit, rules.warn_buffer_pct) {
        let message = match level {
            BreachLevel::Hard => format!(
                "Daily drawdown {pct:.2}% breaches the {limit}% limit (anchor ${anchor:.2})"
            ),
            BreachLevel::Warn => format!(
                "Daily drawdown warning: {pct:.2}% of the {limit}% limit used (anchor ${anchor:.2})"
            ),
        };
        push(
            BreachCode::DailyDrawdown,
            level,
            message,
            Some(pct),
            Some(limit),
        );
    }
}

/// Total drawdown from the account's initial funded balance.
fn check_total_drawdown(
    rules: &PropRules,
    snapshot: &AccountSnapshot,
    starting_balance: f64,
    push: Push,
) {
    let limit = rules.max_total_drawdown_pct;
    if limit <= 0.0 || starting_balance <= 0.0 {
        return;
    }

    let loss = (starting_balance - snapshot.equity).max(0.0);
    let pct = 100.0 * loss / starting_balance;

    if let Some(level) = drawdown_level(pct, limit, rules.warn_buffer_pct) {
        let message = match level {
            BreachLevel::Hard => format!(
                "Total drawdown {pct:.2}% breaches the {limit}% limit (from ${starting_balance:.2})"
            ),
            BreachLevel::Warn => format!(
                "Total drawdown warning: {pct:.2}% of the {limit}% limit used"
            ),
        };
        push(
            BreachCode::TotalDrawdown,
            level,
            message,
            Some(pct),
            Some(limit),
        );
    }
}

/// Per-position notional exposure as a percentage of equity. Positions with
/// unknown contract size cannot be priced; those produce a single advisory
/// warning instead of a numeric breach.
fn check_risk_per_trade(rules: &PropRules, snapshot: &AccountSnapshot, push: Push) {
    let limit = rules.max_risk_per_trade_pct;
    if limit <= 0.0 || snapshot.equity <= 0.0 {
        return;
    }

    let mut unknown_notional = 0usize;
    for position in &snapshot.positions {
        let Some(notional) = position.notional() else {
            unknown_notional += 1;
            continue;
        };
        let pct = 100.0 * notional / snapshot.equity;
        if let Some(level) = drawdown_level(pct, limit, rules.warn_buffer_pct) {
            let message = match level {
                BreachLevel::Hard => format!(
                    "Position {} ({}) risks {pct:.2}% of equity, limit {limit}%",
                    position.id, position.symbol
                ),
                BreachLevel::Warn => format!(
                    "Position {} ({}) risk warning: {pct:.2}% of equity, limit {limit}%",
                    position.id, position.symbol
                ),
            };
            push(
                BreachCode::RiskPerTrade,
                level,
                message,
                Some(pct),
                Some(limit),
            );
        }
    }

    if unknown_notional > 0 {
        push(
            BreachCode::RiskPerTrade,
            BreachLevel::Warn,
            format!(
                "Notional unavailable for {unknown_notional} position(s); per-trade risk not verified"
            ),
            None,
            None,
        );
    }
}

/// Total open lots. HARD only when strictly over the limit.
fn check_max_lots(rules: &PropRules, snapshot: &AccountSnapshot, push: Push) {
    let limit = rules.max_open_lots;
    if limit <= 0.0 {
        return;
    }

    let total = snapshot.total_open_lots();
    if total > limit {
        push(
            BreachCode::MaxLots,
            BreachLevel::Hard,
            format!("Open volume {total:.2} lots exceeds the {limit} lot limit"),
            Some(total),
            Some(limit),
        );
    } else if total >= rules.warn_buffer_pct * limit {
        push(
            BreachCode::MaxLots,
            BreachLevel::Warn,
            format!("Open volume warning: {total:.2} of {limit} lots in use"),
            Some(total),
            Some(limit),
        );
    }
}

/// Position count. HARD only; no warning threshold.
fn check_max_positions(rules: &PropRules, snapshot: &AccountSnapshot, push: Push) {
    let limit = rules.max_positions;
    if limit == 0 {
        return;
    }

    let count = snapshot.positions.len();
    if count > limit {
        push(
            BreachCode::MaxPositions,
            BreachLevel::Hard,
            format!("{count} open positions exceed the limit of {limit}"),
            Some(count as f64),
            Some(limit as f64),
        );
    }
}

/// Margin level. Skipped entirely when no margin is in use.
fn check_margin_level(rules: &PropRules, snapshot: &AccountSnapshot, push: Push) {
    if snapshot.margin_used <= 0.0 {
        return;
    }

    let level = snapshot.margin_level_pct();
    if level <= rules.margin_critical_level_pct {
        push(
            BreachCode::MarginLevel,
            BreachLevel::Hard,
            format!(
                "Margin level critically low at {level:.2}% (critical threshold {}%)",
                rules.margin_critical_level_pct
            ),
            Some(level),
            Some(rules.margin_critical_level_pct),
        );
    } else if level <= rules.margin_warn_level_pct {
        push(
            BreachCode::MarginLevel,
            BreachLevel::Warn,
            format!(
                "Margin level low at {level:.2}% (warning threshold {}%)",
                rules.margin_warn_level_pct
            ),
            Some(level),
            Some(rules.margin_warn_level_pct),
        );
    }
}

fn check_stop_losses(rules: &PropRules, snapshot: &AccountSnapshot, push: Push) {
    if !rules.require_stop_loss {
        return;
    }

    for position in &snapshot.positions {
        if position.stop_loss.is_none() {
            push(
                BreachCode::MissingStopLoss,
                BreachLevel::Warn,
                format!(
                    "Position {} ({}) has no stop loss attached",
                    position.id, position.symbol
                ),
                None,
                None,
            );
        }
    }
}

fn check_leverage(rules: &PropRules, snapshot: &AccountSnapshot, push: Push) {
    let (Some(limit), Some(leverage)) = (rules.max_leverage, snapshot.account_leverage) else {
        return;
    };

    if leverage > limit {
        push(
            BreachCode::Leverage,
            BreachLevel::Hard,
            format!("Account leverage 1:{leverage:.0} exceeds the allowed 1:{limit:.0}"),
            Some(leverage),
            Some(limit),
        );
    }
}
