//! Account snapshot types
//!
//! The uniform read-only view of a trading account that every platform
//! adapter produces. Monetary values are account-currency decimals, volumes
//! are lots, `observed_at_server` is broker-local and everything else UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

/// Trading platform a monitored account lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mt5,
    Ctrader,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Mt5 => write!(f, "MT5"),
            Platform::Ctrader => write!(f, "cTrader"),
        }
    }
}

/// One open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub volume_lots: f64,
    pub open_price: f64,
    pub current_price: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    pub unrealized_pl: f64,
    pub open_time: DateTime<Utc>,
    #[serde(default)]
    pub commission: f64,
    #[serde(default)]
    pub swap: f64,
    /// Units of the base instrument per lot. Symbol metadata supplied by the
    /// adapter; when the adapter cannot resolve it, notional checks degrade
    /// to an advisory warning.
    #[serde(default)]
    pub contract_size: Option<f64>,
}

impl Position {
    /// Notional value in account currency, when contract size is known.
    pub fn notional(&self) -> Option<f64> {
        self.contract_size
            .map(|cs| self.volume_lots.abs() * cs * self.current_price)
    }
}

/// Instantaneous observation of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub platform: Platform,
    pub currency: String,

    /// Realized-only balance.
    pub balance: f64,
    /// Balance plus unrealized floating P/L.
    pub equity: f64,
    pub margin_used: f64,
    pub margin_free: f64,
    /// Realized P/L of deals closed since broker midnight.
    #[serde(default)]
    pub realized_pl_today: f64,

    /// Filled in by the day-anchor tracker before evaluation.
    #[serde(default)]
    pub day_start_balance: f64,
    #[serde(default)]
    pub day_start_equity: f64,

    pub positions: Vec<Position>,

    /// Account leverage as reported by the platform, when available.
    #[serde(default)]
    pub account_leverage: Option<f64>,

    /// Broker-local observation time.
    pub observed_at_server: NaiveDateTime,
    /// Our wall clock at observation time.
    pub observed_at_wall: DateTime<Utc>,
}

impl AccountSnapshot {
    /// Margin level as a percentage: `100 * equity / margin_used`, infinite
    /// when no margin is in use.
    pub fn margin_level_pct(&self) -> f64 {
        if self.margin_used > 0.0 {
            100.0 * self.equity / self.margin_used
        } else {
            f64::INFINITY
        }
    }

    /// The per-day reference point daily drawdown is measured against:
    /// whichever of the day-start balance and equity is higher.
    pub fn day_start_anchor(&self) -> f64 {
        self.day_start_balance.max(self.day_start_equity)
    }

    /// Sum of open volume across positions, in lots.
    pub fn total_open_lots(&self) -> f64 {
        self.positions.iter().map(|p| p.volume_lots.abs()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn snapshot(balance: f64, equity: f64, margin_used: f64) -> AccountSnapshot {
        AccountSnapshot {
            account_id: "12345".to_string(),
            platform: Platform::Mt5,
            currency: "USD".to_string(),
            balance,
            equity,
            margin_used,
            margin_free: equity - margin_used,
            realized_pl_today: 0.0,
            day_start_balance: balance,
            day_start_equity: equity,
            positions: vec![],
            account_leverage: None,
            observed_at_server: NaiveDate::from_ymd_opt(2025, 3, 4)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            observed_at_wall: Utc::now(),
        }
    }

    #[test]
    fn margin_level_infinite_with_no_margin_used() {
        let snap = snapshot(100_000.0, 100_000.0, 0.0);
        assert!(snap.margin_level_pct().is_infinite());
    }

    #[test]
    fn margin_level_is_equity_over_used() {
        let snap = snapshot(100_000.0, 100_000.0, 50_000.0);
        assert_eq!(snap.margin_level_pct(), 200.0);
    }

    #[test]
    fn day_start_anchor_uses_higher_of_balance_and_equity() {
        let mut snap = snapshot(98_000.0, 95_000.0, 0.0);
        snap.day_start_balance = 98_000.0;
        snap.day_start_equity = 100_000.0;
        assert_eq!(snap.day_start_anchor(), 100_000.0);
    }

    #[test]
    fn notional_requires_contract_size() {
        let mut pos = Position {
            id: "1".to_string(),
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            volume_lots: 0.5,
            open_price: 1.1,
            current_price: 1.2,
            stop_loss: None,
            take_profit: None,
            unrealized_pl: 50.0,
            open_time: Utc::now(),
            commission: 0.0,
            swap: 0.0,
            contract_size: None,
        };
        assert!(pos.notional().is_none());

        pos.contract_size = Some(100_000.0);
        assert_eq!(pos.notional(), Some(0.5 * 100_000.0 * 1.2));
    }

    #[test]
    fn total_open_lots_uses_absolute_volume() {
        let mut snap = snapshot(100_000.0, 100_000.0, 0.0);
        for (i, vol) in [1.5, -2.0].into_iter().enumerate() {
            snap.positions.push(Position {
                id: i.to_string(),
                symbol: "EURUSD".to_string(),
                side: if vol >= 0.0 { Side::Long } else { Side::Short },
                volume_lots: vol,
                open_price: 1.1,
                current_price: 1.1,
                stop_loss: None,
                take_profit: None,
                unrealized_pl: 0.0,
                open_time: Utc::now(),
                commission: 0.0,
                swap: 0.0,
                contract_size: None,
            });
        }
        assert_eq!(snap.total_open_lots(), 3.5);
    }
}
