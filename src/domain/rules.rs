//! Rule model
//!
//! A `PropRules` value fully describes one firm/program's compliance
//! contract. Instances come from the rule store, the preset registry, or an
//! inline custom block in the account config; once resolved for an account
//! they are never mutated.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("Invalid rules '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Breach severity. HARD means a limit was met or exceeded, WARN means the
/// proximity threshold was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreachLevel {
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "HARD")]
    Hard,
}

impl std::fmt::Display for BreachLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreachLevel::Warn => write!(f, "WARN"),
            BreachLevel::Hard => write!(f, "HARD"),
        }
    }
}

/// The closed set of rule kinds the evaluator knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreachCode {
    #[serde(rename = "DAILY_DD")]
    DailyDrawdown,
    #[serde(rename = "TOTAL_DD")]
    TotalDrawdown,
    #[serde(rename = "RISK_PER_TRADE")]
    RiskPerTrade,
    #[serde(rename = "MAX_LOTS")]
    MaxLots,
    #[serde(rename = "MAX_POSITIONS")]
    MaxPositions,
    #[serde(rename = "MARGIN_LEVEL")]
    MarginLevel,
    #[serde(rename = "MISSING_STOP_LOSS")]
    MissingStopLoss,
    #[serde(rename = "LEVERAGE")]
    Leverage,
}

impl std::fmt::Display for BreachCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreachCode::DailyDrawdown => "DAILY_DD",
            BreachCode::TotalDrawdown => "TOTAL_DD",
            BreachCode::RiskPerTrade => "RISK_PER_TRADE",
            BreachCode::MaxLots => "MAX_LOTS",
            BreachCode::MaxPositions => "MAX_POSITIONS",
            BreachCode::MarginLevel => "MARGIN_LEVEL",
            BreachCode::MissingStopLoss => "MISSING_STOP_LOSS",
            BreachCode::Leverage => "LEVERAGE",
        };
        write!(f, "{s}")
    }
}

/// One rule breach produced by the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleBreach {
    pub code: BreachCode,
    pub level: BreachLevel,
    pub message: String,
    /// Observed quantity (percent, lots, count), if numeric.
    pub value: Option<f64>,
    /// The limit that applied, if numeric.
    pub threshold: Option<f64>,
    pub account_id: String,
    /// Broker-local time of the snapshot that produced this breach.
    pub observed_at: NaiveDateTime,
}

fn default_margin_warn() -> f64 {
    100.0
}

fn default_margin_critical() -> f64 {
    50.0
}

fn default_warn_buffer() -> f64 {
    0.8
}

/// Compliance contract for one firm program.
///
/// All `*_pct` limits are percentages of the relevant base (anchor, starting
/// balance, equity). Warnings fire at `warn_buffer_pct` of each limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropRules {
    /// Human label, e.g. "FTMO Challenge".
    pub name: String,
    /// Canonical program identifier, when the rules belong to one.
    #[serde(default)]
    pub program_id: Option<String>,
    pub max_daily_drawdown_pct: f64,
    pub max_total_drawdown_pct: f64,
    pub max_risk_per_trade_pct: f64,
    pub max_open_lots: f64,
    pub max_positions: usize,
    #[serde(default = "default_margin_warn")]
    pub margin_warn_level_pct: f64,
    #[serde(default = "default_margin_critical")]
    pub margin_critical_level_pct: f64,
    /// Count daily drawdown on weekdays only (broker calendar).
    #[serde(default)]
    pub trading_days_only: bool,
    /// Warn about positions with no stop loss attached.
    #[serde(default)]
    pub require_stop_loss: bool,
    #[serde(default)]
    pub max_leverage: Option<f64>,
    /// Warnings fire at `warn_buffer_pct * limit`. Must be in (0, 1].
    #[serde(default = "default_warn_buffer")]
    pub warn_buffer_pct: f64,
}

impl PropRules {
    /// Check the structural invariants: percent fields non-negative,
    /// `warn_buffer_pct` in (0, 1].
    pub fn validate(&self) -> Result<(), RulesError> {
        let invalid = |reason: String| RulesError::Invalid {
            name: self.name.clone(),
            reason,
        };

        let pct_fields = [
            ("max_daily_drawdown_pct", self.max_daily_drawdown_pct),
            ("max_total_drawdown_pct", self.max_total_drawdown_pct),
            ("max_risk_per_trade_pct", self.max_risk_per_trade_pct),
            ("margin_warn_level_pct", self.margin_warn_level_pct),
            ("margin_critical_level_pct", self.margin_critical_level_pct),
        ];
        for (field, value) in pct_fields {
            if value < 0.0 {
                return Err(invalid(format!("{field} must be non-negative, got {value}")));
            }
        }

        if self.max_open_lots < 0.0 {
            return Err(invalid(format!(
                "max_open_lots must be non-negative, got {}",
                self.max_open_lots
            )));
        }

        if self.warn_buffer_pct <= 0.0 || self.warn_buffer_pct > 1.0 {
            return Err(invalid(format!(
                "warn_buffer_pct must be in (0, 1], got {}",
                self.warn_buffer_pct
            )));
        }

        if let Some(lev) = self.max_leverage {
            if lev <= 0.0 {
                return Err(invalid(format!("max_leverage must be positive, got {lev}")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_rules() -> PropRules {
        PropRules {
            name: "Test Rules".to_string(),
            program_id: None,
            max_daily_drawdown_pct: 5.0,
            max_total_drawdown_pct: 10.0,
            max_risk_per_trade_pct: 1.0,
            max_open_lots: 10.0,
            max_positions: 10,
            margin_warn_level_pct: 100.0,
            margin_critical_level_pct: 50.0,
            trading_days_only: false,
            require_stop_loss: false,
            max_leverage: None,
            warn_buffer_pct: 0.8,
        }
    }

    #[test]
    fn valid_rules_pass_validation() {
        assert!(base_rules().validate().is_ok());
    }

    #[test]
    fn negative_percent_rejected() {
        let mut rules = base_rules();
        rules.max_daily_drawdown_pct = -1.0;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn warn_buffer_out_of_range_rejected() {
        let mut rules = base_rules();
        rules.warn_buffer_pct = 0.0;
        assert!(rules.validate().is_err());

        rules.warn_buffer_pct = 1.5;
        assert!(rules.validate().is_err());

        rules.warn_buffer_pct = 1.0;
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn json_round_trip_is_identity() {
        let rules = base_rules();
        let json = serde_json::to_string(&rules).unwrap();
        let back: PropRules = serde_json::from_str(&json).unwrap();
        assert_eq!(rules, back);
    }

    #[test]
    fn unknown_fields_rejected() {
        let json = r#"{
            "name": "X",
            "max_daily_drawdown_pct": 5.0,
            "max_total_drawdown_pct": 10.0,
            "max_risk_per_trade_pct": 1.0,
            "max_open_lots": 10.0,
            "max_positions": 10,
            "definitely_not_a_field": true
        }"#;
        assert!(serde_json::from_str::<PropRules>(json).is_err());
    }

    #[test]
    fn optional_fields_get_defaults() {
        let json = r#"{
            "name": "Minimal",
            "max_daily_drawdown_pct": 5.0,
            "max_total_drawdown_pct": 10.0,
            "max_risk_per_trade_pct": 1.0,
            "max_open_lots": 10.0,
            "max_positions": 10
        }"#;
        let rules: PropRules = serde_json::from_str(json).unwrap();
        assert_eq!(rules.margin_warn_level_pct, 100.0);
        assert_eq!(rules.margin_critical_level_pct, 50.0);
        assert_eq!(rules.warn_buffer_pct, 0.8);
        assert!(!rules.trading_days_only);
        assert!(!rules.require_stop_loss);
        assert!(rules.max_leverage.is_none());
    }

    #[test]
    fn breach_codes_serialize_as_wire_names() {
        assert_eq!(
            serde_json::to_string(&BreachCode::DailyDrawdown).unwrap(),
            "\"DAILY_DD\""
        );
        assert_eq!(
            serde_json::to_string(&BreachLevel::Hard).unwrap(),
            "\"HARD\""
        );
        assert_eq!(BreachCode::MissingStopLoss.to_string(), "MISSING_STOP_LOSS");
    }
}
