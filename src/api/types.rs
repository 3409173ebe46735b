//! Wire types for the compliance review API.

use serde::{Deserialize, Serialize};

use crate::application::monitor::AccountStatus;
use crate::application::resolver::RuleSource;
use crate::domain::rules::{BreachCode, BreachLevel, RuleBreach};
use crate::ports::rule_store::SoftRuleInsight;

/// Caller-supplied open position.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionInput {
    pub position_id: String,
    pub symbol: String,
    /// Lots; sign carries direction for callers that do not set `side`.
    pub volume: f64,
    pub entry_price: f64,
    pub current_price: f64,
    /// Unrealized profit/loss in account currency.
    pub profit_loss: f64,
    /// "buy" or "sell".
    pub side: String,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub contract_size: Option<f64>,
}

/// Caller-supplied account state used for the evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountDataInput {
    pub balance: f64,
    pub equity: f64,
    /// Needed for total-drawdown checks; omitted means they are skipped.
    #[serde(default)]
    pub starting_balance: Option<f64>,
    /// Day-start fields default to the supplied balance/equity when absent.
    #[serde(default)]
    pub day_start_balance: Option<f64>,
    #[serde(default)]
    pub day_start_equity: Option<f64>,
    #[serde(default)]
    pub margin_used: f64,
    #[serde(default)]
    pub margin_available: f64,
    #[serde(default)]
    pub positions: Vec<PositionInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComplianceRequest {
    pub firm: String,
    #[serde(default)]
    pub program_id: Option<String>,
    /// Echoed back for client-side tracking; unused server-side.
    #[serde(default)]
    pub account_id: Option<String>,
    pub account: AccountDataInput,
    #[serde(default = "default_include_soft_rules")]
    pub include_soft_rules: bool,
}

fn default_include_soft_rules() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct BreachResponse {
    pub level: BreachLevel,
    pub code: BreachCode,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
}

impl From<&RuleBreach> for BreachResponse {
    fn from(b: &RuleBreach) -> Self {
        Self {
            level: b.level,
            code: b.code,
            message: b.message.clone(),
            value: b.value,
            threshold: b.threshold,
        }
    }
}

/// Overall result rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NeedsAttention,
    NonCompliant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceResponse {
    pub account_id: Option<String>,
    pub firm: String,
    pub program_id: Option<String>,
    pub rules_source: RuleSource,
    pub status: ComplianceStatus,
    pub hard_breaches: Vec<BreachResponse>,
    pub warnings: Vec<BreachResponse>,
    pub soft_rule_insights: Vec<SoftRuleInsight>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    /// Per-account monitor status when running in combined mode; empty for
    /// a standalone review server.
    pub accounts: Vec<AccountStatus>,
}
