//! Wire types for the cTrader Open API.
//!
//! All monetary wire values are cents and all volumes centilots; scaling to
//! account-currency units and lots happens in the client, never downstream.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfoResponse {
    /// Balance in cents.
    pub balance: f64,
    /// Equity in cents.
    pub equity: f64,
    /// Used margin in cents.
    #[serde(default)]
    pub margin: f64,
    /// Free margin in cents.
    #[serde(default)]
    pub margin_free: f64,
    #[serde(default)]
    pub leverage: Option<f64>,
    #[serde(default)]
    pub deposit_currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PositionsResponse {
    #[serde(default, rename = "position")]
    pub positions: Vec<PositionResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub position_id: i64,
    pub symbol: String,
    /// Volume in centilots.
    pub volume: f64,
    pub entry_price: f64,
    pub current_price: f64,
    /// Unrealized profit in cents.
    pub profit: f64,
    /// "BUY" or "SELL".
    pub trade_side: String,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    /// Commission in cents.
    #[serde(default)]
    pub commission: f64,
    /// Swap in cents.
    #[serde(default)]
    pub swap: f64,
    /// Open time, epoch milliseconds.
    #[serde(default)]
    pub open_timestamp: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct DealsResponse {
    #[serde(default, rename = "deal")]
    pub deals: Vec<DealResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealResponse {
    /// Realized profit of the closing deal, cents.
    #[serde(default)]
    pub close_profit: f64,
    /// Server-stamped execution time, epoch milliseconds.
    pub execution_timestamp: i64,
}
