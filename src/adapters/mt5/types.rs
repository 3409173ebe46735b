//! Wire types for the MT5 REST bridge.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub account_number: i64,
    pub password: String,
    pub server: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub session_token: String,
    #[allow(dead_code)]
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub struct AccountInfoResponse {
    pub login: i64,
    pub balance: f64,
    pub equity: f64,
    pub profit: f64,
    pub margin: f64,
    pub margin_free: f64,
    #[allow(dead_code)]
    pub margin_level: f64,
    pub leverage: i64,
    pub currency: String,
}

/// One open position as the bridge reports it (raw MT5 field names).
#[derive(Debug, Deserialize)]
pub struct PositionResponse {
    pub ticket: i64,
    /// Open time, unix seconds.
    pub time: i64,
    /// 0 = buy, 1 = sell.
    #[serde(rename = "type")]
    pub position_type: i32,
    pub volume: f64,
    pub price_open: f64,
    pub price_current: f64,
    /// Stop loss price; the terminal reports 0.0 when none is set.
    pub sl: f64,
    /// Take profit price; 0.0 when none is set.
    pub tp: f64,
    pub profit: f64,
    pub swap: f64,
    #[serde(default)]
    pub commission: f64,
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerTimeResponse {
    /// Broker-local time, ISO-8601 without offset.
    pub server_time: String,
}

#[derive(Debug, Deserialize)]
pub struct SymbolInfoResponse {
    #[allow(dead_code)]
    pub name: String,
    pub trade_contract_size: f64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    pub deals: Vec<DealResponse>,
}

#[derive(Debug, Deserialize)]
pub struct DealResponse {
    /// Deal time, unix seconds, server-stamped.
    pub time: i64,
    /// 0 = entry-in, 1 = entry-out. Only exits carry realized P/L.
    pub entry: i32,
    pub profit: f64,
    pub commission: f64,
    pub swap: f64,
}
