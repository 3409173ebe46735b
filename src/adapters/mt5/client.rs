//! MT5 bridge client
//!
//! Talks to the MetaTrader 5 REST bridge over HTTP: login for a bearer
//! session token, then account/position/time reads. The broker's UTC offset
//! is detected once from the bridge's tick-stamped server time and cached;
//! if detection fails the adapter errors instead of guessing.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::adapters::mt5::types::{
    AccountInfoResponse, HistoryResponse, LoginRequest, LoginResponse, PositionResponse,
    ServerTimeResponse, SymbolInfoResponse,
};
use crate::config::Mt5Credentials;
use crate::domain::snapshot::{AccountSnapshot, Platform, Position, Side};
use crate::ports::platform::{PlatformError, PlatformPort};

/// Per-request operation timeout.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Mt5Client {
    credentials: Mt5Credentials,
    account_number: i64,
    http: Client,
    session_token: Option<String>,
    /// Broker offset from UTC, whole hours, cached after first detection.
    server_offset_hours: Option<i64>,
    /// Contract sizes by symbol; MT5 symbol metadata is static per session.
    contract_sizes: HashMap<String, Option<f64>>,
}

impl Mt5Client {
    pub fn new(credentials: Mt5Credentials, account_id: &str) -> Result<Self, PlatformError> {
        let account_number: i64 = account_id
            .parse()
            .map_err(|_| PlatformError::Protocol(format!("MT5 account id must be numeric, got '{account_id}'")))?;

        let http = Client::builder()
            .timeout(OPERATION_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Protocol(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            credentials,
            account_number,
            http,
            session_token: None,
            server_offset_hours: None,
            contract_sizes: HashMap::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.credentials.bridge_url.trim_end_matches('/'))
    }

    fn token(&self) -> Result<&str, PlatformError> {
        self.session_token
            .as_deref()
            .ok_or(PlatformError::NotConnected)
    }

    fn map_transport_error(e: reqwest::Error) -> PlatformError {
        if e.is_timeout() || e.is_connect() {
            PlatformError::Transient(e.to_string())
        } else {
            PlatformError::Protocol(e.to_string())
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlatformError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(self.token()?)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(PlatformError::Auth(format!("bridge rejected session on {path}")))
            }
            status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                Err(PlatformError::Transient(format!("{path} returned {status}")))
            }
            status if !status.is_success() => {
                Err(PlatformError::Protocol(format!("{path} returned {status}")))
            }
            _ => response
                .json()
                .await
                .map_err(|e| PlatformError::Protocol(format!("decoding {path}: {e}"))),
        }
    }

    /// Detect and cache the broker's UTC offset by comparing the bridge's
    /// server-stamped time against our wall clock, rounded to whole hours
    /// (brokers sit on whole-hour offsets, typically UTC+2/UTC+3).
    async fn detect_server_offset(&mut self) -> Result<i64, PlatformError> {
        if let Some(offset) = self.server_offset_hours {
            return Ok(offset);
        }

        let raw: ServerTimeResponse = self.get_json("/api/v1/server-time").await?;
        let server_time = NaiveDateTime::parse_from_str(&raw.server_time, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|e| {
                PlatformError::Protocol(format!("unparseable server time '{}': {e}", raw.server_time))
            })?;

        let delta_secs = (server_time - Utc::now().naive_utc()).num_seconds();
        let offset = (delta_secs as f64 / 3600.0).round() as i64;
        tracing::info!(account = self.account_number, offset_hours = offset, "detected MT5 broker offset");
        self.server_offset_hours = Some(offset);
        Ok(offset)
    }

    fn broker_now(&self, offset_hours: i64) -> NaiveDateTime {
        (Utc::now() + chrono::Duration::hours(offset_hours)).naive_utc()
    }

    async fn contract_size(&mut self, symbol: &str) -> Option<f64> {
        if let Some(cached) = self.contract_sizes.get(symbol) {
            return *cached;
        }

        let size = match self
            .get_json::<SymbolInfoResponse>(&format!("/api/v1/symbol/{symbol}"))
            .await
        {
            Ok(info) => Some(info.trade_contract_size),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "no contract size; notional checks degrade for this symbol");
                None
            }
        };
        self.contract_sizes.insert(symbol.to_string(), size);
        size
    }

    /// Realized P/L of deals closed since broker midnight. Only exit deals
    /// carry profit; commission and swap are settled with them.
    async fn realized_pl_today(&self, broker_now: NaiveDateTime) -> Result<f64, PlatformError> {
        let history: HistoryResponse = self.get_json("/api/v1/history?from_days_ago=2").await?;
        let midnight = broker_now.date().and_time(chrono::NaiveTime::MIN);

        let total = history
            .deals
            .iter()
            .filter(|deal| deal.entry == 1)
            .filter(|deal| {
                DateTime::from_timestamp(deal.time, 0)
                    .map(|t| t.naive_utc() >= midnight)
                    .unwrap_or(false)
            })
            .map(|deal| deal.profit + deal.commission + deal.swap)
            .sum();
        Ok(total)
    }

    fn convert_position(&mut self, raw: &PositionResponse, contract_size: Option<f64>) -> Position {
        Position {
            id: raw.ticket.to_string(),
            symbol: raw.symbol.clone(),
            side: if raw.position_type == 0 {
                Side::Long
            } else {
                Side::Short
            },
            volume_lots: raw.volume,
            open_price: raw.price_open,
            current_price: raw.price_current,
            stop_loss: (raw.sl != 0.0).then_some(raw.sl),
            take_profit: (raw.tp != 0.0).then_some(raw.tp),
            unrealized_pl: raw.profit,
            open_time: DateTime::from_timestamp(raw.time, 0).unwrap_or_else(Utc::now),
            commission: raw.commission,
            swap: raw.swap,
            contract_size,
        }
    }
}

#[async_trait]
impl PlatformPort for Mt5Client {
    async fn connect(&mut self) -> Result<(), PlatformError> {
        let request = LoginRequest {
            account_number: self.account_number,
            password: self.credentials.password.clone(),
            server: self.credentials.server.clone(),
        };

        let response = self
            .http
            .post(self.url("/api/v1/login"))
            .json(&request)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(PlatformError::Auth(format!(
                "MT5 login rejected for account {} on {}",
                self.account_number, self.credentials.server
            ))),
            StatusCode::SERVICE_UNAVAILABLE => Err(PlatformError::Transient(
                "MT5 bridge temporarily unavailable".to_string(),
            )),
            status if !status.is_success() => {
                Err(PlatformError::Protocol(format!("login returned {status}")))
            }
            _ => {
                let login: LoginResponse = response
                    .json()
                    .await
                    .map_err(|e| PlatformError::Protocol(format!("decoding login: {e}")))?;
                self.session_token = Some(login.session_token);
                tracing::info!(
                    account = self.account_number,
                    server = %self.credentials.server,
                    "connected to MT5 bridge"
                );
                // Pin the broker offset while the session is fresh.
                self.detect_server_offset().await?;
                Ok(())
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Ok(token) = self.token() {
            let _ = self
                .http
                .post(self.url("/api/v1/logout"))
                .bearer_auth(token)
                .send()
                .await;
        }
        self.session_token = None;
    }

    async fn server_time(&mut self) -> Result<NaiveDateTime, PlatformError> {
        let offset = self.detect_server_offset().await?;
        Ok(self.broker_now(offset))
    }

    async fn snapshot(&mut self) -> Result<AccountSnapshot, PlatformError> {
        let offset = self.detect_server_offset().await?;
        let account: AccountInfoResponse = self.get_json("/api/v1/account").await?;
        let raw_positions: Vec<PositionResponse> = self.get_json("/api/v1/positions").await?;

        let observed_at_server = self.broker_now(offset);
        let realized_pl_today = self.realized_pl_today(observed_at_server).await?;

        let mut positions = Vec::with_capacity(raw_positions.len());
        for raw in &raw_positions {
            let contract_size = self.contract_size(&raw.symbol).await;
            positions.push(self.convert_position(raw, contract_size));
        }

        Ok(AccountSnapshot {
            account_id: account.login.to_string(),
            platform: Platform::Mt5,
            currency: account.currency,
            balance: account.balance,
            equity: account.equity,
            margin_used: account.margin,
            margin_free: account.margin_free,
            realized_pl_today,
            day_start_balance: 0.0,
            day_start_equity: 0.0,
            positions,
            account_leverage: Some(account.leverage as f64),
            observed_at_server,
            observed_at_wall: Utc::now(),
        })
    }

    async fn leverage(&mut self) -> Result<Option<f64>, PlatformError> {
        let account: AccountInfoResponse = self.get_json("/api/v1/account").await?;
        Ok(Some(account.leverage as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Mt5Credentials {
        Mt5Credentials {
            bridge_url: "http://127.0.0.1:8000/".to_string(),
            password: "secret".to_string(),
            server: "Demo-Server".to_string(),
        }
    }

    #[test]
    fn account_id_must_be_numeric() {
        assert!(Mt5Client::new(credentials(), "12345678").is_ok());
        assert!(matches!(
            Mt5Client::new(credentials(), "not-a-number"),
            Err(PlatformError::Protocol(_))
        ));
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = Mt5Client::new(credentials(), "1").unwrap();
        assert_eq!(client.url("/api/v1/account"), "http://127.0.0.1:8000/api/v1/account");
    }

    #[test]
    fn requests_fail_before_connect() {
        let client = Mt5Client::new(credentials(), "1").unwrap();
        assert!(matches!(client.token(), Err(PlatformError::NotConnected)));
    }

    #[test]
    fn zero_sl_tp_map_to_none() {
        let mut client = Mt5Client::new(credentials(), "1").unwrap();
        let raw = PositionResponse {
            ticket: 42,
            time: 1_700_000_000,
            position_type: 1,
            volume: 0.5,
            price_open: 1.1,
            price_current: 1.09,
            sl: 0.0,
            tp: 1.2,
            profit: -50.0,
            swap: -1.2,
            commission: -3.5,
            symbol: "EURUSD".to_string(),
        };
        let position = client.convert_position(&raw, Some(100_000.0));
        assert_eq!(position.side, Side::Short);
        assert!(position.stop_loss.is_none());
        assert_eq!(position.take_profit, Some(1.2));
        assert_eq!(position.id, "42");
        assert_eq!(position.notional(), Some(0.5 * 100_000.0 * 1.09));
    }
}
