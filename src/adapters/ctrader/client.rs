//! cTrader Open API client
//!
//! Polls the REST surface of the Open API with a bearer access token. The
//! wire speaks cents and centilots; this client converts to account-currency
//! units and lots at the edge so nothing downstream ever sees the scaling.
//! Broker offset is detected from the most recent server-stamped deal and
//! cached; with no recent deal to compare against, the adapter errors rather
//! than guessing a timezone.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::adapters::ctrader::types::{
    AccountInfoResponse, DealsResponse, PositionsResponse,
};
use crate::config::CtraderCredentials;
use crate::domain::snapshot::{AccountSnapshot, Platform, Position, Side};
use crate::ports::platform::{PlatformError, PlatformPort};

const REST_BASE_URL: &str = "https://openapi.ctrader.com";
const OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Cents to account-currency units.
fn from_cents(v: f64) -> f64 {
    v / 100.0
}

pub struct CtraderClient {
    credentials: CtraderCredentials,
    account_id: String,
    base_url: String,
    http: Client,
    connected: bool,
    server_offset_hours: Option<i64>,
}

impl CtraderClient {
    pub fn new(credentials: CtraderCredentials, account_id: &str) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .timeout(OPERATION_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Protocol(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            credentials,
            account_id: account_id.to_string(),
            base_url: REST_BASE_URL.to_string(),
            http,
            connected: false,
            server_offset_hours: None,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/accounts/{}{path}", self.base_url, self.account_id)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, PlatformError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.credentials.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    PlatformError::Transient(e.to_string())
                } else {
                    PlatformError::Protocol(e.to_string())
                }
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PlatformError::Auth(
                "cTrader rejected the access token".to_string(),
            )),
            status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                Err(PlatformError::Transient(format!("cTrader returned {status}")))
            }
            status if !status.is_success() => {
                Err(PlatformError::Protocol(format!("cTrader returned {status}")))
            }
            _ => response
                .json()
                .await
                .map_err(|e| PlatformError::Protocol(format!("decoding cTrader response: {e}"))),
        }
    }

    async fn account_info(&self) -> Result<AccountInfoResponse, PlatformError> {
        self.get_json(&self.url("")).await
    }

    async fn deals_since(&self, from_millis: i64) -> Result<DealsResponse, PlatformError> {
        let url = format!("{}?from={from_millis}", self.url("/deals"));
        self.get_json(&url).await
    }

    /// Detect and cache the broker offset from the most recent deal
    /// timestamp. Surfaces an error when no recent deal exists to compare.
    async fn detect_server_offset(&mut self) -> Result<i64, PlatformError> {
        if let Some(offset) = self.server_offset_hours {
            return Ok(offset);
        }

        let day_ago = (Utc::now() - chrono::Duration::hours(24)).timestamp_millis();
        let deals = self.deals_since(day_ago).await?;
        let Some(latest) = deals.deals.iter().map(|d| d.execution_timestamp).max() else {
            return Err(PlatformError::Protocol(
                "cannot detect broker offset: no deal in the last 24h to compare against".to_string(),
            ));
        };

        let deal_time = DateTime::from_timestamp_millis(latest)
            .ok_or_else(|| PlatformError::Protocol(format!("bad deal timestamp {latest}")))?
            .naive_utc();
        let delta_secs = (deal_time - Utc::now().naive_utc()).num_seconds();
        let offset = (delta_secs as f64 / 3600.0).round() as i64;
        tracing::info!(account = %self.account_id, offset_hours = offset, "detected cTrader broker offset");
        self.server_offset_hours = Some(offset);
        Ok(offset)
    }

    fn broker_now(&self, offset_hours: i64) -> NaiveDateTime {
        (Utc::now() + chrono::Duration::hours(offset_hours)).naive_utc()
    }

    /// Realized P/L since broker midnight, summed over closing deals.
    async fn realized_pl_today(&self, broker_now: NaiveDateTime) -> Result<f64, PlatformError> {
        let midnight = broker_now.date().and_time(chrono::NaiveTime::MIN);
        let from_millis = midnight.and_utc().timestamp_millis();

        let deals = self.deals_since(from_millis).await?;
        Ok(deals.deals.iter().map(|d| from_cents(d.close_profit)).sum())
    }
}

#[async_trait]
impl PlatformPort for CtraderClient {
    async fn connect(&mut self) -> Result<(), PlatformError> {
        // The Open API has no session handshake; validate the token with an
        // account read and pin the broker offset while we are at it.
        self.account_info().await?;
        self.connected = true;
        self.detect_server_offset().await?;
        tracing::info!(account = %self.account_id, "connected to cTrader Open API");
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    async fn server_time(&mut self) -> Result<NaiveDateTime, PlatformError> {
        let offset = self.detect_server_offset().await?;
        Ok(self.broker_now(offset))
    }

    async fn snapshot(&mut self) -> Result<AccountSnapshot, PlatformError> {
        if !self.connected {
            return Err(PlatformError::NotConnected);
        }

        let offset = self.detect_server_offset().await?;
        let account = self.account_info().await?;
        let positions: PositionsResponse = self.get_json(&self.url("/positions")).await?;

        let observed_at_server = self.broker_now(offset);
        let realized_pl_today = self.realized_pl_today(observed_at_server).await?;

        let positions = positions
            .positions
            .iter()
            .map(|raw| Position {
                id: raw.position_id.to_string(),
                symbol: raw.symbol.clone(),
                side: if raw.trade_side == "BUY" {
                    Side::Long
                } else {
                    Side::Short
                },
                volume_lots: raw.volume / 100.0,
                open_price: raw.entry_price,
                current_price: raw.current_price,
                stop_loss: raw.stop_loss,
                take_profit: raw.take_profit,
                unrealized_pl: from_cents(raw.profit),
                open_time: DateTime::from_timestamp_millis(raw.open_timestamp)
                    .unwrap_or_else(Utc::now),
                commission: from_cents(raw.commission),
                swap: from_cents(raw.swap),
                // The Open API does not carry symbol contract sizes; risk
                // per trade degrades to an advisory for cTrader accounts.
                contract_size: None,
            })
            .collect();

        Ok(AccountSnapshot {
            account_id: self.account_id.clone(),
            platform: Platform::Ctrader,
            currency: account.deposit_currency.unwrap_or_else(|| "USD".to_string()),
            balance: from_cents(account.balance),
            equity: from_cents(account.equity),
            margin_used: from_cents(account.margin),
            margin_free: from_cents(account.margin_free),
            realized_pl_today,
            day_start_balance: 0.0,
            day_start_equity: 0.0,
            positions,
            account_leverage: account.leverage,
            observed_at_server,
            observed_at_wall: Utc::now(),
        })
    }

    async fn leverage(&mut self) -> Result<Option<f64>, PlatformError> {
        Ok(self.account_info().await?.leverage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> CtraderCredentials {
        CtraderCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            access_token: "token".to_string(),
        }
    }

    #[test]
    fn urls_are_scoped_to_the_account() {
        let client = CtraderClient::new(credentials(), "987654")
            .unwrap()
            .with_base_url("https://example.test/");
        assert_eq!(
            client.url("/positions"),
            "https://example.test/v2/accounts/987654/positions"
        );
        assert_eq!(client.url(""), "https://example.test/v2/accounts/987654");
    }

    #[test]
    fn cent_scaling() {
        assert_eq!(from_cents(10_000_000.0), 100_000.0);
        assert_eq!(from_cents(-550.0), -5.5);
    }

    #[test]
    fn snapshot_requires_connect_first() {
        let client = CtraderClient::new(credentials(), "987654").unwrap();
        assert!(!client.connected);
    }

    #[test]
    fn position_wire_fields_deserialize() {
        let json = r#"{
            "position": [{
                "positionId": 111,
                "symbol": "EURUSD",
                "volume": 150.0,
                "entryPrice": 1.1,
                "currentPrice": 1.11,
                "profit": 2500.0,
                "tradeSide": "SELL",
                "openTimestamp": 1700000000000
            }]
        }"#;
        let parsed: PositionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.positions.len(), 1);
        let p = &parsed.positions[0];
        assert_eq!(p.position_id, 111);
        assert_eq!(p.volume, 150.0);
        assert!(p.stop_loss.is_none());
    }
}
