//! Platform port
//!
//! The uniform, read-only view of a trading platform that every adapter
//! implements. The monitor loop drives this trait synchronously: one
//! snapshot is processed to completion before the next is fetched, whatever
//! the adapter's underlying transport looks like.
//!
//! Data-unit contract: monetary values are account-currency decimals (no
//! cent scaling past the adapter boundary), volumes are lots,
//! `server_time`/`observed_at_server` are broker-local, everything else UTC.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::snapshot::AccountSnapshot;

#[derive(Debug, Error)]
pub enum PlatformError {
    /// Credentials rejected. Terminal for the account.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network trouble, timeout, or rate limit. Retried with backoff.
    #[error("Transient platform error: {0}")]
    Transient(String),

    /// The platform answered with something we could not interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Not connected")]
    NotConnected,
}

impl PlatformError {
    /// Terminal errors move the account to FAILED; everything else is
    /// retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlatformError::Auth(_))
    }
}

/// Read-only account access for one platform. Implementations: the MT5
/// bridge client and the cTrader Open API client.
#[async_trait]
pub trait PlatformPort: Send + Sync {
    async fn connect(&mut self) -> Result<(), PlatformError>;

    async fn disconnect(&mut self);

    /// Current broker-local time. The adapter detects the broker's UTC
    /// offset on first use and errors out if it cannot; it never guesses.
    async fn server_time(&mut self) -> Result<NaiveDateTime, PlatformError>;

    /// Full account observation, everything except the day-start fields
    /// (those are stamped by the anchor tracker downstream).
    async fn snapshot(&mut self) -> Result<AccountSnapshot, PlatformError>;

    /// Account leverage, when the platform exposes it.
    async fn leverage(&mut self) -> Result<Option<f64>, PlatformError>;
}
