//! Configuration Loader
//!
//! Loads and validates the monitored-account set from an accounts.json file
//! or, for a single account, from environment variables. Platform
//! credentials never live in the accounts file; they come from the
//! environment (a local .env is loaded at startup).

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::domain::rules::PropRules;
use crate::domain::snapshot::Platform;

/// Configuration errors. These are startup-only and terminal: the process
/// exits with code 1.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid environment variable {name}: {reason}")]
    InvalidEnv { name: String, reason: String },
}

/// Where an account's rules come from when not left to the resolver chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RulesSpec {
    /// Name of a compiled-in preset, e.g. `"ftmo"`.
    Preset(String),
    /// Full inline rules object, used verbatim.
    Inline(PropRules),
}

fn default_check_interval() -> u64 {
    60
}

fn default_enabled() -> bool {
    true
}

/// One monitored account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub label: String,
    pub firm: String,
    #[serde(default)]
    pub program_id: Option<String>,
    pub platform: Platform,
    pub account_id: String,
    pub starting_balance: f64,
    /// Seconds between checks for this account.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Option<RulesSpec>,
}

impl AccountConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.label.trim().is_empty() {
            return Err(ConfigError::Validation("account label cannot be empty".to_string()));
        }
        if self.firm.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "account '{}': firm cannot be empty",
                self.label
            )));
        }
        if self.account_id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "account '{}': account_id cannot be empty",
                self.label
            )));
        }
        if self.starting_balance <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "account '{}': starting_balance must be positive, got {}",
                self.label, self.starting_balance
            )));
        }
        if self.check_interval == 0 {
            return Err(ConfigError::Validation(format!(
                "account '{}': check_interval must be at least 1 second",
                self.label
            )));
        }
        if let Some(RulesSpec::Inline(rules)) = &self.rules {
            rules
                .validate()
                .map_err(|e| ConfigError::Validation(format!("account '{}': {e}", self.label)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AccountsFile {
    accounts: Vec<AccountConfig>,
}

/// Load and validate the account set from a JSON file.
pub fn load_accounts<P: AsRef<Path>>(path: P) -> Result<Vec<AccountConfig>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let file: AccountsFile = serde_json::from_str(&content)?;

    if file.accounts.is_empty() {
        return Err(ConfigError::Validation(
            "accounts file contains no accounts".to_string(),
        ));
    }
    for account in &file.accounts {
        account.validate()?;
    }

    let mut labels: Vec<&str> = file.accounts.iter().map(|a| a.label.as_str()).collect();
    labels.sort_unstable();
    labels.dedup();
    if labels.len() != file.accounts.len() {
        return Err(ConfigError::Validation(
            "account labels must be unique".to_string(),
        ));
    }

    Ok(file.accounts)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    env_var(name).ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
}

/// Build a single AccountConfig from `GUARDIAN_*` environment variables.
///
/// Returns `Ok(None)` when `GUARDIAN_ACCOUNT_ID` is unset, i.e. the env form
/// is not in use at all. Once the account id is present, the other required
/// fields must be too.
pub fn account_from_env() -> Result<Option<AccountConfig>, ConfigError> {
    let Some(account_id) = env_var("GUARDIAN_ACCOUNT_ID") else {
        return Ok(None);
    };

    let platform = match require_env("GUARDIAN_PLATFORM")?.to_lowercase().as_str() {
        "mt5" => Platform::Mt5,
        "ctrader" => Platform::Ctrader,
        other => {
            return Err(ConfigError::InvalidEnv {
                name: "GUARDIAN_PLATFORM".to_string(),
                reason: format!("must be 'mt5' or 'ctrader', got '{other}'"),
            })
        }
    };

    let starting_balance: f64 = require_env("GUARDIAN_STARTING_BALANCE")?
        .parse()
        .map_err(|_| ConfigError::InvalidEnv {
            name: "GUARDIAN_STARTING_BALANCE".to_string(),
            reason: "must be a number".to_string(),
        })?;

    let check_interval = match env_var("GUARDIAN_CHECK_INTERVAL") {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidEnv {
            name: "GUARDIAN_CHECK_INTERVAL".to_string(),
            reason: "must be a whole number of seconds".to_string(),
        })?,
        None => default_check_interval(),
    };

    let firm = require_env("GUARDIAN_FIRM")?;
    let account = AccountConfig {
        label: env_var("GUARDIAN_LABEL").unwrap_or_else(|| format!("{firm}-{account_id}")),
        firm,
        program_id: env_var("GUARDIAN_PROGRAM_ID"),
        platform,
        account_id,
        starting_balance,
        check_interval,
        enabled: true,
        rules: env_var("GUARDIAN_RULES_PRESET").map(RulesSpec::Preset),
    };
    account.validate()?;
    Ok(Some(account))
}

// ---------------------------------------------------------------------------
// Platform credentials (environment only)
// ---------------------------------------------------------------------------

/// Connection settings for the MT5 REST bridge.
#[derive(Debug, Clone)]
pub struct Mt5Credentials {
    pub bridge_url: String,
    pub password: String,
    pub server: String,
}

impl Mt5Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bridge_url: env_var("MT5_BRIDGE_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8000".to_string()),
            password: require_env("MT5_PASSWORD")?,
            server: require_env("MT5_SERVER")?,
        })
    }
}

/// OAuth credentials for the cTrader Open API.
#[derive(Debug, Clone)]
pub struct CtraderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
}

impl CtraderCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: require_env("CTRADER_CLIENT_ID")?,
            client_secret: require_env("CTRADER_CLIENT_SECRET")?,
            access_token: require_env("CTRADER_ACCESS_TOKEN")?,
        })
    }
}

/// Path of the SQLite rule store, when configured. Tilde-expanded.
pub fn rules_db_path_from_env() -> Option<String> {
    env_var("GUARDIAN_RULES_DB").map(|p| shellexpand::tilde(&p).to_string())
}
