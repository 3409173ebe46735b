//! Configuration Module
//!
//! Account-set loading from accounts.json or environment variables, plus
//! platform credentials (environment only).

pub mod loader;

pub use loader::{
    account_from_env, load_accounts, rules_db_path_from_env, AccountConfig, ConfigError,
    CtraderCredentials, Mt5Credentials, RulesSpec,
};
