//! Adapters Layer - External System Implementations
//!
//! Implementations of the port traits:
//! - MT5: REST bridge client for MetaTrader 5 terminals
//! - cTrader: Open API polling client
//! - Store: SQLite rule store (extraction pipeline output)
//! - Terminal: default notifier sink

pub mod ctrader;
pub mod mt5;
pub mod store;
pub mod terminal;

pub use ctrader::CtraderClient;
pub use mt5::Mt5Client;
pub use store::SqliteRuleStore;
pub use terminal::TerminalSink;
