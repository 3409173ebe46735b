//! MetaTrader 5 adapter (REST bridge client).

pub mod client;
pub mod types;

pub use client::Mt5Client;
