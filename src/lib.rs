//! Guardian - Prop-Firm Compliance Monitor Library
//!
//! Real-time rule compliance monitoring for proprietary-trading accounts on
//! MetaTrader 5 and cTrader.
//!
//! # Modules
//!
//! - `domain`: Core compliance logic (rules, snapshots, day anchor, evaluator)
//! - `ports`: Trait abstractions (platform, rule store, notifier sinks)
//! - `adapters`: External implementations (MT5 bridge, cTrader, SQLite, terminal)
//! - `config`: Account-set and credential loading
//! - `application`: Resolver, per-account monitors, dispatcher, supervisor
//! - `api`: Stateless HTTP review endpoint

pub mod adapters;
pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
