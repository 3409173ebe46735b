//! Ports Layer - Trait definitions for external dependencies
//!
//! Following hexagonal architecture, these traits abstract:
//! - Trading platforms (MT5 bridge, cTrader Open API)
//! - The extracted-rules store
//! - Notification sinks

pub mod mocks;
pub mod notifier;
pub mod platform;
pub mod rule_store;

pub use notifier::NotifierSink;
pub use platform::{PlatformError, PlatformPort};
pub use rule_store::{RuleStorePort, SoftRuleInsight, StoreError};
