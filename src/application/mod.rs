//! Application Layer - Orchestration of the monitoring engine
//!
//! Rule-source resolution, the per-account monitor loops, breach dispatch,
//! and the supervisor that owns the fleet.

pub mod dispatcher;
pub mod monitor;
pub mod resolver;
pub mod supervisor;

pub use dispatcher::{BreachDispatch, Dispatcher, DEFAULT_DISPATCH_BUFFER};
pub use monitor::{AccountMonitor, AccountStatus, MonitorState};
pub use resolver::{ResolveError, ResolvedRules, RuleResolver, RuleSource};
pub use supervisor::{PlatformFactory, StatusView, Supervisor, SHUTDOWN_GRACE};
