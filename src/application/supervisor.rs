//! Supervisor
//!
//! Owns the monitor fleet: resolves rules for each configured account,
//! builds its platform adapter through an injected factory, spawns one
//! monitor task per account, and exposes a read-only status view. One
//! account failing to start never prevents the others from running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::application::dispatcher::Dispatcher;
use crate::application::monitor::{AccountMonitor, AccountStatus, MonitorState};
use crate::application::resolver::RuleResolver;
use crate::config::{AccountConfig, RulesSpec};
use crate::ports::platform::PlatformPort;

/// Builds a platform adapter for one account. Injected so tests can hand
/// the supervisor mock platforms.
pub type PlatformFactory =
    Arc<dyn Fn(&AccountConfig) -> anyhow::Result<Box<dyn PlatformPort>> + Send + Sync>;

/// How long monitors get to wind down after the shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Cloneable read handle over every monitor's published status.
#[derive(Clone, Default)]
pub struct StatusView {
    entries: Arc<Vec<(String, Arc<RwLock<AccountStatus>>)>>,
}

impl StatusView {
    pub async fn snapshot(&self) -> Vec<AccountStatus> {
        let mut out = Vec::with_capacity(self.entries.len());
        for (_, status) in self.entries.iter() {
            out.push(status.read().await.clone());
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<MonitorState>)>,
    status_view: StatusView,
    grace: Duration,
}

impl Supervisor {
    /// Resolve rules and spawn a monitor for every enabled account. Accounts
    /// that fail to resolve or to build an adapter are logged and skipped.
    pub async fn start(
        accounts: Vec<AccountConfig>,
        resolver: &RuleResolver,
        platform_factory: PlatformFactory,
        dispatcher: Dispatcher,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let mut tasks = Vec::new();
        let mut statuses = Vec::new();

        for account in accounts {
            if !account.enabled {
                tracing::debug!(account = %account.label, "account disabled; skipping");
                continue;
            }

            // The rules field narrows the resolver inputs: a preset name
            // replaces the firm key and skips the store tier, an inline
            // block feeds the custom tier.
            let (firm, program_id, custom) = match &account.rules {
                Some(RulesSpec::Preset(name)) => (name.clone(), None, None),
                Some(RulesSpec::Inline(rules)) => (
                    account.firm.clone(),
                    account.program_id.clone(),
                    Some(rules.clone()),
                ),
                None => (account.firm.clone(), account.program_id.clone(), None),
            };

            let resolved = match resolver
                .resolve(&firm, program_id.as_deref(), custom.as_ref())
                .await
            {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::error!(account = %account.label, error = %e, "cannot resolve rules; account not monitored");
                    continue;
                }
            };
            tracing::info!(
                account = %account.label,
                rules = %resolved.rules.name,
                source = %resolved.source,
                "rules resolved"
            );

            let platform = match platform_factory(&account) {
                Ok(platform) => platform,
                Err(e) => {
                    tracing::error!(account = %account.label, error = %e, "cannot build platform adapter; account not monitored");
                    continue;
                }
            };

            let label = account.label.clone();
            let monitor = AccountMonitor::new(
                account,
                resolved.rules,
                platform,
                dispatcher.clone(),
                shutdown_tx.subscribe(),
            );
            statuses.push((label.clone(), monitor.status_handle()));
            tasks.push((label, tokio::spawn(monitor.run())));
        }

        tracing::info!(monitors = tasks.len(), "supervisor started");

        Self {
            shutdown_tx,
            tasks,
            status_view: StatusView {
                entries: Arc::new(statuses),
            },
            grace: SHUTDOWN_GRACE,
        }
    }

    #[cfg(test)]
    fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Number of monitors actually running.
    pub fn monitor_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn status_view(&self) -> StatusView {
        self.status_view.clone()
    }

    /// Signal every monitor and wait up to the grace period for each to
    /// finish its in-flight evaluation and exit.
    pub async fn shutdown(self) {
        tracing::info!("supervisor shutting down; cancelling monitors");
        let _ = self.shutdown_tx.send(true);

        for (label, task) in self.tasks {
            match tokio::time::timeout(self.grace, task).await {
                Ok(Ok(state)) => {
                    tracing::info!(account = %label, state = %state, "monitor finished")
                }
                Ok(Err(e)) => {
                    tracing::error!(account = %label, error = %e, "monitor task panicked")
                }
                Err(_) => {
                    tracing::warn!(account = %label, "monitor exceeded shutdown grace; aborting");
                }
            }
        }
    }
}
