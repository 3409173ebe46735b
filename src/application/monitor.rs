//! Per-account monitor
//!
//! One independent loop per monitored account: fetch a snapshot, roll the
//! day anchor, evaluate the rules, hand breaches to the dispatcher, sleep
//! its own check interval. Transient platform trouble backs off and
//! reconnects; only an authentication failure or a shutdown signal ends the
//! loop.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::{watch, RwLock};

use crate::application::dispatcher::Dispatcher;
use crate::config::AccountConfig;
use crate::domain::anchor::DayAnchor;
use crate::domain::evaluator::evaluate;
use crate::domain::rules::{BreachLevel, PropRules};
use crate::ports::platform::{PlatformError, PlatformPort};

/// Monitor loop state, surfaced in the status view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Connecting,
    Observing,
    Reconnecting,
    Failed,
    Stopped,
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MonitorState::Connecting => "connecting",
            MonitorState::Observing => "observing",
            MonitorState::Reconnecting => "reconnecting",
            MonitorState::Failed => "failed",
            MonitorState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Read-only status snapshot published after every state change and check.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatus {
    pub label: String,
    pub state: MonitorState,
    pub last_snapshot_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_breach_summary: Option<String>,
    pub checks_completed: u64,
    pub equity: Option<f64>,
    pub realized_pl_today: Option<f64>,
}

impl AccountStatus {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: MonitorState::Connecting,
            last_snapshot_at: None,
            last_breach_summary: None,
            checks_completed: 0,
            equity: None,
            realized_pl_today: None,
        }
    }
}

/// Exponential backoff with full jitter: base 1s, factor 2, cap 60s.
struct Backoff {
    attempt: u32,
}

impl Backoff {
    const BASE_SECS: f64 = 1.0;
    const CAP_SECS: f64 = 60.0;

    fn new() -> Self {
        Self { attempt: 0 }
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_delay(&mut self) -> Duration {
        let ceiling = (Self::BASE_SECS * 2f64.powi(self.attempt as i32)).min(Self::CAP_SECS);
        self.attempt = self.attempt.saturating_add(1);
        let jittered = rand::thread_rng().gen_range(0.0..=ceiling);
        Duration::from_secs_f64(jittered)
    }
}

/// One account's monitoring loop. Owns its platform adapter and anchor
/// tracker exclusively; nothing here is shared except the published status.
pub struct AccountMonitor {
    config: AccountConfig,
    rules: PropRules,
    platform: Box<dyn PlatformPort>,
    dispatcher: Dispatcher,
    anchor: DayAnchor,
    status: Arc<RwLock<AccountStatus>>,
    shutdown: watch::Receiver<bool>,
}

impl AccountMonitor {
    pub fn new(
        config: AccountConfig,
        rules: PropRules,
        platform: Box<dyn PlatformPort>,
        dispatcher: Dispatcher,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let status = Arc::new(RwLock::new(AccountStatus::new(&config.label)));
        Self {
            config,
            rules,
            platform,
            dispatcher,
            anchor: DayAnchor::new(),
            status,
            shutdown,
        }
    }

    /// Handle for the supervisor's status view.
    pub fn status_handle(&self) -> Arc<RwLock<AccountStatus>> {
        Arc::clone(&self.status)
    }

    async fn publish<F: FnOnce(&mut AccountStatus)>(&self, update: F) {
        let mut status = self.status.write().await;
        update(&mut status);
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep that wakes early on shutdown. Returns false when shutdown was
    /// requested during the wait.
    async fn interruptible_sleep(&mut self, duration: Duration) -> bool {
        if self.shutdown_requested() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.shutdown.changed() => !self.shutdown_requested(),
        }
    }

    /// Drive the loop until a terminal state. Returns the state the monitor
    /// ended in (Failed or Stopped).
    pub async fn run(mut self) -> MonitorState {
        let label = self.config.label.clone();
        let check_interval = Duration::from_secs(self.config.check_interval);
        let mut backoff = Backoff::new();
        let mut state = MonitorState::Connecting;

        tracing::info!(
            account = %label,
            firm = %self.config.firm,
            platform = %self.config.platform,
            rules = %self.rules.name,
            interval_secs = self.config.check_interval,
            "monitor starting"
        );

        let terminal = loop {
            if self.shutdown_requested() {
                break MonitorState::Stopped;
            }

            match state {
                MonitorState::Connecting => match self.platform.connect().await {
                    Ok(()) => {
                        backoff.reset();
                        state = MonitorState::Observing;
                        self.publish(|s| s.state = MonitorState::Observing).await;
                    }
                    Err(e) if e.is_terminal() => {
                        tracing::error!(account = %label, error = %e, "authentication failed; monitor giving up");
                        break MonitorState::Failed;
                    }
                    Err(e) => {
                        tracing::warn!(account = %label, error = %e, "connect failed; backing off");
                        state = MonitorState::Reconnecting;
                        self.publish(|s| s.state = MonitorState::Reconnecting).await;
                    }
                },

                MonitorState::Observing => {
                    match self.check_once().await {
                        Ok(()) => {
                            if !self.interruptible_sleep(check_interval).await {
                                break MonitorState::Stopped;
                            }
                        }
                        Err(e) if e.is_terminal() => {
                            tracing::error!(account = %label, error = %e, "platform rejected credentials mid-run");
                            break MonitorState::Failed;
                        }
                        Err(e) => {
                            tracing::warn!(account = %label, error = %e, "snapshot failed; backing off");
                            state = MonitorState::Reconnecting;
                            self.publish(|s| s.state = MonitorState::Reconnecting).await;
                        }
                    }
                }

                MonitorState::Reconnecting => {
                    let delay = backoff.next_delay();
                    tracing::debug!(account = %label, delay_ms = delay.as_millis() as u64, "reconnect backoff");
                    if !self.interruptible_sleep(delay).await {
                        break MonitorState::Stopped;
                    }
                    state = MonitorState::Connecting;
                }

                // Terminal states are returned from the loop, never entered.
                MonitorState::Failed | MonitorState::Stopped => unreachable!(),
            }
        };

        self.platform.disconnect().await;
        self.publish(|s| s.state = terminal).await;
        tracing::info!(account = %label, state = %terminal, "monitor exited");
        terminal
    }

    /// One full cycle: snapshot, anchor, evaluate, dispatch.
    async fn check_once(&mut self) -> Result<(), PlatformError> {
        let mut snapshot = self.platform.snapshot().await?;

        // The leverage check needs the account leverage; ask the platform
        // when the snapshot did not carry it.
        if snapshot.account_leverage.is_none() && self.rules.max_leverage.is_some() {
            snapshot.account_leverage = self.platform.leverage().await.ok().flatten();
        }

        if let Some(anchored) = self.anchor.update(&mut snapshot) {
            tracing::info!(
                account = %self.config.label,
                date = %anchored.date,
                day_start_balance = anchored.day_start_balance,
                day_start_equity = anchored.day_start_equity,
                anchor = anchored.anchor(),
                "day start anchored"
            );
        }

        let breaches = evaluate(&self.rules, &snapshot, self.config.starting_balance);

        let hard = breaches.iter().filter(|b| b.level == BreachLevel::Hard).count();
        let warn = breaches.len() - hard;
        tracing::info!(
            account = %self.config.label,
            equity = snapshot.equity,
            realized_today = snapshot.realized_pl_today,
            hard_breaches = hard,
            warnings = warn,
            "check complete"
        );

        let summary = breaches
            .last()
            .map(|b| format!("{} {} ({})", b.level, b.code, b.observed_at));
        let observed_wall = snapshot.observed_at_wall;
        let equity = snapshot.equity;
        let realized = snapshot.realized_pl_today;

        self.dispatcher.dispatch(&self.config.label, breaches);

        self.publish(move |s| {
            s.state = MonitorState::Observing;
            s.last_snapshot_at = Some(observed_wall);
            s.checks_completed += 1;
            s.equity = Some(equity);
            s.realized_pl_today = Some(realized);
            if let Some(summary) = summary {
                s.last_breach_summary = Some(summary);
            }
        })
        .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use crate::domain::snapshot::{AccountSnapshot, Platform};
    use crate::ports::mocks::{MockPlatform, RecordingSink};
    use chrono::{NaiveDate, Utc};

    fn account_config() -> AccountConfig {
        AccountConfig {
            label: "Test".to_string(),
            firm: "FTMO".to_string(),
            program_id: None,
            platform: Platform::Mt5,
            account_id: "1".to_string(),
            starting_balance: 100_000.0,
            check_interval: 1,
            enabled: true,
            rules: None,
        }
    }

    fn rules() -> PropRules {
        PropRules {
            name: "Test".to_string(),
            program_id: None,
            max_daily_drawdown_pct: 5.0,
            max_total_drawdown_pct: 10.0,
            max_risk_per_trade_pct: 1.0,
            max_open_lots: 10.0,
            max_positions: 10,
            margin_warn_level_pct: 100.0,
            margin_critical_level_pct: 50.0,
            trading_days_only: false,
            require_stop_loss: false,
            max_leverage: None,
            warn_buffer_pct: 0.8,
        }
    }

    fn snapshot(balance: f64, equity: f64) -> AccountSnapshot {
        AccountSnapshot {
            account_id: "1".to_string(),
            platform: Platform::Mt5,
            currency: "USD".to_string(),
            balance,
            equity,
            margin_used: 0.0,
            margin_free: equity,
            realized_pl_today: 0.0,
            day_start_balance: 0.0,
            day_start_equity: 0.0,
            positions: vec![],
            account_leverage: None,
            observed_at_server: NaiveDate::from_ymd_opt(2025, 3, 4)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            observed_at_wall: Utc::now(),
        }
    }

    fn monitor_with(
        platform: MockPlatform,
        dispatcher: &Dispatcher,
    ) -> (AccountMonitor, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let monitor = AccountMonitor::new(
            account_config(),
            rules(),
            Box::new(platform),
            dispatcher.clone(),
            rx,
        );
        (monitor, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn breaching_snapshot_reaches_the_sink() {
        let dispatcher = Dispatcher::new(8);
        let sink = RecordingSink::new();
        dispatcher.register(Arc::new(sink.clone()));

        let platform = MockPlatform::new();
        platform.push_snapshot(snapshot(100_000.0, 100_000.0)); // clean, sets anchor
        platform.push_snapshot(snapshot(100_000.0, 94_000.0)); // 6% daily loss

        let (monitor, tx) = monitor_with(platform.clone(), &dispatcher);
        let status = monitor.status_handle();
        let handle = tokio::spawn(monitor.run());

        // Let two checks complete (interval 1s, paused clock auto-advances).
        while status.read().await.checks_completed < 2 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tx.send(true).unwrap();
        let terminal = handle.await.unwrap();
        assert_eq!(terminal, MonitorState::Stopped);

        // Only the breaching evaluation produced a dispatch.
        assert_eq!(sink.dispatch_count(), 1);
        let (label, breaches) = &sink.dispatches()[0];
        assert_eq!(label, "Test");
        assert!(!breaches.is_empty());
        assert!(platform.was_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_is_terminal() {
        let dispatcher = Dispatcher::new(8);
        let platform = MockPlatform::new();
        platform.push_connect_result(Err(PlatformError::Auth("bad password".to_string())));

        let (monitor, _tx) = monitor_with(platform, &dispatcher);
        let terminal = monitor.run().await;
        assert_eq!(terminal, MonitorState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_snapshot_error_reconnects_and_recovers() {
        let dispatcher = Dispatcher::new(8);
        let platform = MockPlatform::new();
        platform.push_snapshot_error(PlatformError::Transient("socket closed".to_string()));
        platform.push_snapshot(snapshot(100_000.0, 100_000.0));

        let (monitor, tx) = monitor_with(platform.clone(), &dispatcher);
        let status = monitor.status_handle();
        let handle = tokio::spawn(monitor.run());

        while status.read().await.checks_completed < 1 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        // The failed snapshot forced a reconnect before the good one.
        assert!(platform.connect_calls() >= 2);
        assert_eq!(status.read().await.state, MonitorState::Observing);

        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), MonitorState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_exits_promptly_mid_sleep() {
        let dispatcher = Dispatcher::new(8);
        let platform = MockPlatform::new();
        platform.push_snapshot(snapshot(100_000.0, 100_000.0));

        let (monitor, tx) = monitor_with(platform, &dispatcher);
        let status = monitor.status_handle();
        let handle = tokio::spawn(monitor.run());

        while status.read().await.checks_completed < 1 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // The monitor is now inside its check-interval sleep.
        tx.send(true).unwrap();
        let terminal = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor must exit within the grace period")
            .unwrap();
        assert_eq!(terminal, MonitorState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn leverage_backfilled_from_platform_when_limit_set() {
        let dispatcher = Dispatcher::new(8);
        let sink = RecordingSink::new();
        dispatcher.register(Arc::new(sink.clone()));

        let platform = MockPlatform::new();
        platform.push_snapshot(snapshot(100_000.0, 100_000.0)); // no leverage field
        platform.set_leverage(Some(200.0));

        let (tx, rx) = watch::channel(false);
        let mut leveraged_rules = rules();
        leveraged_rules.max_leverage = Some(100.0);
        let monitor = AccountMonitor::new(
            account_config(),
            leveraged_rules,
            Box::new(platform),
            dispatcher.clone(),
            rx,
        );
        let status = monitor.status_handle();
        let handle = tokio::spawn(monitor.run());

        while status.read().await.checks_completed < 1 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sink.dispatch_count(), 1);
        let (_, breaches) = &sink.dispatches()[0];
        assert!(breaches
            .iter()
            .any(|b| b.code == crate::domain::rules::BreachCode::Leverage));
    }

    #[tokio::test(start_paused = true)]
    async fn status_carries_equity_and_check_count() {
        let dispatcher = Dispatcher::new(8);
        let platform = MockPlatform::new();
        platform.push_snapshot(snapshot(100_000.0, 99_500.0));

        let (monitor, tx) = monitor_with(platform, &dispatcher);
        let status = monitor.status_handle();
        let handle = tokio::spawn(monitor.run());

        while status.read().await.checks_completed < 1 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let snap = status.read().await.clone();
        assert_eq!(snap.equity, Some(99_500.0));
        assert!(snap.last_snapshot_at.is_some());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
