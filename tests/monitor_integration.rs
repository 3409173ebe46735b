//! End-to-end monitoring scenarios over mock platforms.
//!
//! Wires the real supervisor, resolver, monitors, anchor tracking,
//! evaluator, and dispatcher together; only the platform and the sink are
//! test doubles.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};

use guardian::application::{Dispatcher, PlatformFactory, RuleResolver, Supervisor};
use guardian::config::AccountConfig;
use guardian::domain::presets::PresetRegistry;
use guardian::domain::rules::{BreachCode, BreachLevel};
use guardian::domain::snapshot::{AccountSnapshot, Platform};
use guardian::domain::taxonomy::ProgramTaxonomy;
use guardian::ports::mocks::{MockPlatform, RecordingSink};
use guardian::ports::platform::PlatformPort;

fn at(date: (i32, u32, u32), hms: (u32, u32, u32)) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(date.0, date.1, date.2)
        .unwrap()
        .and_hms_opt(hms.0, hms.1, hms.2)
        .unwrap()
}

fn snapshot(observed: NaiveDateTime, balance: f64, equity: f64) -> AccountSnapshot {
    AccountSnapshot {
        account_id: "12345678".to_string(),
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
        observed_at_server: observed,
        observed_at_wall: Utc::now(),
    }
}

fn account(label: &str) -> AccountConfig {
    AccountConfig {
        label: label.to_string(),
        firm: "FTMO".to_string(),
        program_id: None,
        platform: Platform::Mt5,
        account_id: "12345678".to_string(),
        starting_balance: 100_000.0,
        check_interval: 1,
        enabled: true,
        rules: None,
    }
}

fn resolver() -> RuleResolver {
    RuleResolver::new(
        None,
        Arc::new(PresetRegistry::builtin()),
        Arc::new(ProgramTaxonomy::builtin()),
    )
}

fn factory_for(mock: MockPlatform) -> PlatformFactory {
    Arc::new(move |_account| Ok(Box::new(mock.clone()) as Box<dyn PlatformPort>))
}

async fn wait_for_checks(supervisor: &Supervisor, label: &str, count: u64) {
    loop {
        let statuses = supervisor.status_view().snapshot().await;
        if statuses
            .iter()
            .any(|s| s.label == label && s.checks_completed >= count)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn hard_breach_flows_from_snapshot_to_sink() {
    let platform = MockPlatform::new();
    // Two observations on the same broker day: the first sets the anchor,
    // the second carries a 6% equity loss.
    platform.push_snapshot(snapshot(at((2025, 3, 4), (9, 0, 0)), 100_000.0, 100_000.0));
    platform.push_snapshot(snapshot(at((2025, 3, 4), (9, 30, 0)), 100_000.0, 94_000.0));

    let dispatcher = Dispatcher::new(16);
    let sink = RecordingSink::new();
    dispatcher.register(Arc::new(sink.clone()));

    let supervisor = Supervisor::start(
        vec![account("FTMO-Main")],
        &resolver(),
        factory_for(platform),
        dispatcher,
    )
    .await;
    assert_eq!(supervisor.monitor_count(), 1);

    wait_for_checks(&supervisor, "FTMO-Main", 2).await;
    supervisor.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let dispatches = sink.dispatches();
    assert_eq!(dispatches.len(), 1, "only the breaching check notifies");
    let (label, breaches) = &dispatches[0];
    assert_eq!(label, "FTMO-Main");
    assert!(breaches
        .iter()
        .any(|b| b.code == BreachCode::DailyDrawdown && b.level == BreachLevel::Hard));
}

#[tokio::test(start_paused = true)]
async fn broker_midnight_rollover_rebases_daily_drawdown() {
    let platform = MockPlatform::new();
    // 23:59 server time: equity ran up to 102k intraday.
    platform.push_snapshot(snapshot(at((2025, 3, 4), (23, 59, 0)), 100_000.0, 102_000.0));
    // 00:01 next server day: new anchor max(100k, 101k) = 101k.
    platform.push_snapshot(snapshot(at((2025, 3, 5), (0, 1, 0)), 100_000.0, 101_000.0));
    // Later that day equity drops to 96k: 4.95% against the fresh anchor
    // (WARN), where the stale 102k anchor would have read 5.88% (HARD).
    platform.push_snapshot(snapshot(at((2025, 3, 5), (8, 0, 0)), 100_000.0, 96_000.0));

    let dispatcher = Dispatcher::new(16);
    let sink = RecordingSink::new();
    dispatcher.register(Arc::new(sink.clone()));

    let supervisor = Supervisor::start(
        vec![account("Rollover")],
        &resolver(),
        factory_for(platform),
        dispatcher,
    )
    .await;

    wait_for_checks(&supervisor, "Rollover", 3).await;
    supervisor.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let dispatches = sink.dispatches();
    assert_eq!(dispatches.len(), 1);
    let daily: Vec<_> = dispatches[0]
        .1
        .iter()
        .filter(|b| b.code == BreachCode::DailyDrawdown)
        .collect();
    assert_eq!(daily.len(), 1);
    assert_eq!(
        daily[0].level,
        BreachLevel::Warn,
        "drawdown must be measured against the post-rollover anchor"
    );
    assert!((daily[0].value.unwrap() - 100.0 * 5_000.0 / 101_000.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn accounts_run_independently() {
    let healthy = MockPlatform::new();
    healthy.push_snapshot(snapshot(at((2025, 3, 4), (9, 0, 0)), 100_000.0, 100_000.0));

    let broken = MockPlatform::new();
    broken.push_connect_result(Err(
        guardian::ports::platform::PlatformError::Auth("token revoked".to_string()),
    ));

    let healthy_clone = healthy.clone();
    let broken_clone = broken.clone();
    let factory: PlatformFactory = Arc::new(move |account| {
        let platform: Box<dyn PlatformPort> = if account.label == "broken" {
            Box::new(broken_clone.clone())
        } else {
            Box::new(healthy_clone.clone())
        };
        Ok(platform)
    });

    let dispatcher = Dispatcher::new(16);
    let supervisor = Supervisor::start(
        vec![account("broken"), account("healthy")],
        &resolver(),
        factory,
        dispatcher,
    )
    .await;
    assert_eq!(supervisor.monitor_count(), 2);

    // The healthy account keeps observing even though the other failed auth.
    wait_for_checks(&supervisor, "healthy", 1).await;

    // The broken monitor reaches its terminal state on its own schedule.
    loop {
        let statuses = supervisor.status_view().snapshot().await;
        let broken_status = statuses.iter().find(|s| s.label == "broken").unwrap();
        if format!("{}", broken_status.state) == "failed" {
            let healthy_status = statuses.iter().find(|s| s.label == "healthy").unwrap();
            assert!(healthy_status.checks_completed >= 1);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    supervisor.shutdown().await;
}
