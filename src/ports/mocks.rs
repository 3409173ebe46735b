//! Test doubles for the port traits
//!
//! Mocks record calls and replay scripted responses so the resolver, the
//! monitor loop, and the supervisor can be exercised without a platform or
//! a database. Shared state lives behind `Arc<Mutex<..>>` so tests keep a
//! handle for inspection after ownership of the mock moves into the code
//! under test.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::domain::rules::{PropRules, RuleBreach};
use crate::domain::snapshot::AccountSnapshot;
use crate::ports::notifier::NotifierSink;
use crate::ports::platform::{PlatformError, PlatformPort};
use crate::ports::rule_store::{RuleStorePort, SoftRuleInsight, StoreError};

// ---------------------------------------------------------------------------
// MockPlatform
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockPlatformState {
    connect_results: VecDeque<Result<(), PlatformError>>,
    snapshot_results: VecDeque<Result<AccountSnapshot, PlatformError>>,
    server_time: Option<NaiveDateTime>,
    leverage: Option<f64>,
    connect_calls: usize,
    snapshot_calls: usize,
    disconnected: bool,
}

/// Scripted platform adapter. Responses are consumed front-to-back; an empty
/// snapshot script yields transient errors.
#[derive(Clone, Default)]
pub struct MockPlatform {
    state: Arc<Mutex<MockPlatformState>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful snapshot response.
    pub fn push_snapshot(&self, snapshot: AccountSnapshot) -> &Self {
        self.state
            .lock()
            .unwrap()
            .snapshot_results
            .push_back(Ok(snapshot));
        self
    }

    /// Queue a snapshot failure.
    pub fn push_snapshot_error(&self, error: PlatformError) -> &Self {
        self.state
            .lock()
            .unwrap()
            .snapshot_results
            .push_back(Err(error));
        self
    }

    /// Queue a connect outcome (default when the queue is empty: success).
    pub fn push_connect_result(&self, result: Result<(), PlatformError>) -> &Self {
        self.state.lock().unwrap().connect_results.push_back(result);
        self
    }

    pub fn set_server_time(&self, time: NaiveDateTime) -> &Self {
        self.state.lock().unwrap().server_time = Some(time);
        self
    }

    pub fn set_leverage(&self, leverage: Option<f64>) -> &Self {
        self.state.lock().unwrap().leverage = leverage;
        self
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().unwrap().connect_calls
    }

    pub fn snapshot_calls(&self) -> usize {
        self.state.lock().unwrap().snapshot_calls
    }

    pub fn was_disconnected(&self) -> bool {
        self.state.lock().unwrap().disconnected
    }
}

#[async_trait]
impl PlatformPort for MockPlatform {
    async fn connect(&mut self) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        state.connect_results.pop_front().unwrap_or(Ok(()))
    }

    async fn disconnect(&mut self) {
        self.state.lock().unwrap().disconnected = true;
    }

    async fn server_time(&mut self) -> Result<NaiveDateTime, PlatformError> {
        self.state
            .lock()
            .unwrap()
            .server_time
            .ok_or_else(|| PlatformError::Protocol("no server time configured".to_string()))
    }

    async fn snapshot(&mut self) -> Result<AccountSnapshot, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.snapshot_calls += 1;
        state.snapshot_results.pop_front().unwrap_or_else(|| {
            Err(PlatformError::Transient(
                "snapshot script exhausted".to_string(),
            ))
        })
    }

    async fn leverage(&mut self) -> Result<Option<f64>, PlatformError> {
        Ok(self.state.lock().unwrap().leverage)
    }
}

// ---------------------------------------------------------------------------
// CountingRuleStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CountingRuleStoreState {
    rules: HashMap<(String, String), PropRules>,
    soft: HashMap<String, Vec<SoftRuleInsight>>,
    lookup_calls: usize,
    fail_lookups: bool,
}

/// In-memory rule store that counts lookups, so resolver-ordering tests can
/// observe which tiers were consulted.
#[derive(Clone, Default)]
pub struct CountingRuleStore {
    state: Arc<Mutex<CountingRuleStoreState>>,
}

impl CountingRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(self, firm: &str, program_id: &str, rules: PropRules) -> Self {
        self.state
            .lock()
            .unwrap()
            .rules
            .insert((firm.to_lowercase(), program_id.to_string()), rules);
        self
    }

    pub fn with_soft_rules(self, firm: &str, insights: Vec<SoftRuleInsight>) -> Self {
        self.state
            .lock()
            .unwrap()
            .soft
            .insert(firm.to_lowercase(), insights);
        self
    }

    /// Make every lookup fail with a query error.
    pub fn failing(self) -> Self {
        self.state.lock().unwrap().fail_lookups = true;
        self
    }

    pub fn lookup_calls(&self) -> usize {
        self.state.lock().unwrap().lookup_calls
    }
}

#[async_trait]
impl RuleStorePort for CountingRuleStore {
    async fn lookup_rules(
        &self,
        firm: &str,
        program_id: &str,
    ) -> Result<Option<PropRules>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.lookup_calls += 1;
        if state.fail_lookups {
            return Err(StoreError::Query("injected store failure".to_string()));
        }
        Ok(state
            .rules
            .get(&(firm.to_lowercase(), program_id.to_string()))
            .cloned())
    }

    async fn soft_rules(
        &self,
        firm: &str,
        _program_id: Option<&str>,
    ) -> Result<Vec<SoftRuleInsight>, StoreError> {
        let state = self.state.lock().unwrap();
        if state.fail_lookups {
            return Err(StoreError::Query("injected store failure".to_string()));
        }
        Ok(state
            .soft
            .get(&firm.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Notifier sink that records every dispatch it receives.
#[derive(Clone, Default)]
pub struct RecordingSink {
    dispatches: Arc<Mutex<Vec<(String, Vec<RuleBreach>)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatches(&self) -> Vec<(String, Vec<RuleBreach>)> {
        self.dispatches.lock().unwrap().clone()
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches.lock().unwrap().len()
    }
}

impl NotifierSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn notify(&self, account_label: &str, breaches: &[RuleBreach]) {
        self.dispatches
            .lock()
            .unwrap()
            .push((account_label.to_string(), breaches.to_vec()));
    }
}
