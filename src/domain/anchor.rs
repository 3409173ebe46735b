//! Day-start anchor tracking
//!
//! Daily drawdown is measured against the account state at broker-local
//! midnight. The tracker watches the broker calendar date of each snapshot
//! and re-anchors on the first observation of a new day. The broker's
//! calendar is authoritative: the anchor rolls on weekends too, and it never
//! rolls backward.

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::snapshot::AccountSnapshot;

/// Audit event emitted whenever the tracker (re)anchors.
#[derive(Debug, Clone, Serialize)]
pub struct DayStartAnchored {
    pub date: NaiveDate,
    pub day_start_balance: f64,
    pub day_start_equity: f64,
}

impl DayStartAnchored {
    /// The reference level daily drawdown is measured against.
    pub fn anchor(&self) -> f64 {
        self.day_start_balance.max(self.day_start_equity)
    }
}

/// Per-account day-start state. Owned exclusively by the account's monitor
/// task; initialized on the first observation after process start.
#[derive(Debug, Default)]
pub struct DayAnchor {
    state: Option<AnchorState>,
}

#[derive(Debug, Clone)]
struct AnchorState {
    current_date: NaiveDate,
    day_start_balance: f64,
    day_start_equity: f64,
}

impl DayAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The broker-local date of the current anchor, if one is set.
    pub fn current_date(&self) -> Option<NaiveDate> {
        self.state.as_ref().map(|s| s.current_date)
    }

    /// Fold a snapshot into the anchor state and stamp its day-start fields.
    ///
    /// Re-anchors when the state is unset or the snapshot's broker date is
    /// later than the current one; returns the audit event when that
    /// happens. A snapshot dated earlier than the current anchor date keeps
    /// the existing anchor (dates are monotonic non-decreasing).
    pub fn update(&mut self, snapshot: &mut AccountSnapshot) -> Option<DayStartAnchored> {
        let date = snapshot.observed_at_server.date();

        let event = match &self.state {
            Some(state) if date < state.current_date => {
                tracing::warn!(
                    account_id = %snapshot.account_id,
                    snapshot_date = %date,
                    anchor_date = %state.current_date,
                    "snapshot dated before current anchor; keeping existing anchor"
                );
                None
            }
            Some(state) if date == state.current_date => None,
            _ => {
                let state = AnchorState {
                    current_date: date,
                    day_start_balance: snapshot.balance,
                    day_start_equity: snapshot.equity,
                };
                let event = DayStartAnchored {
                    date,
                    day_start_balance: state.day_start_balance,
                    day_start_equity: state.day_start_equity,
                };
                self.state = Some(state);
                Some(event)
            }
        };

        // By this point state is always set.
        if let Some(state) = &self.state {
            snapshot.day_start_balance = state.day_start_balance;
            snapshot.day_start_equity = state.day_start_equity;
        }

        event
    }
}
