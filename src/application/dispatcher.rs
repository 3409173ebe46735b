//! Breach dispatch
//!
//! Monitors hand breaches to the dispatcher and move straight on to the next
//! snapshot; every registered sink drains from its own receiver task. The
//! channel is bounded: when a sink cannot keep up, the oldest dispatches for
//! it are dropped and counted rather than backing up the evaluator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::rules::RuleBreach;
use crate::ports::notifier::NotifierSink;

/// One delivery: every breach found in a single snapshot evaluation.
#[derive(Debug, Clone)]
pub struct BreachDispatch {
    pub account_label: String,
    pub breaches: Vec<RuleBreach>,
}

/// Fan-out hub for notifier sinks. Cloneable handle; sinks are registered at
/// startup and the registry is read-only afterwards.
#[derive(Clone)]
pub struct Dispatcher {
    tx: broadcast::Sender<BreachDispatch>,
    dropped: Arc<AtomicU64>,
}

pub const DEFAULT_DISPATCH_BUFFER: usize = 64;

impl Dispatcher {
    pub fn new(buffer: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Attach a sink. Each sink gets its own drain task so one slow sink
    /// cannot stall the others.
    pub fn register(&self, sink: Arc<dyn NotifierSink>) {
        let rx = self.tx.subscribe();
        let dropped = Arc::clone(&self.dropped);
        tokio::spawn(drain_loop(rx, sink, dropped));
    }

    /// Queue one dispatch. An empty breach list is a no-op; nothing reaches
    /// any sink.
    pub fn dispatch(&self, account_label: &str, breaches: Vec<RuleBreach>) {
        if breaches.is_empty() {
            return;
        }
        // Send fails only when no sink is registered; that is not an error.
        let _ = self.tx.send(BreachDispatch {
            account_label: account_label.to_string(),
            breaches,
        });
    }

    /// Total dispatches dropped across all sinks due to overflow.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn drain_loop(
    mut rx: broadcast::Receiver<BreachDispatch>,
    sink: Arc<dyn NotifierSink>,
    dropped: Arc<AtomicU64>,
) {
    loop {
        match rx.recv().await {
            Ok(dispatch) => {
                sink.notify(&dispatch.account_label, &dispatch.breaches);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                dropped.fetch_add(n, Ordering::Relaxed);
                tracing::warn!(
                    sink = sink.name(),
                    dropped = n,
                    "notifier sink fell behind; oldest dispatches dropped"
                );
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rules::{BreachCode, BreachLevel};
    use crate::ports::mocks::RecordingSink;
    use chrono::Utc;

    fn breach(account: &str) -> RuleBreach {
        RuleBreach {
            code: BreachCode::DailyDrawdown,
            level: BreachLevel::Hard,
            message: "test".to_string(),
            value: Some(5.0),
            threshold: Some(5.0),
            account_id: account.to_string(),
            observed_at: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn empty_dispatch_is_a_no_op() {
        let dispatcher = Dispatcher::new(8);
        let sink = RecordingSink::new();
        dispatcher.register(Arc::new(sink.clone()));

        dispatcher.dispatch("acct", vec![]);
        tokio::task::yield_now().await;

        assert_eq!(sink.dispatch_count(), 0);
    }

    #[tokio::test]
    async fn every_registered_sink_receives_the_dispatch() {
        let dispatcher = Dispatcher::new(8);
        let first = RecordingSink::new();
        let second = RecordingSink::new();
        dispatcher.register(Arc::new(first.clone()));
        dispatcher.register(Arc::new(second.clone()));

        dispatcher.dispatch("acct", vec![breach("acct")]);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(first.dispatch_count(), 1);
        assert_eq!(second.dispatch_count(), 1);
        assert_eq!(first.dispatches()[0].0, "acct");
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts() {
        // Buffer of 2; five dispatches queued before the drain task runs
        // (current-thread runtime: spawned tasks only run at await points).
        let dispatcher = Dispatcher::new(2);
        let sink = RecordingSink::new();
        dispatcher.register(Arc::new(sink.clone()));

        for i in 0..5 {
            dispatcher.dispatch(&format!("acct-{i}"), vec![breach("acct")]);
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(dispatcher.dropped_count(), 3);
        let delivered = sink.dispatches();
        assert_eq!(delivered.len(), 2, "newest two survive");
        assert_eq!(delivered[0].0, "acct-3");
        assert_eq!(delivered[1].0, "acct-4");
    }
}
