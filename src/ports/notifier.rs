//! Notifier sink port
//!
//! A sink receives `(account_label, breaches)` and delivers it somewhere: a
//! terminal, a webhook, an email gateway. Sinks are registered at startup
//! and fanned out to by the dispatcher; a sink must treat an empty breach
//! slice as a no-op.

use crate::domain::rules::RuleBreach;

pub trait NotifierSink: Send + Sync {
    /// Short identifier used in logs ("terminal", "webhook", ...).
    fn name(&self) -> &str;

    /// Deliver one dispatch. Errors are the sink's problem: log and return,
    /// never panic. Monitoring must not die because a notification failed.
    fn notify(&self, account_label: &str, breaches: &[RuleBreach]);
}
