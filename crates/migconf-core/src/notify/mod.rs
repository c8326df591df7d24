//! Alerts derived from the conference set, and the reminder escalation that
//! rides on the same sweep.

pub mod alert;
pub mod ledger;
pub mod sweep;

pub use alert::{
    Alert, AlertSink, CollectingSink, Condition, DedupKey, FanoutSink, Severity, TracingSink,
};
pub use ledger::{DedupLedger, MemoryLedger};
pub use sweep::{spawn_change_poller, NotificationEngine, SweepReport};
