//! Pipeline stages for grade polling.
//!
//! - `diff`: Snapshot comparison and message rendering
//! - `guard`: Optional protection against degraded fetches
//! - `poll`: Per-account fetch → parse → diff → notify → store cycle

pub mod diff;
pub mod guard;
pub mod poll;

pub use diff::{
    Change, DiffCalculator, DiffResult, SubjectChanges, generate_notifications, multiset_diff,
    value_changed,
};
pub use guard::{GuardResult, SnapshotGuard};
pub use poll::{AccountOutcome, CycleStats, Poller};
