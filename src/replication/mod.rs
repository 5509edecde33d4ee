//! Replication Module
//!
//! Best-effort propagation of master operations to replicas. Delivery is
//! unacknowledged: no retry, no queue, no re-sync. Sequence numbers let a
//! replica notice that it missed something, nothing more.

mod broadcaster;
mod sequence;

pub use broadcaster::{BroadcastReport, Broadcaster};
pub use sequence::{Continuity, SequenceTracker};
