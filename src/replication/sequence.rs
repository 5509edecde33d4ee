//! Replica-side sequence tracking
//!
//! Detects missed or reordered broadcasts. Detection only: the replica
//! still applies whatever it receives.

use std::sync::atomic::{AtomicU64, Ordering};

/// How a received sequence number relates to what was seen before
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// First broadcast seen since this replica started
    First,
    /// Exactly one past the highest seen
    InOrder,
    /// Skipped ahead; `missed` broadcasts have not (yet) arrived
    Gap { missed: u64 },
    /// At or below the highest seen: reordered delivery or a master restart
    Behind { highest: u64 },
}

/// Highest master sequence number observed by this replica
#[derive(Debug, Default)]
pub struct SequenceTracker {
    highest: AtomicU64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sequence number and classify it
    pub fn observe(&self, sequence: u64) -> Continuity {
        let previous = self.highest.fetch_max(sequence, Ordering::SeqCst);

        if previous == 0 {
            Continuity::First
        } else if sequence == previous + 1 {
            Continuity::InOrder
        } else if sequence > previous {
            Continuity::Gap {
                missed: sequence - previous - 1,
            }
        } else {
            Continuity::Behind { highest: previous }
        }
    }

    pub fn highest(&self) -> u64 {
        self.highest.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuity() {
        let tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(3), Continuity::First);
        assert_eq!(tracker.observe(4), Continuity::InOrder);
        assert_eq!(tracker.observe(7), Continuity::Gap { missed: 2 });
        assert_eq!(tracker.observe(5), Continuity::Behind { highest: 7 });
        assert_eq!(tracker.highest(), 7);
        // a restarted master starts again at 1
        assert_eq!(tracker.observe(1), Continuity::Behind { highest: 7 });
    }
}
