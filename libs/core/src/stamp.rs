use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::envelope::Stamp;

/// Source of callback stamps
///
/// Stamps only need to be unique among the pending callbacks of one channel.
pub trait StampSource: Send + Sync {
    fn next_stamp(&self) -> Stamp;
}

/// Random v4 UUID stamps
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidStamps;

impl StampSource for UuidStamps {
    fn next_stamp(&self) -> Stamp {
        Stamp::new(Uuid::new_v4().to_string())
    }
}

/// Deterministic `prefix-N` stamps, mostly for tests
#[derive(Debug)]
pub struct CounterStamps {
    prefix: String,
    next: AtomicU64,
}

impl CounterStamps {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl Default for CounterStamps {
    fn default() -> Self {
        Self::new("stamp")
    }
}

impl StampSource for CounterStamps {
    fn next_stamp(&self) -> Stamp {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Stamp::new(format!("{}-{}", self.prefix, n))
    }
}
