//! Serial numbers for outgoing operations.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

static GLOBAL: Lazy<SerialNumberGenerator> = Lazy::new(SerialNumberGenerator::new);

/// Shared, thread-safe counter handing out unique serial numbers.
///
/// Clones share the same counter. Only uniqueness is guaranteed; numbers are
/// not stable across processes. Zero is never produced since the wire uses it
/// for "unset".
#[derive(Debug, Clone)]
pub struct SerialNumberGenerator {
    next: Arc<AtomicI64>,
}

impl SerialNumberGenerator {
    /// A fresh counter starting at 1, independent of the process-wide one.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: i64) -> Self {
        Self {
            next: Arc::new(AtomicI64::new(first.max(1))),
        }
    }

    /// Handle to the process-wide counter.
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// Next unique serial number.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SerialNumberGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Next serial number from the process-wide counter.
pub fn new_serial_number() -> i64 {
    GLOBAL.next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn consecutive_calls_are_distinct() {
        let gen = SerialNumberGenerator::new();
        let seen: HashSet<i64> = (0..1_000).map(|_| gen.next()).collect();
        assert_eq!(seen.len(), 1_000);
        assert!(!seen.contains(&0));
    }

    #[test]
    fn clones_share_the_counter() {
        let a = SerialNumberGenerator::new();
        let b = a.clone();
        let x = a.next();
        let y = b.next();
        assert_ne!(x, y);
    }

    #[test]
    fn unique_across_threads() {
        let gen = SerialNumberGenerator::global();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gen = gen.clone();
                std::thread::spawn(move || (0..500).map(|_| gen.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all = HashSet::new();
        for h in handles {
            for s in h.join().unwrap() {
                assert!(all.insert(s), "duplicate serial {s}");
            }
        }
        all.insert(new_serial_number());
        assert_eq!(all.len(), 2_001);
    }
}
