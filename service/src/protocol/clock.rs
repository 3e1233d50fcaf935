//! Wall-clock source for the protocol, in Unix milliseconds.
//!
//! Client timestamps are Unix milliseconds, so the server side compares
//! against wall time rather than a monotonic `Instant`.

use std::fmt::Debug;

/// Source of the current time in Unix milliseconds.
pub trait Clock: Send + Sync + Debug {
    fn now_ms(&self) -> i64;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Controllable clock for deterministic tests.

    use super::Clock;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    /// Clock whose time only moves when a test says so.
    ///
    /// Clones share the same underlying time value.
    #[derive(Debug, Clone)]
    pub struct MockClock {
        current_ms: Arc<AtomicI64>,
    }

    impl MockClock {
        #[must_use]
        pub fn new(start_ms: i64) -> Self {
            Self {
                current_ms: Arc::new(AtomicI64::new(start_ms)),
            }
        }

        pub fn advance(&self, ms: i64) {
            self.current_ms.fetch_add(ms, Ordering::SeqCst);
        }

        pub fn set(&self, ms: i64) {
            self.current_ms.store(ms, Ordering::SeqCst);
        }
    }

    impl Clock for MockClock {
        fn now_ms(&self) -> i64 {
            self.current_ms.load(Ordering::SeqCst)
        }
    }
}
