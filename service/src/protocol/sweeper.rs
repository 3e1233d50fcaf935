//! Periodic eviction for the protocol registries.
//!
//! Runs on its own timer so memory stays bounded even with no traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::activity::ActivityTracker;
use super::clock::Clock;
use super::nonce_ledger::NonceLedger;
use super::rate_limiter::FixedWindowLimiter;

/// Handles to the three shared registries.
#[derive(Debug, Clone)]
pub struct Registries {
    pub ledger: Arc<NonceLedger>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub tracker: Arc<ActivityTracker>,
}

/// Entries removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub nonces: usize,
    pub rate_windows: usize,
    pub activity_keys: usize,
}

impl SweepReport {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.nonces + self.rate_windows + self.activity_keys
    }
}

pub fn sweep_once(registries: &Registries, now_ms: i64) -> SweepReport {
    SweepReport {
        nonces: registries.ledger.sweep(now_ms),
        rate_windows: registries.limiter.sweep(now_ms),
        activity_keys: registries.tracker.sweep(now_ms),
    }
}

/// Spawn the background sweeper. Abort the returned handle to stop it.
pub fn spawn_sweeper(
    registries: Registries,
    clock: Arc<dyn Clock>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let report = sweep_once(&registries, clock.now_ms());
            tracing::debug!(
                nonces = report.nonces,
                rate_windows = report.rate_windows,
                activity_keys = report.activity_keys,
                remaining_nonces = registries.ledger.len(),
                "Swept protocol registries"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::clock::mock::MockClock;
    use crate::protocol::activity::ActivityKey;
    use crate::protocol::rate_limiter::RateKey;

    fn registries() -> Registries {
        Registries {
            ledger: Arc::new(NonceLedger::new(300_000)),
            limiter: Arc::new(FixedWindowLimiter::new(5, 60_000)),
            tracker: Arc::new(ActivityTracker::new(10, 300_000)),
        }
    }

    fn populate(r: &Registries, at: i64) {
        r.ledger.record("n1", at);
        r.limiter.allow(&RateKey::new(Some("u1"), "1.1.1.1"), at);
        r.tracker.record_and_check(&ActivityKey::Subject("u1".to_string()), at);
    }

    #[test]
    fn sweep_once_respects_each_horizon() {
        let r = registries();
        populate(&r, 0);

        // rate window elapsed, nonce and activity still retained
        let report = sweep_once(&r, 60_000);
        assert_eq!(
            report,
            SweepReport {
                nonces: 0,
                rate_windows: 1,
                activity_keys: 0
            }
        );

        let report = sweep_once(&r, 300_001);
        assert_eq!(report.nonces, 1);
        assert_eq!(report.activity_keys, 1);
        assert_eq!(report.total(), 2);
        assert!(r.ledger.is_empty() && r.limiter.is_empty() && r.tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_runs_without_traffic() {
        let r = registries();
        let clock = MockClock::new(0);
        populate(&r, 0);

        let handle = spawn_sweeper(r.clone(), Arc::new(clock.clone()), Duration::from_secs(60));
        clock.set(400_000);
        tokio::time::sleep(Duration::from_secs(61)).await;
        // let the sweeper task run after its tick fires
        tokio::task::yield_now().await;

        assert!(r.ledger.is_empty());
        assert!(r.limiter.is_empty());
        assert!(r.tracker.is_empty());
        handle.abort();
    }
}
