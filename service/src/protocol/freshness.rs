//! Freshness gate bounding the skew between client and server clocks.

/// Default tolerance: 30 seconds either side of the server clock.
pub const DEFAULT_TOLERANCE_MS: u64 = 30_000;

/// Whether a client timestamp lies within `tolerance_ms` of `now`.
///
/// Symmetric: stale requests and requests stamped in the future are both
/// rejected.
#[must_use]
pub const fn is_fresh(client_timestamp_ms: i64, now_ms: i64, tolerance_ms: u64) -> bool {
    now_ms.abs_diff(client_timestamp_ms) <= tolerance_ms
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The gate gives the same answer whichever clock is ahead
        #[test]
        fn symmetric(a in -4_000_000_000_000i64..4_000_000_000_000, b in -4_000_000_000_000i64..4_000_000_000_000, tol in 0u64..120_000) {
            prop_assert_eq!(is_fresh(a, b, tol), is_fresh(b, a, tol));
        }
    }
}
