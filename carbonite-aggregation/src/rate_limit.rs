// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{sync::OnceLock, time::Instant};

#[doc(hidden)]
pub(crate) fn seconds_since_start() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    Instant::now()
        .duration_since(*START.get_or_init(Instant::now))
        .as_secs()
}

/// `rate_limited!(duration, expr)` evaluates `expr` at most once every `duration` for each call
/// site, across all aggregation workers.
///
/// Used for logs on the flush path: a collector that is down fails every cycle, and one line per
/// interval is enough to show the problem persists.
macro_rules! rate_limited {
    ($interval:expr, $call:expr) => {{
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_CALL: AtomicU64 = AtomicU64::new(0);
        let interval: std::time::Duration = $interval;
        assert!(
            interval >= std::time::Duration::from_secs(1),
            "only second-level granularity supported for rate limiting"
        );

        let now = $crate::rate_limit::seconds_since_start();
        let next = NEXT_CALL.load(Ordering::Relaxed);
        if next <= now {
            let new_next = now.saturating_add(interval.as_secs());
            if NEXT_CALL
                .compare_exchange(next, new_next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                $call;
            }
        }
    }};
}
pub(crate) use rate_limited;
