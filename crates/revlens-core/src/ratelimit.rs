use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Named rate-limit tier bundling the per-second and per-minute ceilings.
///
/// Values are tuned conservatively below the advertised upstream ceilings so
/// concurrent extractions do not trip server-side throttling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateTier {
    Small,
    #[default]
    Medium,
    Large,
}

impl RateTier {
    pub const fn requests_per_second(self) -> u32 {
        match self {
            Self::Small => 3,
            Self::Medium => 10,
            Self::Large => 25,
        }
    }

    pub const fn requests_per_minute(self) -> u32 {
        match self {
            Self::Small => 60,
            Self::Medium => 150,
            Self::Large => 700,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

/// Dual-window request budget shared by every outgoing call of one session.
///
/// Both quotas must have capacity before a request may be issued. Grants are
/// smoothed to one cell per `window / limit` rather than allowing a full
/// burst, so the number of grants in any rolling window never exceeds the
/// configured ceiling. Cloning shares the underlying limiters; all in-flight
/// requests draw from the same budget. Counters live in memory only and reset
/// on process restart.
#[derive(Clone)]
pub struct RateBudget {
    per_second: Arc<DirectRateLimiter>,
    per_minute: Arc<DirectRateLimiter>,
    granted: Arc<AtomicU64>,
}

impl RateBudget {
    pub fn new(tier: RateTier) -> Self {
        Self::with_limits(tier.requests_per_second(), tier.requests_per_minute())
    }

    pub fn with_limits(per_second: u32, per_minute: u32) -> Self {
        Self {
            per_second: Arc::new(RateLimiter::direct(smooth_quota(
                Duration::from_secs(1),
                per_second,
            ))),
            per_minute: Arc::new(RateLimiter::direct(smooth_quota(
                Duration::from_secs(60),
                per_minute,
            ))),
            granted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Suspends until both ceilings have capacity, then consumes one cell
    /// from each.
    ///
    /// The minute budget is awaited first: a caller blocked on the minute
    /// ceiling must not sit on an already-consumed per-second cell while it
    /// waits.
    pub async fn acquire(&self) {
        self.per_minute.until_ready().await;
        self.per_second.until_ready().await;
        self.granted.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-suspending variant. A failed per-second check after a passing
    /// minute check burns one minute cell; that only makes the budget more
    /// conservative, never less.
    pub fn try_acquire(&self) -> bool {
        if self.per_minute.check().is_err() || self.per_second.check().is_err() {
            return false;
        }

        self.granted.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Lifetime grant count for this session.
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }
}

fn smooth_quota(window: Duration, limit: u32) -> Quota {
    let safe_limit = limit.max(1);
    let period = Duration::from_secs_f64(window.as_secs_f64() / f64::from(safe_limit));
    let single = NonZeroU32::new(1).expect("one is non-zero");

    Quota::with_period(period)
        .expect("period is always greater than zero")
        .allow_burst(single)
}
