use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::domain::UtcTimestamp;
use crate::error::WindowError;

/// Relative timeframe keywords accepted by reporting-style endpoints.
///
/// The upstream server interprets these against *its* current time, not the
/// nominal end of the requested window. Callers that need exact boundaries
/// must use the exact-range filter dialect instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativePeriod {
    Last7Days,
    Last30Days,
    Last90Days,
    Last365Days,
}

impl RelativePeriod {
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Last7Days => "last_7_days",
            Self::Last30Days => "last_30_days",
            Self::Last90Days => "last_90_days",
            Self::Last365Days => "last_365_days",
        }
    }

    pub const fn days(self) -> i64 {
        match self {
            Self::Last7Days => 7,
            Self::Last30Days => 30,
            Self::Last90Days => 90,
            Self::Last365Days => 365,
        }
    }

    /// Smallest enumerated period that covers a span of `days`, rounding up.
    pub const fn covering(days: i64) -> Self {
        if days <= 7 {
            Self::Last7Days
        } else if days <= 30 {
            Self::Last30Days
        } else if days <= 90 {
            Self::Last90Days
        } else {
            Self::Last365Days
        }
    }

    pub fn from_keyword(value: &str) -> Result<Self, WindowError> {
        match value {
            "last_7_days" => Ok(Self::Last7Days),
            "last_30_days" => Ok(Self::Last30Days),
            "last_90_days" => Ok(Self::Last90Days),
            "last_365_days" => Ok(Self::Last365Days),
            other => Err(WindowError::InvalidPeriod {
                value: other.to_owned(),
            }),
        }
    }
}

impl Display for RelativePeriod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Time range over which revenue and engagement are measured.
///
/// The window itself is always held as exact UTC boundaries; endpoints that
/// only accept relative keywords get the smallest covering
/// [`RelativePeriod`] via the filter builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionWindow {
    pub start: UtcTimestamp,
    pub end: UtcTimestamp,
    pub timezone: String,
}

impl AttributionWindow {
    pub fn new(
        start: UtcTimestamp,
        end: UtcTimestamp,
        timezone: impl Into<String>,
    ) -> Result<Self, WindowError> {
        let timezone = timezone.into();
        if timezone.trim().is_empty() {
            return Err(WindowError::EmptyTimezone);
        }
        if start >= end {
            return Err(WindowError::Inverted {
                start: start.format_rfc3339(),
                end: end.format_rfc3339(),
            });
        }

        Ok(Self {
            start,
            end,
            timezone,
        })
    }

    /// Window covering the named period, ending at `now`.
    pub fn relative(
        period: RelativePeriod,
        now: UtcTimestamp,
        timezone: impl Into<String>,
    ) -> Result<Self, WindowError> {
        Self::new(now.days_ago(period.days()), now, timezone)
    }

    pub fn days(&self) -> i64 {
        self.start.whole_days_until(self.end)
    }

    pub fn covering_period(&self) -> RelativePeriod {
        RelativePeriod::covering(self.days())
    }

    /// Clamps a future end boundary to `now`. Returns the adjusted window and
    /// whether clamping happened; a window that becomes inverted (start also
    /// in the future) is an error.
    pub fn clamp_end(&self, now: UtcTimestamp) -> Result<(Self, bool), WindowError> {
        if self.end <= now {
            return Ok((self.clone(), false));
        }

        let clamped = Self::new(self.start, self.end.min(now), self.timezone.clone())?;
        Ok((clamped, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(input: &str) -> UtcTimestamp {
        UtcTimestamp::parse(input).expect("valid timestamp")
    }

    #[test]
    fn rejects_inverted_window() {
        let err = AttributionWindow::new(ts("2025-04-01T00:00:00Z"), ts("2025-03-01T00:00:00Z"), "UTC")
            .expect_err("must fail");
        assert!(matches!(err, WindowError::Inverted { .. }));
    }

    #[test]
    fn clamps_future_end_to_now() {
        let window = AttributionWindow::new(
            ts("2025-03-01T00:00:00Z"),
            ts("2025-04-02T00:00:00Z"),
            "UTC",
        )
        .expect("valid window");

        let now = ts("2025-04-01T00:00:00Z");
        let (clamped, adjusted) = window.clamp_end(now).expect("clamp must succeed");

        assert!(adjusted);
        assert_eq!(clamped.end, now);
        assert_eq!(clamped.start, window.start);
    }

    #[test]
    fn clamp_is_noop_for_past_windows() {
        let window = AttributionWindow::new(
            ts("2025-03-01T00:00:00Z"),
            ts("2025-03-31T00:00:00Z"),
            "UTC",
        )
        .expect("valid window");

        let (unchanged, adjusted) = window
            .clamp_end(ts("2025-04-01T00:00:00Z"))
            .expect("clamp must succeed");

        assert!(!adjusted);
        assert_eq!(unchanged, window);
    }

    #[test]
    fn clamp_fails_when_start_is_also_future() {
        let window = AttributionWindow::new(
            ts("2025-05-01T00:00:00Z"),
            ts("2025-06-01T00:00:00Z"),
            "UTC",
        )
        .expect("valid window");

        let err = window
            .clamp_end(ts("2025-04-01T00:00:00Z"))
            .expect_err("must fail");
        assert!(matches!(err, WindowError::Inverted { .. }));
    }

    #[test]
    fn covering_period_rounds_up() {
        assert_eq!(RelativePeriod::covering(5), RelativePeriod::Last7Days);
        assert_eq!(RelativePeriod::covering(7), RelativePeriod::Last7Days);
        assert_eq!(RelativePeriod::covering(8), RelativePeriod::Last30Days);
        assert_eq!(RelativePeriod::covering(90), RelativePeriod::Last90Days);
        assert_eq!(RelativePeriod::covering(200), RelativePeriod::Last365Days);
    }

    #[test]
    fn relative_window_spans_the_period() {
        let now = ts("2025-04-01T00:00:00Z");
        let window = AttributionWindow::relative(RelativePeriod::Last90Days, now, "UTC")
            .expect("valid window");

        assert_eq!(window.days(), 90);
        assert_eq!(window.covering_period(), RelativePeriod::Last90Days);
    }
}
