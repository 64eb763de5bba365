use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::error::WindowError;

/// RFC3339 timestamp guaranteed to be UTC.
///
/// All window boundaries and emitted timestamps go through this type so the
/// exact-range filter dialect always serializes with a `Z` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcTimestamp(OffsetDateTime);

impl UtcTimestamp {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn parse(input: &str) -> Result<Self, WindowError> {
        let parsed =
            OffsetDateTime::parse(input, &Rfc3339).map_err(|_| WindowError::TimestampNotUtc {
                value: input.to_owned(),
            })?;

        Self::from_offset_datetime(parsed)
    }

    pub fn from_offset_datetime(value: OffsetDateTime) -> Result<Self, WindowError> {
        if value.offset() != UtcOffset::UTC {
            return Err(WindowError::TimestampNotUtc {
                value: value
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| String::from("<unformattable>")),
            });
        }

        Ok(Self(value))
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    /// Timestamp shifted back by `days`. The offset stays UTC, so the result
    /// is always valid.
    pub fn days_ago(self, days: i64) -> Self {
        Self(self.0 - Duration::days(days))
    }

    /// Whole days between `self` and a later timestamp, never negative.
    pub fn whole_days_until(self, later: Self) -> i64 {
        (later.0 - self.0).whole_days().max(0)
    }

    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .expect("UTC timestamps are always RFC3339 formattable")
    }
}

impl Display for UtcTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_utc_timestamp() {
        let parsed = UtcTimestamp::parse("2025-03-01T00:00:00Z").expect("must parse");
        assert_eq!(parsed.format_rfc3339(), "2025-03-01T00:00:00Z");
    }

    #[test]
    fn rejects_non_utc_offset() {
        let err = UtcTimestamp::parse("2025-03-01T01:00:00+01:00").expect_err("must fail");
        assert!(matches!(err, WindowError::TimestampNotUtc { .. }));
    }

    #[test]
    fn day_arithmetic_round_trips() {
        let end = UtcTimestamp::parse("2025-03-31T00:00:00Z").expect("must parse");
        let start = end.days_ago(30);

        assert_eq!(start.format_rfc3339(), "2025-03-01T00:00:00Z");
        assert_eq!(start.whole_days_until(end), 30);
        assert_eq!(end.whole_days_until(start), 0);
    }
}
