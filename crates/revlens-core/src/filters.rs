use crate::domain::{AttributionWindow, Channel, UtcTimestamp};

/// Timeframe constraint in one of the two dialects the upstream API speaks.
///
/// Aggregate-style endpoints accept arbitrary `Exact` boundaries; reporting
/// endpoints only accept enumerated `Relative` keywords that the server
/// resolves against its own current time. The variants are deliberately
/// asymmetric so a relative filter can never be mistaken for one with exact
/// boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeframeFilter {
    Exact {
        expression: String,
        start: UtcTimestamp,
        end: UtcTimestamp,
    },
    Relative {
        keyword: &'static str,
    },
}

impl TimeframeFilter {
    /// Exact-range expression over `field`, half-open on the end boundary.
    pub fn exact(window: &AttributionWindow, field: &str) -> Self {
        Self::Exact {
            expression: range_expression(field, window.start, window.end),
            start: window.start,
            end: window.end,
        }
    }

    /// Smallest enumerated relative period covering the window.
    pub fn relative(window: &AttributionWindow) -> Self {
        Self::Relative {
            keyword: window.covering_period().keyword(),
        }
    }

    /// The exact filter expression, absent for relative filters.
    pub fn expression(&self) -> Option<&str> {
        match self {
            Self::Exact { expression, .. } => Some(expression),
            Self::Relative { .. } => None,
        }
    }

    /// The relative keyword, absent for exact filters.
    pub const fn keyword(&self) -> Option<&'static str> {
        match self {
            Self::Exact { .. } => None,
            Self::Relative { keyword } => Some(keyword),
        }
    }
}

/// `greater-or-equal(field,START),less-than(field,END)` range expression.
pub fn range_expression(field: &str, start: UtcTimestamp, end: UtcTimestamp) -> String {
    format!(
        "greater-or-equal({field},{}),less-than({field},{})",
        start.format_rfc3339(),
        end.format_rfc3339()
    )
}

/// Channel equality constraint for message-bearing resources.
pub fn channel_expression(channel: Channel) -> String {
    format!("equals(messages.channel,'{}')", channel.as_str())
}

/// Campaign list filter: channel plus scheduled-at bounds from the window.
pub fn campaign_filter(window: &AttributionWindow, channel: Channel) -> String {
    format!(
        "{},{}",
        channel_expression(channel),
        range_expression("scheduled_at", window.start, window.end)
    )
}

/// Percent-encodes a filter expression for use in a query string.
pub fn encode(expression: &str) -> String {
    urlencoding::encode(expression).into_owned()
}
