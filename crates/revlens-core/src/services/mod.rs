//! Thin per-resource callers over the shared rate-limited client.
//!
//! Services shape one endpoint family's request and response each; none of
//! them reconciles across resources. An upstream rejection of a filter
//! combination (a non-429 4xx) degrades to an empty result at this boundary
//! so one unsupported query never aborts a whole extraction.

pub mod campaigns;
pub mod flows;
pub mod forms;
pub mod lists;
pub mod metrics;

use crate::error::EngineError;

pub use campaigns::{CampaignSummary, CampaignsService};
pub use flows::{FlowSummary, FlowsService};
pub use forms::{FormSummary, FormsService};
pub use lists::{ListSummary, ListsService};
pub use metrics::MetricsService;

/// Outcome of one resource fetch: either the data, or a default marked
/// unavailable because the upstream rejected the query outright.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceFetch<T> {
    pub data: T,
    pub unavailable: bool,
}

impl<T> ResourceFetch<T> {
    pub fn available(data: T) -> Self {
        Self {
            data,
            unavailable: false,
        }
    }
}

/// Converts a non-retryable upstream rejection into an empty default.
/// Everything else (rate-limit exhaustion, transient failures, auth errors)
/// propagates for the orchestrator to decide.
pub(crate) fn absorb_rejection<T: Default>(
    resource: &'static str,
    result: Result<T, EngineError>,
) -> Result<ResourceFetch<T>, EngineError> {
    match result {
        Ok(data) => Ok(ResourceFetch::available(data)),
        Err(EngineError::ClientRejected { status, message }) => {
            tracing::warn!(
                resource,
                status,
                %message,
                "upstream rejected the query, continuing with an empty result"
            );
            Ok(ResourceFetch {
                data: T::default(),
                unavailable: true,
            })
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_becomes_empty_default() {
        let rejected: Result<Vec<u32>, EngineError> = Err(EngineError::ClientRejected {
            status: 400,
            message: String::from("unsupported filter"),
        });

        let fetch = absorb_rejection("campaigns", rejected).expect("must not propagate");

        assert!(fetch.unavailable);
        assert!(fetch.data.is_empty());
    }

    #[test]
    fn rate_limit_exhaustion_still_propagates() {
        let exhausted: Result<Vec<u32>, EngineError> = Err(EngineError::RateLimitExhausted {
            attempts: 4,
            message: String::from("throttled"),
        });

        assert!(absorb_rejection("campaigns", exhausted).is_err());
    }
}
