//! Extraction and revenue-reconciliation engine for revlens.
//!
//! This crate contains:
//! - The dual-window rate budget shared by all outgoing requests
//! - A rate-limited HTTP client with bounded, hint-aware retry
//! - Normalization of heterogeneous upstream numeric shapes
//! - Timeframe filters in both upstream dialects (exact and relative)
//! - Per-resource query services and the revenue reconciler
//! - The extraction orchestrator producing one [`ExtractionResult`] per run

pub mod config;
pub mod domain;
pub mod error;
pub mod filters;
pub mod http;
pub mod orchestrator;
pub mod parse;
pub mod ratelimit;
pub mod reconcile;
pub mod services;

pub use config::{EngineConfig, DEFAULT_BASE_URL};
pub use domain::{AttributionWindow, Channel, RelativePeriod, UtcTimestamp};
pub use error::{EngineError, WindowError};
pub use filters::TimeframeFilter;
pub use http::{
    ApiClient, HttpMethod, HttpTransport, PreparedRequest, ReqwestTransport, RequestEnvelope,
    RetryPolicy, TransportError, TransportResponse,
};
pub use orchestrator::{ExtractionResult, Extractor};
pub use parse::{normalize, Normalized, ParseStats};
pub use ratelimit::{RateBudget, RateTier};
pub use reconcile::{
    reconcile, ChannelBreakdown, ReconcileInputs, ReconcilerConfig, RevenueSnapshot,
    ValidationFlag,
};
pub use services::{
    CampaignSummary, CampaignsService, FlowSummary, FlowsService, FormSummary, FormsService,
    ListSummary, ListsService, MetricsService, ResourceFetch,
};
