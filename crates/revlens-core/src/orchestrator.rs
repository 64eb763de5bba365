use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{AttributionWindow, Channel, UtcTimestamp};
use crate::error::EngineError;
use crate::http::ApiClient;
use crate::parse::ParseStats;
use crate::ratelimit::RateBudget;
use crate::reconcile::{
    reconcile, ChannelBreakdown, ReconcileInputs, ReconcilerConfig, RevenueSnapshot,
    ValidationFlag,
};
use crate::services::{
    CampaignSummary, CampaignsService, FlowSummary, FlowsService, FormSummary, FormsService,
    ListSummary, ListsService, MetricsService, ResourceFetch,
};

/// Grouping dimension for flow-attributed revenue on aggregate endpoints.
const FLOW_ATTRIBUTION_DIMENSION: &str = "$flow";

/// Everything one audit run hands to the reporting collaborator.
///
/// Immutable once assembled. `validation_flags` is the union of the
/// snapshot's reconciliation flags and resource-availability flags, so a
/// renderer can show "data unavailable" instead of presenting zeros as
/// measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub request_id: String,
    pub window: AttributionWindow,
    pub snapshot: RevenueSnapshot,
    pub campaigns: Vec<CampaignSummary>,
    pub flows: Vec<FlowSummary>,
    pub lists: Vec<ListSummary>,
    pub forms: Vec<FormSummary>,
    pub validation_flags: Vec<ValidationFlag>,
    pub degraded_parse_count: u64,
    pub requests_issued: u64,
    pub generated_at: UtcTimestamp,
    pub latency_ms: u64,
}

/// Sequences the resource queries over one shared rate budget and assembles
/// the final result.
///
/// Per-resource failures degrade to empty summaries plus a flag; only an
/// invalid window or rejected credentials abort the run.
pub struct Extractor {
    client: Arc<ApiClient>,
    metrics: MetricsService,
    campaigns: CampaignsService,
    flows: FlowsService,
    lists: ListsService,
    forms: FormsService,
    reconciler: ReconcilerConfig,
    stats: Arc<ParseStats>,
}

impl Extractor {
    pub fn new(config: &EngineConfig) -> Self {
        let budget = RateBudget::new(config.rate_tier);
        let client = Arc::new(ApiClient::new(config, budget));
        Self::with_client(client, config.reconciler)
    }

    /// Builds an extractor over an existing client, e.g. one with a scripted
    /// transport.
    pub fn with_client(client: Arc<ApiClient>, reconciler: ReconcilerConfig) -> Self {
        let stats = Arc::new(ParseStats::default());
        Self {
            metrics: MetricsService::new(Arc::clone(&client), Arc::clone(&stats)),
            campaigns: CampaignsService::new(Arc::clone(&client), Arc::clone(&stats)),
            flows: FlowsService::new(Arc::clone(&client)),
            lists: ListsService::new(Arc::clone(&client), Arc::clone(&stats)),
            forms: FormsService::new(Arc::clone(&client), Arc::clone(&stats)),
            reconciler,
            client,
            stats,
        }
    }

    /// Runs one full extraction for the given window.
    pub async fn extract(
        &self,
        window: &AttributionWindow,
    ) -> Result<ExtractionResult, EngineError> {
        let started = Instant::now();
        let now = UtcTimestamp::now();

        let (window, clamped) = window.clamp_end(now)?;
        let mut flags = Vec::new();
        if clamped {
            tracing::info!(end = %window.end, "window end was in the future, clamped to now");
            flags.push(ValidationFlag::WindowClamped);
        }

        let metric_id = match self.metrics.find_conversion_metric().await {
            Ok(id) => id,
            Err(error) if error.is_resource_scoped() => {
                tracing::warn!(%error, "conversion metric discovery failed");
                None
            }
            Err(hard) => return Err(hard),
        };

        let (revenue, campaign_bundle, flows_fetch, lists_fetch, forms_fetch) = tokio::join!(
            self.fetch_revenue(metric_id.as_deref(), &window),
            self.fetch_campaigns(&window),
            self.flows.flows(),
            self.lists.lists(),
            self.forms.forms(&window),
        );

        let (total_revenue, flow_groups) = revenue?;
        let campaign_bundle = campaign_bundle?;
        let (mut flows, flows_unavailable) =
            tolerate_fetch("flows", flows_fetch, Vec::default())?;
        let (lists, lists_unavailable) = tolerate_fetch("lists", lists_fetch, Vec::default())?;
        let (forms, forms_unavailable) = tolerate_fetch("forms", forms_fetch, Vec::default())?;

        let inputs = ReconcileInputs {
            total_revenue,
            flow_revenue: flow_groups.clone(),
            campaign_revenue: campaign_bundle.revenue,
            campaign_by_channel: campaign_bundle.by_channel,
        };
        let snapshot = reconcile(&inputs, &self.reconciler);

        stitch_flow_revenue(&mut flows, flow_groups.as_deref(), &snapshot);

        if campaign_bundle.unavailable {
            flags.push(ValidationFlag::CampaignsUnavailable);
        }
        if flows_unavailable {
            flags.push(ValidationFlag::FlowsUnavailable);
        }
        if lists_unavailable {
            flags.push(ValidationFlag::ListsUnavailable);
        }
        if forms_unavailable {
            flags.push(ValidationFlag::FormsUnavailable);
        }
        flags.extend(snapshot.validation_flags.iter().copied());

        let result = ExtractionResult {
            request_id: Uuid::new_v4().to_string(),
            window,
            snapshot,
            campaigns: campaign_bundle.campaigns,
            flows,
            lists,
            forms,
            validation_flags: flags,
            degraded_parse_count: self.stats.degraded(),
            requests_issued: self.client.attempts(),
            generated_at: now,
            latency_ms: started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64,
        };

        tracing::info!(
            request_id = %result.request_id,
            kav = result.snapshot.kav_percentage,
            flags = result.validation_flags.len(),
            requests = result.requests_issued,
            "extraction complete"
        );

        Ok(result)
    }

    async fn fetch_revenue(
        &self,
        metric_id: Option<&str>,
        window: &AttributionWindow,
    ) -> Result<(Option<f64>, Option<Vec<(String, f64)>>), EngineError> {
        let Some(metric_id) = metric_id else {
            return Ok((None, None));
        };

        let (total_fetch, grouped_fetch) = tokio::join!(
            self.metrics.revenue_total(metric_id, window),
            self.metrics
                .revenue_grouped(metric_id, window, FLOW_ATTRIBUTION_DIMENSION),
        );

        let (total, total_unavailable) =
            tolerate_fetch("metric_aggregates_total", total_fetch, None)?;
        let (grouped, grouped_unavailable) =
            tolerate_fetch("metric_aggregates_grouped", grouped_fetch, Vec::default())?;

        Ok((
            if total_unavailable { None } else { total },
            if grouped_unavailable {
                None
            } else {
                Some(grouped)
            },
        ))
    }

    async fn fetch_campaigns(
        &self,
        window: &AttributionWindow,
    ) -> Result<CampaignBundle, EngineError> {
        let mut campaigns = Vec::new();
        let mut list_unavailable = false;

        for channel in Channel::ALL {
            let fetch = match self.campaigns.campaigns_in_window(window, channel).await {
                Ok(fetch) => fetch,
                Err(error) if error.is_resource_scoped() => {
                    tracing::warn!(%channel, %error, "campaign inventory query failed");
                    list_unavailable = true;
                    continue;
                }
                Err(hard) => return Err(hard),
            };
            list_unavailable |= fetch.unavailable;
            campaigns.extend(fetch.data);
        }

        let stats_unavailable = match self
            .campaigns
            .apply_statistics(window, &mut campaigns)
            .await
        {
            Ok(fetch) => fetch.unavailable,
            Err(error) if error.is_resource_scoped() => {
                tracing::warn!(%error, "campaign statistics query failed");
                true
            }
            Err(hard) => return Err(hard),
        };

        // Revenue counts as measured only when the statistics call succeeded
        // and the inventory was not silently truncated to nothing.
        let measured = !stats_unavailable && !(list_unavailable && campaigns.is_empty());
        let (revenue, by_channel) = if measured {
            let mut split = ChannelBreakdown::default();
            for campaign in &campaigns {
                match campaign.channel {
                    Channel::Email => split.email += campaign.revenue,
                    Channel::Sms => split.sms += campaign.revenue,
                }
            }
            (Some(split.total()), Some(split))
        } else {
            (None, None)
        };

        Ok(CampaignBundle {
            campaigns,
            revenue,
            by_channel,
            unavailable: list_unavailable || stats_unavailable,
        })
    }
}

struct CampaignBundle {
    campaigns: Vec<CampaignSummary>,
    revenue: Option<f64>,
    by_channel: Option<ChannelBreakdown>,
    unavailable: bool,
}

/// Fills per-flow revenue from the grouped aggregate. When the grouped data
/// was degenerate and discarded by the reconciler, the raw numbers are not
/// re-surfaced on the summaries either.
fn stitch_flow_revenue(
    flows: &mut [FlowSummary],
    groups: Option<&[(String, f64)]>,
    snapshot: &RevenueSnapshot,
) {
    if snapshot
        .validation_flags
        .contains(&ValidationFlag::FlowEstimated)
    {
        return;
    }
    let Some(groups) = groups else {
        return;
    };

    for flow in flows.iter_mut() {
        if let Some((_, revenue)) = groups.iter().find(|(id, _)| *id == flow.id) {
            flow.revenue = *revenue;
        }
    }
}

/// Unwraps a resource fetch, downgrading resource-scoped failures (rate-limit
/// exhaustion, transient exhaustion, malformed bodies) to an unavailable
/// default. Auth and window errors stay hard.
fn tolerate_fetch<T>(
    resource: &'static str,
    result: Result<ResourceFetch<T>, EngineError>,
    default: T,
) -> Result<(T, bool), EngineError> {
    match result {
        Ok(fetch) => Ok((fetch.data, fetch.unavailable)),
        Err(error) if error.is_resource_scoped() => {
            tracing::warn!(resource, %error, "resource temporarily unavailable");
            Ok((default, true))
        }
        Err(hard) => Err(hard),
    }
}
