use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{AttributionWindow, Channel, UtcTimestamp};
use crate::error::EngineError;
use crate::filters::{campaign_filter, TimeframeFilter};
use crate::http::{ApiClient, RequestEnvelope};
use crate::parse::{normalize, ParseStats};
use crate::services::{absorb_rejection, ResourceFetch};

/// One sent campaign with its engagement and revenue statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub id: String,
    pub name: String,
    pub channel: Channel,
    pub send_time: Option<UtcTimestamp>,
    pub open_rate: f64,
    pub click_rate: f64,
    pub revenue: f64,
}

/// Campaign inventory plus value statistics.
///
/// The statistics endpoint only speaks the relative-timeframe dialect, so the
/// revenue figures here carry that dialect's imprecision: the server resolves
/// the period against its own clock, not the requested window's end.
pub struct CampaignsService {
    client: Arc<ApiClient>,
    stats: Arc<ParseStats>,
}

impl CampaignsService {
    pub fn new(client: Arc<ApiClient>, stats: Arc<ParseStats>) -> Self {
        Self { client, stats }
    }

    /// Campaigns of one channel scheduled inside the window. Certain
    /// channel/dimension combinations are rejected upstream with a 4xx; those
    /// degrade to an empty list.
    pub async fn campaigns_in_window(
        &self,
        window: &AttributionWindow,
        channel: Channel,
    ) -> Result<ResourceFetch<Vec<CampaignSummary>>, EngineError> {
        let envelope = RequestEnvelope::get("campaigns")
            .with_query("filter", campaign_filter(window, channel));

        let result = match self.client.request(&envelope).await {
            Ok(response) => Ok(parse_campaigns(&response, channel)),
            Err(error) => Err(error),
        };

        absorb_rejection("campaigns", result)
    }

    /// Per-campaign conversion value and engagement rates under the relative
    /// dialect, merged into the given summaries.
    pub async fn apply_statistics(
        &self,
        window: &AttributionWindow,
        campaigns: &mut [CampaignSummary],
    ) -> Result<ResourceFetch<()>, EngineError> {
        if campaigns.is_empty() {
            return Ok(ResourceFetch::available(()));
        }

        let timeframe = TimeframeFilter::relative(window);
        let keyword = timeframe
            .keyword()
            .expect("relative filters always carry a keyword");

        let envelope = RequestEnvelope::post("campaign-values-reports").with_json_body(&json!({
            "data": {
                "type": "campaign-values-report",
                "attributes": {
                    "timeframe": { "key": keyword },
                    "statistics": ["conversion_value", "open_rate", "click_rate"],
                }
            }
        }));

        let result = match self.client.request(&envelope).await {
            Ok(response) => {
                let by_campaign = parse_statistics(&response, self.stats.as_ref());
                for campaign in campaigns.iter_mut() {
                    if let Some(stats) = by_campaign.get(&campaign.id) {
                        campaign.revenue = stats.conversion_value;
                        campaign.open_rate = stats.open_rate;
                        campaign.click_rate = stats.click_rate;
                    }
                }
                Ok(())
            }
            Err(error) => Err(error),
        };

        absorb_rejection("campaign_statistics", result)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CampaignStatistics {
    conversion_value: f64,
    open_rate: f64,
    click_rate: f64,
}

fn parse_campaigns(response: &Value, channel: Channel) -> Vec<CampaignSummary> {
    response
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let id = row.get("id").and_then(Value::as_str)?;
                    let name = row
                        .pointer("/attributes/name")
                        .and_then(Value::as_str)
                        .unwrap_or("(unnamed campaign)");
                    let send_time = row
                        .pointer("/attributes/send_time")
                        .and_then(Value::as_str)
                        .and_then(|raw| UtcTimestamp::parse(raw).ok());

                    Some(CampaignSummary {
                        id: id.to_owned(),
                        name: name.to_owned(),
                        channel,
                        send_time,
                        open_rate: 0.0,
                        click_rate: 0.0,
                        revenue: 0.0,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_statistics(response: &Value, stats: &ParseStats) -> HashMap<String, CampaignStatistics> {
    let rows = response
        .pointer("/data/attributes/results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    rows.iter()
        .filter_map(|row| {
            let id = row
                .pointer("/groupings/campaign_id")
                .and_then(Value::as_str)?;
            let statistics = row.get("statistics");

            let field = |name: &str| {
                stats.record(normalize(
                    statistics.and_then(|values| values.get(name)),
                ))
            };

            Some((
                id.to_owned(),
                CampaignStatistics {
                    conversion_value: field("conversion_value"),
                    open_rate: field("open_rate"),
                    click_rate: field("click_rate"),
                },
            ))
        })
        .collect()
}
