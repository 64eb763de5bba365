use std::sync::Arc;

use serde_json::{json, Value};

use crate::domain::AttributionWindow;
use crate::error::EngineError;
use crate::filters::TimeframeFilter;
use crate::http::{ApiClient, RequestEnvelope};
use crate::parse::{sum_series, ParseStats};
use crate::services::{absorb_rejection, ResourceFetch};

/// Conversion metric the revenue queries aggregate over.
pub const CONVERSION_METRIC_NAME: &str = "Placed Order";

/// Metric discovery and aggregate queries.
///
/// Aggregate endpoints accept the exact-range dialect, so these are the only
/// revenue sources with faithful window boundaries.
pub struct MetricsService {
    client: Arc<ApiClient>,
    stats: Arc<ParseStats>,
}

impl MetricsService {
    pub fn new(client: Arc<ApiClient>, stats: Arc<ParseStats>) -> Self {
        Self { client, stats }
    }

    /// Finds the conversion metric id by name. `None` when the account has no
    /// such metric (no orders have ever been tracked).
    pub async fn find_conversion_metric(&self) -> Result<Option<String>, EngineError> {
        let response = self.client.request(&RequestEnvelope::get("metrics")).await?;

        let metrics = response
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(metrics.iter().find_map(|metric| {
            let name = metric.pointer("/attributes/name").and_then(Value::as_str)?;
            if name != CONVERSION_METRIC_NAME {
                return None;
            }
            metric
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_owned)
        }))
    }

    /// Total conversion value over the exact window.
    pub async fn revenue_total(
        &self,
        metric_id: &str,
        window: &AttributionWindow,
    ) -> Result<ResourceFetch<Option<f64>>, EngineError> {
        let result = self
            .aggregate(metric_id, window, None)
            .await
            .map(|rows| Some(rows.into_iter().map(|(_, value)| value).sum()));

        absorb_rejection("metric_aggregates_total", result)
    }

    /// Conversion value grouped by an attribution dimension, e.g. `$flow`.
    pub async fn revenue_grouped(
        &self,
        metric_id: &str,
        window: &AttributionWindow,
        group_by: &str,
    ) -> Result<ResourceFetch<Vec<(String, f64)>>, EngineError> {
        let result = self.aggregate(metric_id, window, Some(group_by)).await;
        absorb_rejection("metric_aggregates_grouped", result)
    }

    async fn aggregate(
        &self,
        metric_id: &str,
        window: &AttributionWindow,
        group_by: Option<&str>,
    ) -> Result<Vec<(String, f64)>, EngineError> {
        let timeframe = TimeframeFilter::exact(window, "datetime");
        let expression = timeframe
            .expression()
            .expect("exact filters always carry an expression");

        let mut attributes = json!({
            "metric_id": metric_id,
            "measurements": ["sum_value"],
            "interval": "month",
            "filter": [expression],
            "timezone": window.timezone,
        });
        if let Some(dimension) = group_by {
            attributes["by"] = json!([dimension]);
        }

        let envelope = RequestEnvelope::post("metric-aggregates")
            .with_json_body(&json!({ "data": { "type": "metric-aggregate", "attributes": attributes } }));
        let response = self.client.request(&envelope).await?;

        let rows = response
            .pointer("/data/attributes/data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(rows
            .iter()
            .map(|row| {
                let dimension = row
                    .pointer("/dimensions/0")
                    .and_then(Value::as_str)
                    .unwrap_or("all")
                    .to_owned();
                let value = sum_series(
                    row.pointer("/measurements/sum_value"),
                    self.stats.as_ref(),
                );
                (dimension, value)
            })
            .collect())
    }
}
