use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::AttributionWindow;
use crate::error::EngineError;
use crate::filters::TimeframeFilter;
use crate::http::{ApiClient, RequestEnvelope};
use crate::parse::{normalize, ParseStats};
use crate::services::{absorb_rejection, ResourceFetch};

/// One signup form with its submit count over the reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSummary {
    pub id: String,
    pub name: String,
    pub status: Option<String>,
    pub submits: f64,
}

/// Form inventory and submit statistics (relative-timeframe dialect only).
pub struct FormsService {
    client: Arc<ApiClient>,
    stats: Arc<ParseStats>,
}

impl FormsService {
    pub fn new(client: Arc<ApiClient>, stats: Arc<ParseStats>) -> Self {
        Self { client, stats }
    }

    pub async fn forms(
        &self,
        window: &AttributionWindow,
    ) -> Result<ResourceFetch<Vec<FormSummary>>, EngineError> {
        let mut fetch = {
            let result = match self.client.request(&RequestEnvelope::get("forms")).await {
                Ok(response) => Ok(parse_forms(&response)),
                Err(error) => Err(error),
            };
            absorb_rejection("forms", result)?
        };

        if fetch.data.is_empty() {
            return Ok(fetch);
        }

        let submits = self.submit_counts(window).await?;
        if let Some(by_form) = submits {
            for form in fetch.data.iter_mut() {
                if let Some(count) = by_form.get(&form.id) {
                    form.submits = *count;
                }
            }
        }

        Ok(fetch)
    }

    async fn submit_counts(
        &self,
        window: &AttributionWindow,
    ) -> Result<Option<HashMap<String, f64>>, EngineError> {
        let timeframe = TimeframeFilter::relative(window);
        let keyword = timeframe
            .keyword()
            .expect("relative filters always carry a keyword");

        let envelope = RequestEnvelope::post("form-values-reports").with_json_body(&json!({
            "data": {
                "type": "form-values-report",
                "attributes": {
                    "timeframe": { "key": keyword },
                    "statistics": ["submits"],
                }
            }
        }));

        let fetch = absorb_rejection(
            "form_statistics",
            self.client.request(&envelope).await,
        )?;
        if fetch.unavailable {
            return Ok(None);
        }

        let rows = fetch
            .data
            .pointer("/data/attributes/results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(Some(
            rows.iter()
                .filter_map(|row| {
                    let id = row.pointer("/groupings/form_id").and_then(Value::as_str)?;
                    let submits = self
                        .stats
                        .record(normalize(row.pointer("/statistics/submits")));
                    Some((id.to_owned(), submits))
                })
                .collect(),
        ))
    }
}

fn parse_forms(response: &Value) -> Vec<FormSummary> {
    response
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let id = row.get("id").and_then(Value::as_str)?;
                    Some(FormSummary {
                        id: id.to_owned(),
                        name: row
                            .pointer("/attributes/name")
                            .and_then(Value::as_str)
                            .unwrap_or("(unnamed form)")
                            .to_owned(),
                        status: row
                            .pointer("/attributes/status")
                            .and_then(Value::as_str)
                            .map(str::to_owned),
                        submits: 0.0,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
