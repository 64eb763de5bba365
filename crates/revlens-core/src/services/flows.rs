use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::http::{ApiClient, RequestEnvelope};
use crate::services::{absorb_rejection, ResourceFetch};

/// One automation flow. Revenue is stitched in by the orchestrator from the
/// flow-grouped aggregate query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub id: String,
    pub name: String,
    pub status: Option<String>,
    pub revenue: f64,
}

/// Flow inventory.
pub struct FlowsService {
    client: Arc<ApiClient>,
}

impl FlowsService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn flows(&self) -> Result<ResourceFetch<Vec<FlowSummary>>, EngineError> {
        let result = match self.client.request(&RequestEnvelope::get("flows")).await {
            Ok(response) => Ok(parse_flows(&response)),
            Err(error) => Err(error),
        };

        absorb_rejection("flows", result)
    }
}

fn parse_flows(response: &Value) -> Vec<FlowSummary> {
    response
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let id = row.get("id").and_then(Value::as_str)?;
                    Some(FlowSummary {
                        id: id.to_owned(),
                        name: row
                            .pointer("/attributes/name")
                            .and_then(Value::as_str)
                            .unwrap_or("(unnamed flow)")
                            .to_owned(),
                        status: row
                            .pointer("/attributes/status")
                            .and_then(Value::as_str)
                            .map(str::to_owned),
                        revenue: 0.0,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
