use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::http::{ApiClient, RequestEnvelope};
use crate::parse::{normalize, ParseStats};
use crate::services::{absorb_rejection, ResourceFetch};

/// Detailed member counts are fetched per list; cap how many lists get the
/// extra call so large accounts do not drain the rate budget on inventory.
const MEMBER_COUNT_LIMIT: usize = 10;

/// One subscriber list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSummary {
    pub id: String,
    pub name: String,
    pub member_count: Option<f64>,
}

/// List inventory and per-list member counts.
pub struct ListsService {
    client: Arc<ApiClient>,
    stats: Arc<ParseStats>,
}

impl ListsService {
    pub fn new(client: Arc<ApiClient>, stats: Arc<ParseStats>) -> Self {
        Self { client, stats }
    }

    pub async fn lists(&self) -> Result<ResourceFetch<Vec<ListSummary>>, EngineError> {
        let mut fetch = {
            let result = match self.client.request(&RequestEnvelope::get("lists")).await {
                Ok(response) => Ok(parse_lists(&response)),
                Err(error) => Err(error),
            };
            absorb_rejection("lists", result)?
        };

        for list in fetch.data.iter_mut().take(MEMBER_COUNT_LIMIT) {
            list.member_count = self.member_count(&list.id).await?;
        }

        Ok(fetch)
    }

    /// Member count for one list; a rejected count query leaves the count
    /// unknown rather than failing the inventory.
    async fn member_count(&self, list_id: &str) -> Result<Option<f64>, EngineError> {
        let envelope = RequestEnvelope::get(format!("lists/{list_id}"))
            .with_query("additional-fields[list]", "profile_count");

        let fetch = absorb_rejection(
            "list_member_count",
            self.client.request(&envelope).await,
        )?;
        if fetch.unavailable {
            return Ok(None);
        }

        let raw = fetch.data.pointer("/data/attributes/profile_count");
        if raw.is_none() {
            return Ok(None);
        }

        Ok(Some(self.stats.record(normalize(raw))))
    }
}

fn parse_lists(response: &Value) -> Vec<ListSummary> {
    response
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let id = row.get("id").and_then(Value::as_str)?;
                    Some(ListSummary {
                        id: id.to_owned(),
                        name: row
                            .pointer("/attributes/name")
                            .and_then(Value::as_str)
                            .unwrap_or("(unnamed list)")
                            .to_owned(),
                        member_count: None,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn list_rows_become_summaries() {
        let response = json!({
            "data": [
                { "id": "L1", "attributes": { "name": "Newsletter" } },
                { "id": "L2", "attributes": { "name": "VIP" } },
            ]
        });

        let lists = parse_lists(&response);

        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].name, "Newsletter");
        assert_eq!(lists[0].member_count, None);
    }
}
