//! End-to-end extraction behavior over a scripted transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;

use revlens_core::{
    ApiClient, AttributionWindow, EngineConfig, Extractor, HttpTransport, PreparedRequest,
    RateBudget, ReconcilerConfig, TransportError, TransportResponse, UtcTimestamp, ValidationFlag,
};

type Responder =
    Box<dyn Fn(&PreparedRequest) -> Result<TransportResponse, TransportError> + Send + Sync>;

struct RoutedTransport {
    responder: Responder,
}

impl RoutedTransport {
    fn new(responder: Responder) -> Self {
        Self { responder }
    }
}

impl HttpTransport for RoutedTransport {
    fn execute<'a>(
        &'a self,
        request: PreparedRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>> {
        let outcome = (self.responder)(&request);
        Box::pin(async move { outcome })
    }
}

fn ok(body: serde_json::Value) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse {
        status: 200,
        body: body.to_string(),
    })
}

fn rejected(status: u16, detail: &str) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse {
        status,
        body: json!({ "errors": [{ "detail": detail }] }).to_string(),
    })
}

fn is_post(request: &PreparedRequest) -> bool {
    matches!(request.method, revlens_core::HttpMethod::Post)
}

/// Upstream with a degenerate flow grouping: the grouped aggregate returns
/// all revenue under a single flow, and the SMS campaign filter combination
/// is rejected outright.
fn degenerate_upstream() -> Responder {
    Box::new(|request| {
        let url = &request.url;
        if is_post(request) && url.contains("metric-aggregates") {
            let body = request.body.as_deref().unwrap_or_default();
            if body.contains("\"by\"") {
                // Grouping silently fell back to all revenue upstream.
                return ok(json!({ "data": { "attributes": { "data": [
                    { "dimensions": ["FLOW1"], "measurements": { "sum_value": [100_000.0] } }
                ] } } }));
            }
            return ok(json!({ "data": { "attributes": { "data": [
                { "dimensions": [], "measurements": { "sum_value": [60_000.0, 40_000.0] } }
            ] } } }));
        }
        if is_post(request) && url.contains("campaign-values-reports") {
            return ok(json!({ "data": { "attributes": { "results": [
                {
                    "groupings": { "campaign_id": "C1" },
                    "statistics": { "conversion_value": 40_000.0, "open_rate": 0.38, "click_rate": 0.05 }
                }
            ] } } }));
        }
        if is_post(request) && url.contains("form-values-reports") {
            return ok(json!({ "data": { "attributes": { "results": [
                { "groupings": { "form_id": "FM1" }, "statistics": { "submits": 412 } }
            ] } } }));
        }
        if url.contains("/campaigns") {
            if url.contains("sms") {
                return rejected(400, "channel filter combination is not supported");
            }
            return ok(json!({ "data": [
                { "id": "C1", "attributes": { "name": "Spring Sale", "send_time": "2025-03-05T10:00:00Z" } }
            ] }));
        }
        if url.contains("/metrics") {
            return ok(json!({ "data": [
                { "id": "M1", "attributes": { "name": "Placed Order" } }
            ] }));
        }
        if url.contains("/flows") {
            return ok(json!({ "data": [
                { "id": "FLOW1", "attributes": { "name": "Welcome Series", "status": "live" } }
            ] }));
        }
        if url.contains("/lists/") {
            return ok(json!({ "data": { "attributes": { "profile_count": 5_200 } } }));
        }
        if url.contains("/lists") {
            return ok(json!({ "data": [
                { "id": "L1", "attributes": { "name": "Newsletter" } }
            ] }));
        }
        if url.contains("/forms") {
            return ok(json!({ "data": [
                { "id": "FM1", "attributes": { "name": "Exit Intent", "status": "live" } }
            ] }));
        }
        rejected(404, "unrouted request in test upstream")
    })
}

fn extractor(responder: Responder) -> Extractor {
    let config = EngineConfig::new("pk_test");
    let client = Arc::new(ApiClient::with_transport(
        &config,
        RateBudget::with_limits(1_000, 10_000),
        Arc::new(RoutedTransport::new(responder)),
    ));
    Extractor::with_client(client, ReconcilerConfig::default())
}

fn past_window() -> AttributionWindow {
    let now = UtcTimestamp::now();
    AttributionWindow::new(now.days_ago(91), now.days_ago(1), "UTC").expect("valid window")
}

#[tokio::test]
async fn degenerate_flow_revenue_is_estimated_not_surfaced() {
    let extractor = extractor(degenerate_upstream());

    let result = extractor
        .extract(&past_window())
        .await
        .expect("extraction must succeed");

    let snapshot = &result.snapshot;
    assert_eq!(snapshot.total_revenue, 100_000.0);
    assert!(snapshot
        .validation_flags
        .contains(&ValidationFlag::FlowEstimated));
    assert_ne!(snapshot.flow_revenue, snapshot.total_revenue);
    assert_eq!(snapshot.flow_revenue, 20_000.0);
    assert_eq!(snapshot.campaign_revenue, 40_000.0);
    assert_eq!(snapshot.attributed_revenue, 60_000.0);
    assert!(snapshot.kav_percentage <= 100.0);
    assert!(!result.validation_flags.is_empty());

    // The rejected SMS filter degraded instead of aborting the run.
    assert!(result
        .validation_flags
        .contains(&ValidationFlag::CampaignsUnavailable));
    assert_eq!(result.campaigns.len(), 1);
    assert_eq!(result.campaigns[0].revenue, 40_000.0);

    // Degenerate per-flow numbers are not re-surfaced on the summaries.
    assert_eq!(result.flows.len(), 1);
    assert_eq!(result.flows[0].revenue, 0.0);

    assert_eq!(result.lists[0].member_count, Some(5_200.0));
    assert_eq!(result.forms[0].submits, 412.0);
    assert!(result.requests_issued >= 8);
}

#[tokio::test]
async fn one_failed_resource_does_not_abort_the_run() {
    let inner = degenerate_upstream();
    let responder: Responder = Box::new(move |request| {
        if request.url.contains("/forms") || request.url.contains("form-values-reports") {
            return rejected(400, "forms are not enabled for this account");
        }
        inner(request)
    });
    let extractor = extractor(responder);

    let result = extractor
        .extract(&past_window())
        .await
        .expect("extraction must succeed despite the failed resource");

    assert!(result
        .validation_flags
        .contains(&ValidationFlag::FormsUnavailable));
    assert!(result.forms.is_empty());
    // The rest of the extraction is intact.
    assert_eq!(result.snapshot.total_revenue, 100_000.0);
    assert_eq!(result.flows.len(), 1);
    assert_eq!(result.lists.len(), 1);
}

#[tokio::test]
async fn future_window_end_is_clamped_and_recorded() {
    let extractor = extractor(degenerate_upstream());
    let now = UtcTimestamp::now();
    let window =
        AttributionWindow::new(now.days_ago(30), now.days_ago(-1), "UTC").expect("valid window");

    let result = extractor
        .extract(&window)
        .await
        .expect("extraction must succeed");

    assert!(result
        .validation_flags
        .contains(&ValidationFlag::WindowClamped));
    assert!(result.window.end < window.end);
}

#[tokio::test]
async fn inverted_window_is_a_hard_error() {
    let now = UtcTimestamp::now();
    let inverted = AttributionWindow::new(now.days_ago(1), now.days_ago(30), "UTC");

    assert!(inverted.is_err());
}

#[tokio::test]
async fn missing_conversion_metric_degrades_to_estimates() {
    let inner = degenerate_upstream();
    let responder: Responder = Box::new(move |request| {
        if !is_post(request) && request.url.contains("/metrics") {
            return ok(json!({ "data": [] }));
        }
        inner(request)
    });
    let extractor = extractor(responder);

    let result = extractor
        .extract(&past_window())
        .await
        .expect("extraction must succeed");

    let snapshot = &result.snapshot;
    assert!(snapshot
        .validation_flags
        .contains(&ValidationFlag::TotalUnavailable));
    assert_eq!(snapshot.total_revenue, 0.0);
    assert_eq!(snapshot.kav_percentage, 0.0);
    // Without a total the attributed sum rescales to the zero ceiling, but
    // the per-campaign measurements survive on the summaries.
    assert!(snapshot
        .validation_flags
        .contains(&ValidationFlag::RescaledOverCeiling));
    assert_eq!(snapshot.attributed_revenue, 0.0);
    assert_eq!(result.campaigns[0].revenue, 40_000.0);
}

#[tokio::test]
async fn rejected_credentials_abort_the_run() {
    let responder: Responder = Box::new(|_| {
        Ok(TransportResponse {
            status: 401,
            body: String::from("invalid api key"),
        })
    });
    let extractor = extractor(responder);

    let error = extractor
        .extract(&past_window())
        .await
        .expect_err("auth failures must propagate");

    assert!(matches!(
        error,
        revlens_core::EngineError::Unauthorized { status: 401 }
    ));
}
