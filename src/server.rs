//! REST + metrics adapter over the core pipeline. A thin layer per §1/§6
//! — the contracts are fixed by the specification, the framing is
//! grounded on the teacher's `build_router`/`metrics_handler`/
//! `ready_handler` shape in `src/commands/watch.rs`.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{MatchedPath, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use crate::metrics;
use crate::model::Identity;
use crate::scheduler::{Scheduler, TriggerOutcome};

pub fn build_router(scheduler: Arc<Scheduler>) -> Router {
    Router::new()
        .route("/services", get(services_handler))
        .route("/overview", get(overview_list_handler))
        .route("/overview/:service", get(overview_one_handler))
        .route("/overview/:service/naming", get(naming_handler))
        .route("/overview/:service/errors", get(errors_handler))
        .route("/summary", get(summary_handler))
        .route("/recommendations", get(recommendations_handler))
        .route("/harvest", post(harvest_handler))
        .route("/health/live", get(health_live_handler))
        .route("/health/ready", get(health_ready_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(record_http_request_metrics))
        .with_state(scheduler)
}

/// Records every request in `http_requests_total`/`http_request_duration_seconds`,
/// the way the teacher's `watch.rs` records pod-event counters around its handlers.
async fn record_http_request_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let started = Instant::now();
    let response = next.run(request).await;
    metrics::record_http_request(&method, &endpoint, response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

#[derive(Debug, Deserialize)]
struct NamespaceQuery {
    namespace: Option<String>,
}

fn resolve_identity(service: String, namespace: Option<String>) -> Identity {
    Identity::new(service, namespace.unwrap_or_else(|| "default".to_string()))
}

async fn services_handler(State(scheduler): State<Arc<Scheduler>>) -> impl IntoResponse {
    Json(scheduler.last_services().await)
}

async fn overview_list_handler(State(scheduler): State<Arc<Scheduler>>) -> impl IntoResponse {
    Json(scheduler.aggregator().list().await)
}

async fn overview_one_handler(
    State(scheduler): State<Arc<Scheduler>>,
    Path(service): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> impl IntoResponse {
    let identity = resolve_identity(service, query.namespace);
    match scheduler.aggregator().get(&identity).await {
        Some(overview) => (StatusCode::OK, Json(overview)).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "no overview for identity"}))).into_response(),
    }
}

async fn naming_handler(
    State(scheduler): State<Arc<Scheduler>>,
    Path(service): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> impl IntoResponse {
    let identity = resolve_identity(service, query.namespace);
    Json(scheduler.aggregator().details_naming(&identity).await)
}

async fn errors_handler(
    State(scheduler): State<Arc<Scheduler>>,
    Path(service): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> impl IntoResponse {
    let identity = resolve_identity(service, query.namespace);
    Json(scheduler.aggregator().details_errors(&identity).await)
}

async fn summary_handler(State(scheduler): State<Arc<Scheduler>>) -> impl IntoResponse {
    Json(scheduler.aggregator().summary().await)
}

async fn recommendations_handler(State(scheduler): State<Arc<Scheduler>>) -> impl IntoResponse {
    Json(scheduler.aggregator().recommendations().await)
}

#[derive(Debug, Deserialize, Default)]
struct HarvestRequest {
    #[serde(default)]
    force: bool,
}

async fn harvest_handler(State(scheduler): State<Arc<Scheduler>>, body: Bytes) -> impl IntoResponse {
    let force = serde_json::from_slice::<HarvestRequest>(&body)
        .map(|r| r.force)
        .unwrap_or(false);
    match scheduler.trigger_now(force).await {
        TriggerOutcome::Started(report) => (
            StatusCode::OK,
            Json(json!({
                "cycle_id": report.cycle_id,
                "discovered": report.discovered,
                "harvested": report.harvested,
                "failed": report.failed,
                "analyzed": report.analyzed,
                "skipped_unchanged": report.skipped_unchanged,
                "cancelled": report.cancelled,
            })),
        ),
        TriggerOutcome::AlreadyRunning => (
            StatusCode::CONFLICT,
            Json(json!({"status": "already running"})),
        ),
    }
}

async fn health_live_handler() -> impl IntoResponse {
    metrics::update_health_status("live", true);
    (StatusCode::OK, "OK")
}

async fn health_ready_handler(State(scheduler): State<Arc<Scheduler>>) -> impl IntoResponse {
    // Ready once at least one cycle has produced a snapshot, or the
    // service has never had anything to discover.
    let ready = !(scheduler.aggregator().list().await.is_empty() && scheduler.is_running());
    metrics::update_health_status("ready", ready);
    if ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather() {
        Ok(body) => (StatusCode::OK, body),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::cluster_index::StaticClusterIndex;
    use crate::config::Config;
    use crate::linter::ReferenceLinter;
    use crate::profile::DomainProfile;

    async fn test_scheduler() -> Arc<Scheduler> {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config {
            storage_path: tmp.path().to_path_buf(),
            ..Config::default()
        };
        // Leak the tempdir so it outlives the test; fine for a short-lived test process.
        std::mem::forget(tmp);

        Arc::new(
            Scheduler::new(
                cfg,
                Arc::new(StaticClusterIndex::new(Vec::new())),
                Arc::new(ReferenceLinter::new()),
                Arc::new(DomainProfile::default()),
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn health_live_always_ok() {
        let app = build_router(test_scheduler().await);
        let req = Request::builder().uri("/health/live").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn overview_for_unknown_identity_is_404() {
        let app = build_router(test_scheduler().await);
        let req = Request::builder()
            .uri("/overview/unknown-service")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn summary_of_empty_fleet_has_zero_average() {
        let app = build_router(test_scheduler().await);
        let req = Request::builder().uri("/summary").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["total_services"], 0);
        assert_eq!(value["average_score"], 0.0);
    }

    #[tokio::test]
    async fn recommendations_endpoint_serves_empty_list_for_fresh_fleet() {
        let app = build_router(test_scheduler().await);
        let req = Request::builder().uri("/recommendations").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!([]));
    }

    #[tokio::test]
    async fn harvest_trigger_returns_cycle_report() {
        let app = build_router(test_scheduler().await);
        let req = Request::builder()
            .method("POST")
            .uri("/harvest")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let app = build_router(test_scheduler().await);
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
