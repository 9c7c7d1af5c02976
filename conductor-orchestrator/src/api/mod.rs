//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod auth;
pub mod error;
pub mod extract;
pub mod health;
pub mod job;
pub mod ticket;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::{EscalationService, JobOrchestrator, LogService, RetryPolicy};

/// Services shared by all handlers, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub logs: Arc<LogService>,
    pub escalation: Arc<EscalationService>,
    /// Dispatch policy for newly created jobs
    pub retry: RetryPolicy,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Job endpoints
        .route("/jobs", post(job::create_job).get(job::list_jobs))
        .route("/jobs/stats", get(job::job_statistics))
        .route("/jobs/token/{token}", get(job::get_job_by_token))
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/dispatch", post(job::dispatch_job))
        .route("/jobs/{id}/cancel", post(job::cancel_job))
        .route("/jobs/{id}/status", post(job::report_status))
        .route(
            "/jobs/{id}/logs",
            get(job::get_job_logs).post(job::append_job_logs),
        )
        // Ticket endpoints
        .route("/jobs/{id}/ticket", post(ticket::create_ticket))
        .route("/tickets/{token}", get(ticket::get_ticket));

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .nest("/api", api)
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ACTIVE_SCRIPT, ACTIVE_TARGET, Harness, INACTIVE_SCRIPT};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn call(
        router: &Router,
        method: &str,
        uri: &str,
        principal: Option<(i64, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = principal {
            builder = builder
                .header(auth::PRINCIPAL_ID_HEADER, id.to_string())
                .header(auth::PRINCIPAL_ROLE_HEADER, role);
        }
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    const USER: Option<(i64, &str)> = Some((1, "user"));
    const ADMIN: Option<(i64, &str)> = Some((9, "admin"));

    fn create_body(script_id: i64) -> Value {
        json!({
            "script_id": script_id,
            "target_id": ACTIVE_TARGET,
            "extra_parameters": {"version": "1.2.3"}
        })
    }

    #[tokio::test]
    async fn test_health_needs_no_principal() {
        let harness = Harness::new();
        let router = create_router(harness.state());

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_or_unknown_principal_is_unauthorized() {
        let harness = Harness::new();
        let router = create_router(harness.state());

        let (status, body) = call(&router, "GET", "/api/jobs", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, _) = call(&router, "GET", "/api/jobs", Some((1, "root")), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_dispatches_and_returns_created() {
        let harness = Harness::new();
        let router = create_router(harness.state());

        let (status, body) = call(
            &router,
            "POST",
            "/api/jobs",
            USER,
            Some(create_body(ACTIVE_SCRIPT)),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["worker_handle"], "w-1");
        assert_eq!(body["principal_id"], 1);
        assert_eq!(body["extra_parameters"]["version"], "1.2.3");
    }

    #[tokio::test]
    async fn test_create_returns_failed_job_when_dispatch_exhausted() {
        let harness = Harness::new();
        harness.gateway.fail_next(10);
        let router = create_router(harness.state());

        let (status, body) = call(
            &router,
            "POST",
            "/api/jobs",
            USER,
            Some(create_body(ACTIVE_SCRIPT)),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "failed");
        assert!(body["error_message"]
            .as_str()
            .unwrap()
            .starts_with("dispatch failed after 3 attempt(s)"));
    }

    #[tokio::test]
    async fn test_create_with_inactive_script_is_not_found() {
        let harness = Harness::new();
        let router = create_router(harness.state());

        let (status, body) = call(
            &router,
            "POST",
            "/api/jobs",
            USER,
            Some(create_body(INACTIVE_SCRIPT)),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (_, page) = call(&router, "GET", "/api/jobs", USER, None).await;
        assert_eq!(page["total"], 0);
    }

    #[tokio::test]
    async fn test_worker_callbacks_and_late_report() {
        let harness = Harness::new();
        let router = create_router(harness.state());
        let job = harness.pending_job().await;

        let uri = format!("/api/jobs/{}/status", job.id);
        let (status, body) =
            call(&router, "POST", &uri, USER, Some(json!({"status": "running"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert!(!body["started_at"].is_null());

        let (status, _) = call(
            &router,
            "POST",
            &format!("/api/jobs/{}/cancel", job.id),
            USER,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            call(&router, "POST", &uri, USER, Some(json!({"status": "success"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "invalid_transition");

        let (_, body) = call(&router, "GET", &format!("/api/jobs/{}", job.id), USER, None).await;
        assert_eq!(body["status"], "cancelled");
        assert_eq!(body["error_message"], "Job cancelled by user");
    }

    #[tokio::test]
    async fn test_log_round_trip_over_http() {
        let harness = Harness::new();
        let router = create_router(harness.state());
        let job = harness.pending_job().await;
        let uri = format!("/api/jobs/{}/logs", job.id);

        let (status, body) = call(
            &router,
            "POST",
            &uri,
            USER,
            Some(json!({"lines": [
                {"content": "line-0"},
                {"content": "line-1", "severity": "ERROR"},
                {"content": "line-2"}
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["line_numbers"], json!([0, 1, 2]));

        let (status, body) = call(
            &router,
            "GET",
            &format!("{}?start_line=1&limit=1", uri),
            USER,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_lines"], 3);
        assert_eq!(body["returned_lines"], 1);
        assert_eq!(body["logs"][0]["content"], "line-1");
        assert_eq!(body["logs"][0]["severity"], "ERROR");
    }

    #[tokio::test]
    async fn test_statistics_scope() {
        let harness = Harness::new();
        let router = create_router(harness.state());
        harness.pending_job().await;

        let (status, body) = call(&router, "GET", "/api/jobs/stats", USER, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["pending"], 1);

        let (status, body) =
            call(&router, "GET", "/api/jobs/stats?principal_id=2", USER, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let (status, body) =
            call(&router, "GET", "/api/jobs/stats?principal_id=2", ADMIN, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let harness = Harness::new();
        let router = create_router(harness.state());
        for _ in 0..3 {
            harness.pending_job().await;
        }

        let (status, body) = call(
            &router,
            "GET",
            "/api/jobs?status=pending&page=2&per_page=2",
            USER,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["pages"], 2);
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ticket_endpoints() {
        let harness = Harness::new();
        let router = create_router(harness.state());
        let job = harness.pending_job().await;

        let (status, ticket) = call(
            &router,
            "POST",
            &format!("/api/jobs/{}/ticket", job.id),
            USER,
            Some(json!({"title": "Deploy failed", "priority": "high"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(ticket["status"], "open");
        assert_eq!(ticket["priority"], "high");

        let token = ticket["token"].as_str().unwrap();
        let (status, fetched) =
            call(&router, "GET", &format!("/api/tickets/{}", token), USER, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], ticket["id"]);

        let (status, body) = call(
            &router,
            "POST",
            "/api/jobs/999/ticket",
            USER,
            Some(json!({"title": "Missing"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_lookup_by_token() {
        let harness = Harness::new();
        let router = create_router(harness.state());
        let job = harness.pending_job().await;

        let (status, body) = call(
            &router,
            "GET",
            &format!("/api/jobs/token/{}", job.token),
            USER,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], job.id);
    }

    #[tokio::test]
    async fn test_malformed_input_gets_json_validation_error() {
        let harness = Harness::new();
        let router = create_router(harness.state());
        let job = harness.pending_job().await;

        let (status, body) = call(
            &router,
            "POST",
            &format!("/api/jobs/{}/status", job.id),
            USER,
            Some(json!({"status": "queued"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert!(body["message"].is_string());

        let (status, body) = call(&router, "GET", "/api/jobs?status=bogus", USER, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let (status, body) = call(&router, "GET", "/api/jobs/abc", USER, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let (status, body) = call(
            &router,
            "POST",
            &format!("/api/jobs/{}/ticket", job.id),
            USER,
            Some(json!({"description": "no title"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_unparseable_body_is_bad_request() {
        let harness = Harness::new();
        let router = create_router(harness.state());

        let request = Request::builder()
            .method("POST")
            .uri("/api/jobs")
            .header(auth::PRINCIPAL_ID_HEADER, "1")
            .header(auth::PRINCIPAL_ROLE_HEADER, "user")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_worker_severity_labels_are_lenient() {
        let harness = Harness::new();
        let router = create_router(harness.state());
        let job = harness.pending_job().await;
        let uri = format!("/api/jobs/{}/logs", job.id);

        let (status, body) = call(
            &router,
            "POST",
            &uri,
            USER,
            Some(json!({"lines": [{"content": "disk low", "severity": "warn"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["line_numbers"], json!([0]));

        let (_, body) = call(&router, "GET", &uri, USER, None).await;
        assert_eq!(body["logs"][0]["severity"], "WARNING");
    }
}
