use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use remedy_audit_memory::MemoryAuditStore;
use remedy_engine::OrchestratorBuilder;
use remedy_executor::{MemoryInventory, ResourceRef, ResourceSnapshot};
use remedy_server::api::AppState;
use remedy_state_memory::MemoryStateStore;

// -- Helpers --------------------------------------------------------------

struct TestApp {
    router: axum::Router,
    inventory: Arc<MemoryInventory>,
}

fn build_app() -> TestApp {
    let inventory = Arc::new(MemoryInventory::new());
    inventory.insert(ResourceSnapshot::new(bucket("logs")));
    inventory.insert(
        ResourceSnapshot::new(bucket("prod-logs")).with_tag("environment", "production"),
    );
    inventory.insert(ResourceSnapshot::new(bucket("site")));

    let engine = OrchestratorBuilder::new()
        .state(Arc::new(MemoryStateStore::new()))
        .audit(Arc::new(MemoryAuditStore::new()))
        .inventory(inventory.clone())
        .build()
        .expect("engine should build");

    TestApp {
        router: remedy_server::api::router(AppState {
            engine: Arc::new(engine),
        }),
        inventory,
    }
}

fn bucket(name: &str) -> ResourceRef {
    ResourceRef::new("000000000000", "us-east-1", "S3_BUCKET", name)
}

fn request_body(remediation_type: &str, bucket: &str) -> Value {
    json!({
        "finding_id": "finding-1",
        "remediation_type": remediation_type,
        "resource_id": bucket,
        "resource_type": "S3_BUCKET",
        "region": "us-east-1",
        "account_id": "000000000000",
        "tenant_id": "acme",
        "requested_by": "scanner"
    })
}

async fn send(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_as(app, method, uri, body, Some("acme")).await
}

async fn send_as(
    app: &TestApp,
    method: &str,
    uri: &str,
    body: Option<Value>,
    tenant: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-actor", "alice")
        .header("x-correlation-id", "corr-1");
    if let Some(tenant) = tenant {
        builder = builder.header("x-tenant-id", tenant);
    }
    let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));

    let response = app
        .router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

// -- Tests ----------------------------------------------------------------

#[tokio::test]
async fn health_returns_200() {
    let app = build_app();
    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["policy_version"], 1);
    assert_eq!(body["executors"].as_array().unwrap().len(), 3);
    assert_eq!(body["metrics"]["requested"], 0);
}

#[tokio::test]
async fn apply_low_risk_returns_applied_job() {
    let app = build_app();
    let (status, job) = send(
        &app,
        "POST",
        "/v1/remediations",
        Some(request_body("ENABLE_BUCKET_ENCRYPTION", "logs")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["status"], "APPLIED");
    assert_eq!(job["result"]["success"], true);

    let (status, metrics) = send(&app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["applied"], 1);
}

#[tokio::test]
async fn approval_flow_over_http() {
    let app = build_app();
    let (status, job) = send(
        &app,
        "POST",
        "/v1/remediations",
        Some(request_body("ENABLE_BUCKET_ENCRYPTION", "prod-logs")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["status"], "PENDING_APPROVAL");
    let id = job["id"].as_str().unwrap().to_owned();

    let (status, pending) = send(&app, "GET", "/v1/remediations/pending", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["count"], 1);
    assert_eq!(pending["jobs"][0]["id"], id.as_str());

    let (status, approved) =
        send(&app, "POST", &format!("/v1/remediations/{id}/approve"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "APPLIED");

    let (status, fetched) = send(&app, "GET", &format!("/v1/remediations/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["status"], "APPLIED");

    let (status, audit) = send(&app, "GET", &format!("/v1/remediations/{id}/audit"), None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = audit["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[2]["to_status"], "APPROVED");
    assert_eq!(entries[2]["actor"], "alice");
    assert!(entries.iter().all(|e| e["correlation_id"] == "corr-1"));
}

#[tokio::test]
async fn explicit_approval_request_pends() {
    let app = build_app();
    let (status, job) = send(
        &app,
        "POST",
        "/v1/remediations/approval-requests",
        Some(request_body("ENABLE_BUCKET_ENCRYPTION", "logs")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["status"], "PENDING_APPROVAL");
}

#[tokio::test]
async fn rollback_then_rollback_again_conflicts() {
    let app = build_app();
    let (_, job) = send(
        &app,
        "POST",
        "/v1/remediations",
        Some(request_body("ENABLE_BUCKET_ENCRYPTION", "logs")),
    )
    .await;
    let id = job["id"].as_str().unwrap().to_owned();

    let (status, rolled) =
        send(&app, "POST", &format!("/v1/remediations/{id}/rollback"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rolled["status"], "ROLLED_BACK");

    let (status, err) =
        send(&app, "POST", &format!("/v1/remediations/{id}/rollback"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "NO_ROLLBACK_AVAILABLE");
}

#[tokio::test]
async fn partial_rollback_returns_207_with_job() {
    let app = build_app();
    let (_, job) = send(
        &app,
        "POST",
        "/v1/remediations",
        Some(request_body("BLOCK_PUBLIC_ACCESS", "site")),
    )
    .await;
    assert_eq!(job["status"], "APPLIED");
    let id = job["id"].as_str().unwrap().to_owned();

    app.inventory.fail_writes_to("restrict_public_buckets");
    let (status, body) =
        send(&app, "POST", &format!("/v1/remediations/{id}/rollback"), None).await;

    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body["code"], "PARTIAL_ROLLBACK_FAILURE");
    assert_eq!(body["partial_rollback"], true);
    assert_eq!(body["job"]["status"], "APPLIED");
    assert_eq!(body["rollback"]["failed"], json!(["restrict_public_buckets"]));
}

#[tokio::test]
async fn duplicate_active_job_conflicts() {
    let app = build_app();
    let body = request_body("ENABLE_BUCKET_ENCRYPTION", "prod-logs");
    let (status, first) = send(&app, "POST", "/v1/remediations", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, err) = send(&app, "POST", "/v1/remediations", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "CONFLICT");
    assert_eq!(err["active_job"], first["id"]);
}

#[tokio::test]
async fn approve_applied_job_conflicts() {
    let app = build_app();
    let (_, job) = send(
        &app,
        "POST",
        "/v1/remediations",
        Some(request_body("ENABLE_BUCKET_ENCRYPTION", "logs")),
    )
    .await;
    let id = job["id"].as_str().unwrap().to_owned();

    let (status, err) = send(&app, "POST", &format!("/v1/remediations/{id}/approve"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "INVALID_STATE_TRANSITION");
}

#[tokio::test]
async fn invalid_request_returns_400() {
    let app = build_app();
    let mut body = request_body("ENABLE_BUCKET_ENCRYPTION", "logs");
    body["finding_id"] = json!("");

    let (status, err) = send(&app, "POST", "/v1/remediations", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn missing_tenant_header_returns_400() {
    let app = build_app();
    let (status, err) = send_as(&app, "GET", "/v1/remediations/pending", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn other_tenant_sees_404() {
    let app = build_app();
    let (_, job) = send(
        &app,
        "POST",
        "/v1/remediations",
        Some(request_body("ENABLE_BUCKET_ENCRYPTION", "prod-logs")),
    )
    .await;
    let id = job["id"].as_str().unwrap().to_owned();

    let (status, err) = send_as(
        &app,
        "GET",
        &format!("/v1/remediations/{id}"),
        None,
        Some("globex"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], "NOT_FOUND");
}

#[tokio::test]
async fn openapi_document_lists_remediation_paths() {
    let app = build_app();
    let (status, doc) = send(&app, "GET", "/api-doc/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/v1/remediations"].is_object());
    assert!(doc["paths"]["/v1/remediations/{id}/rollback"].is_object());
}
