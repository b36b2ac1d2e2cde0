//! Router-level checks: status codes, envelopes and header handling.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{TestApp, OPERATOR, PLANNER};

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    operator: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(operator) = operator {
        builder = builder.header("x-operator-id", operator);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn order_body(quantity: i32) -> Value {
    json!({
        "item_code": "5YB011056",
        "product": "YBS main board",
        "quantity": quantity,
        "machine_no": "LINE-3"
    })
}

#[tokio::test]
async fn work_order_lifecycle_over_http() {
    let app = TestApp::new().await;
    let router = app.router();

    let (status, created) = send(
        &router,
        Method::POST,
        "/api/v1/work-orders",
        Some(PLANNER),
        Some(order_body(2)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["success"], json!(true));
    assert_eq!(created["data"]["status"], json!("Pending"));
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, progress) = send(
        &router,
        Method::POST,
        &format!("/api/v1/work-orders/{}/complete-unit", id),
        Some(OPERATOR),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["data"]["completed_quantity"], json!(1));
    assert_eq!(progress["data"]["remaining_quantity"], json!(1));
    assert_eq!(progress["data"]["status"], json!("In Progress"));

    let (status, flag) = send(
        &router,
        Method::GET,
        &format!("/api/v1/work-orders/{}/can-complete", id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(flag["data"], json!(true));

    let (status, listed) = send(
        &router,
        Method::GET,
        "/api/v1/work-orders?page=1&per_page=5",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"]["total"], json!(1));
    assert_eq!(listed["data"]["per_page"], json!(5));
}

#[tokio::test]
async fn mutations_without_operator_header_are_bad_requests() {
    let app = TestApp::new().await;
    let router = app.router();

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/v1/work-orders",
        None,
        Some(order_body(1)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Bad Request"));
}

#[tokio::test]
async fn error_statuses_follow_the_failure_kind() {
    let app = TestApp::new().await;
    let router = app.router();
    let wo = app.create_order("5YB011056", 1).await;
    app.services()
        .work_orders
        .complete_unit(wo.id, OPERATOR)
        .await
        .unwrap();

    let (status, body) = send(
        &router,
        Method::POST,
        &format!("/api/v1/work-orders/{}/complete-unit", wo.id),
        Some(OPERATOR),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("Conflict"));
    assert!(body["timestamp"].is_string());

    let (status, _) = send(
        &router,
        Method::GET,
        &format!("/api/v1/work-orders/{}", uuid::Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        Method::POST,
        "/api/v1/work-orders",
        Some(PLANNER),
        Some(order_body(0)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        Method::POST,
        "/api/v1/completed-assemblies/X123/rework",
        None,
        Some(json!({ "reason": "cold joint", "requested_by": "qa-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn scan_flow_over_http() {
    let app = TestApp::new().await;
    let router = app.router();
    let wo = app.create_order("5YB011056", 1).await;

    let (status, opened) = send(
        &router,
        Method::POST,
        "/api/v1/assembly",
        None,
        Some(json!({ "work_order_id": wo.id, "created_by": OPERATOR })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let unit_id = opened["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(opened["data"]["serial_number"], json!("5YB-250314-0001"));

    let scan = json!({ "part_code": "CAP-100", "sensor_id": 5, "operator": OPERATOR });
    let (status, _) = send(
        &router,
        Method::POST,
        &format!("/api/v1/assembly/{}/scan", unit_id),
        None,
        Some(scan.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &router,
        Method::POST,
        &format!("/api/v1/assembly/{}/scan", unit_id),
        None,
        Some(scan),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.tick();
    let (status, completed) = send(
        &router,
        Method::POST,
        &format!("/api/v1/assembly/{}/complete", unit_id),
        None,
        Some(json!({ "operator": OPERATOR })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["data"]["progress"]["is_fully_completed"], json!(true));
    assert!(completed["data"]["next_unit"].is_null());
    let archive_id = completed["data"]["archive"]["id"].as_str().unwrap().to_string();

    let (status, archived) = send(
        &router,
        Method::GET,
        &format!("/api/v1/completed-assemblies/{}", archive_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(archived["data"]["scanned_components"][0]["barcode"], json!("CAP-100"));

    let (status, logs) = send(
        &router,
        Method::GET,
        &format!("/api/v1/assembly-logs?assembly_id={}", unit_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs["data"]["total"], json!(3));
}

#[tokio::test]
async fn pcb_types_can_be_seeded_and_listed() {
    let app = TestApp::new().await;
    let router = app.router();

    let (status, seeded) = send(&router, Method::POST, "/api/v1/pcb-types/initialize", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seeded["data"], json!(["YBS", "RSM"]));

    let (status, listed) = send(
        &router,
        Method::GET,
        "/api/v1/pcb-types?active_only=true",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let app = TestApp::new().await;
    let router = app.router();

    let (status, health) = send(&router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], json!("up"));

    let (status, doc) = send(&router, Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/v1/work-orders"].is_object());
}

#[tokio::test]
async fn request_id_is_echoed_back() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .uri("/api/v1/status")
        .header("x-request-id", "line3-req-42")
        .body(Body::empty())
        .unwrap();

    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "line3-req-42"
    );
}
