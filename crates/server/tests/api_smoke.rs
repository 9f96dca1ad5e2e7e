use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tower::ServiceExt;
use vigil_core::Role;
use vigil_server::api::{router, AppState};
use vigil_server::ingest::ReportIntake;
use vigil_server::storage::Storage;

async fn setup_app() -> (axum::Router, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("tempfile");
    let storage = Storage::new_with_path(temp_db.path(), None, None)
        .await
        .expect("storage connect");
    storage.run_migrations().await.expect("migrations");
    storage
        .create_submitter("sub-1", "Ada", Role::Observer.as_str())
        .await
        .expect("seed submitter");

    let intake = ReportIntake::new(storage.clone(), None, vigil_core::DEFAULT_RESOLUTION);
    let app = router(AppState::new(intake, storage));
    (app, temp_db)
}

async fn request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<&Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(value).expect("serialize body"))
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).expect("build request"))
        .await
        .expect("request should complete");

    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, value)
}

#[tokio::test]
async fn submit_fetch_and_review_round_trip() {
    let (app, _db) = setup_app().await;

    let submission = json!({
        "submitter_id": "sub-1",
        "category": "ballot_stuffing",
        "description": "Urns arrived pre-filled",
        "latitude": 4.05,
        "longitude": 9.7,
    });

    let (status, created) = request(&app, "POST", "/v1/reports", Some(&submission)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["location"], "POINT(9.7 4.05)");
    assert_eq!(created["hex_cell"].as_str().expect("hex cell").len(), 15);
    let id = created["id"].as_str().expect("report id").to_string();

    let (status, fetched) = request(&app, "GET", &format!("/v1/reports/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, listed) = request(&app, "GET", "/v1/reports?status=pending", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["reports"].as_array().expect("reports array").len(), 1);

    let (status, updated) = request(
        &app,
        "PUT",
        &format!("/v1/reports/{}/status", id),
        Some(&json!({ "status": "verified" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "verified");

    let (status, listed) = request(&app, "GET", "/v1/reports?status=pending", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed["reports"].as_array().expect("reports array").is_empty());

    let (status, body) = request(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
}

#[tokio::test]
async fn validation_errors_are_explicit() {
    let (app, _db) = setup_app().await;

    let (status, body) = request(
        &app,
        "POST",
        "/v1/reports",
        Some(&json!({
            "submitter_id": "sub-1",
            "category": "ballot_stuffing",
            "longitude": 9.7,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation");
    assert!(body["error"]["message"]
        .as_str()
        .expect("message")
        .contains("latitude"));

    let (status, body) = request(
        &app,
        "POST",
        "/v1/reports",
        Some(&json!({
            "submitter_id": "sub-1",
            "category": "ballot_stuffing",
            "latitude": 91.0,
            "longitude": 9.7,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation");
}

#[tokio::test]
async fn unknown_ids_and_bad_queries() {
    let (app, _db) = setup_app().await;

    let (status, body) = request(&app, "GET", "/v1/reports/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = request(
        &app,
        "PUT",
        "/v1/reports/ghost/status",
        Some(&json!({ "status": "rejected" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = request(&app, "GET", "/v1/reports?status=archived", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
}
