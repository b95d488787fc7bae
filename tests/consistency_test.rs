//! Integration tests for the code/ad binding protocol
//!
//! Verifies the invariants the coordinator must uphold:
//! - binding duality: a code is `active` exactly when it references an ad
//! - no code ever references a closed or deleted ad
//! - unbind is idempotent and over-inclusive
//! - delete aborts when the release step fails, leaving the ad untouched

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use redb::{Database, ReadableDatabase, ReadableTable};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use qventa::config::AppConfig;
use qventa::database::{init_db, AppState, TABLE_ADS, TABLE_CODES};
use qventa::model::{Ad, AdStatus, Code, CodeStatus};
use qventa::route::create_app;

fn setup_test_app() -> (axum::Router, Arc<Database>, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = temp_db.path().to_str().unwrap();

    let db = Arc::new(init_db(db_path).expect("Failed to initialize test database"));
    let config = AppConfig {
        admin_ids: HashSet::from(["admin".to_string()]),
        code_prefix: "QV".to_string(),
    };
    let state = AppState {
        db: db.clone(),
        config: Arc::new(config),
    };

    (create_app(state), db, temp_db)
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    actor: Option<&str>,
    body: Option<Value>,
) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header("x-actor-id", actor);
    }
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

async fn issue_batch(app: &axum::Router, count: u32) {
    let response = send(
        app,
        "POST",
        "/api/codes/batch",
        Some("admin"),
        Some(json!({ "count": count })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

async fn create_ad(app: &axum::Router, owner: &str, code: Option<&str>) -> String {
    let mut payload = json!({
        "title": "Furgoneta de reparto",
        "media_ref": "https://media.example/ads/furgo.jpg",
        "features": { "category": "vehicle", "brand": "Citroën" }
    });
    if let Some(code) = code {
        payload["code"] = json!(code);
    }

    let response = send(app, "POST", "/api/ads", Some(owner), Some(payload)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response.into_body()).await;
    body["id"].as_str().unwrap().to_string()
}

async fn code_record(app: &axum::Router, id: &str) -> Value {
    let uri = format!("/api/codes/{}", id);
    let response = send(app, "GET", &uri, Some("admin"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response.into_body()).await
}

/// Reads every code record straight from the store
fn all_codes(db: &Database) -> Vec<Code> {
    let read_txn = db.begin_read().unwrap();
    let table = read_txn.open_table(TABLE_CODES).unwrap();
    table
        .iter()
        .unwrap()
        .map(|entry| {
            let (_, value) = entry.unwrap();
            serde_json::from_str::<Code>(value.value()).unwrap()
        })
        .collect()
}

fn all_ads(db: &Database) -> Vec<Ad> {
    let read_txn = db.begin_read().unwrap();
    let table = read_txn.open_table(TABLE_ADS).unwrap();
    table
        .iter()
        .unwrap()
        .map(|entry| {
            let (_, value) = entry.unwrap();
            serde_json::from_str::<Ad>(value.value()).unwrap()
        })
        .collect()
}

/// Binding duality: `active` exactly when a bound ad reference exists
fn assert_binding_duality(db: &Database) {
    for code in all_codes(db) {
        assert_eq!(
            code.status == CodeStatus::Active,
            code.bound_ad.is_some(),
            "code {} violates binding duality: status {:?}, bound_ad {:?}",
            code.id,
            code.status,
            code.bound_ad
        );
    }
}

#[tokio::test]
async fn test_delete_releases_code() {
    let (app, db, _temp_db) = setup_test_app();

    issue_batch(&app, 1).await;
    let ad_id = create_ad(&app, "user1", Some("QV-001")).await;

    let uri = format!("/api/ads/{}", ad_id);
    let response = send(&app, "DELETE", &uri, Some("user1"), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response.into_body()).await;
    assert_eq!(body["codes_released"], 1);

    let code = code_record(&app, "QV-001").await;
    assert_eq!(code["status"], "printed");
    assert!(code["bound_ad"].is_null());

    assert_binding_duality(&db);
}

#[tokio::test]
async fn test_close_releases_code_and_keeps_ad() {
    let (app, db, _temp_db) = setup_test_app();

    issue_batch(&app, 1).await;
    let ad_id = create_ad(&app, "user1", Some("QV-001")).await;

    let uri = format!("/api/ads/{}/close", ad_id);
    let response = send(&app, "POST", &uri, Some("user1"), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response.into_body()).await;
    assert_eq!(body["status"], "closed");
    assert_eq!(body["codes_released"], 1);

    let code = code_record(&app, "QV-001").await;
    assert_eq!(code["status"], "printed");

    // The closed ad row survives, unlike delete
    let ads = all_ads(&db);
    assert_eq!(ads.len(), 1);
    assert_eq!(ads[0].status, AdStatus::Closed);
}

#[tokio::test]
async fn test_unlink_is_admin_only() {
    let (app, _db, _temp_db) = setup_test_app();

    issue_batch(&app, 1).await;
    let ad_id = create_ad(&app, "user1", Some("QV-001")).await;

    let uri = format!("/api/ads/{}/unlink-code", ad_id);
    // Not even the owner may unlink; it is an admin repair tool
    let response = send(&app, "POST", &uri, Some("user1"), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let code = code_record(&app, "QV-001").await;
    assert_eq!(code["status"], "active");
}

#[tokio::test]
async fn test_unlink_frees_code_without_touching_ad() {
    let (app, db, _temp_db) = setup_test_app();

    issue_batch(&app, 1).await;
    let ad_id = create_ad(&app, "user1", Some("QV-001")).await;

    let uri = format!("/api/ads/{}/approve", ad_id);
    send(&app, "POST", &uri, Some("admin"), None).await;

    let uri = format!("/api/ads/{}/unlink-code", ad_id);
    let response = send(&app, "POST", &uri, Some("admin"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["codes_released"], 1);

    let code = code_record(&app, "QV-001").await;
    assert_eq!(code["status"], "printed");

    // Ad stays published
    let ads = all_ads(&db);
    assert_eq!(ads[0].status, AdStatus::Aprobado);

    // Idempotent: a second unlink releases nothing and succeeds
    let uri = format!("/api/ads/{}/unlink-code", ad_id);
    let response = send(&app, "POST", &uri, Some("admin"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["codes_released"], 0);

    assert_binding_duality(&db);
}

#[tokio::test]
async fn test_relink_repairs_missing_binding() {
    let (app, db, _temp_db) = setup_test_app();

    issue_batch(&app, 1).await;
    // Created without a code (e.g. the create-time bind failed)
    let ad_id = create_ad(&app, "user1", None).await;

    let uri = format!("/api/ads/{}/relink-code", ad_id);
    let response = send(
        &app,
        "POST",
        &uri,
        Some("admin"),
        Some(json!({ "code": "qv-001" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let code = code_record(&app, "QV-001").await;
    assert_eq!(code["status"], "active");
    assert_eq!(code["bound_ad"], ad_id);

    // Safe to retry: the same pair is a no-op
    let response = send(
        &app,
        "POST",
        &uri,
        Some("admin"),
        Some(json!({ "code": "QV-001" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_binding_duality(&db);
}

#[tokio::test]
async fn test_relink_rejects_code_bound_elsewhere() {
    let (app, _db, _temp_db) = setup_test_app();

    issue_batch(&app, 1).await;
    let first_ad = create_ad(&app, "user1", Some("QV-001")).await;
    let second_ad = create_ad(&app, "user2", None).await;

    let uri = format!("/api/ads/{}/relink-code", second_ad);
    let response = send(
        &app,
        "POST",
        &uri,
        Some("admin"),
        Some(json!({ "code": "QV-001" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The original binding is untouched
    let code = code_record(&app, "QV-001").await;
    assert_eq!(code["bound_ad"], first_ad);
}

#[tokio::test]
async fn test_delete_aborts_when_release_fails() {
    let (app, db, _temp_db) = setup_test_app();

    issue_batch(&app, 1).await;
    let ad_id = create_ad(&app, "user1", Some("QV-001")).await;

    // An unreadable code record makes the release scan fail: it might
    // reference this ad, so the delete must not proceed
    let write_txn = db.begin_write().unwrap();
    {
        let mut table = write_txn.open_table(TABLE_CODES).unwrap();
        table.insert("QV-099", "not valid json").unwrap();
    }
    write_txn.commit().unwrap();

    let uri = format!("/api/ads/{}", ad_id);
    let response = send(&app, "DELETE", &uri, Some("user1"), None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = response_json(response.into_body()).await;
    assert_eq!(body["code"], "binding_inconsistency");

    // The ad row is unchanged and the binding still stands
    let ads = all_ads(&db);
    assert_eq!(ads.len(), 1);
    assert_eq!(ads[0].id, ad_id);
    assert_eq!(ads[0].status, AdStatus::PendingVerification);

    let code = code_record(&app, "QV-001").await;
    assert_eq!(code["status"], "active");
    assert_eq!(code["bound_ad"], ad_id);
}

#[tokio::test]
async fn test_unbind_releases_every_code_referencing_the_ad() {
    let (app, db, _temp_db) = setup_test_app();

    issue_batch(&app, 3).await;
    let ad_id = create_ad(&app, "user1", Some("QV-001")).await;

    // Simulate an earlier bug that left a second code pointing at the ad
    let stray = json!({
        "id": "QV-002",
        "category": null,
        "status": "active",
        "bound_ad": ad_id,
        "created_at": "2026-01-01T00:00:00Z"
    })
    .to_string();
    let write_txn = db.begin_write().unwrap();
    {
        let mut table = write_txn.open_table(TABLE_CODES).unwrap();
        table.insert("QV-002", stray.as_str()).unwrap();
    }
    write_txn.commit().unwrap();

    let uri = format!("/api/ads/{}", ad_id);
    let response = send(&app, "DELETE", &uri, Some("user1"), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response.into_body()).await;
    assert_eq!(body["codes_released"], 2);

    assert_binding_duality(&db);
}

#[tokio::test]
async fn test_invariants_hold_across_operation_sequence() {
    let (app, db, _temp_db) = setup_test_app();

    issue_batch(&app, 5).await;

    let ad_a = create_ad(&app, "user1", Some("QV-001")).await;
    let ad_b = create_ad(&app, "user2", Some("QV-002")).await;
    assert_binding_duality(&db);

    let uri = format!("/api/ads/{}/approve", ad_b);
    send(&app, "POST", &uri, Some("admin"), None).await;
    assert_binding_duality(&db);

    let uri = format!("/api/ads/{}", ad_a);
    send(&app, "DELETE", &uri, Some("user1"), None).await;
    assert_binding_duality(&db);

    let uri = format!("/api/ads/{}/unlink-code", ad_b);
    send(&app, "POST", &uri, Some("admin"), None).await;
    assert_binding_duality(&db);

    let uri = format!("/api/ads/{}/relink-code", ad_b);
    send(&app, "POST", &uri, Some("admin"), Some(json!({ "code": "QV-003" }))).await;
    assert_binding_duality(&db);

    let uri = format!("/api/ads/{}/close", ad_b);
    send(&app, "POST", &uri, Some("user2"), None).await;
    assert_binding_duality(&db);

    // No code may reference a closed or deleted ad
    let terminal: Vec<String> = all_ads(&db)
        .into_iter()
        .filter(|ad| ad.status.is_terminal())
        .map(|ad| ad.id)
        .collect();
    for code in all_codes(&db) {
        if let Some(bound) = &code.bound_ad {
            assert!(
                !terminal.contains(bound),
                "code {} still references terminated ad {}",
                code.id,
                bound
            );
        }
    }
}
