//! REST API tests
//!
//! Drive the router in-process with `tower::ServiceExt::oneshot`.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use opsplatform_rbac::{EngineConfig, InMemoryStore, RbacEngine};
use opsplatform_rbac_api::{build_router, AppState, USER_ID_HEADER};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt as _;

async fn app() -> Router {
    let config = EngineConfig {
        bootstrap_admin: Some("root".to_string()),
        ..Default::default()
    };
    let engine = RbacEngine::new(config, Arc::new(InMemoryStore::new()))
        .await
        .unwrap();
    build_router(AppState::new(Arc::new(engine)))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    caller: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header(USER_ID_HEADER, caller);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn create_role(app: &Router, body: Value) -> Value {
    let (status, role) = send(app, Method::POST, "/api/v1/roles", Some("root"), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", role);
    role
}

async fn assign(app: &Router, user: &str, role_id: &str, scope: Option<&str>) -> StatusCode {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/v1/assignments",
        Some("root"),
        Some(json!({ "userId": user, "roleId": role_id, "scope": scope })),
    )
    .await;
    status
}

async fn role_id_by_name(app: &Router, name: &str) -> String {
    let (_, roles) = send(
        app,
        Method::GET,
        &format!("/api/v1/roles?keys={}", name),
        Some("root"),
        None,
    )
    .await;
    roles[0]["id"].as_str().unwrap().to_string()
}

// ============================================================================
// HEALTH & METRICS
// ============================================================================

#[tokio::test]
async fn test_health_check_returns_200() {
    let app = app().await;
    let (status, json) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["storeAvailable"], true);
    assert!(json.get("version").is_some());
}

#[tokio::test]
async fn test_metrics_prometheus_text() {
    let app = app().await;
    send(
        &app,
        Method::GET,
        "/api/v1/users/root/permissions/reports.read",
        Some("root"),
        None,
    )
    .await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("rbac_decisions_total"));
    assert!(text.contains("rbac_cache_entries"));
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = app().await;
    let (status, doc) = send(&app, Method::GET, "/api-docs/openapi.json", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/v1/assignments/bulk"].is_object());
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

#[tokio::test]
async fn test_missing_caller_is_401() {
    let app = app().await;

    let (status, json) = send(&app, Method::GET, "/api/v1/permissions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "unauthenticated");

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/v1/users/root/permissions/payroll.export",
        Some("  "),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_permission_is_404_for_authenticated_callers() {
    let app = app().await;

    let (status, json) = send(
        &app,
        Method::GET,
        "/api/v1/users/root/permissions/payroll.export",
        Some("root"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
    assert!(json.get("hasPermission").is_none());
}

#[tokio::test]
async fn test_users_may_only_inspect_themselves() {
    let app = app().await;

    let (status, json) = send(
        &app,
        Method::GET,
        "/api/v1/users/u1/permissions",
        Some("u1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["permissions"], json!([]));

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/v1/users/root/permissions",
        Some("u1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_store_outage_answers_false() {
    let store = InMemoryStore::new();
    let config = EngineConfig {
        enable_cache: false,
        bootstrap_admin: Some("root".to_string()),
        ..Default::default()
    };
    let engine = RbacEngine::new(config, Arc::new(store.clone()))
        .await
        .unwrap();
    let app = build_router(AppState::new(Arc::new(engine)));

    store.set_available(false);
    let (status, json) = send(
        &app,
        Method::GET,
        "/api/v1/users/root/permissions/reports.read",
        Some("root"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["hasPermission"], false);

    store.set_available(true);
    let (_, json) = send(
        &app,
        Method::GET,
        "/api/v1/users/root/permissions/reports.read",
        Some("root"),
        None,
    )
    .await;
    assert_eq!(json["hasPermission"], true);
}

#[tokio::test]
async fn test_sensitive_check_on_another_user_audits_the_caller() {
    let app = app().await;

    let (status, json) = send(
        &app,
        Method::GET,
        "/api/v1/users/u1/permissions/roles.manage",
        Some("root"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["hasPermission"], false);

    let (status, page) = send(
        &app,
        Method::GET,
        "/api/v1/audit?action=access.denied&userId=u1",
        Some("root"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = page["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["actor"], "root");
    assert_eq!(entries[0]["target"]["userId"], "u1");
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_global_role_decisions() {
    let app = app().await;
    let role = create_role(
        &app,
        json!({ "name": "auditor", "permissions": ["reports.read"] }),
    )
    .await;
    assert_eq!(role["version"], 1);
    assert_eq!(role["scopeClass"], "global");

    let role_id = role["id"].as_str().unwrap();
    assert_eq!(assign(&app, "u1", role_id, None).await, StatusCode::CREATED);

    let (status, json) = send(
        &app,
        Method::GET,
        "/api/v1/users/u1/permissions/reports.read",
        Some("u1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["hasPermission"], true);

    let (_, json) = send(
        &app,
        Method::GET,
        "/api/v1/users/u1/permissions/reports.write",
        Some("u1"),
        None,
    )
    .await;
    assert_eq!(json["hasPermission"], false);
}

#[tokio::test]
async fn test_scoped_effective_permissions() {
    let app = app().await;
    let consultant = create_role(
        &app,
        json!({
            "name": "consultant",
            "scopeClass": "hospital",
            "permissions": ["profile.read", "profile.write"]
        }),
    )
    .await;
    let viewer = create_role(
        &app,
        json!({ "name": "viewer", "permissions": ["projects.read"] }),
    )
    .await;

    assert_eq!(
        assign(&app, "u2", consultant["id"].as_str().unwrap(), Some("hospital:H1")).await,
        StatusCode::CREATED
    );
    assert_eq!(
        assign(&app, "u2", viewer["id"].as_str().unwrap(), None).await,
        StatusCode::CREATED
    );

    let (_, h1) = send(
        &app,
        Method::GET,
        "/api/v1/users/u2/permissions?scope=hospital:H1",
        Some("u2"),
        None,
    )
    .await;
    assert_eq!(h1["userId"], "u2");
    assert_eq!(h1["scope"], "hospital:H1");
    assert_eq!(
        h1["permissions"],
        json!(["profile.read", "profile.write", "projects.read"])
    );

    let (_, h2) = send(
        &app,
        Method::GET,
        "/api/v1/users/u2/permissions?scope=hospital:H2",
        Some("u2"),
        None,
    )
    .await;
    assert_eq!(h2["permissions"], json!(["projects.read"]));

    let (status, json) = send(
        &app,
        Method::GET,
        "/api/v1/users/u2/permissions?scope=ward:W1",
        Some("u2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "scope");
}

#[tokio::test]
async fn test_delete_referenced_role_conflicts() {
    let app = app().await;
    let role = create_role(
        &app,
        json!({ "name": "consultant", "scopeClass": "hospital", "permissions": ["profile.read"] }),
    )
    .await;
    let role_id = role["id"].as_str().unwrap();
    assign(&app, "u2", role_id, Some("hospital:H1")).await;

    let uri = format!("/api/v1/roles/{}?version=1", role_id);
    let (status, json) = send(&app, Method::DELETE, &uri, Some("root"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "referential_conflict");

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/v1/assignments",
        Some("root"),
        Some(json!({ "userId": "u2", "roleId": role_id, "scope": "hospital:H1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, Method::DELETE, &uri, Some("root"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "consultant");
}

#[tokio::test]
async fn test_last_administrator_cannot_be_removed() {
    let app = app().await;
    let admin_id = role_id_by_name(&app, "administrator").await;

    let (status, json) = send(
        &app,
        Method::DELETE,
        "/api/v1/assignments",
        Some("root"),
        Some(json!({ "userId": "root", "roleId": admin_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "invariant_violation");

    let (_, json) = send(
        &app,
        Method::GET,
        "/api/v1/users/root/permissions/roles.manage",
        Some("root"),
        None,
    )
    .await;
    assert_eq!(json["hasPermission"], true);
}

// ============================================================================
// MANAGEMENT ERRORS
// ============================================================================

#[tokio::test]
async fn test_non_admin_management_is_403() {
    let app = app().await;

    let (status, json) = send(
        &app,
        Method::POST,
        "/api/v1/roles",
        Some("u1"),
        Some(json!({ "name": "sneaky", "permissions": ["roles.manage"] })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "unauthorized");

    let (status, _) = send(&app, Method::GET, "/api/v1/roles", Some("u1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_stale_version_is_409() {
    let app = app().await;
    let role = create_role(&app, json!({ "name": "auditor", "permissions": ["reports.read"] })).await;
    let uri = format!("/api/v1/roles/{}/permissions", role["id"].as_str().unwrap());

    let (status, updated) = send(
        &app,
        Method::PUT,
        &uri,
        Some("root"),
        Some(json!({ "version": 1, "permissions": ["reports.write", "reports.write"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["version"], 2);
    assert_eq!(updated["permissions"], json!(["reports.write"]));

    let (status, json) = send(
        &app,
        Method::PUT,
        &uri,
        Some("root"),
        Some(json!({ "version": 1, "permissions": ["reports.read"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "conflict");
    assert_eq!(json["field"], "version");
}

#[tokio::test]
async fn test_base_role_rename_is_403() {
    let app = app().await;
    let member_id = role_id_by_name(&app, "member").await;

    let (status, json) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/roles/{}", member_id),
        Some("root"),
        Some(json!({ "version": 1, "name": "staff" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "forbidden");
}

#[tokio::test]
async fn test_scope_mismatch_is_422() {
    let app = app().await;
    let role = create_role(
        &app,
        json!({ "name": "consultant", "scopeClass": "hospital", "permissions": ["profile.read"] }),
    )
    .await;

    let status = assign(&app, "u1", role["id"].as_str().unwrap(), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_catalog_append_and_remove() {
    let app = app().await;

    let (status, permission) = send(
        &app,
        Method::POST,
        "/api/v1/permissions",
        Some("root"),
        Some(json!({ "id": "travel.book", "name": "Book travel" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(permission["domain"], "travel");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/permissions",
        Some("root"),
        Some(json!({ "id": "Not A Permission" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, catalog) = send(&app, Method::GET, "/api/v1/permissions", Some("u1"), None).await;
    assert!(catalog
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["id"] == "travel.book"));

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/v1/permissions/travel.book",
        Some("root"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// BULK & AUDIT
// ============================================================================

#[tokio::test]
async fn test_bulk_assignment_reports_per_user() {
    let app = app().await;
    let role = create_role(&app, json!({ "name": "viewer", "permissions": ["projects.read"] })).await;
    let role_id = role["id"].as_str().unwrap();
    assign(&app, "u2", role_id, None).await;

    let (status, report) = send(
        &app,
        Method::POST,
        "/api/v1/assignments/bulk",
        Some("root"),
        Some(json!({ "userIds": ["u1", "u2", "u3"], "roleId": role_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["succeeded"].as_array().unwrap().len(), 2);
    assert_eq!(report["failed"][0]["userId"], "u2");
    assert_eq!(report["failed"][0]["error"], "duplicate_assignment");

    let (_, assignments) = send(
        &app,
        Method::GET,
        &format!("/api/v1/roles/{}/assignments", role_id),
        Some("root"),
        None,
    )
    .await;
    assert_eq!(assignments.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_audit_query_pagination_and_immutability() {
    let app = app().await;
    for i in 0..3 {
        create_role(&app, json!({ "name": format!("role-{}", i) })).await;
    }

    let (status, page) = send(
        &app,
        Method::GET,
        "/api/v1/audit?action=role.created&limit=3",
        Some("root"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["entries"].as_array().unwrap().len(), 3);
    let cursor = page["nextCursor"].as_u64().unwrap();

    let (_, rest) = send(
        &app,
        Method::GET,
        &format!("/api/v1/audit?action=role.created&limit=3&cursor={}", cursor),
        Some("root"),
        None,
    )
    .await;
    // Two base roles seeded plus three created here
    assert_eq!(rest["entries"].as_array().unwrap().len(), 2);
    assert!(rest["nextCursor"].is_null());
    assert_eq!(rest["entries"][1]["actor"], "root");

    let (status, _) = send(&app, Method::GET, "/api/v1/audit?action=role.renamed", Some("root"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, Method::DELETE, "/api/v1/audit/1", Some("root"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "forbidden");

    let (status, verification) = send(&app, Method::GET, "/api/v1/audit/verify", Some("root"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verification["intact"], true);
}
