//! HTTP API tests driven through the router with `tower::ServiceExt::oneshot`.
//!
//! Tests cover:
//! - Health endpoint
//! - Session resolution from bearer header and cookie
//! - Status codes and error bodies for denials and validation failures
//! - Admin and self-service routes end to end

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use bastion_core::api::{build_router, AppState};
use bastion_core::rbac::{Organization, Role, RoleSet, SessionRecord, UserRecord};
use bastion_core::store::{AdminStore, InMemoryStore};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

const COOKIE: &str = "bastion.session_token";

// ============================================================================
// Harness
// ============================================================================

async fn seeded() -> (Router, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let org = Organization::new("Org One", "org-one").with_id("org-1");
    store.insert_organization(&org).await.unwrap();

    let users = [
        UserRecord::new("Root", "root@example.com")
            .with_id("root")
            .with_roles(RoleSet::single(Role::Superadmin)),
        UserRecord::new("Ada", "ada@example.com")
            .with_id("ada")
            .with_roles(RoleSet::single(Role::Admin))
            .with_organization(Some(org.id.clone())),
        UserRecord::new("Mia", "mia@example.com")
            .with_id("mia")
            .with_organization(Some(org.id.clone())),
    ];
    for user in &users {
        store.insert_user(user).await.unwrap();
        store
            .insert_session(&SessionRecord::new(
                format!("{}-token", user.id),
                user.id.clone(),
                Utc::now() + Duration::hours(1),
            ))
            .await
            .unwrap();
    }

    let state = AppState::new(store.clone(), COOKIE);
    (build_router(state), store)
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let (app, _) = seeded().await;
    let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_disabled_without_recorder() {
    let (app, _) = seeded().await;
    let (status, body) = send(&app, request(Method::GET, "/metrics", None, None)).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["error_code"], "NOT_IMPLEMENTED");
}

// ============================================================================
// Identity resolution
// ============================================================================

#[tokio::test]
async fn test_anonymous_request_is_unauthorized() {
    let (app, _) = seeded().await;
    let (status, body) = send(&app, request(Method::GET, "/api/v1/admin/users", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_unknown_token_is_treated_as_anonymous() {
    let (app, _) = seeded().await;
    let (status, _) = send(
        &app,
        request(Method::GET, "/api/v1/me", Some("bogus"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_cookie_resolves_caller() {
    let (app, _) = seeded().await;
    let req = Request::builder()
        .uri("/api/v1/me")
        .header(header::COOKIE, format!("{COOKIE}=mia-token"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "mia");
    assert_eq!(body["data"]["role"], "user");
}

// ============================================================================
// Admin routes
// ============================================================================

#[tokio::test]
async fn test_plain_user_gets_forbidden() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        request(Method::GET, "/api/v1/admin/stats", Some("mia-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_admin_creates_user_in_own_organization() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/admin/users",
            Some("ada-token"),
            Some(json!({ "name": "Neo", "email": "neo@example.com", "role": "user" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["organization_id"], "org-1");
    assert_eq!(body["data"]["email_verified"], false);
}

#[tokio::test]
async fn test_privilege_escalation_is_rejected() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        request(
            Method::PUT,
            "/api/v1/admin/users/mia/role",
            Some("ada-token"),
            Some(json!({ "role": "superadmin" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "PRIVILEGE_ESCALATION_BLOCKED");
    assert_eq!(body["numeric_code"], 4013);
}

#[tokio::test]
async fn test_validation_error_is_unprocessable() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/admin/users/mia/ban",
            Some("ada-token"),
            Some(json!({ "reason": "   " })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "MISSING_REQUIRED_FIELD");
}

#[tokio::test]
async fn test_ban_revokes_target_sessions_over_http() {
    let (app, store) = seeded().await;
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/admin/users/mia/ban",
            Some("ada-token"),
            Some(json!({ "reason": "spam", "expires_in_days": 3 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["banned"], true);
    assert!(store.get_session("mia-token").await.unwrap().is_none());

    let (status, _) = send(&app, request(Method::GET, "/api/v1/me", Some("mia-token"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_self_deletion_is_blocked() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        request(Method::DELETE, "/api/v1/admin/users/root", Some("root-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "SELF_DELETION_BLOCKED");
}

#[tokio::test]
async fn test_delete_user_returns_no_content() {
    let (app, store) = seeded().await;
    let (status, _) = send(
        &app,
        request(Method::DELETE, "/api/v1/admin/users/mia", Some("ada-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(store.get_user(&"mia".into()).await.unwrap().is_none());

    let (status, body) = send(
        &app,
        request(Method::DELETE, "/api/v1/admin/users/mia", Some("ada-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "RECORD_NOT_FOUND");
}

#[tokio::test]
async fn test_organization_with_members_cannot_be_deleted() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        request(Method::DELETE, "/api/v1/admin/organizations/org-1", Some("root-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "ORGANIZATION_HAS_MEMBERS");
    assert_eq!(body["details"]["context"]["member_count"], 2);
}

#[tokio::test]
async fn test_organization_lifecycle() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/admin/organizations",
            Some("root-token"),
            Some(json!({ "name": "Blue Sky Labs" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["slug"], "blue-sky-labs");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request(Method::GET, "/api/v1/admin/organizations", Some("root-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, _) = send(
        &app,
        request(
            Method::DELETE,
            &format!("/api/v1/admin/organizations/{id}"),
            Some("root-token"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_list_sessions_filters_by_user() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        request(Method::GET, "/api/v1/admin/sessions?user_id=mia", Some("root-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body["data"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["user"]["email"], "mia@example.com");
}

#[tokio::test]
async fn test_revoke_all_sessions_reports_count() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        request(Method::DELETE, "/api/v1/admin/users/mia/sessions", Some("ada-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["revoked"], 1);
}

// ============================================================================
// Self-service routes
// ============================================================================

#[tokio::test]
async fn test_metrics_round_trip_for_caller() {
    let (app, _) = seeded().await;
    let (status, body) = send(&app, request(Method::GET, "/api/v1/me/metrics", Some("mia-token"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalRevenue"], 0.0);

    let (status, body) = send(
        &app,
        request(
            Method::PATCH,
            "/api/v1/me/metrics",
            Some("mia-token"),
            Some(json!({ "totalRevenue": 99.5, "growthRate": 2.0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalRevenue"], 99.5);
    assert_eq!(body["data"]["growthRate"], 2.0);
    assert_eq!(body["data"]["totalCustomers"], 0.0);
}
