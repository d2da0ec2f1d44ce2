//! API request handlers.
//!
//! All handlers return `Result<impl IntoResponse, BastionError>` so that
//! authorization denials and validation failures map onto HTTP statuses via
//! the `IntoResponse` implementation on `BastionError`.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, AppState};
use crate::admin::{BanUser, CreateOrganization, CreateUser, SetRole, UpdateOrganization, UpdateUser};
use crate::error::{BastionError, ErrorCode};
use crate::profile::{MetricsUpdate, ProfileUpdate};
use crate::rbac::{CurrentIdentity, OrganizationId, UserId};

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> Result<impl IntoResponse, BastionError> {
    let handle = state.metrics.as_ref().ok_or_else(|| {
        BastionError::new(ErrorCode::NotImplemented, "Prometheus metrics are disabled")
    })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_users(
    State(state): State<AppState>,
    caller: CurrentIdentity,
) -> Result<impl IntoResponse, BastionError> {
    let users = state.admin.list_users(caller.identity()).await?;
    Ok(Json(ApiResponse::success(users)))
}

pub async fn create_user(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Json(request): Json<CreateUser>,
) -> Result<impl IntoResponse, BastionError> {
    let user = state.admin.create_user(caller.identity(), request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn update_user(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Path(id): Path<UserId>,
    Json(request): Json<UpdateUser>,
) -> Result<impl IntoResponse, BastionError> {
    let user = state.admin.update_user(caller.identity(), &id, request).await?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Path(id): Path<UserId>,
) -> Result<impl IntoResponse, BastionError> {
    state.admin.delete_user(caller.identity(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ban_user(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Path(id): Path<UserId>,
    Json(request): Json<BanUser>,
) -> Result<impl IntoResponse, BastionError> {
    let user = state.admin.ban_user(caller.identity(), &id, request).await?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn unban_user(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Path(id): Path<UserId>,
) -> Result<impl IntoResponse, BastionError> {
    let user = state.admin.unban_user(caller.identity(), &id).await?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn set_role(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Path(id): Path<UserId>,
    Json(request): Json<SetRole>,
) -> Result<impl IntoResponse, BastionError> {
    let user = state.admin.set_role(caller.identity(), &id, request).await?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn dashboard_stats(
    State(state): State<AppState>,
    caller: CurrentIdentity,
) -> Result<impl IntoResponse, BastionError> {
    let stats = state.admin.dashboard_stats(caller.identity()).await?;
    Ok(Json(ApiResponse::success(stats)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct SessionsQuery {
    pub user_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
pub struct RevokedSessions {
    pub revoked: u64,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Query(query): Query<SessionsQuery>,
) -> Result<impl IntoResponse, BastionError> {
    let sessions = state
        .admin
        .list_sessions(caller.identity(), query.user_id.as_ref())
        .await?;
    Ok(Json(ApiResponse::success(sessions)))
}

pub async fn list_user_sessions(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Path(id): Path<UserId>,
) -> Result<impl IntoResponse, BastionError> {
    let sessions = state.admin.list_sessions(caller.identity(), Some(&id)).await?;
    Ok(Json(ApiResponse::success(sessions)))
}

pub async fn revoke_session(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, BastionError> {
    state.admin.revoke_session(caller.identity(), &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn revoke_all_user_sessions(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Path(id): Path<UserId>,
) -> Result<impl IntoResponse, BastionError> {
    let revoked = state.admin.revoke_all_user_sessions(caller.identity(), &id).await?;
    Ok(Json(ApiResponse::success(RevokedSessions { revoked })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Organizations
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_organizations(
    State(state): State<AppState>,
    caller: CurrentIdentity,
) -> Result<impl IntoResponse, BastionError> {
    let organizations = state.admin.list_organizations(caller.identity()).await?;
    Ok(Json(ApiResponse::success(organizations)))
}

pub async fn create_organization(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Json(request): Json<CreateOrganization>,
) -> Result<impl IntoResponse, BastionError> {
    let organization = state.admin.create_organization(caller.identity(), request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(organization))))
}

pub async fn update_organization(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Path(id): Path<OrganizationId>,
    Json(request): Json<UpdateOrganization>,
) -> Result<impl IntoResponse, BastionError> {
    let organization = state
        .admin
        .update_organization(caller.identity(), &id, request)
        .await?;
    Ok(Json(ApiResponse::success(organization)))
}

pub async fn delete_organization(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Path(id): Path<OrganizationId>,
) -> Result<impl IntoResponse, BastionError> {
    state.admin.delete_organization(caller.identity(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Self-service
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn current_profile(
    State(state): State<AppState>,
    caller: CurrentIdentity,
) -> Result<impl IntoResponse, BastionError> {
    let user = state.profile.current_profile(caller.identity()).await?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, BastionError> {
    let user = state.profile.update_profile(caller.identity(), update).await?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn get_metrics(
    State(state): State<AppState>,
    caller: CurrentIdentity,
) -> Result<impl IntoResponse, BastionError> {
    let metrics = state.profile.get_metrics(caller.identity()).await?;
    Ok(Json(ApiResponse::success(metrics)))
}

pub async fn update_metrics(
    State(state): State<AppState>,
    caller: CurrentIdentity,
    Json(update): Json<MetricsUpdate>,
) -> Result<impl IntoResponse, BastionError> {
    let metrics = state.profile.update_metrics(caller.identity(), update).await?;
    Ok(Json(ApiResponse::success(metrics)))
}
