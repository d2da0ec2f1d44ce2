//! HTTP API for the admin console.
//!
//! Admin routes live under `/api/v1/admin/`, self-service routes under
//! `/api/v1/me`. Every handler resolves the caller through
//! [`CurrentIdentity`](crate::rbac::CurrentIdentity); authorization itself
//! happens inside the services, so an anonymous request reaches the handler
//! and is rejected there with `UNAUTHENTICATED`.
//!
//! Successful responses are wrapped in [`ApiResponse`]. Failures are rendered
//! by the `IntoResponse` implementation on [`BastionError`].

mod handlers;

use axum::{
    extract::FromRef,
    routing::{delete, get, patch, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::admin::AdminService;
use crate::error::BastionError;
use crate::profile::ProfileService;
use crate::rbac::SessionResolver;
use crate::store::AdminStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub admin: AdminService,
    pub profile: ProfileService,
    pub sessions: SessionResolver,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire every service to the same store.
    pub fn new(store: Arc<dyn AdminStore>, session_cookie: impl Into<String>) -> Self {
        Self {
            admin: AdminService::new(store.clone()),
            profile: ProfileService::new(store.clone()),
            sessions: SessionResolver::new(store, session_cookie),
            metrics: None,
        }
    }

    /// Serve Prometheus output from this handle on `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

impl FromRef<AppState> for SessionResolver {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

/// Build the API router.
///
/// ```rust,ignore
/// let state = AppState::new(Arc::new(InMemoryStore::new()), "bastion.session_token");
/// let app = build_router(state);
/// ```
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest("/api/v1", v1_router())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

fn v1_router() -> Router<AppState> {
    let admin = Router::new()
        .route("/stats", get(handlers::dashboard_stats))
        .route("/users", get(handlers::list_users).post(handlers::create_user))
        .route(
            "/users/:id",
            patch(handlers::update_user).delete(handlers::delete_user),
        )
        .route("/users/:id/ban", post(handlers::ban_user))
        .route("/users/:id/unban", post(handlers::unban_user))
        .route("/users/:id/role", put(handlers::set_role))
        .route(
            "/users/:id/sessions",
            get(handlers::list_user_sessions).delete(handlers::revoke_all_user_sessions),
        )
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/:token", delete(handlers::revoke_session))
        .route(
            "/organizations",
            get(handlers::list_organizations).post(handlers::create_organization),
        )
        .route(
            "/organizations/:id",
            patch(handlers::update_organization).delete(handlers::delete_organization),
        );

    Router::new()
        .nest("/admin", admin)
        .route("/me", get(handlers::current_profile).patch(handlers::update_profile))
        .route(
            "/me/metrics",
            get(handlers::get_metrics).patch(handlers::update_metrics),
        )
}

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    pub fn from_bastion_error(err: &BastionError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.user_message().to_string()),
            error_code: Some(err.code().as_api_str()),
        }
    }
}
