#![allow(clippy::result_large_err)]
//! # Bastion Core
//!
//! Role-based authorization and administration for the Bastion dashboard.
//!
//! ## Architecture
//!
//! - **RBAC**: Roles, identities and the `AuthorizationGate` that decides every admin action
//! - **Admin**: User, session and organization management behind the gate
//! - **Profile**: Self-service profile and dashboard metrics
//! - **Store**: `AdminStore` persistence trait with PostgreSQL and in-memory backends
//! - **API**: Axum routes exposing the services over JSON
//! - **Observability**: Structured logging, OpenTelemetry export and Prometheus metrics

pub mod admin;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod observability;
pub mod profile;
pub mod rbac;
pub mod store;

pub use error::{BastionError, ErrorCode, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::admin::{
        AdminService, BanUser, CreateOrganization, CreateUser, SetRole, UpdateOrganization,
        UpdateUser,
    };
    pub use crate::error::{BastionError, ErrorCode, ErrorDetails, ErrorSeverity, Result};
    pub use crate::profile::{MetricsUpdate, ProfileService, ProfileUpdate, UserMetrics};
    pub use crate::rbac::{
        authorize, AccessRequest, Action, Assignment, AuthorizationGate, CurrentIdentity, Decision,
        DenyReason, Grant, Identity, Organization, OrganizationAssignment, OrganizationId, Role,
        RoleSet, SessionRecord, Target, TargetUser, UserId, UserRecord,
    };
    pub use crate::store::{AdminStore, DashboardStats, InMemoryStore, Scope};
}
