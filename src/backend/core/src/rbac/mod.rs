//! Role-based access control for the admin console.
//!
//! This module provides:
//! - **Roles**: the built-in `user`, `admin` and `superadmin` roles and the role set
//! - **Models**: identity, user, organization and session records
//! - **Gate**: the pure decision function guarding every admin action
//! - **Middleware**: resolution of the calling identity from a session token
//!
//! # Usage
//!
//! ```rust,ignore
//! use bastion_core::rbac::{authorize, AccessRequest, Decision};
//!
//! match authorize(Some(&caller), &AccessRequest::ban_user(&target)) {
//!     Decision::Allow(_) => store.update_user(&banned).await?,
//!     Decision::Deny(reason) => return Err(reason.into()),
//! }
//! ```

pub mod gate;
pub mod middleware;
pub mod models;
pub mod roles;

pub use gate::{
    authorize, AccessRequest, Action, Assignment, AuthorizationGate, Decision, DenyReason, Grant,
    OrganizationAssignment, Target, TargetUser,
};
pub use middleware::{CurrentIdentity, SessionResolver};
pub use models::{
    Identity, Organization, OrganizationId, OrganizationSummary, SessionOwner, SessionRecord,
    SessionView, UserId, UserRecord,
};
pub use roles::{Role, RoleSet, UnknownRole};
