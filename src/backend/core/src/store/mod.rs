//! Persistence seam for the admin console.
//!
//! [`AdminStore`] is the single trait the admin and profile services talk to.
//! Two backends implement it:
//!
//! - [`InMemoryStore`]: `DashMap`-backed, used in tests and for local runs
//! - [`crate::db::Database`]: PostgreSQL via `sqlx`
//!
//! Stores perform no authorization. Every read that feeds the gate must be
//! done fresh inside the request that acts on it.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::profile::UserMetrics;
use crate::rbac::{
    Identity, Organization, OrganizationId, OrganizationSummary, SessionRecord, SessionView,
    UserId, UserRecord,
};

// ═══════════════════════════════════════════════════════════════════════════════
// Scope
// ═══════════════════════════════════════════════════════════════════════════════

/// Which users a listing may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every user.
    All,
    /// Users of one organization.
    Organization(OrganizationId),
    /// No users at all.
    Nothing,
}

impl Scope {
    /// Listing scope for an identity: superadmins see everything, admins see
    /// their own organization, anyone else sees nothing.
    pub fn for_identity(identity: &Identity) -> Self {
        if identity.is_superadmin() {
            return Self::All;
        }
        match (&identity.organization_id, identity.is_admin()) {
            (Some(org), true) => Self::Organization(org.clone()),
            _ => Self::Nothing,
        }
    }

    /// Whether a user in `organization_id` falls inside this scope.
    pub fn includes(&self, organization_id: Option<&OrganizationId>) -> bool {
        match self {
            Self::All => true,
            Self::Organization(own) => organization_id == Some(own),
            Self::Nothing => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// User counts shown on the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_users: u64,
    pub verified_users: u64,
    pub banned_users: u64,
    /// Users not currently banned.
    pub active_users: u64,
    /// Users created in the last seven days.
    pub recent_users: u64,
}

/// Window used for [`DashboardStats::recent_users`].
pub const RECENT_USERS_WINDOW_DAYS: i64 = 7;

impl DashboardStats {
    /// Fold a set of users into dashboard counts at `now`.
    pub fn from_users<'a>(users: impl IntoIterator<Item = &'a UserRecord>, now: DateTime<Utc>) -> Self {
        let since = now - chrono::Duration::days(RECENT_USERS_WINDOW_DAYS);
        let mut stats = Self::default();
        for user in users {
            stats.total_users += 1;
            if user.email_verified {
                stats.verified_users += 1;
            }
            if user.is_banned_at(now) {
                stats.banned_users += 1;
            }
            if user.created_at >= since {
                stats.recent_users += 1;
            }
        }
        stats.active_users = stats.total_users - stats.banned_users;
        stats
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage operations used by the admin and profile services.
///
/// Listings are returned newest first.
#[async_trait]
pub trait AdminStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Insert a user. Fails with `DuplicateRecord` if the email is taken.
    async fn insert_user(&self, user: &UserRecord) -> Result<()>;

    /// Replace a stored user. Fails with `RecordNotFound` if it does not exist
    /// and `DuplicateRecord` if the new email belongs to someone else.
    async fn update_user(&self, user: &UserRecord) -> Result<()>;

    /// Delete a user together with its sessions and metrics.
    async fn delete_user(&self, id: &UserId) -> Result<bool>;

    async fn list_users(&self, scope: &Scope) -> Result<Vec<UserRecord>>;

    async fn dashboard_stats(&self, scope: &Scope, now: DateTime<Utc>) -> Result<DashboardStats>;

    // ─────────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>>;

    async fn insert_session(&self, session: &SessionRecord) -> Result<()>;

    async fn delete_session(&self, token: &str) -> Result<bool>;

    /// Delete every session of a user, returning how many were removed.
    async fn delete_user_sessions(&self, user_id: &UserId) -> Result<u64>;

    /// Sessions active at `now` whose owner falls inside `scope`, optionally
    /// restricted to one owner.
    async fn list_active_sessions(
        &self,
        scope: &Scope,
        user_id: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionView>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Organizations
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_organization(&self, id: &OrganizationId) -> Result<Option<Organization>>;

    async fn find_organization_by_slug(&self, slug: &str) -> Result<Option<Organization>>;

    /// Insert an organization. Fails with `DuplicateRecord` if the slug is taken.
    async fn insert_organization(&self, organization: &Organization) -> Result<()>;

    async fn update_organization(&self, organization: &Organization) -> Result<()>;

    async fn delete_organization(&self, id: &OrganizationId) -> Result<bool>;

    async fn count_members(&self, id: &OrganizationId) -> Result<u64>;

    async fn list_organizations(&self) -> Result<Vec<OrganizationSummary>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_metrics(&self, user_id: &UserId) -> Result<Option<UserMetrics>>;

    async fn upsert_metrics(&self, metrics: &UserMetrics) -> Result<()>;
}
