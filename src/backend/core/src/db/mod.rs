//! Database layer for Bastion.
//!
//! Uses PostgreSQL for persistent storage with sqlx. Role strings are parsed
//! into a `RoleSet` here, at the storage boundary, and never re-split later.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::DatabaseConfig;
use crate::error::{BastionError, Result};
use crate::profile::UserMetrics;
use crate::rbac::{
    Organization, OrganizationId, OrganizationSummary, RoleSet, SessionOwner, SessionRecord,
    SessionView, UserId, UserRecord,
};
use crate::store::{AdminStore, DashboardStats, Scope, RECENT_USERS_WINDOW_DAYS};

/// Database connection and operations.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Split a scope into the `(all, organization_id)` pair bound by scoped queries.
fn scope_binds(scope: &Scope) -> Option<(bool, Option<String>)> {
    match scope {
        Scope::All => Some((true, None)),
        Scope::Organization(id) => Some((false, Some(id.0.clone()))),
        Scope::Nothing => None,
    }
}

#[async_trait]
impl AdminStore for Database {
    // ═══════════════════════════════════════════════════════════════════════════
    // User Operations
    // ═══════════════════════════════════════════════════════════════════════════

    async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, email_verified, image, role, organization_id,
                   banned, ban_reason, ban_expires, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, email_verified, image, role, organization_id,
                   banned, ban_reason, ban_expires, created_at, updated_at
            FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRecord::from))
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, email_verified, image, role, organization_id,
                               banned, ban_reason, ban_expires, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.image)
        .bind(user.roles.to_persisted())
        .bind(user.organization_id.as_ref().map(|id| id.as_str()))
        .bind(user.banned)
        .bind(&user.ban_reason)
        .bind(user.ban_expires)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_user(&self, user: &UserRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = $2, email = $3, email_verified = $4, image = $5, role = $6,
                organization_id = $7, banned = $8, ban_reason = $9, ban_expires = $10,
                updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.image)
        .bind(user.roles.to_persisted())
        .bind(user.organization_id.as_ref().map(|id| id.as_str()))
        .bind(user.banned)
        .bind(&user.ban_reason)
        .bind(user.ban_expires)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BastionError::not_found("User", user.id.as_str()));
        }
        Ok(())
    }

    async fn delete_user(&self, id: &UserId) -> Result<bool> {
        // Sessions and metrics go with the user through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self, scope: &Scope) -> Result<Vec<UserRecord>> {
        let Some((all, organization_id)) = scope_binds(scope) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, email_verified, image, role, organization_id,
                   banned, ban_reason, ban_expires, created_at, updated_at
            FROM users
            WHERE $1 OR organization_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(all)
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserRecord::from).collect())
    }

    async fn dashboard_stats(&self, scope: &Scope, now: DateTime<Utc>) -> Result<DashboardStats> {
        let Some((all, organization_id)) = scope_binds(scope) else {
            return Ok(DashboardStats::default());
        };

        let (total, verified, banned, recent): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE email_verified),
                   COUNT(*) FILTER (WHERE banned AND (ban_expires IS NULL OR ban_expires > $3)),
                   COUNT(*) FILTER (WHERE created_at >= $4)
            FROM users
            WHERE $1 OR organization_id = $2
            "#,
        )
        .bind(all)
        .bind(organization_id)
        .bind(now)
        .bind(now - chrono::Duration::days(RECENT_USERS_WINDOW_DAYS))
        .fetch_one(&self.pool)
        .await?;

        let total_users = total as u64;
        let banned_users = banned as u64;
        Ok(DashboardStats {
            total_users,
            verified_users: verified as u64,
            banned_users,
            active_users: total_users.saturating_sub(banned_users),
            recent_users: recent as u64,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Session Operations
    // ═══════════════════════════════════════════════════════════════════════════

    async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT token, user_id, expires_at, created_at, ip_address, user_agent, impersonated_by
            FROM sessions
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionRecord::from))
    }

    async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, expires_at, created_at, ip_address, user_agent, impersonated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&session.token)
        .bind(session.user_id.as_str())
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.impersonated_by.as_ref().map(|id| id.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_session(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_sessions(&self, user_id: &UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_active_sessions(
        &self,
        scope: &Scope,
        user_id: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionView>> {
        let Some((all, organization_id)) = scope_binds(scope) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, SessionViewRow>(
            r#"
            SELECT s.token, s.user_id, s.expires_at, s.created_at, s.ip_address,
                   s.user_agent, s.impersonated_by,
                   u.name AS user_name, u.email AS user_email, u.image AS user_image
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.expires_at > $1
              AND ($2::TEXT IS NULL OR s.user_id = $2)
              AND ($3 OR u.organization_id = $4)
            ORDER BY s.created_at DESC
            "#,
        )
        .bind(now)
        .bind(user_id.map(|id| id.as_str()))
        .bind(all)
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SessionView::from).collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Organization Operations
    // ═══════════════════════════════════════════════════════════════════════════

    async fn get_organization(&self, id: &OrganizationId) -> Result<Option<Organization>> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            r#"
            SELECT id, name, slug, description, logo, created_at, updated_at
            FROM organizations
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Organization::from))
    }

    async fn find_organization_by_slug(&self, slug: &str) -> Result<Option<Organization>> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            r#"
            SELECT id, name, slug, description, logo, created_at, updated_at
            FROM organizations
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Organization::from))
    }

    async fn insert_organization(&self, organization: &Organization) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, slug, description, logo, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(organization.id.as_str())
        .bind(&organization.name)
        .bind(&organization.slug)
        .bind(&organization.description)
        .bind(&organization.logo)
        .bind(organization.created_at)
        .bind(organization.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_organization(&self, organization: &Organization) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE organizations
            SET name = $2, slug = $3, description = $4, logo = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(organization.id.as_str())
        .bind(&organization.name)
        .bind(&organization.slug)
        .bind(&organization.description)
        .bind(&organization.logo)
        .bind(organization.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BastionError::not_found("Organization", organization.id.as_str()));
        }
        Ok(())
    }

    async fn delete_organization(&self, id: &OrganizationId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_members(&self, id: &OrganizationId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE organization_id = $1")
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn list_organizations(&self) -> Result<Vec<OrganizationSummary>> {
        let rows = sqlx::query_as::<_, OrganizationSummaryRow>(
            r#"
            SELECT o.id, o.name, o.slug, o.description, o.logo, o.created_at, o.updated_at,
                   COUNT(u.id) AS member_count
            FROM organizations o
            LEFT JOIN users u ON u.organization_id = o.id
            GROUP BY o.id
            ORDER BY o.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OrganizationSummary::from).collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Metrics Operations
    // ═══════════════════════════════════════════════════════════════════════════

    async fn get_metrics(&self, user_id: &UserId) -> Result<Option<UserMetrics>> {
        let row = sqlx::query_as::<_, MetricsRow>(
            r#"
            SELECT user_id, total_revenue, revenue_change, total_customers, customers_change,
                   active_accounts, accounts_change, growth_rate, growth_change,
                   created_at, updated_at
            FROM user_metrics
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserMetrics::from))
    }

    async fn upsert_metrics(&self, metrics: &UserMetrics) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_metrics (user_id, total_revenue, revenue_change, total_customers,
                                      customers_change, active_accounts, accounts_change,
                                      growth_rate, growth_change, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (user_id) DO UPDATE SET
                total_revenue = EXCLUDED.total_revenue,
                revenue_change = EXCLUDED.revenue_change,
                total_customers = EXCLUDED.total_customers,
                customers_change = EXCLUDED.customers_change,
                active_accounts = EXCLUDED.active_accounts,
                accounts_change = EXCLUDED.accounts_change,
                growth_rate = EXCLUDED.growth_rate,
                growth_change = EXCLUDED.growth_change,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(metrics.user_id.as_str())
        .bind(metrics.total_revenue)
        .bind(metrics.revenue_change)
        .bind(metrics.total_customers)
        .bind(metrics.customers_change)
        .bind(metrics.active_accounts)
        .bind(metrics.accounts_change)
        .bind(metrics.growth_rate)
        .bind(metrics.growth_change)
        .bind(metrics.created_at)
        .bind(metrics.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    pub role: Option<String>,
    pub organization_id: Option<String>,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub ban_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.id),
            name: row.name,
            email: row.email,
            email_verified: row.email_verified,
            image: row.image,
            roles: RoleSet::parse_lenient(row.role.as_deref()),
            organization_id: row.organization_id.map(OrganizationId),
            banned: row.banned,
            ban_reason: row.ban_reason,
            ban_expires: row.ban_expires,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionRow {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub impersonated_by: Option<String>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            token: row.token,
            user_id: UserId(row.user_id),
            expires_at: row.expires_at,
            created_at: row.created_at,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            impersonated_by: row.impersonated_by.map(UserId),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionViewRow {
    #[sqlx(flatten)]
    pub session: SessionRow,
    pub user_name: String,
    pub user_email: String,
    pub user_image: Option<String>,
}

impl From<SessionViewRow> for SessionView {
    fn from(row: SessionViewRow) -> Self {
        let session = SessionRecord::from(row.session);
        let user = SessionOwner {
            id: session.user_id.clone(),
            name: row.user_name,
            email: row.user_email,
            image: row.user_image,
        };
        Self { session, user }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct OrganizationRow {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Self {
            id: OrganizationId(row.id),
            name: row.name,
            slug: row.slug,
            description: row.description,
            logo: row.logo,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct OrganizationSummaryRow {
    #[sqlx(flatten)]
    pub organization: OrganizationRow,
    pub member_count: i64,
}

impl From<OrganizationSummaryRow> for OrganizationSummary {
    fn from(row: OrganizationSummaryRow) -> Self {
        Self {
            organization: Organization::from(row.organization),
            member_count: row.member_count.max(0) as u64,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct MetricsRow {
    pub user_id: String,
    pub total_revenue: f64,
    pub revenue_change: f64,
    pub total_customers: f64,
    pub customers_change: f64,
    pub active_accounts: f64,
    pub accounts_change: f64,
    pub growth_rate: f64,
    pub growth_change: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MetricsRow> for UserMetrics {
    fn from(row: MetricsRow) -> Self {
        Self {
            user_id: UserId(row.user_id),
            total_revenue: row.total_revenue,
            revenue_change: row.revenue_change,
            total_customers: row.total_customers,
            customers_change: row.customers_change,
            active_accounts: row.active_accounts,
            accounts_change: row.accounts_change,
            growth_rate: row.growth_rate,
            growth_change: row.growth_change,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
