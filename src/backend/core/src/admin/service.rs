//! Admin mutation and listing operations.
//!
//! Every operation follows the same shape: check the caller's baseline role,
//! load the authorization inputs fresh from the store, ask the gate, and write
//! only on ALLOW. A denied request never reaches a store write.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

use super::requests::{BanUser, CreateOrganization, CreateUser, SetRole, UpdateOrganization, UpdateUser};
use crate::error::{BastionError, ErrorCode, Result};
use crate::observability::{metrics, AdminEvent};
use crate::rbac::{
    AccessRequest, Action, Assignment, AuthorizationGate, Decision, Grant, Identity,
    Organization, OrganizationAssignment, OrganizationId, OrganizationSummary, SessionView,
    UserId, UserRecord,
};
use crate::store::{AdminStore, DashboardStats, Scope};

/// Admin operations over an [`AdminStore`], guarded by the [`AuthorizationGate`].
#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn AdminStore>,
    gate: AuthorizationGate,
}

impl AdminService {
    pub fn new(store: Arc<dyn AdminStore>) -> Self {
        Self {
            store,
            gate: AuthorizationGate::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn AdminStore> {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Gate plumbing
    // ─────────────────────────────────────────────────────────────────────────

    /// Authentication and baseline role, checked before any validation or
    /// store read so that an unprivileged caller learns nothing about targets.
    fn admit<'c>(&self, caller: Option<&'c Identity>, action: Action) -> Result<&'c Identity> {
        if let Err(reason) = self.gate.admit(caller, action) {
            Self::record(caller, action, &Decision::Deny(reason));
            return Err(BastionError::denied(reason));
        }
        caller.ok_or_else(BastionError::unauthenticated)
    }

    fn check(&self, caller: &Identity, request: &AccessRequest<'_>) -> Result<Grant> {
        let decision = self.gate.authorize(Some(caller), request);
        Self::record(Some(caller), request.action(), &decision);
        decision.into_result().map_err(BastionError::denied)
    }

    fn record(caller: Option<&Identity>, action: Action, decision: &Decision) {
        let caller_id = caller.map(|c| c.id.as_str()).unwrap_or("anonymous");
        match decision {
            Decision::Allow(grant) => debug!(
                action = %action,
                caller_id = %caller_id,
                forced_organization_id = ?grant.forced_organization_id(),
                "Authorization granted"
            ),
            Decision::Deny(reason) => warn!(
                action = %action,
                caller_id = %caller_id,
                reason = %reason,
                "Authorization denied"
            ),
        }
        metrics::record_authorization(action, decision);
    }

    async fn load_user(&self, id: &UserId) -> Result<UserRecord> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| BastionError::not_found("User", id.as_str()))
    }

    async fn load_organization(&self, id: &OrganizationId) -> Result<Organization> {
        self.store
            .get_organization(id)
            .await?
            .ok_or_else(|| BastionError::not_found("Organization", id.as_str()))
    }

    /// Turn a (possibly pinned) organization assignment into the value to
    /// store, checking that an assigned organization exists.
    async fn resolve_organization(
        &self,
        assignment: OrganizationAssignment,
        current: Option<OrganizationId>,
    ) -> Result<Option<OrganizationId>> {
        match assignment {
            OrganizationAssignment::Unspecified => Ok(current),
            OrganizationAssignment::Clear => Ok(None),
            OrganizationAssignment::Assign(id) => {
                if current.as_ref() != Some(&id) {
                    self.load_organization(&id).await?;
                }
                Ok(Some(id))
            }
        }
    }

    async fn ensure_email_free(&self, email: &str, owner: Option<&UserId>) -> Result<()> {
        match self.store.find_user_by_email(email).await? {
            Some(existing) if Some(&existing.id) != owner => {
                Err(BastionError::duplicate("User", "email", email))
            }
            _ => Ok(()),
        }
    }

    async fn ensure_slug_free(&self, slug: &str, owner: Option<&OrganizationId>) -> Result<()> {
        match self.store.find_organization_by_slug(slug).await? {
            Some(existing) if Some(&existing.id) != owner => {
                Err(BastionError::duplicate("Organization", "slug", slug))
            }
            _ => Ok(()),
        }
    }

    fn timed(action: Action, started: Instant) {
        metrics::record_operation_duration(action, started.elapsed().as_secs_f64());
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Users
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create a user. A non-superadmin's new user always lands in the
    /// caller's own organization.
    #[instrument(skip(self, caller, request), fields(caller_id))]
    pub async fn create_user(&self, caller: Option<&Identity>, request: CreateUser) -> Result<UserRecord> {
        let started = Instant::now();
        let caller = self.admit(caller, Action::CreateUser)?;
        tracing::Span::current().record("caller_id", caller.id.as_str());

        let valid = request.validate()?;
        let mut assignment = Assignment::new().with_organization(valid.organization.clone());
        if let Some(roles) = &valid.roles {
            assignment = assignment.with_roles(roles.clone());
        }
        let grant = self.check(caller, &AccessRequest::create_user(assignment))?;

        let organization_id = self
            .resolve_organization(grant.apply(valid.organization), None)
            .await?;
        self.ensure_email_free(&valid.email, None).await?;

        let user = UserRecord::new(valid.name, valid.email)
            .with_roles(valid.roles.unwrap_or_default())
            .with_organization(organization_id);
        self.store.insert_user(&user).await?;

        AdminEvent::UserCreated {
            actor_id: caller.id.to_string(),
            user_id: user.id.to_string(),
            roles: user.roles.to_persisted(),
            organization_id: user.organization_id.as_ref().map(ToString::to_string),
        }
        .log();
        Self::timed(Action::CreateUser, started);
        Ok(user)
    }

    /// Update name, email, roles and organization of a user.
    #[instrument(skip(self, caller, request), fields(user_id = %user_id))]
    pub async fn update_user(
        &self,
        caller: Option<&Identity>,
        user_id: &UserId,
        request: UpdateUser,
    ) -> Result<UserRecord> {
        let started = Instant::now();
        let caller = self.admit(caller, Action::UpdateUser)?;
        let valid = request.validate()?;
        let mut user = self.load_user(user_id).await?;

        let mut assignment = Assignment::new().with_organization(valid.organization.clone());
        if let Some(roles) = &valid.roles {
            assignment = assignment.with_roles(roles.clone());
        }
        let grant = self.check(caller, &AccessRequest::update_user(&user, assignment))?;

        user.organization_id = self
            .resolve_organization(grant.apply(valid.organization), user.organization_id.take())
            .await?;
        if let Some(email) = valid.email {
            if email != user.email {
                self.ensure_email_free(&email, Some(&user.id)).await?;
                user.email = email;
            }
        }
        if let Some(name) = valid.name {
            user.name = name;
        }
        if let Some(roles) = valid.roles {
            user.roles = roles;
        }
        user.touch();
        self.store.update_user(&user).await?;

        AdminEvent::UserUpdated {
            actor_id: caller.id.to_string(),
            user_id: user.id.to_string(),
        }
        .log();
        Self::timed(Action::UpdateUser, started);
        Ok(user)
    }

    /// Ban a user and revoke every session they hold.
    #[instrument(skip(self, caller, request), fields(user_id = %user_id))]
    pub async fn ban_user(
        &self,
        caller: Option<&Identity>,
        user_id: &UserId,
        request: BanUser,
    ) -> Result<UserRecord> {
        let started = Instant::now();
        let caller = self.admit(caller, Action::BanUser)?;
        let (reason, duration) = request.validate()?;
        let mut user = self.load_user(user_id).await?;
        self.check(caller, &AccessRequest::ban_user(&user))?;

        let expires_at = duration.map(|d| Utc::now() + d);
        user.ban(reason, expires_at);
        self.store.update_user(&user).await?;

        let sessions_revoked = self.store.delete_user_sessions(&user.id).await?;
        metrics::record_sessions_revoked(sessions_revoked);

        AdminEvent::UserBanned {
            actor_id: caller.id.to_string(),
            user_id: user.id.to_string(),
            expires_at,
            sessions_revoked,
        }
        .log();
        Self::timed(Action::BanUser, started);
        Ok(user)
    }

    /// Lift a ban.
    #[instrument(skip(self, caller), fields(user_id = %user_id))]
    pub async fn unban_user(&self, caller: Option<&Identity>, user_id: &UserId) -> Result<UserRecord> {
        let caller = self.admit(caller, Action::UnbanUser)?;
        let mut user = self.load_user(user_id).await?;
        self.check(caller, &AccessRequest::unban_user(&user))?;

        user.unban();
        self.store.update_user(&user).await?;

        AdminEvent::UserUnbanned {
            actor_id: caller.id.to_string(),
            user_id: user.id.to_string(),
        }
        .log();
        Ok(user)
    }

    /// Delete a user, their sessions and metrics.
    #[instrument(skip(self, caller), fields(user_id = %user_id))]
    pub async fn delete_user(&self, caller: Option<&Identity>, user_id: &UserId) -> Result<()> {
        let started = Instant::now();
        let caller = self.admit(caller, Action::DeleteUser)?;
        let user = self.load_user(user_id).await?;
        self.check(caller, &AccessRequest::delete_user(&user))?;

        if !self.store.delete_user(&user.id).await? {
            return Err(BastionError::not_found("User", user.id.as_str()));
        }

        AdminEvent::UserDeleted {
            actor_id: caller.id.to_string(),
            user_id: user.id.to_string(),
        }
        .log();
        Self::timed(Action::DeleteUser, started);
        Ok(())
    }

    /// Replace a user's role set.
    #[instrument(skip(self, caller, request), fields(user_id = %user_id))]
    pub async fn set_role(
        &self,
        caller: Option<&Identity>,
        user_id: &UserId,
        request: SetRole,
    ) -> Result<UserRecord> {
        let caller = self.admit(caller, Action::SetRole)?;
        let roles = request.validate()?;
        let mut user = self.load_user(user_id).await?;
        self.check(caller, &AccessRequest::set_role(&user, roles.clone()))?;

        user.roles = roles;
        user.touch();
        self.store.update_user(&user).await?;

        AdminEvent::RoleChanged {
            actor_id: caller.id.to_string(),
            user_id: user.id.to_string(),
            roles: user.roles.to_persisted(),
        }
        .log();
        Ok(user)
    }

    /// Users visible to the caller, newest first.
    pub async fn list_users(&self, caller: Option<&Identity>) -> Result<Vec<UserRecord>> {
        let caller = self.admit(caller, Action::ListUsers)?;
        self.check(caller, &AccessRequest::list_users())?;
        self.store.list_users(&Scope::for_identity(caller)).await
    }

    /// Dashboard counts over the users visible to the caller.
    pub async fn dashboard_stats(&self, caller: Option<&Identity>) -> Result<DashboardStats> {
        let caller = self.admit(caller, Action::ViewStatistics)?;
        self.check(caller, &AccessRequest::view_statistics())?;
        self.store
            .dashboard_stats(&Scope::for_identity(caller), Utc::now())
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Sessions
    // ═══════════════════════════════════════════════════════════════════════════

    /// Revoke one active session.
    #[instrument(skip(self, caller, token))]
    pub async fn revoke_session(&self, caller: Option<&Identity>, token: &str) -> Result<()> {
        let caller = self.admit(caller, Action::RevokeSession)?;
        let session = self
            .store
            .get_session(token)
            .await?
            .filter(|session| session.is_active())
            .ok_or_else(|| {
                BastionError::new(ErrorCode::RecordNotFound, "Session not found or already expired")
            })?;
        self.check(caller, &AccessRequest::revoke_session(&session))?;

        if self.store.delete_session(&session.token).await? {
            metrics::record_sessions_revoked(1);
        }
        AdminEvent::SessionsRevoked {
            actor_id: caller.id.to_string(),
            user_id: session.user_id.to_string(),
            count: 1,
        }
        .log();
        Ok(())
    }

    /// Revoke every session of a user, returning how many were removed.
    #[instrument(skip(self, caller), fields(user_id = %user_id))]
    pub async fn revoke_all_user_sessions(
        &self,
        caller: Option<&Identity>,
        user_id: &UserId,
    ) -> Result<u64> {
        let caller = self.admit(caller, Action::RevokeAllUserSessions)?;
        let user = self.load_user(user_id).await?;
        self.check(caller, &AccessRequest::revoke_all_user_sessions(&user))?;

        let count = self.store.delete_user_sessions(&user.id).await?;
        metrics::record_sessions_revoked(count);

        AdminEvent::SessionsRevoked {
            actor_id: caller.id.to_string(),
            user_id: user.id.to_string(),
            count,
        }
        .log();
        Ok(count)
    }

    /// Active sessions visible to the caller, newest first.
    pub async fn list_sessions(
        &self,
        caller: Option<&Identity>,
        user_id: Option<&UserId>,
    ) -> Result<Vec<SessionView>> {
        let caller = self.admit(caller, Action::ListSessions)?;
        self.check(caller, &AccessRequest::list_sessions())?;
        self.store
            .list_active_sessions(&Scope::for_identity(caller), user_id, Utc::now())
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Organizations
    // ═══════════════════════════════════════════════════════════════════════════

    #[instrument(skip(self, caller, request))]
    pub async fn create_organization(
        &self,
        caller: Option<&Identity>,
        request: CreateOrganization,
    ) -> Result<Organization> {
        let caller = self.admit(caller, Action::CreateOrganization)?;
        self.check(caller, &AccessRequest::create_organization())?;

        let valid = request.validate()?;
        self.ensure_slug_free(&valid.slug, None).await?;

        let mut organization = Organization::new(valid.name, valid.slug);
        organization.description = valid.description;
        organization.logo = valid.logo;
        self.store.insert_organization(&organization).await?;

        AdminEvent::OrganizationCreated {
            actor_id: caller.id.to_string(),
            organization_id: organization.id.to_string(),
            slug: organization.slug.clone(),
        }
        .log();
        Ok(organization)
    }

    #[instrument(skip(self, caller, request), fields(organization_id = %organization_id))]
    pub async fn update_organization(
        &self,
        caller: Option<&Identity>,
        organization_id: &OrganizationId,
        request: UpdateOrganization,
    ) -> Result<Organization> {
        let caller = self.admit(caller, Action::UpdateOrganization)?;
        let mut organization = self.load_organization(organization_id).await?;
        self.check(caller, &AccessRequest::update_organization(&organization))?;

        let valid = request.validate()?;
        if let Some(slug) = valid.slug {
            if slug != organization.slug {
                self.ensure_slug_free(&slug, Some(&organization.id)).await?;
                organization.slug = slug;
            }
        }
        if let Some(name) = valid.name {
            organization.name = name;
        }
        if let Some(description) = valid.description {
            organization.description = description;
        }
        if let Some(logo) = valid.logo {
            organization.logo = logo;
        }
        organization.updated_at = Utc::now();
        self.store.update_organization(&organization).await?;

        AdminEvent::OrganizationUpdated {
            actor_id: caller.id.to_string(),
            organization_id: organization.id.to_string(),
        }
        .log();
        Ok(organization)
    }

    /// Delete an empty organization. The member count is read fresh in this
    /// request.
    #[instrument(skip(self, caller), fields(organization_id = %organization_id))]
    pub async fn delete_organization(
        &self,
        caller: Option<&Identity>,
        organization_id: &OrganizationId,
    ) -> Result<()> {
        let caller = self.admit(caller, Action::DeleteOrganization)?;
        let organization = self.load_organization(organization_id).await?;
        let member_count = self.store.count_members(&organization.id).await?;
        self.check(
            caller,
            &AccessRequest::delete_organization(&organization, member_count),
        )
        .map_err(|e| e.with_context("member_count", member_count))?;

        if !self.store.delete_organization(&organization.id).await? {
            return Err(BastionError::not_found("Organization", organization.id.as_str()));
        }

        AdminEvent::OrganizationDeleted {
            actor_id: caller.id.to_string(),
            organization_id: organization.id.to_string(),
        }
        .log();
        Ok(())
    }

    /// All organizations with member counts, newest first.
    pub async fn list_organizations(&self, caller: Option<&Identity>) -> Result<Vec<OrganizationSummary>> {
        let caller = self.admit(caller, Action::ListOrganizations)?;
        self.check(caller, &AccessRequest::list_organizations())?;
        self.store.list_organizations().await
    }
}
