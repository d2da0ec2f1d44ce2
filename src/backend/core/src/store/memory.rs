//! In-memory [`AdminStore`] backed by `DashMap`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::cmp::Reverse;

use super::{AdminStore, DashboardStats, Scope};
use crate::error::{BastionError, Result};
use crate::profile::UserMetrics;
use crate::rbac::{
    Organization, OrganizationId, OrganizationSummary, SessionOwner, SessionRecord, SessionView,
    UserId, UserRecord,
};

/// Thread-safe in-memory store.
///
/// Unique-key checks (user email, organization slug) and the writes they guard
/// run under a single write lock; reads go straight to the maps.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    users: DashMap<UserId, UserRecord>,
    sessions: DashMap<String, SessionRecord>,
    organizations: DashMap<OrganizationId, Organization>,
    metrics: DashMap<UserId, UserMetrics>,
    write_lock: Mutex<()>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn email_taken_by_other(&self, email: &str, id: &UserId) -> bool {
        self.users
            .iter()
            .any(|entry| entry.email.eq_ignore_ascii_case(email) && &entry.id != id)
    }

    fn slug_taken_by_other(&self, slug: &str, id: &OrganizationId) -> bool {
        self.organizations
            .iter()
            .any(|entry| entry.slug == slug && &entry.id != id)
    }
}

#[async_trait]
impl AdminStore for InMemoryStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>> {
        Ok(self.users.get(id).map(|entry| entry.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.email.eq_ignore_ascii_case(email))
            .map(|entry| entry.clone()))
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        if self.users.contains_key(&user.id) {
            return Err(BastionError::duplicate("User", "id", user.id.as_str()));
        }
        if self.email_taken_by_other(&user.email, &user.id) {
            return Err(BastionError::duplicate("User", "email", &user.email));
        }
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &UserRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        if !self.users.contains_key(&user.id) {
            return Err(BastionError::not_found("User", user.id.as_str()));
        }
        if self.email_taken_by_other(&user.email, &user.id) {
            return Err(BastionError::duplicate("User", "email", &user.email));
        }
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn delete_user(&self, id: &UserId) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let removed = self.users.remove(id).is_some();
        if removed {
            self.sessions.retain(|_, session| &session.user_id != id);
            self.metrics.remove(id);
        }
        Ok(removed)
    }

    async fn list_users(&self, scope: &Scope) -> Result<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self
            .users
            .iter()
            .filter(|entry| scope.includes(entry.organization_id.as_ref()))
            .map(|entry| entry.clone())
            .collect();
        users.sort_by_key(|user| Reverse(user.created_at));
        Ok(users)
    }

    async fn dashboard_stats(&self, scope: &Scope, now: DateTime<Utc>) -> Result<DashboardStats> {
        let users = self.list_users(scope).await?;
        Ok(DashboardStats::from_users(&users, now))
    }

    async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.get(token).map(|entry| entry.clone()))
    }

    async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        if !self.users.contains_key(&session.user_id) {
            return Err(BastionError::not_found("User", session.user_id.as_str()));
        }
        if self.sessions.contains_key(&session.token) {
            return Err(BastionError::duplicate("Session", "token", &session.token));
        }
        self.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, token: &str) -> Result<bool> {
        Ok(self.sessions.remove(token).is_some())
    }

    async fn delete_user_sessions(&self, user_id: &UserId) -> Result<u64> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| &session.user_id != user_id);
        Ok(before.saturating_sub(self.sessions.len()) as u64)
    }

    async fn list_active_sessions(
        &self,
        scope: &Scope,
        user_id: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionView>> {
        let mut views: Vec<SessionView> = self
            .sessions
            .iter()
            .filter(|session| session.is_active_at(now))
            .filter(|session| user_id.map_or(true, |id| &session.user_id == id))
            .filter_map(|session| {
                let owner = self.users.get(&session.user_id)?;
                if !scope.includes(owner.organization_id.as_ref()) {
                    return None;
                }
                Some(SessionView {
                    session: session.clone(),
                    user: SessionOwner::from(&*owner),
                })
            })
            .collect();
        views.sort_by_key(|view| Reverse(view.session.created_at));
        Ok(views)
    }

    async fn get_organization(&self, id: &OrganizationId) -> Result<Option<Organization>> {
        Ok(self.organizations.get(id).map(|entry| entry.clone()))
    }

    async fn find_organization_by_slug(&self, slug: &str) -> Result<Option<Organization>> {
        Ok(self
            .organizations
            .iter()
            .find(|entry| entry.slug == slug)
            .map(|entry| entry.clone()))
    }

    async fn insert_organization(&self, organization: &Organization) -> Result<()> {
        let _guard = self.write_lock.lock();
        if self.organizations.contains_key(&organization.id) {
            return Err(BastionError::duplicate("Organization", "id", organization.id.as_str()));
        }
        if self.slug_taken_by_other(&organization.slug, &organization.id) {
            return Err(BastionError::duplicate("Organization", "slug", &organization.slug));
        }
        self.organizations
            .insert(organization.id.clone(), organization.clone());
        Ok(())
    }

    async fn update_organization(&self, organization: &Organization) -> Result<()> {
        let _guard = self.write_lock.lock();
        if !self.organizations.contains_key(&organization.id) {
            return Err(BastionError::not_found("Organization", organization.id.as_str()));
        }
        if self.slug_taken_by_other(&organization.slug, &organization.id) {
            return Err(BastionError::duplicate("Organization", "slug", &organization.slug));
        }
        self.organizations
            .insert(organization.id.clone(), organization.clone());
        Ok(())
    }

    async fn delete_organization(&self, id: &OrganizationId) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let removed = self.organizations.remove(id).is_some();
        if removed {
            // Mirrors ON DELETE SET NULL on users.organization_id.
            for mut user in self.users.iter_mut() {
                if user.organization_id.as_ref() == Some(id) {
                    user.organization_id = None;
                }
            }
        }
        Ok(removed)
    }

    async fn count_members(&self, id: &OrganizationId) -> Result<u64> {
        Ok(self
            .users
            .iter()
            .filter(|entry| entry.organization_id.as_ref() == Some(id))
            .count() as u64)
    }

    async fn list_organizations(&self) -> Result<Vec<OrganizationSummary>> {
        let mut organizations: Vec<Organization> = self
            .organizations
            .iter()
            .map(|entry| entry.clone())
            .collect();
        organizations.sort_by_key(|org| Reverse(org.created_at));

        let mut summaries = Vec::with_capacity(organizations.len());
        for organization in organizations {
            let member_count = self.count_members(&organization.id).await?;
            summaries.push(OrganizationSummary {
                organization,
                member_count,
            });
        }
        Ok(summaries)
    }

    async fn get_metrics(&self, user_id: &UserId) -> Result<Option<UserMetrics>> {
        Ok(self.metrics.get(user_id).map(|entry| entry.clone()))
    }

    async fn upsert_metrics(&self, metrics: &UserMetrics) -> Result<()> {
        if !self.users.contains_key(&metrics.user_id) {
            return Err(BastionError::not_found("User", metrics.user_id.as_str()));
        }
        self.metrics.insert(metrics.user_id.clone(), metrics.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::Duration;

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryStore::new();
        store
            .insert_user(&UserRecord::new("Ana", "ana@example.com"))
            .await
            .unwrap();

        let err = store
            .insert_user(&UserRecord::new("Ana Two", "ANA@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateRecord);
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let store = InMemoryStore::new();
        let user = UserRecord::new("Bob", "bob@example.com");
        store.insert_user(&user).await.unwrap();
        store
            .insert_session(&SessionRecord::new(
                "tok-1",
                user.id.clone(),
                Utc::now() + Duration::hours(1),
            ))
            .await
            .unwrap();
        store
            .upsert_metrics(&UserMetrics::zeroed(user.id.clone()))
            .await
            .unwrap();

        assert!(store.delete_user(&user.id).await.unwrap());
        assert!(store.get_session("tok-1").await.unwrap().is_none());
        assert!(store.get_metrics(&user.id).await.unwrap().is_none());
        assert!(!store.delete_user(&user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_active_sessions_are_scoped_and_unexpired() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let inside = UserRecord::new("In", "in@example.com")
            .with_organization(Some(OrganizationId::new("org-1")));
        let outside = UserRecord::new("Out", "out@example.com")
            .with_organization(Some(OrganizationId::new("org-2")));
        store.insert_user(&inside).await.unwrap();
        store.insert_user(&outside).await.unwrap();

        for (token, owner, expires) in [
            ("live-in", &inside, now + Duration::hours(1)),
            ("dead-in", &inside, now - Duration::hours(1)),
            ("live-out", &outside, now + Duration::hours(1)),
        ] {
            store
                .insert_session(&SessionRecord::new(token, owner.id.clone(), expires))
                .await
                .unwrap();
        }

        let scope = Scope::Organization(OrganizationId::new("org-1"));
        let sessions = store.list_active_sessions(&scope, None, now).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session.token, "live-in");
        assert_eq!(sessions[0].user.email, "in@example.com");

        let all = store.list_active_sessions(&Scope::All, None, now).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_organization_member_counts() {
        let store = InMemoryStore::new();
        let org = Organization::new("Acme", "acme");
        store.insert_organization(&org).await.unwrap();
        store
            .insert_user(&UserRecord::new("M", "m@example.com").with_organization(Some(org.id.clone())))
            .await
            .unwrap();

        let listed = store.list_organizations().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].member_count, 1);

        let err = store
            .insert_organization(&Organization::new("Acme 2", "acme"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateRecord);
    }
}
