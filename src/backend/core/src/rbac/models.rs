//! RBAC data models: identifiers, caller identity, user, organization and session records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::roles::RoleSet;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Strongly-typed organization identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrganizationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrganizationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════════════

/// The authenticated caller of an operation.
///
/// Resolved once per request from the session store and passed explicitly
/// into the authorization gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub roles: RoleSet,
    pub organization_id: Option<OrganizationId>,
}

impl Identity {
    pub fn new(id: impl Into<UserId>, roles: RoleSet) -> Self {
        Self {
            id: id.into(),
            roles,
            organization_id: None,
        }
    }

    /// Place this identity inside an organization.
    pub fn in_organization(mut self, organization_id: impl Into<OrganizationId>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn is_superadmin(&self) -> bool {
        self.roles.is_superadmin()
    }

    pub fn is_admin(&self) -> bool {
        self.roles.is_admin()
    }
}

impl From<&UserRecord> for Identity {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            roles: user.roles.clone(),
            organization_id: user.organization_id.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// User
// ═══════════════════════════════════════════════════════════════════════════════

/// A persisted user, the target of administrative actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    #[serde(rename = "role")]
    pub roles: RoleSet,
    pub organization_id: Option<OrganizationId>,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub ban_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Create a new, unverified, unbanned user with the `user` role.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::generate(),
            name: name.into(),
            email: email.into(),
            email_verified: false,
            image: None,
            roles: RoleSet::default(),
            organization_id: None,
            banned: false,
            ban_reason: None,
            ban_expires: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<UserId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_roles(mut self, roles: RoleSet) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_organization(mut self, organization_id: Option<OrganizationId>) -> Self {
        self.organization_id = organization_id;
        self
    }

    /// Whether the user is banned at `now`. A ban whose expiry has passed no
    /// longer applies.
    pub fn is_banned_at(&self, now: DateTime<Utc>) -> bool {
        self.banned && self.ban_expires.map_or(true, |exp| now < exp)
    }

    /// Ban the user; `expires` of `None` is a permanent ban.
    pub fn ban(&mut self, reason: impl Into<String>, expires: Option<DateTime<Utc>>) {
        self.banned = true;
        self.ban_reason = Some(reason.into());
        self.ban_expires = expires;
        self.updated_at = Utc::now();
    }

    pub fn unban(&mut self) {
        self.banned = false;
        self.ban_reason = None;
        self.ban_expires = None;
        self.updated_at = Utc::now();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Organization
// ═══════════════════════════════════════════════════════════════════════════════

/// An organization (tenant) grouping users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Create a new organization.
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: OrganizationId::generate(),
            name: name.into(),
            slug: slug.into(),
            description: None,
            logo: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<OrganizationId>) -> Self {
        self.id = id.into();
        self
    }
}

/// An organization together with its derived member count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationSummary {
    #[serde(flatten)]
    pub organization: Organization,
    pub member_count: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════════════════════════

/// A live login issued by the authentication provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Set when an admin is impersonating the owner.
    pub impersonated_by: Option<UserId>,
}

impl SessionRecord {
    pub fn new(token: impl Into<String>, user_id: UserId, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            user_id,
            expires_at,
            created_at: Utc::now(),
            ip_address: None,
            user_agent: None,
            impersonated_by: None,
        }
    }

    /// A session is active iff its expiry lies in the future.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

/// Session owner details shown alongside a session in listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOwner {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

/// A session joined with its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: SessionRecord,
    pub user: SessionOwner,
}

impl From<&UserRecord> for SessionOwner {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::roles::Role;
    use chrono::Duration;

    #[test]
    fn test_identity_from_user_record() {
        let user = UserRecord::new("Ana", "ana@example.com")
            .with_id("u1")
            .with_roles(RoleSet::single(Role::Admin))
            .with_organization(Some(OrganizationId::new("org-1")));

        let identity = Identity::from(&user);
        assert_eq!(identity.id.as_str(), "u1");
        assert!(identity.is_admin());
        assert!(!identity.is_superadmin());
        assert_eq!(identity.organization_id, Some(OrganizationId::new("org-1")));
    }

    #[test]
    fn test_ban_and_unban() {
        let now = Utc::now();
        let mut user = UserRecord::new("Bob", "bob@example.com");
        assert!(!user.is_banned_at(now));

        user.ban("spam", None);
        assert!(user.is_banned_at(now));
        assert!(user.is_banned_at(now + Duration::days(3650)));

        user.unban();
        assert!(!user.banned);
        assert!(user.ban_reason.is_none());
        assert!(user.ban_expires.is_none());
    }

    #[test]
    fn test_temporary_ban_expires() {
        let now = Utc::now();
        let mut user = UserRecord::new("Carl", "carl@example.com");
        user.ban("cooldown", Some(now + Duration::days(1)));

        assert!(user.is_banned_at(now));
        assert!(!user.is_banned_at(now + Duration::days(2)));
    }

    #[test]
    fn test_session_activity() {
        let now = Utc::now();
        let live = SessionRecord::new("t1", UserId::new("u1"), now + Duration::hours(1));
        let dead = SessionRecord::new("t2", UserId::new("u1"), now - Duration::seconds(1));

        assert!(live.is_active_at(now));
        assert!(!dead.is_active_at(now));
    }

    #[test]
    fn test_user_record_serializes_role_as_text() {
        let user = UserRecord::new("Dee", "dee@example.com")
            .with_roles("superadmin,admin".parse().unwrap());
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["role"], "admin,superadmin");
    }
}
