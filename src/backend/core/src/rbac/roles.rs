//! Built-in roles and the role set carried by every identity.
//!
//! Bastion ships with three roles:
//!
//! | Role        | Description                                                   |
//! |-------------|---------------------------------------------------------------|
//! | User        | Dashboard access to their own profile and metrics             |
//! | Admin       | Manages users and sessions inside their own organization      |
//! | Superadmin  | Manages every user, session and organization                  |
//!
//! Roles are persisted as comma-joined text (`"admin,superadmin"`). The text is
//! parsed once into a [`RoleSet`] at the storage or request boundary and never
//! re-split downstream.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A single role tag.
///
/// Variants are ordered by privilege so `RoleSet` iterates from least to most
/// privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    User,
    Admin,
    Superadmin,
}

impl Role {
    /// Get the role identifier string as persisted.
    pub fn id(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
        }
    }

    /// Get the human-readable name, as shown on role badges.
    pub fn name(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Admin => "Admin",
            Self::Superadmin => "Super Admin",
        }
    }

    /// Get the description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::User => "Access to the personal dashboard, profile and metrics",
            Self::Admin => "Manage users and sessions within their own organization",
            Self::Superadmin => "Full access to all users, sessions and organizations",
        }
    }

    /// Return all roles, least privileged first.
    pub fn all() -> Vec<Role> {
        vec![Self::User, Self::Admin, Self::Superadmin]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Error returned when a role tag is not one of the built-in roles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "superadmin" => Ok(Self::Superadmin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Set
// ═══════════════════════════════════════════════════════════════════════════════

/// The set of roles held by an identity.
///
/// Never empty: constructing a set from no roles yields `{user}`. Order and
/// duplicates in the source text are irrelevant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    /// Build a role set, falling back to `{user}` when `roles` is empty.
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut set: BTreeSet<Role> = roles.into_iter().collect();
        if set.is_empty() {
            set.insert(Role::User);
        }
        Self(set)
    }

    /// A set holding only the given role.
    pub fn single(role: Role) -> Self {
        Self::new([role])
    }

    /// Parse persisted role text, skipping tags that are not built-in roles.
    ///
    /// Used for data coming from storage, where an unknown tag must not lock
    /// the account out of the dashboard. A missing or blank value yields `{user}`.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        let roles = raw
            .unwrap_or_default()
            .split(',')
            .filter(|tag| !tag.trim().is_empty())
            .filter_map(|tag| match tag.parse::<Role>() {
                Ok(role) => Some(role),
                Err(e) => {
                    tracing::debug!(tag = %e.0, "Ignoring unknown role tag");
                    None
                }
            });
        Self::new(roles)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// Whether the set grants superadmin privileges.
    pub fn is_superadmin(&self) -> bool {
        self.contains(Role::Superadmin)
    }

    /// Whether the set grants at least admin privileges.
    ///
    /// Superadmin dominates: a superadmin is always an admin for permission
    /// purposes.
    pub fn is_admin(&self) -> bool {
        self.contains(Role::Admin) || self.is_superadmin()
    }

    /// The most privileged role in the set.
    pub fn highest(&self) -> Role {
        self.0.iter().next_back().copied().unwrap_or(Role::User)
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    /// Comma-joined persisted form, least privileged first.
    pub fn to_persisted(&self) -> String {
        self.iter().map(|r| r.id()).collect::<Vec<_>>().join(",")
    }
}

impl Default for RoleSet {
    fn default() -> Self {
        Self::single(Role::User)
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_persisted())
    }
}

/// Strict parsing for request input: every tag must be a built-in role.
impl FromStr for RoleSet {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let roles = s
            .split(',')
            .filter(|tag| !tag.trim().is_empty())
            .map(str::parse::<Role>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(roles))
    }
}

impl From<Role> for RoleSet {
    fn from(role: Role) -> Self {
        Self::single(role)
    }
}

impl Serialize for RoleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_persisted())
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
