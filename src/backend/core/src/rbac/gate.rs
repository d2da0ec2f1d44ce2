//! Authorization gate for administrative actions.
//!
//! The gate answers the question:
//! "May caller C perform action A on target T, and under which constraint?"
//!
//! It is a pure function of its inputs. Member counts, target roles and
//! organization ids are fetched by the caller before `authorize` is invoked;
//! the gate itself performs no I/O and holds no state, so a single instance
//! can be shared freely across request tasks.
//!
//! Rules are evaluated in a fixed order and the first denial wins:
//!
//! 1. caller present, else `Unauthenticated`
//! 2. baseline role (`admin`/`superadmin`, organization actions need `superadmin`)
//! 3. self-target exception (skips steps 4 and 5)
//! 4. peer / higher-privilege checks
//! 5. organization scoping
//! 6. privilege escalation
//! 7. organization assignment
//! 8. self-protection
//! 9. resource preconditions

use serde::{Deserialize, Serialize};
use std::fmt;

use super::models::{Identity, Organization, OrganizationId, SessionRecord, UserId, UserRecord};
use super::roles::{Role, RoleSet};

// ═══════════════════════════════════════════════════════════════════════════════
// Actions
// ═══════════════════════════════════════════════════════════════════════════════

/// Every administrative action the gate can decide on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateUser,
    UpdateUser,
    BanUser,
    UnbanUser,
    DeleteUser,
    SetRole,
    RevokeSession,
    RevokeAllUserSessions,
    CreateOrganization,
    UpdateOrganization,
    DeleteOrganization,
    ListOrganizations,
    ListUsers,
    ListSessions,
    ViewStatistics,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateUser => "create_user",
            Self::UpdateUser => "update_user",
            Self::BanUser => "ban_user",
            Self::UnbanUser => "unban_user",
            Self::DeleteUser => "delete_user",
            Self::SetRole => "set_role",
            Self::RevokeSession => "revoke_session",
            Self::RevokeAllUserSessions => "revoke_all_user_sessions",
            Self::CreateOrganization => "create_organization",
            Self::UpdateOrganization => "update_organization",
            Self::DeleteOrganization => "delete_organization",
            Self::ListOrganizations => "list_organizations",
            Self::ListUsers => "list_users",
            Self::ListSessions => "list_sessions",
            Self::ViewStatistics => "view_statistics",
        }
    }

    /// Organization management is reserved to superadmins.
    pub fn requires_superadmin(&self) -> bool {
        matches!(
            self,
            Self::CreateOrganization
                | Self::UpdateOrganization
                | Self::DeleteOrganization
                | Self::ListOrganizations
        )
    }

    /// Actions scoped to an existing target user.
    pub fn targets_user(&self) -> bool {
        matches!(
            self,
            Self::UpdateUser | Self::BanUser | Self::UnbanUser | Self::DeleteUser | Self::SetRole
        )
    }

    /// Actions that may assign roles to the target.
    pub fn assigns_roles(&self) -> bool {
        matches!(self, Self::CreateUser | Self::UpdateUser | Self::SetRole)
    }

    /// Actions that may assign the target to an organization.
    pub fn assigns_organization(&self) -> bool {
        matches!(self, Self::CreateUser | Self::UpdateUser)
    }

    /// Return all actions.
    pub fn all() -> Vec<Action> {
        vec![
            Self::CreateUser,
            Self::UpdateUser,
            Self::BanUser,
            Self::UnbanUser,
            Self::DeleteUser,
            Self::SetRole,
            Self::RevokeSession,
            Self::RevokeAllUserSessions,
            Self::CreateOrganization,
            Self::UpdateOrganization,
            Self::DeleteOrganization,
            Self::ListOrganizations,
            Self::ListUsers,
            Self::ListSessions,
            Self::ViewStatistics,
        ]
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Deny reasons
// ═══════════════════════════════════════════════════════════════════════════════

/// Why an action was denied. Every denial path yields exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    Unauthenticated,
    Forbidden,
    CannotModifyPeerSuperadmin,
    CannotModifyHigherPrivilege,
    CrossOrganizationAccess,
    PrivilegeEscalationBlocked,
    CrossOrganizationAssignment,
    SelfDeletionBlocked,
    OrganizationHasMembers,
}

impl DenyReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::CannotModifyPeerSuperadmin => "CANNOT_MODIFY_PEER_SUPERADMIN",
            Self::CannotModifyHigherPrivilege => "CANNOT_MODIFY_HIGHER_PRIVILEGE",
            Self::CrossOrganizationAccess => "CROSS_ORGANIZATION_ACCESS",
            Self::PrivilegeEscalationBlocked => "PRIVILEGE_ESCALATION_BLOCKED",
            Self::CrossOrganizationAssignment => "CROSS_ORGANIZATION_ASSIGNMENT",
            Self::SelfDeletionBlocked => "SELF_DELETION_BLOCKED",
            Self::OrganizationHasMembers => "ORGANIZATION_HAS_MEMBERS",
        }
    }

    /// Human-readable message, safe to show to the caller.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "You must be signed in to perform this action",
            Self::Forbidden => "You do not have permission to perform this action",
            Self::CannotModifyPeerSuperadmin => "Superadmins cannot modify other superadmins",
            Self::CannotModifyHigherPrivilege => "You cannot modify a user with higher privileges",
            Self::CrossOrganizationAccess => "You can only manage users of your own organization",
            Self::PrivilegeEscalationBlocked => "Only superadmins can grant the superadmin role",
            Self::CrossOrganizationAssignment => {
                "You can only assign users to your own organization"
            }
            Self::SelfDeletionBlocked => "You cannot delete your own account",
            Self::OrganizationHasMembers => "Cannot delete an organization that still has members",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request
// ═══════════════════════════════════════════════════════════════════════════════

/// Requested organization placement for a created or updated user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "organization_id", rename_all = "snake_case")]
pub enum OrganizationAssignment {
    /// Leave the organization unchanged (or unset, on creation).
    #[default]
    Unspecified,
    /// Move the user into the given organization.
    Assign(OrganizationId),
    /// Remove the user from any organization.
    Clear,
}

impl OrganizationAssignment {
    /// The organization the target ends up in, given the fallback used when
    /// nothing was specified.
    fn resolve<'a>(&'a self, fallback: Option<&'a OrganizationId>) -> Option<&'a OrganizationId> {
        match self {
            Self::Unspecified => fallback,
            Self::Assign(id) => Some(id),
            Self::Clear => None,
        }
    }
}

impl From<Option<OrganizationId>> for OrganizationAssignment {
    fn from(value: Option<OrganizationId>) -> Self {
        match value {
            Some(id) => Self::Assign(id),
            None => Self::Clear,
        }
    }
}

/// Role and organization changes requested by a create/update/set-role action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    pub roles: Option<RoleSet>,
    pub organization: OrganizationAssignment,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(mut self, roles: RoleSet) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn with_organization(mut self, organization: OrganizationAssignment) -> Self {
        self.organization = organization;
        self
    }

    fn grants_superadmin(&self) -> bool {
        self.roles
            .as_ref()
            .is_some_and(|roles| roles.contains(Role::Superadmin))
    }
}

/// Borrowed view of the authorization-relevant fields of a target user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetUser<'a> {
    pub id: &'a UserId,
    pub roles: &'a RoleSet,
    pub organization_id: Option<&'a OrganizationId>,
}

impl<'a> From<&'a UserRecord> for TargetUser<'a> {
    fn from(user: &'a UserRecord) -> Self {
        Self {
            id: &user.id,
            roles: &user.roles,
            organization_id: user.organization_id.as_ref(),
        }
    }
}

impl<'a> From<&'a Identity> for TargetUser<'a> {
    fn from(identity: &'a Identity) -> Self {
        Self {
            id: &identity.id,
            roles: &identity.roles,
            organization_id: identity.organization_id.as_ref(),
        }
    }
}

/// The entity an action is applied to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target<'a> {
    None,
    User(TargetUser<'a>),
    Session(&'a SessionRecord),
    Organization {
        organization: &'a Organization,
        /// Number of users in the organization, fetched by the caller.
        member_count: u64,
    },
}

/// A fully-formed authorization question.
///
/// Built through per-action constructors so that every action always comes
/// with the target it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRequest<'a> {
    action: Action,
    target: Target<'a>,
    assignment: Assignment,
}

impl<'a> AccessRequest<'a> {
    fn new(action: Action, target: Target<'a>) -> Self {
        Self {
            action,
            target,
            assignment: Assignment::default(),
        }
    }

    fn user(action: Action, target: impl Into<TargetUser<'a>>) -> Self {
        Self::new(action, Target::User(target.into()))
    }

    pub fn create_user(assignment: Assignment) -> Self {
        Self {
            assignment,
            ..Self::new(Action::CreateUser, Target::None)
        }
    }

    pub fn update_user(target: impl Into<TargetUser<'a>>, assignment: Assignment) -> Self {
        Self {
            assignment,
            ..Self::user(Action::UpdateUser, target)
        }
    }

    pub fn ban_user(target: impl Into<TargetUser<'a>>) -> Self {
        Self::user(Action::BanUser, target)
    }

    pub fn unban_user(target: impl Into<TargetUser<'a>>) -> Self {
        Self::user(Action::UnbanUser, target)
    }

    pub fn delete_user(target: impl Into<TargetUser<'a>>) -> Self {
        Self::user(Action::DeleteUser, target)
    }

    pub fn set_role(target: impl Into<TargetUser<'a>>, roles: RoleSet) -> Self {
        Self {
            assignment: Assignment::new().with_roles(roles),
            ..Self::user(Action::SetRole, target)
        }
    }

    pub fn revoke_session(session: &'a SessionRecord) -> Self {
        Self::new(Action::RevokeSession, Target::Session(session))
    }

    pub fn revoke_all_user_sessions(target: impl Into<TargetUser<'a>>) -> Self {
        Self::user(Action::RevokeAllUserSessions, target)
    }

    pub fn create_organization() -> Self {
        Self::new(Action::CreateOrganization, Target::None)
    }

    pub fn update_organization(organization: &'a Organization) -> Self {
        Self::new(
            Action::UpdateOrganization,
            Target::Organization {
                organization,
                member_count: 0,
            },
        )
    }

    pub fn delete_organization(organization: &'a Organization, member_count: u64) -> Self {
        Self::new(
            Action::DeleteOrganization,
            Target::Organization {
                organization,
                member_count,
            },
        )
    }

    pub fn list_organizations() -> Self {
        Self::new(Action::ListOrganizations, Target::None)
    }

    pub fn list_users() -> Self {
        Self::new(Action::ListUsers, Target::None)
    }

    pub fn list_sessions() -> Self {
        Self::new(Action::ListSessions, Target::None)
    }

    pub fn view_statistics() -> Self {
        Self::new(Action::ViewStatistics, Target::None)
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn target(&self) -> &Target<'a> {
        &self.target
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    fn target_user(&self) -> Option<&TargetUser<'a>> {
        match &self.target {
            Target::User(user) => Some(user),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Constraint attached to an allowed action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grant {
    forced_organization_id: Option<OrganizationId>,
    organization_pinned: bool,
}

impl Grant {
    fn unconstrained() -> Self {
        Self::default()
    }

    fn pinned_to(organization_id: Option<OrganizationId>) -> Self {
        Self {
            forced_organization_id: organization_id,
            organization_pinned: true,
        }
    }

    /// Organization the mutation is forced into, if any.
    pub fn forced_organization_id(&self) -> Option<&OrganizationId> {
        self.forced_organization_id.as_ref()
    }

    /// Whether the target's organization is fixed by the gate regardless of
    /// what the client asked for.
    pub fn is_organization_pinned(&self) -> bool {
        self.organization_pinned
    }

    /// Apply the constraint to the organization requested by the client.
    pub fn apply(&self, requested: OrganizationAssignment) -> OrganizationAssignment {
        if self.organization_pinned {
            self.forced_organization_id.clone().into()
        } else {
            requested
        }
    }
}

/// Result of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The action is allowed, possibly under a constraint.
    Allow(Grant),
    /// The action is denied, with a reason.
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow(_) => None,
            Self::Deny(reason) => Some(*reason),
        }
    }

    pub fn forced_organization_id(&self) -> Option<&OrganizationId> {
        match self {
            Self::Allow(grant) => grant.forced_organization_id(),
            Self::Deny(_) => None,
        }
    }

    /// Convenience: `Ok(grant)` if allowed, `Err(reason)` if denied.
    pub fn into_result(self) -> Result<Grant, DenyReason> {
        match self {
            Self::Allow(grant) => Ok(grant),
            Self::Deny(reason) => Err(reason),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Gate
// ═══════════════════════════════════════════════════════════════════════════════

/// Stateless authorization gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationGate;

impl AuthorizationGate {
    pub fn new() -> Self {
        Self
    }

    /// Decide whether `caller` may perform `request`.
    pub fn authorize(&self, caller: Option<&Identity>, request: &AccessRequest<'_>) -> Decision {
        match Self::evaluate(caller, request) {
            Ok(grant) => Decision::Allow(grant),
            Err(reason) => Decision::Deny(reason),
        }
    }

    /// Authentication and baseline role alone. Runs before any target is
    /// loaded or any input validated; [`authorize`](Self::authorize) still
    /// decides the full request afterwards.
    pub fn admit(&self, caller: Option<&Identity>, action: Action) -> Result<(), DenyReason> {
        let caller = caller.ok_or(DenyReason::Unauthenticated)?;
        Self::check_baseline(caller, action)
    }

    fn evaluate(caller: Option<&Identity>, request: &AccessRequest<'_>) -> Result<Grant, DenyReason> {
        let caller = caller.ok_or(DenyReason::Unauthenticated)?;
        let action = request.action;

        Self::check_baseline(caller, action)?;

        if action.targets_user() {
            if let Some(target) = request.target_user() {
                if target.id != &caller.id {
                    Self::check_target_privilege(caller, target)?;
                    Self::check_target_organization(caller, target)?;
                }
            }
        }

        if action.assigns_roles()
            && request.assignment.grants_superadmin()
            && !caller.is_superadmin()
        {
            return Err(DenyReason::PrivilegeEscalationBlocked);
        }

        let grant = if action.assigns_organization() && !caller.is_superadmin() {
            Self::pin_organization(caller, &request.assignment.organization)?
        } else {
            Grant::unconstrained()
        };

        if action == Action::DeleteUser {
            if let Some(target) = request.target_user() {
                if target.id == &caller.id {
                    return Err(DenyReason::SelfDeletionBlocked);
                }
            }
        }

        if let (Action::DeleteOrganization, Target::Organization { member_count, .. }) =
            (action, &request.target)
        {
            if *member_count > 0 {
                return Err(DenyReason::OrganizationHasMembers);
            }
        }

        Ok(grant)
    }

    fn check_baseline(caller: &Identity, action: Action) -> Result<(), DenyReason> {
        let permitted = if action.requires_superadmin() {
            caller.is_superadmin()
        } else {
            caller.is_admin()
        };
        if permitted {
            Ok(())
        } else {
            Err(DenyReason::Forbidden)
        }
    }

    fn check_target_privilege(caller: &Identity, target: &TargetUser<'_>) -> Result<(), DenyReason> {
        if !target.roles.is_superadmin() {
            return Ok(());
        }
        if caller.is_superadmin() {
            Err(DenyReason::CannotModifyPeerSuperadmin)
        } else {
            Err(DenyReason::CannotModifyHigherPrivilege)
        }
    }

    fn check_target_organization(
        caller: &Identity,
        target: &TargetUser<'_>,
    ) -> Result<(), DenyReason> {
        if caller.is_superadmin() {
            return Ok(());
        }
        // A caller without an organization never matches, not even a target
        // without one.
        match (caller.organization_id.as_ref(), target.organization_id) {
            (Some(own), Some(theirs)) if own == theirs => Ok(()),
            _ => Err(DenyReason::CrossOrganizationAccess),
        }
    }

    fn pin_organization(
        caller: &Identity,
        requested: &OrganizationAssignment,
    ) -> Result<Grant, DenyReason> {
        let own = caller.organization_id.as_ref();
        if requested.resolve(own) != own {
            return Err(DenyReason::CrossOrganizationAssignment);
        }
        Ok(Grant::pinned_to(own.cloned()))
    }
}

/// Free-function form of [`AuthorizationGate::authorize`].
pub fn authorize(caller: Option<&Identity>, request: &AccessRequest<'_>) -> Decision {
    AuthorizationGate.authorize(caller, request)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
