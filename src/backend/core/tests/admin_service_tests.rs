//! Admin and profile service tests against the in-memory store.
//!
//! Tests cover:
//! - Gate enforcement surfacing as typed errors
//! - User lifecycle: create, update, ban, unban, role changes, deletion
//! - Session revocation and listing
//! - Organization management and member-count preconditions
//! - Scoped listings and dashboard statistics
//! - Self-service profile and metrics

use std::sync::Arc;

use bastion_core::admin::{
    AdminService, BanUser, CreateOrganization, CreateUser, SetRole, UpdateOrganization, UpdateUser,
};
use bastion_core::error::ErrorCode;
use bastion_core::profile::{MetricsUpdate, ProfileService, ProfileUpdate};
use bastion_core::rbac::{
    Identity, Organization, OrganizationAssignment, OrganizationId, Role, RoleSet, SessionRecord,
    UserId, UserRecord,
};
use bastion_core::store::{AdminStore, InMemoryStore};
use chrono::{Duration, Utc};

// ============================================================================
// Fixtures
// ============================================================================

struct Fixture {
    store: Arc<InMemoryStore>,
    admin: AdminService,
    profile: ProfileService,
    org1: Organization,
    org2: Organization,
    superadmin: UserRecord,
    admin_user: UserRecord,
    member: UserRecord,
    outsider: UserRecord,
}

impl Fixture {
    async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let org1 = Organization::new("Org One", "org-one").with_id("org-1");
        let org2 = Organization::new("Org Two", "org-two").with_id("org-2");
        store.insert_organization(&org1).await.unwrap();
        store.insert_organization(&org2).await.unwrap();

        let superadmin = UserRecord::new("Root", "root@example.com")
            .with_id("root")
            .with_roles(RoleSet::single(Role::Superadmin));
        let admin_user = UserRecord::new("Ada", "ada@example.com")
            .with_id("ada")
            .with_roles(RoleSet::single(Role::Admin))
            .with_organization(Some(org1.id.clone()));
        let member = UserRecord::new("Mia", "mia@example.com")
            .with_id("mia")
            .with_organization(Some(org1.id.clone()));
        let outsider = UserRecord::new("Otto", "otto@example.com")
            .with_id("otto")
            .with_organization(Some(org2.id.clone()));
        for user in [&superadmin, &admin_user, &member, &outsider] {
            store.insert_user(user).await.unwrap();
        }

        Self {
            admin: AdminService::new(store.clone()),
            profile: ProfileService::new(store.clone()),
            store,
            org1,
            org2,
            superadmin,
            admin_user,
            member,
            outsider,
        }
    }

    fn root(&self) -> Identity {
        Identity::from(&self.superadmin)
    }

    fn ada(&self) -> Identity {
        Identity::from(&self.admin_user)
    }

    fn mia(&self) -> Identity {
        Identity::from(&self.member)
    }

    async fn add_session(&self, token: &str, user: &UserRecord, ttl: Duration) {
        self.store
            .insert_session(&SessionRecord::new(token, user.id.clone(), Utc::now() + ttl))
            .await
            .unwrap();
    }
}

fn create_user(name: &str, email: &str) -> CreateUser {
    CreateUser {
        name: name.to_string(),
        email: email.to_string(),
        ..Default::default()
    }
}

// ============================================================================
// Authentication & baseline
// ============================================================================

#[tokio::test]
async fn test_anonymous_caller_is_unauthenticated() {
    let fx = Fixture::new().await;
    let err = fx.admin.list_users(None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthenticated);
    assert_eq!(err.http_status().as_u16(), 401);

    let err = fx.profile.current_profile(None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthenticated);
}

#[tokio::test]
async fn test_plain_user_is_forbidden() {
    let fx = Fixture::new().await;
    let err = fx
        .admin
        .ban_user(Some(&fx.mia()), &fx.outsider.id, BanUser { reason: "spam".into(), expires_in_days: None })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
    assert_eq!(err.http_status().as_u16(), 403);
}

#[tokio::test]
async fn test_plain_user_is_forbidden_before_lookup_or_validation() {
    let fx = Fixture::new().await;
    let mia = fx.mia();
    let missing = UserId::new("does-not-exist");

    let err = fx
        .admin
        .ban_user(Some(&mia), &missing, BanUser { reason: "spam".into(), expires_in_days: None })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let err = fx.admin.delete_user(Some(&mia), &missing).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let err = fx.admin.revoke_session(Some(&mia), "unknown-token").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let invalid = UpdateUser { email: Some("bad".into()), ..Default::default() };
    let err = fx
        .admin
        .update_user(Some(&mia), &fx.outsider.id, invalid)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let err = fx
        .admin
        .ban_user(Some(&mia), &fx.outsider.id, BanUser { reason: String::new(), expires_in_days: None })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[tokio::test]
async fn test_admin_is_forbidden_from_organization_lookups() {
    let fx = Fixture::new().await;
    let err = fx
        .admin
        .delete_organization(Some(&fx.ada()), &OrganizationId::new("missing-org"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    // Past the baseline, a missing target is reported as such.
    let err = fx
        .admin
        .ban_user(
            Some(&fx.ada()),
            &UserId::new("does-not-exist"),
            BanUser { reason: "spam".into(), expires_in_days: None },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RecordNotFound);
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn test_admin_created_user_lands_in_admin_organization() {
    let fx = Fixture::new().await;
    let user = fx
        .admin
        .create_user(Some(&fx.ada()), create_user("  New Person ", "New@Example.com"))
        .await
        .unwrap();

    assert_eq!(user.name, "New Person");
    assert_eq!(user.email, "new@example.com");
    assert_eq!(user.organization_id, Some(fx.org1.id.clone()));
    assert!(!user.email_verified);
    assert_eq!(user.roles, RoleSet::single(Role::User));

    let stored = fx.store.get_user(&user.id).await.unwrap().unwrap();
    assert_eq!(stored, user);
}

#[tokio::test]
async fn test_admin_cannot_create_user_in_other_organization() {
    let fx = Fixture::new().await;
    let mut request = create_user("Eve", "eve@example.com");
    request.organization_id = Some(fx.org2.id.clone());

    let err = fx.admin.create_user(Some(&fx.ada()), request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::CrossOrganizationAssignment);
    assert!(fx.store.find_user_by_email("eve@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_user_rejects_duplicate_email_case_insensitively() {
    let fx = Fixture::new().await;
    let err = fx
        .admin
        .create_user(Some(&fx.root()), create_user("Mia Again", "MIA@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateRecord);
    assert_eq!(err.http_status().as_u16(), 409);
}

#[tokio::test]
async fn test_create_user_validates_input() {
    let fx = Fixture::new().await;
    let err = fx
        .admin
        .create_user(Some(&fx.root()), create_user("Bad", "not-an-email"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidFormat);

    let mut request = create_user("Bad", "bad@example.com");
    request.role = Some("owner".into());
    let err = fx.admin.create_user(Some(&fx.root()), request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);
}

#[tokio::test]
async fn test_superadmin_assigning_unknown_organization_is_not_found() {
    let fx = Fixture::new().await;
    let mut request = create_user("Nomad", "nomad@example.com");
    request.organization_id = Some(OrganizationId::new("missing"));
    let err = fx.admin.create_user(Some(&fx.root()), request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::RecordNotFound);
}

#[tokio::test]
async fn test_update_user_moves_and_clears_organization() {
    let fx = Fixture::new().await;
    let moved = fx
        .admin
        .update_user(
            Some(&fx.root()),
            &fx.member.id,
            UpdateUser {
                organization: OrganizationAssignment::Assign(fx.org2.id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.organization_id, Some(fx.org2.id.clone()));

    let cleared = fx
        .admin
        .update_user(
            Some(&fx.root()),
            &fx.member.id,
            UpdateUser {
                name: Some("Mia B.".into()),
                organization: OrganizationAssignment::Clear,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.organization_id, None);
    assert_eq!(cleared.name, "Mia B.");
}

#[tokio::test]
async fn test_admin_update_keeps_target_in_admin_organization() {
    let fx = Fixture::new().await;
    let updated = fx
        .admin
        .update_user(
            Some(&fx.ada()),
            &fx.member.id,
            UpdateUser {
                email: Some("mia.new@example.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.email, "mia.new@example.com");
    assert_eq!(updated.organization_id, Some(fx.org1.id.clone()));

    let err = fx
        .admin
        .update_user(Some(&fx.ada()), &fx.outsider.id, UpdateUser::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CrossOrganizationAccess);
}

#[tokio::test]
async fn test_ban_sets_expiry_and_revokes_sessions() {
    let fx = Fixture::new().await;
    fx.add_session("mia-1", &fx.member, Duration::hours(1)).await;
    fx.add_session("mia-2", &fx.member, Duration::hours(2)).await;
    fx.add_session("otto-1", &fx.outsider, Duration::hours(1)).await;

    let banned = fx
        .admin
        .ban_user(
            Some(&fx.ada()),
            &fx.member.id,
            BanUser { reason: " spam ".into(), expires_in_days: Some(7) },
        )
        .await
        .unwrap();

    assert!(banned.banned);
    assert_eq!(banned.ban_reason.as_deref(), Some("spam"));
    let expires = banned.ban_expires.unwrap();
    assert!(expires > Utc::now() + Duration::days(6));
    assert!(expires <= Utc::now() + Duration::days(7));

    assert!(fx.store.get_session("mia-1").await.unwrap().is_none());
    assert!(fx.store.get_session("mia-2").await.unwrap().is_none());
    assert!(fx.store.get_session("otto-1").await.unwrap().is_some());

    let unbanned = fx.admin.unban_user(Some(&fx.ada()), &fx.member.id).await.unwrap();
    assert!(!unbanned.banned);
    assert!(unbanned.ban_reason.is_none());
    assert!(unbanned.ban_expires.is_none());
}

#[tokio::test]
async fn test_ban_rejects_out_of_range_duration() {
    let fx = Fixture::new().await;
    let err = fx
        .admin
        .ban_user(
            Some(&fx.root()),
            &fx.member.id,
            BanUser { reason: "spam".into(), expires_in_days: Some(0) },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);
}

#[tokio::test]
async fn test_role_changes_respect_escalation_rule() {
    let fx = Fixture::new().await;
    let err = fx
        .admin
        .set_role(Some(&fx.ada()), &fx.member.id, SetRole { role: "superadmin".into() })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PrivilegeEscalationBlocked);

    let promoted = fx
        .admin
        .set_role(Some(&fx.ada()), &fx.member.id, SetRole { role: "user,admin".into() })
        .await
        .unwrap();
    assert!(promoted.roles.contains(Role::Admin));

    let promoted = fx
        .admin
        .set_role(Some(&fx.root()), &fx.member.id, SetRole { role: "superadmin".into() })
        .await
        .unwrap();
    assert!(promoted.roles.is_superadmin());

    // Now a peer of root.
    let err = fx
        .admin
        .set_role(Some(&fx.root()), &fx.member.id, SetRole { role: "user".into() })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CannotModifyPeerSuperadmin);
}

#[tokio::test]
async fn test_delete_user_cascades_and_blocks_self_deletion() {
    let fx = Fixture::new().await;
    fx.add_session("mia-1", &fx.member, Duration::hours(1)).await;
    fx.profile.get_metrics(Some(&fx.mia())).await.unwrap();

    let err = fx.admin.delete_user(Some(&fx.root()), &fx.superadmin.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::SelfDeletionBlocked);

    fx.admin.delete_user(Some(&fx.ada()), &fx.member.id).await.unwrap();
    assert!(fx.store.get_user(&fx.member.id).await.unwrap().is_none());
    assert!(fx.store.get_session("mia-1").await.unwrap().is_none());
    assert!(fx.store.get_metrics(&fx.member.id).await.unwrap().is_none());

    let err = fx.admin.delete_user(Some(&fx.ada()), &fx.member.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::RecordNotFound);
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn test_revoke_session_requires_active_session() {
    let fx = Fixture::new().await;
    fx.add_session("live", &fx.member, Duration::hours(1)).await;
    fx.add_session("stale", &fx.member, -Duration::hours(1)).await;

    let err = fx.admin.revoke_session(Some(&fx.ada()), "stale").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::RecordNotFound);
    let err = fx.admin.revoke_session(Some(&fx.ada()), "unknown").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::RecordNotFound);

    fx.admin.revoke_session(Some(&fx.ada()), "live").await.unwrap();
    assert!(fx.store.get_session("live").await.unwrap().is_none());
}

#[tokio::test]
async fn test_revoke_all_user_sessions_returns_count() {
    let fx = Fixture::new().await;
    fx.add_session("a", &fx.member, Duration::hours(1)).await;
    fx.add_session("b", &fx.member, Duration::hours(1)).await;

    let revoked = fx
        .admin
        .revoke_all_user_sessions(Some(&fx.ada()), &fx.member.id)
        .await
        .unwrap();
    assert_eq!(revoked, 2);
    let revoked = fx
        .admin
        .revoke_all_user_sessions(Some(&fx.ada()), &fx.member.id)
        .await
        .unwrap();
    assert_eq!(revoked, 0);
}

#[tokio::test]
async fn test_list_sessions_is_scoped_and_active_only() {
    let fx = Fixture::new().await;
    fx.add_session("mia-live", &fx.member, Duration::hours(1)).await;
    fx.add_session("mia-stale", &fx.member, -Duration::minutes(5)).await;
    fx.add_session("otto-live", &fx.outsider, Duration::hours(1)).await;

    let tokens = |views: Vec<bastion_core::rbac::SessionView>| {
        let mut tokens: Vec<String> = views.into_iter().map(|v| v.session.token).collect();
        tokens.sort();
        tokens
    };

    let visible = fx.admin.list_sessions(Some(&fx.ada()), None).await.unwrap();
    assert_eq!(tokens(visible), vec!["mia-live".to_string()]);

    let all = fx.admin.list_sessions(Some(&fx.root()), None).await.unwrap();
    assert_eq!(tokens(all), vec!["mia-live".to_string(), "otto-live".to_string()]);

    let filtered = fx
        .admin
        .list_sessions(Some(&fx.root()), Some(&fx.outsider.id))
        .await
        .unwrap();
    assert_eq!(tokens(filtered), vec!["otto-live".to_string()]);
}

// ============================================================================
// Listings & statistics
// ============================================================================

#[tokio::test]
async fn test_list_users_is_scoped_by_organization() {
    let fx = Fixture::new().await;

    let all = fx.admin.list_users(Some(&fx.root())).await.unwrap();
    assert_eq!(all.len(), 4);

    let scoped = fx.admin.list_users(Some(&fx.ada())).await.unwrap();
    let mut ids: Vec<&str> = scoped.iter().map(|u| u.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["ada", "mia"]);

    let orphan_admin = Identity::new("lonely", RoleSet::single(Role::Admin));
    assert!(fx.admin.list_users(Some(&orphan_admin)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dashboard_stats_counts_visible_users() {
    let fx = Fixture::new().await;
    fx.admin
        .ban_user(
            Some(&fx.root()),
            &fx.outsider.id,
            BanUser { reason: "fraud".into(), expires_in_days: None },
        )
        .await
        .unwrap();

    let stats = fx.admin.dashboard_stats(Some(&fx.root())).await.unwrap();
    assert_eq!(stats.total_users, 4);
    assert_eq!(stats.banned_users, 1);
    assert_eq!(stats.active_users, 3);
    assert_eq!(stats.recent_users, 4);
    assert_eq!(stats.verified_users, 0);

    let scoped = fx.admin.dashboard_stats(Some(&fx.ada())).await.unwrap();
    assert_eq!(scoped.total_users, 2);
    assert_eq!(scoped.banned_users, 0);
}

// ============================================================================
// Organizations
// ============================================================================

#[tokio::test]
async fn test_create_organization_derives_slug() {
    let fx = Fixture::new().await;
    let org = fx
        .admin
        .create_organization(
            Some(&fx.root()),
            CreateOrganization { name: "Café  Crème Ltd".into(), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(org.slug, "cafe-creme-ltd");

    let err = fx
        .admin
        .create_organization(
            Some(&fx.root()),
            CreateOrganization { name: "Other".into(), slug: Some("org-one".into()), ..Default::default() },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateRecord);

    let err = fx
        .admin
        .create_organization(Some(&fx.ada()), CreateOrganization { name: "Mine".into(), ..Default::default() })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[tokio::test]
async fn test_update_organization_clears_blank_description() {
    let fx = Fixture::new().await;
    let updated = fx
        .admin
        .update_organization(
            Some(&fx.root()),
            &fx.org1.id,
            UpdateOrganization {
                name: Some("Org Uno".into()),
                description: Some("First".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Org Uno");
    assert_eq!(updated.slug, "org-one");
    assert_eq!(updated.description.as_deref(), Some("First"));

    let cleared = fx
        .admin
        .update_organization(
            Some(&fx.root()),
            &fx.org1.id,
            UpdateOrganization { description: Some("  ".into()), ..Default::default() },
        )
        .await
        .unwrap();
    assert!(cleared.description.is_none());

    let err = fx
        .admin
        .update_organization(
            Some(&fx.root()),
            &fx.org1.id,
            UpdateOrganization { slug: Some("org-two".into()), ..Default::default() },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateRecord);
}

#[tokio::test]
async fn test_delete_organization_requires_no_members() {
    let fx = Fixture::new().await;
    let err = fx
        .admin
        .delete_organization(Some(&fx.root()), &fx.org2.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::OrganizationHasMembers);
    assert_eq!(err.http_status().as_u16(), 409);
    assert_eq!(err.details().context.get("member_count"), Some(&serde_json::json!(1)));

    fx.admin
        .update_user(
            Some(&fx.root()),
            &fx.outsider.id,
            UpdateUser { organization: OrganizationAssignment::Clear, ..Default::default() },
        )
        .await
        .unwrap();
    fx.admin.delete_organization(Some(&fx.root()), &fx.org2.id).await.unwrap();
    assert!(fx.store.get_organization(&fx.org2.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_organizations_includes_member_counts() {
    let fx = Fixture::new().await;
    let summaries = fx.admin.list_organizations(Some(&fx.root())).await.unwrap();
    let count_for = |id: &OrganizationId| {
        summaries
            .iter()
            .find(|s| &s.organization.id == id)
            .map(|s| s.member_count)
    };
    assert_eq!(count_for(&fx.org1.id), Some(2));
    assert_eq!(count_for(&fx.org2.id), Some(1));
}

// ============================================================================
// Profile
// ============================================================================

#[tokio::test]
async fn test_profile_update_trims_and_clears_image() {
    let fx = Fixture::new().await;
    let updated = fx
        .profile
        .update_profile(
            Some(&fx.mia()),
            ProfileUpdate { name: Some(" Mia M ".into()), image: Some("https://img/x.png".into()) },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Mia M");
    assert_eq!(updated.image.as_deref(), Some("https://img/x.png"));

    let cleared = fx
        .profile
        .update_profile(Some(&fx.mia()), ProfileUpdate { name: None, image: Some("".into()) })
        .await
        .unwrap();
    assert!(cleared.image.is_none());
    assert_eq!(cleared.name, "Mia M");
}

#[tokio::test]
async fn test_metrics_are_created_zeroed_and_partially_updated() {
    let fx = Fixture::new().await;
    let metrics = fx.profile.get_metrics(Some(&fx.mia())).await.unwrap();
    assert_eq!(metrics.total_revenue, 0.0);

    let updated = fx
        .profile
        .update_metrics(
            Some(&fx.mia()),
            MetricsUpdate { total_revenue: Some(1250.5), growth_rate: Some(4.2), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(updated.total_revenue, 1250.5);
    assert_eq!(updated.growth_rate, 4.2);
    assert_eq!(updated.total_customers, 0.0);

    let err = fx
        .profile
        .update_metrics(
            Some(&fx.mia()),
            MetricsUpdate { revenue_change: Some(f64::NAN), ..Default::default() },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);

    let stored = fx.store.get_metrics(&fx.member.id).await.unwrap().unwrap();
    assert_eq!(stored.total_revenue, 1250.5);

    let unchanged = fx
        .profile
        .update_metrics(Some(&fx.mia()), MetricsUpdate::default())
        .await
        .unwrap();
    assert_eq!(unchanged, stored);
}
