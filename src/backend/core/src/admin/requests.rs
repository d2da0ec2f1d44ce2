//! Request payloads for admin operations, with input validation.
//!
//! Validation here covers shape only (lengths, formats, role tags). Whether
//! the caller may perform the action is decided by the authorization gate.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::slug::is_valid_slug;
use crate::error::{BastionError, ErrorCode, Result};
use crate::rbac::{OrganizationAssignment, OrganizationId, RoleSet};

/// Email validation regex (RFC 5322 simplified).
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("Invalid email regex")
});

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_BAN_REASON_LEN: usize = 500;
pub const MAX_BAN_DAYS: u32 = 3650;

// ═══════════════════════════════════════════════════════════════════════════════
// Field Checks
// ═══════════════════════════════════════════════════════════════════════════════

fn invalid(field: &'static str, message: impl Into<String>) -> BastionError {
    BastionError::new(ErrorCode::InvalidInput, message.into()).with_context("field", field)
}

/// Trim a display name and check its length.
pub(crate) fn clean_name(field: &'static str, name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(
            BastionError::new(ErrorCode::MissingRequiredField, format!("{} is required", field))
                .with_context("field", field),
        );
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(invalid(
            field,
            format!("{} must be at most {} characters", field, MAX_NAME_LEN),
        ));
    }
    Ok(name.to_string())
}

/// Trim and lowercase an email address and check its shape.
pub(crate) fn clean_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if !EMAIL_REGEX.is_match(&email) {
        return Err(
            BastionError::new(ErrorCode::InvalidFormat, "Invalid email address")
                .with_context("field", "email"),
        );
    }
    Ok(email)
}

/// Blank optional text becomes `None`.
pub(crate) fn clean_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_roles(role: Option<&str>) -> Result<Option<RoleSet>> {
    role.map(|raw| {
        raw.parse::<RoleSet>()
            .map_err(|e| invalid("role", e.to_string()))
    })
    .transpose()
}

fn check_slug(slug: &str) -> Result<()> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(BastionError::new(
            ErrorCode::InvalidFormat,
            "Slug must contain only lowercase letters, digits and single hyphens",
        )
        .with_context("field", "slug")
        .with_context("value", slug))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════════════════════

/// Create a user. Passwords are handled by the authentication provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    /// Comma-joined role tags; defaults to `user`.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
}

/// Validated form of [`CreateUser`].
#[derive(Debug, Clone)]
pub(crate) struct ValidCreateUser {
    pub name: String,
    pub email: String,
    pub roles: Option<RoleSet>,
    pub organization: OrganizationAssignment,
}

impl CreateUser {
    pub(crate) fn validate(&self) -> Result<ValidCreateUser> {
        Ok(ValidCreateUser {
            name: clean_name("name", &self.name)?,
            email: clean_email(&self.email)?,
            roles: parse_roles(self.role.as_deref())?,
            organization: match &self.organization_id {
                Some(id) => OrganizationAssignment::Assign(id.clone()),
                None => OrganizationAssignment::Unspecified,
            },
        })
    }
}

/// Update a user. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub organization: OrganizationAssignment,
}

#[derive(Debug, Clone)]
pub(crate) struct ValidUpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Option<RoleSet>,
    pub organization: OrganizationAssignment,
}

impl UpdateUser {
    pub(crate) fn validate(&self) -> Result<ValidUpdateUser> {
        Ok(ValidUpdateUser {
            name: self.name.as_deref().map(|n| clean_name("name", n)).transpose()?,
            email: self.email.as_deref().map(clean_email).transpose()?,
            roles: parse_roles(self.role.as_deref())?,
            organization: self.organization.clone(),
        })
    }
}

/// Ban a user, permanently or for a number of days.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BanUser {
    pub reason: String,
    #[serde(default)]
    pub expires_in_days: Option<u32>,
}

impl BanUser {
    pub(crate) fn validate(&self) -> Result<(String, Option<chrono::Duration>)> {
        let reason = self.reason.trim();
        if reason.is_empty() {
            return Err(
                BastionError::new(ErrorCode::MissingRequiredField, "A ban reason is required")
                    .with_context("field", "reason"),
            );
        }
        if reason.chars().count() > MAX_BAN_REASON_LEN {
            return Err(invalid(
                "reason",
                format!("Ban reason must be at most {} characters", MAX_BAN_REASON_LEN),
            ));
        }
        let duration = match self.expires_in_days {
            None => None,
            Some(days) if (1..=MAX_BAN_DAYS).contains(&days) => {
                Some(chrono::Duration::days(i64::from(days)))
            }
            Some(_) => {
                return Err(invalid(
                    "expires_in_days",
                    format!("Ban duration must be between 1 and {} days", MAX_BAN_DAYS),
                ))
            }
        };
        Ok((reason.to_string(), duration))
    }
}

/// Replace a user's role set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetRole {
    pub role: String,
}

impl SetRole {
    pub(crate) fn validate(&self) -> Result<RoleSet> {
        if self.role.trim().is_empty() {
            return Err(
                BastionError::new(ErrorCode::MissingRequiredField, "role is required")
                    .with_context("field", "role"),
            );
        }
        self.role
            .parse::<RoleSet>()
            .map_err(|e| invalid("role", e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Organizations
// ═══════════════════════════════════════════════════════════════════════════════

/// Create an organization. The slug is derived from the name when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ValidCreateOrganization {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo: Option<String>,
}

impl CreateOrganization {
    pub(crate) fn validate(&self) -> Result<ValidCreateOrganization> {
        let name = clean_name("name", &self.name)?;
        let slug = match clean_optional(self.slug.as_deref()) {
            Some(slug) => slug,
            None => super::slug::slugify(&name),
        };
        check_slug(&slug)?;
        Ok(ValidCreateOrganization {
            name,
            slug,
            description: clean_optional(self.description.as_deref()),
            logo: clean_optional(self.logo.as_deref()),
        })
    }
}

/// Update an organization. Absent fields are left unchanged; a blank
/// description or logo clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrganization {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ValidUpdateOrganization {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<Option<String>>,
    pub logo: Option<Option<String>>,
}

impl UpdateOrganization {
    pub(crate) fn validate(&self) -> Result<ValidUpdateOrganization> {
        let slug = clean_optional(self.slug.as_deref());
        if let Some(slug) = &slug {
            check_slug(slug)?;
        }
        Ok(ValidUpdateOrganization {
            name: self.name.as_deref().map(|n| clean_name("name", n)).transpose()?,
            slug,
            description: self.description.as_deref().map(|d| clean_optional(Some(d))),
            logo: self.logo.as_deref().map(|l| clean_optional(Some(l))),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Role;

    #[test]
    fn test_create_user_normalizes_input() {
        let valid = CreateUser {
            name: "  Ana Souza ".into(),
            email: " Ana@Example.COM ".into(),
            role: Some("admin".into()),
            organization_id: None,
        }
        .validate()
        .unwrap();

        assert_eq!(valid.name, "Ana Souza");
        assert_eq!(valid.email, "ana@example.com");
        assert_eq!(valid.roles, Some(RoleSet::single(Role::Admin)));
        assert_eq!(valid.organization, OrganizationAssignment::Unspecified);
    }

    #[test]
    fn test_create_user_rejects_bad_input() {
        let missing_name = CreateUser {
            name: "   ".into(),
            email: "a@example.com".into(),
            ..Default::default()
        };
        assert_eq!(
            missing_name.validate().unwrap_err().code(),
            ErrorCode::MissingRequiredField
        );

        let bad_email = CreateUser {
            name: "Ana".into(),
            email: "not-an-email".into(),
            ..Default::default()
        };
        assert_eq!(bad_email.validate().unwrap_err().code(), ErrorCode::InvalidFormat);

        let bad_role = CreateUser {
            name: "Ana".into(),
            email: "a@example.com".into(),
            role: Some("owner".into()),
            ..Default::default()
        };
        assert_eq!(bad_role.validate().unwrap_err().code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn test_update_user_organization_payloads() {
        let update: UpdateUser = serde_json::from_str(r#"{"name": "Bea"}"#).unwrap();
        assert_eq!(update.organization, OrganizationAssignment::Unspecified);

        let update: UpdateUser =
            serde_json::from_str(r#"{"organization": {"op": "clear"}}"#).unwrap();
        assert_eq!(update.organization, OrganizationAssignment::Clear);

        let update: UpdateUser = serde_json::from_str(
            r#"{"organization": {"op": "assign", "organization_id": "org-1"}}"#,
        )
        .unwrap();
        assert_eq!(
            update.organization,
            OrganizationAssignment::Assign(OrganizationId::new("org-1"))
        );
    }

    #[test]
    fn test_ban_duration_bounds() {
        let ban = BanUser {
            reason: "spam".into(),
            expires_in_days: Some(7),
        };
        let (reason, duration) = ban.validate().unwrap();
        assert_eq!(reason, "spam");
        assert_eq!(duration, Some(chrono::Duration::days(7)));

        let zero = BanUser {
            reason: "spam".into(),
            expires_in_days: Some(0),
        };
        assert!(zero.validate().is_err());

        let blank = BanUser::default();
        assert_eq!(blank.validate().unwrap_err().code(), ErrorCode::MissingRequiredField);
    }

    #[test]
    fn test_create_organization_derives_slug() {
        let valid = CreateOrganization {
            name: "Ação Social".into(),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(valid.slug, "acao-social");

        let explicit = CreateOrganization {
            name: "Acme".into(),
            slug: Some("Not A Slug".into()),
            ..Default::default()
        };
        assert_eq!(explicit.validate().unwrap_err().code(), ErrorCode::InvalidFormat);
    }

    #[test]
    fn test_update_organization_blank_description_clears() {
        let valid = UpdateOrganization {
            description: Some("  ".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(valid.description, Some(None));
        assert!(valid.logo.is_none());
    }
}
