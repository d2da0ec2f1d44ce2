//! User management commands.
//!
//! Provides list, create, update, ban, unban, delete, role and session
//! revocation operations, plus dashboard statistics.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum UserCommands {
    /// List users visible to you
    List,

    /// Create a user
    Create {
        /// Display name
        #[arg(long)]
        name: String,

        /// Email address
        #[arg(long)]
        email: String,

        /// Comma-separated roles (user, admin, superadmin)
        #[arg(long)]
        role: Option<String>,

        /// Organization ID (ignored for non-superadmins, who always create in their own)
        #[arg(long)]
        org: Option<String>,
    },

    /// Update a user
    Update {
        /// User ID
        user_id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        /// Comma-separated roles
        #[arg(long)]
        role: Option<String>,

        /// Move the user into this organization
        #[arg(long, conflicts_with = "clear_org")]
        org: Option<String>,

        /// Remove the user from their organization
        #[arg(long)]
        clear_org: bool,
    },

    /// Ban a user and revoke their sessions
    Ban {
        /// User ID
        user_id: String,

        /// Reason shown to administrators
        #[arg(short, long)]
        reason: String,

        /// Ban length in days; permanent when omitted
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Lift a ban
    Unban {
        /// User ID
        user_id: String,
    },

    /// Delete a user with their sessions and metrics
    Delete {
        /// User ID
        user_id: String,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Replace a user's roles
    SetRole {
        /// User ID
        user_id: String,

        /// Comma-separated roles
        role: String,
    },

    /// Revoke every session of a user
    RevokeSessions {
        /// User ID
        user_id: String,
    },

    /// Show dashboard statistics
    Stats,
}

// ── API response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
struct UserInfo {
    id: String,
    name: String,
    email: String,
    email_verified: bool,
    #[serde(default)]
    image: Option<String>,
    role: String,
    #[serde(default)]
    organization_id: Option<String>,
    banned: bool,
    #[serde(default)]
    ban_reason: Option<String>,
    #[serde(default)]
    ban_expires: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Tabled)]
struct UserRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Organization")]
    organization: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&UserInfo> for UserRow {
    fn from(user: &UserInfo) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            organization: output::or_dash(user.organization_id.as_deref()),
            status: status_label(user, Utc::now()),
            created: output::format_time(&user.created_at),
        }
    }
}

fn status_label(user: &UserInfo, now: DateTime<Utc>) -> String {
    match (user.banned, user.ban_expires) {
        (false, _) => "active".to_string(),
        (true, Some(expires)) if expires <= now => "active".to_string(),
        (true, Some(expires)) => format!("banned until {}", output::format_time(&expires)),
        (true, None) => "banned".to_string(),
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct DashboardStats {
    total_users: u64,
    verified_users: u64,
    banned_users: u64,
    active_users: u64,
    recent_users: u64,
}

#[derive(Debug, Deserialize, Serialize)]
struct RevokedSessions {
    revoked: u64,
}

fn print_user(user: &UserInfo, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            output::print_header(&format!("User: {}", user.name));
            output::print_detail("ID", &user.id);
            output::print_detail("Email", &user.email);
            output::print_detail("Verified", &user.email_verified.to_string());
            output::print_detail("Role", &user.role);
            output::print_detail("Organization", &output::or_dash(user.organization_id.as_deref()));
            output::print_detail("Status", &status_label(user, Utc::now()));
            if let Some(reason) = &user.ban_reason {
                output::print_detail("Ban Reason", reason);
            }
            output::print_detail("Updated", &output::format_time(&user.updated_at));
            Ok(())
        }
        _ => output::print_item(user, format),
    }
}

/// Body for `PATCH /users/:id`; absent fields are left out.
fn update_body(
    name: Option<String>,
    email: Option<String>,
    role: Option<String>,
    org: Option<String>,
    clear_org: bool,
) -> Value {
    let mut body = Map::new();
    if let Some(name) = name {
        body.insert("name".into(), json!(name));
    }
    if let Some(email) = email {
        body.insert("email".into(), json!(email));
    }
    if let Some(role) = role {
        body.insert("role".into(), json!(role));
    }
    if clear_org {
        body.insert("organization".into(), json!({ "op": "clear" }));
    } else if let Some(org) = org {
        body.insert("organization".into(), json!({ "op": "assign", "organization_id": org }));
    }
    Value::Object(body)
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: UserCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        UserCommands::List => {
            let users: Vec<UserInfo> = client.get("/api/v1/admin/users").await?;
            let rows: Vec<UserRow> = users.iter().map(UserRow::from).collect();
            output::print_list(&rows, &users, format)?;
        }

        UserCommands::Create { name, email, role, org } => {
            let body = json!({ "name": name, "email": email, "role": role, "organization_id": org });
            let user: UserInfo = client.post("/api/v1/admin/users", &body).await?;
            if format == OutputFormat::Table {
                output::print_success(&format!("Created user {}", user.id));
            }
            print_user(&user, format)?;
        }

        UserCommands::Update { user_id, name, email, role, org, clear_org } => {
            let body = update_body(name, email, role, org, clear_org);
            let user: UserInfo = client
                .send_json(Method::PATCH, &format!("/api/v1/admin/users/{}", user_id), &body)
                .await?;
            print_user(&user, format)?;
        }

        UserCommands::Ban { user_id, reason, days } => {
            let body = json!({ "reason": reason, "expires_in_days": days });
            let user: UserInfo = client
                .post(&format!("/api/v1/admin/users/{}/ban", user_id), &body)
                .await?;
            if format == OutputFormat::Table {
                output::print_success(&format!("User {} banned", user.id));
            }
            print_user(&user, format)?;
        }

        UserCommands::Unban { user_id } => {
            let user: UserInfo = client
                .post(&format!("/api/v1/admin/users/{}/unban", user_id), &json!({}))
                .await?;
            if format == OutputFormat::Table {
                output::print_success(&format!("User {} unbanned", user.id));
            }
            print_user(&user, format)?;
        }

        UserCommands::Delete { user_id, force } => {
            if !force {
                output::print_info("This will delete the user, their sessions and metrics. Use --force to confirm.");
                return Ok(());
            }
            client
                .delete_empty(&format!("/api/v1/admin/users/{}", user_id))
                .await?;
            output::print_success(&format!("User {} deleted", user_id));
        }

        UserCommands::SetRole { user_id, role } => {
            let user: UserInfo = client
                .send_json(
                    Method::PUT,
                    &format!("/api/v1/admin/users/{}/role", user_id),
                    &json!({ "role": role }),
                )
                .await?;
            print_user(&user, format)?;
        }

        UserCommands::RevokeSessions { user_id } => {
            let resp: RevokedSessions = client
                .delete(&format!("/api/v1/admin/users/{}/sessions", user_id))
                .await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Revoked {} session(s) of {}", resp.revoked, user_id))
                }
                _ => output::print_item(&resp, format)?,
            }
        }

        UserCommands::Stats => {
            let stats: DashboardStats = client.get("/api/v1/admin/stats").await?;
            match format {
                OutputFormat::Table => {
                    output::print_header("Dashboard");
                    output::print_detail("Total Users", &stats.total_users.to_string());
                    output::print_detail("Active", &stats.active_users.to_string());
                    output::print_detail("Banned", &stats.banned_users.to_string());
                    output::print_detail("Verified", &stats.verified_users.to_string());
                    output::print_detail("Joined (7 days)", &stats.recent_users.to_string());
                }
                _ => output::print_item(&stats, format)?,
            }
        }
    }

    Ok(())
}
