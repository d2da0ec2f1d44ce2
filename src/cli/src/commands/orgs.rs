//! Organization management commands (superadmin only).

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
pub enum OrgCommands {
    /// List organizations with member counts
    List,

    /// Create an organization
    Create {
        /// Display name
        #[arg(long)]
        name: String,

        /// URL slug; derived from the name when omitted
        #[arg(long)]
        slug: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Logo URL
        #[arg(long)]
        logo: Option<String>,
    },

    /// Update an organization; pass an empty string to clear description or logo
    Update {
        /// Organization ID
        org_id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        slug: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        logo: Option<String>,
    },

    /// Delete an organization that has no members
    Delete {
        /// Organization ID
        org_id: String,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct OrganizationInfo {
    id: String,
    name: String,
    slug: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    member_count: Option<u64>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Tabled)]
struct OrganizationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Slug")]
    slug: String,
    #[tabled(rename = "Members")]
    members: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&OrganizationInfo> for OrganizationRow {
    fn from(org: &OrganizationInfo) -> Self {
        Self {
            id: org.id.clone(),
            name: org.name.clone(),
            slug: org.slug.clone(),
            members: org
                .member_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".into()),
            created: output::format_time(&org.created_at),
        }
    }
}

fn print_organization(org: &OrganizationInfo, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            output::print_header(&format!("Organization: {}", org.name));
            output::print_detail("ID", &org.id);
            output::print_detail("Slug", &org.slug);
            output::print_detail("Description", &output::or_dash(org.description.as_deref()));
            output::print_detail("Logo", &output::or_dash(org.logo.as_deref()));
            Ok(())
        }
        _ => output::print_item(org, format),
    }
}

fn update_body(
    name: Option<String>,
    slug: Option<String>,
    description: Option<String>,
    logo: Option<String>,
) -> Value {
    let fields = [("name", name), ("slug", slug), ("description", description), ("logo", logo)];
    let body: Map<String, Value> = fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), json!(v))))
        .collect();
    Value::Object(body)
}

pub async fn execute(cmd: OrgCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        OrgCommands::List => {
            let orgs: Vec<OrganizationInfo> = client.get("/api/v1/admin/organizations").await?;
            let rows: Vec<OrganizationRow> = orgs.iter().map(OrganizationRow::from).collect();
            output::print_list(&rows, &orgs, format)?;
        }

        OrgCommands::Create { name, slug, description, logo } => {
            let body = json!({ "name": name, "slug": slug, "description": description, "logo": logo });
            let org: OrganizationInfo = client.post("/api/v1/admin/organizations", &body).await?;
            if format == OutputFormat::Table {
                output::print_success(&format!("Created organization {} ({})", org.slug, org.id));
            }
            print_organization(&org, format)?;
        }

        OrgCommands::Update { org_id, name, slug, description, logo } => {
            let body = update_body(name, slug, description, logo);
            let org: OrganizationInfo = client
                .send_json(Method::PATCH, &format!("/api/v1/admin/organizations/{}", org_id), &body)
                .await?;
            print_organization(&org, format)?;
        }

        OrgCommands::Delete { org_id, force } => {
            if !force {
                output::print_info("This will delete the organization. Use --force to confirm.");
                return Ok(());
            }
            client
                .delete_empty(&format!("/api/v1/admin/organizations/{}", org_id))
                .await?;
            output::print_success(&format!("Organization {} deleted", org_id));
        }
    }

    Ok(())
}
