//! Session commands: list active sessions and revoke one.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum SessionCommands {
    /// List active sessions visible to you
    List {
        /// Only sessions of this user
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Revoke one active session by token
    Revoke {
        /// Session token
        token: String,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct SessionOwner {
    id: String,
    name: String,
    email: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct SessionInfo {
    token: String,
    user_id: String,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    user: SessionOwner,
}

#[derive(Debug, Tabled)]
struct SessionRow {
    #[tabled(rename = "Token")]
    token: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Expires")]
    expires: String,
}

/// First characters of a token, enough to tell sessions apart.
fn short_token(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    if prefix.len() < token.len() {
        format!("{}…", prefix)
    } else {
        prefix
    }
}

impl From<&SessionInfo> for SessionRow {
    fn from(session: &SessionInfo) -> Self {
        Self {
            token: short_token(&session.token),
            user: session.user.email.clone(),
            ip: output::or_dash(session.ip_address.as_deref()),
            created: output::format_time(&session.created_at),
            expires: output::format_time(&session.expires_at),
        }
    }
}

pub async fn execute(cmd: SessionCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        SessionCommands::List { user } => {
            let path = match &user {
                Some(user_id) => format!("/api/v1/admin/sessions?user_id={}", user_id),
                None => "/api/v1/admin/sessions".to_string(),
            };
            let sessions: Vec<SessionInfo> = client.get(&path).await?;
            let rows: Vec<SessionRow> = sessions.iter().map(SessionRow::from).collect();
            output::print_list(&rows, &sessions, format)?;
        }

        SessionCommands::Revoke { token } => {
            client
                .delete_empty(&format!("/api/v1/admin/sessions/{}", token))
                .await?;
            output::print_success(&format!("Session {} revoked", short_token(&token)));
        }
    }

    Ok(())
}
