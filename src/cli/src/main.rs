//! Bastion CLI - Command-line interface for administering a Bastion deployment.
//!
//! Provides user, organization, session, health, and configuration commands.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config, health, orgs, sessions, users};
use output::OutputFormat;

/// Bastion - admin console CLI
#[derive(Parser)]
#[command(
    name = "bastion",
    version,
    about = "Bastion - admin console CLI",
    long_about = "CLI tool for managing users, organizations and sessions of a Bastion server.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "BASTION_API_URL")]
    api_url: Option<String>,

    /// Session token sent as a bearer token
    #[arg(long, global = true, env = "BASTION_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User management operations
    #[command(subcommand)]
    Users(users::UserCommands),

    /// Organization management operations
    #[command(subcommand)]
    Orgs(orgs::OrgCommands),

    /// Session management operations
    #[command(subcommand)]
    Sessions(sessions::SessionCommands),

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(config::load_api_url)
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let token = cli.token.clone().or_else(config::load_token);

    let client = client::ApiClient::new(&api_url, token)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Users(cmd) => users::execute(cmd, &client, format).await,
        Commands::Orgs(cmd) => orgs::execute(cmd, &client, format).await,
        Commands::Sessions(cmd) => sessions::execute(cmd, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
