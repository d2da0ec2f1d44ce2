//! Observability: Distributed Tracing, Metrics, and Logging.

use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Initialize the observability stack.
///
/// `RUST_LOG` wins over the configured log level when set.
pub fn init(service_name: &str, config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    // Set up OpenTelemetry tracing if endpoint is provided
    let telemetry_layer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(
                    opentelemetry_sdk::trace::config()
                        .with_resource(opentelemetry_sdk::Resource::new(vec![
                            opentelemetry::KeyValue::new("service.name", service_name.to_string()),
                        ])),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(telemetry_layer)
        .with(config.json_logging.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.json_logging).then(tracing_subscriber::fmt::layer))
        .try_init()?;

    metrics::register_metrics();

    Ok(())
}

/// Shutdown OpenTelemetry.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Metrics registry and helpers.
pub mod metrics {
    use metrics::{counter, describe_counter, describe_histogram, histogram};
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

    use crate::rbac::{Action, Decision};

    /// Register all metric descriptions.
    pub fn register_metrics() {
        describe_counter!(
            "bastion_authorization_decisions_total",
            "Authorization decisions by action, outcome and deny reason"
        );
        describe_counter!(
            "bastion_errors_total",
            "Errors raised, by code, category and severity"
        );
        describe_counter!(
            "bastion_sessions_revoked_total",
            "Sessions removed by admin actions"
        );
        describe_histogram!(
            "bastion_admin_operation_duration_seconds",
            "Admin operation latency in seconds, store round-trips included"
        );

        // Every action shows up in the scrape output before its first decision.
        for action in Action::all() {
            counter!(
                "bastion_authorization_decisions_total",
                "action" => action.as_str(),
                "outcome" => "allow",
                "reason" => "none",
            )
            .absolute(0);
        }
    }

    /// Install the Prometheus recorder and return the handle that renders
    /// the scrape output.
    pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        register_metrics();
        Ok(handle)
    }

    /// Count one authorization decision.
    pub fn record_authorization(action: Action, decision: &Decision) {
        let (outcome, reason) = match decision {
            Decision::Allow(_) => ("allow", "none"),
            Decision::Deny(reason) => ("deny", reason.code()),
        };
        counter!(
            "bastion_authorization_decisions_total",
            "action" => action.as_str(),
            "outcome" => outcome,
            "reason" => reason,
        )
        .increment(1);
    }

    /// Count sessions removed by a revoke or ban.
    pub fn record_sessions_revoked(count: u64) {
        counter!("bastion_sessions_revoked_total").increment(count);
    }

    /// Record how long an admin operation took.
    pub fn record_operation_duration(action: Action, duration_secs: f64) {
        histogram!(
            "bastion_admin_operation_duration_seconds",
            "action" => action.as_str(),
        )
        .record(duration_secs);
    }
}

/// Structured audit events for admin mutations.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event_type")]
pub enum AdminEvent {
    UserCreated {
        actor_id: String,
        user_id: String,
        roles: String,
        organization_id: Option<String>,
    },
    UserUpdated {
        actor_id: String,
        user_id: String,
    },
    UserBanned {
        actor_id: String,
        user_id: String,
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
        sessions_revoked: u64,
    },
    UserUnbanned {
        actor_id: String,
        user_id: String,
    },
    UserDeleted {
        actor_id: String,
        user_id: String,
    },
    RoleChanged {
        actor_id: String,
        user_id: String,
        roles: String,
    },
    SessionsRevoked {
        actor_id: String,
        user_id: String,
        count: u64,
    },
    OrganizationCreated {
        actor_id: String,
        organization_id: String,
        slug: String,
    },
    OrganizationUpdated {
        actor_id: String,
        organization_id: String,
    },
    OrganizationDeleted {
        actor_id: String,
        organization_id: String,
    },
}

impl AdminEvent {
    /// Log this event.
    pub fn log(&self) {
        match self {
            AdminEvent::UserCreated { actor_id, user_id, roles, organization_id } => {
                tracing::info!(
                    actor_id = %actor_id,
                    user_id = %user_id,
                    roles = %roles,
                    organization_id = ?organization_id,
                    "User created"
                );
            }
            AdminEvent::UserUpdated { actor_id, user_id } => {
                tracing::info!(actor_id = %actor_id, user_id = %user_id, "User updated");
            }
            AdminEvent::UserBanned { actor_id, user_id, expires_at, sessions_revoked } => {
                tracing::warn!(
                    actor_id = %actor_id,
                    user_id = %user_id,
                    expires_at = ?expires_at,
                    sessions_revoked = %sessions_revoked,
                    "User banned"
                );
            }
            AdminEvent::UserUnbanned { actor_id, user_id } => {
                tracing::info!(actor_id = %actor_id, user_id = %user_id, "User unbanned");
            }
            AdminEvent::UserDeleted { actor_id, user_id } => {
                tracing::warn!(actor_id = %actor_id, user_id = %user_id, "User deleted");
            }
            AdminEvent::RoleChanged { actor_id, user_id, roles } => {
                tracing::info!(
                    actor_id = %actor_id,
                    user_id = %user_id,
                    roles = %roles,
                    "User role changed"
                );
            }
            AdminEvent::SessionsRevoked { actor_id, user_id, count } => {
                tracing::info!(
                    actor_id = %actor_id,
                    user_id = %user_id,
                    count = %count,
                    "Sessions revoked"
                );
            }
            AdminEvent::OrganizationCreated { actor_id, organization_id, slug } => {
                tracing::info!(
                    actor_id = %actor_id,
                    organization_id = %organization_id,
                    slug = %slug,
                    "Organization created"
                );
            }
            AdminEvent::OrganizationUpdated { actor_id, organization_id } => {
                tracing::info!(
                    actor_id = %actor_id,
                    organization_id = %organization_id,
                    "Organization updated"
                );
            }
            AdminEvent::OrganizationDeleted { actor_id, organization_id } => {
                tracing::warn!(
                    actor_id = %actor_id,
                    organization_id = %organization_id,
                    "Organization deleted"
                );
            }
        }
    }
}
