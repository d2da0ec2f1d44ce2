//! Self-service profile and dashboard metrics.
//!
//! Any authenticated user may read and edit their own profile and metrics.
//! No admin role is involved, so these operations bypass the authorization
//! gate and only require a caller.

pub mod models;

pub use models::{MetricsUpdate, ProfileUpdate, UserMetrics};

use std::sync::Arc;

use crate::admin::requests::{clean_name, clean_optional};
use crate::error::{BastionError, ErrorCode, Result};
use crate::rbac::{Identity, UserRecord};
use crate::store::AdminStore;

/// Profile and metrics operations for the calling user.
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn AdminStore>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn AdminStore>) -> Self {
        Self { store }
    }

    fn require_caller(caller: Option<&Identity>) -> Result<&Identity> {
        caller.ok_or_else(BastionError::unauthenticated)
    }

    async fn load_self(&self, caller: &Identity) -> Result<UserRecord> {
        self.store
            .get_user(&caller.id)
            .await?
            .ok_or_else(|| BastionError::not_found("User", caller.id.as_str()))
    }

    /// The caller's own user record.
    pub async fn current_profile(&self, caller: Option<&Identity>) -> Result<UserRecord> {
        let caller = Self::require_caller(caller)?;
        self.load_self(caller).await
    }

    /// Change the caller's name or avatar. A blank image removes it.
    pub async fn update_profile(
        &self,
        caller: Option<&Identity>,
        update: ProfileUpdate,
    ) -> Result<UserRecord> {
        let caller = Self::require_caller(caller)?;
        let name = update
            .name
            .as_deref()
            .map(|n| clean_name("name", n))
            .transpose()?;

        let mut user = self.load_self(caller).await?;
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(image) = update.image.as_deref() {
            user.image = clean_optional(Some(image));
        }
        user.touch();
        self.store.update_user(&user).await?;

        tracing::info!(user_id = %user.id, "Profile updated");
        Ok(user)
    }

    /// The caller's metrics, created zeroed on first access.
    pub async fn get_metrics(&self, caller: Option<&Identity>) -> Result<UserMetrics> {
        let caller = Self::require_caller(caller)?;
        if let Some(metrics) = self.store.get_metrics(&caller.id).await? {
            return Ok(metrics);
        }

        let metrics = UserMetrics::zeroed(caller.id.clone());
        self.store.upsert_metrics(&metrics).await?;
        tracing::debug!(user_id = %caller.id, "Created default metrics");
        Ok(metrics)
    }

    /// Partially update the caller's metrics; absent fields keep their value
    /// (zero when the metrics did not exist yet). An empty update writes nothing.
    pub async fn update_metrics(
        &self,
        caller: Option<&Identity>,
        update: MetricsUpdate,
    ) -> Result<UserMetrics> {
        let caller = Self::require_caller(caller)?;
        if let Some(field) = first_non_finite(&update) {
            return Err(BastionError::new(
                ErrorCode::InvalidInput,
                format!("{} must be a finite number", field),
            )
            .with_context("field", field));
        }
        if update.is_empty() {
            return self.get_metrics(Some(caller)).await;
        }

        let mut metrics = match self.store.get_metrics(&caller.id).await? {
            Some(metrics) => metrics,
            None => UserMetrics::zeroed(caller.id.clone()),
        };
        metrics.apply(&update);
        self.store.upsert_metrics(&metrics).await?;
        Ok(metrics)
    }
}

fn first_non_finite(update: &MetricsUpdate) -> Option<&'static str> {
    [
        ("totalRevenue", update.total_revenue),
        ("revenueChange", update.revenue_change),
        ("totalCustomers", update.total_customers),
        ("customersChange", update.customers_change),
        ("activeAccounts", update.active_accounts),
        ("accountsChange", update.accounts_change),
        ("growthRate", update.growth_rate),
        ("growthChange", update.growth_change),
    ]
    .into_iter()
    .find(|(_, value)| value.is_some_and(|v| !v.is_finite()))
    .map(|(field, _)| field)
}
