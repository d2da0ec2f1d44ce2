//! Self-service profile and dashboard metric models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rbac::UserId;

/// Per-user dashboard figures, owned exclusively by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetrics {
    pub user_id: UserId,
    pub total_revenue: f64,
    pub revenue_change: f64,
    pub total_customers: f64,
    pub customers_change: f64,
    pub active_accounts: f64,
    pub accounts_change: f64,
    pub growth_rate: f64,
    pub growth_change: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserMetrics {
    /// Zeroed metrics for a user seen for the first time.
    pub fn zeroed(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            total_revenue: 0.0,
            revenue_change: 0.0,
            total_customers: 0.0,
            customers_change: 0.0,
            active_accounts: 0.0,
            accounts_change: 0.0,
            growth_rate: 0.0,
            growth_change: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite every field present in `update`; absent fields keep their value.
    pub fn apply(&mut self, update: &MetricsUpdate) {
        let fields = [
            (&mut self.total_revenue, update.total_revenue),
            (&mut self.revenue_change, update.revenue_change),
            (&mut self.total_customers, update.total_customers),
            (&mut self.customers_change, update.customers_change),
            (&mut self.active_accounts, update.active_accounts),
            (&mut self.accounts_change, update.accounts_change),
            (&mut self.growth_rate, update.growth_rate),
            (&mut self.growth_change, update.growth_change),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Partial metrics update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsUpdate {
    pub total_revenue: Option<f64>,
    pub revenue_change: Option<f64>,
    pub total_customers: Option<f64>,
    pub customers_change: Option<f64>,
    pub active_accounts: Option<f64>,
    pub accounts_change: Option<f64>,
    pub growth_rate: Option<f64>,
    pub growth_change: Option<f64>,
}

impl MetricsUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Profile fields a user may change about themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_update_keeps_absent_fields() {
        let mut metrics = UserMetrics::zeroed(UserId::new("u1"));
        metrics.total_revenue = 120.5;
        metrics.growth_rate = 3.0;

        metrics.apply(&MetricsUpdate {
            growth_rate: Some(4.5),
            active_accounts: Some(12.0),
            ..Default::default()
        });

        assert_eq!(metrics.total_revenue, 120.5);
        assert_eq!(metrics.growth_rate, 4.5);
        assert_eq!(metrics.active_accounts, 12.0);
        assert_eq!(metrics.revenue_change, 0.0);
    }

    #[test]
    fn test_metrics_update_accepts_camel_case() {
        let update: MetricsUpdate =
            serde_json::from_str(r#"{"totalRevenue": 10, "growthChange": -1.5}"#).unwrap();
        assert_eq!(update.total_revenue, Some(10.0));
        assert_eq!(update.growth_change, Some(-1.5));
        assert!(update.revenue_change.is_none());
        assert!(MetricsUpdate::default().is_empty());
    }
}
