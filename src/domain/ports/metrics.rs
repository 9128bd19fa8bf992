//! Campaign metrics port.
//!
//! The trigger engine polls this source for live performance snapshots.
//! Whatever aggregates analytics (a warehouse, an ad-platform API bridge)
//! implements it; the engine only reads named numeric values.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors from the metrics collaborator.
#[derive(Debug, Clone, Error)]
pub enum MetricsError {
    #[error("No metrics recorded for campaign {0}")]
    CampaignUnknown(Uuid),

    #[error("Metrics source unavailable: {0}")]
    Unavailable(String),
}

/// Point-in-time view of one campaign's performance metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub campaign_id: Uuid,
    /// Metric name -> current value (e.g. "ctr" -> 2.5)
    pub values: HashMap<String, f64>,
    pub captured_at: DateTime<Utc>,
}

impl MetricSnapshot {
    pub fn new(campaign_id: Uuid, captured_at: DateTime<Utc>) -> Self {
        Self {
            campaign_id,
            values: HashMap::new(),
            captured_at,
        }
    }

    pub fn with_value(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.values.insert(metric.into(), value);
        self
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }
}

/// Port for reading live campaign metrics.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Current metric snapshot for a campaign.
    async fn snapshot(&self, campaign_id: Uuid) -> Result<MetricSnapshot, MetricsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_lookup() {
        let snapshot = MetricSnapshot::new(Uuid::new_v4(), Utc::now())
            .with_value("ctr", 2.5)
            .with_value("cpa", 41.0);
        assert_eq!(snapshot.get("ctr"), Some(2.5));
        assert_eq!(snapshot.get("roas"), None);
    }
}
