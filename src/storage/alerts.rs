use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;

use crate::alerts::model::Alert;

/// Storage errors surfaced by collaborators
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Failed to load records: {0}")]
    Load(String),
}

/// Alert storage owned by the CRUD layer.
///
/// The engine only reads alerts and moves their trigger state through
/// [`AlertStore::cas_update_trigger_state`].
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Alerts with `dataset_id == dataset_id && active`
    async fn list_active_alerts(&self, dataset_id: &str) -> Result<Vec<Alert>, StoreError>;

    /// Set `last_triggered_at` and `active` only if the stored
    /// `last_triggered_at` still equals `expected_last_triggered_at` and the
    /// alert is still active. Returns whether the update was applied.
    async fn cas_update_trigger_state(
        &self,
        alert_id: &str,
        expected_last_triggered_at: Option<i64>,
        new_last_triggered_at: i64,
        new_active: bool,
    ) -> Result<bool, StoreError>;
}

/// Process-local alert store
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    alerts: DashMap<String, Alert>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from alert records
    pub fn with_alerts(alerts: impl IntoIterator<Item = Alert>) -> Self {
        let store = Self::new();
        for alert in alerts {
            store.upsert(alert);
        }
        store
    }

    /// Load alert records from a JSON array file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Load(format!("{}: {}", path.display(), e)))?;
        let alerts: Vec<Alert> = serde_json::from_str(&content)
            .map_err(|e| StoreError::Load(format!("{}: {}", path.display(), e)))?;
        Ok(Self::with_alerts(alerts))
    }

    /// Insert or replace an alert
    pub fn upsert(&self, alert: Alert) -> Option<Alert> {
        self.alerts.insert(alert.id.clone(), alert)
    }

    pub fn get(&self, id: &str) -> Option<Alert> {
        self.alerts.get(id).map(|a| a.clone())
    }

    pub fn remove(&self, id: &str) -> Option<Alert> {
        self.alerts.remove(id).map(|(_, a)| a)
    }

    /// Re-enable or disable an alert, as the CRUD layer would
    pub fn set_active(&self, id: &str, active: bool) -> bool {
        if let Some(mut alert) = self.alerts.get_mut(id) {
            alert.active = active;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn list_active_alerts(&self, dataset_id: &str) -> Result<Vec<Alert>, StoreError> {
        Ok(self
            .alerts
            .iter()
            .filter(|a| a.active && a.dataset_id == dataset_id)
            .map(|a| a.value().clone())
            .collect())
    }

    async fn cas_update_trigger_state(
        &self,
        alert_id: &str,
        expected_last_triggered_at: Option<i64>,
        new_last_triggered_at: i64,
        new_active: bool,
    ) -> Result<bool, StoreError> {
        // get_mut holds the shard write lock for the whole compare-and-set
        let mut alert = self
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| StoreError::NotFound(alert_id.to_string()))?;

        if !alert.active || alert.last_triggered_at != expected_last_triggered_at {
            return Ok(false);
        }

        alert.last_triggered_at = Some(new_last_triggered_at);
        alert.active = new_active;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::model::AlertType;
    use std::io::Write;

    fn alert(id: &str, dataset: &str) -> Alert {
        Alert::new(id, "chart", dataset, AlertType::ThresholdAbove).with_value(1)
    }

    #[tokio::test]
    async fn test_list_active_filters() {
        let store = InMemoryAlertStore::with_alerts(vec![
            alert("a1", "ds1"),
            alert("a2", "ds1"),
            alert("a3", "ds2"),
        ]);
        store.set_active("a2", false);

        let alerts = store.list_active_alerts("ds1").await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "a1");
    }

    #[tokio::test]
    async fn test_cas_semantics() {
        let store = InMemoryAlertStore::with_alerts(vec![alert("a1", "ds1")]);

        assert!(store.cas_update_trigger_state("a1", None, 1000, true).await.unwrap());
        // Stale expectation loses
        assert!(!store.cas_update_trigger_state("a1", None, 2000, true).await.unwrap());
        assert!(store
            .cas_update_trigger_state("a1", Some(1000), 2000, false)
            .await
            .unwrap());

        let stored = store.get("a1").unwrap();
        assert_eq!(stored.last_triggered_at, Some(2000));
        assert!(!stored.active);

        // Disabled alerts never accept an update
        assert!(!store
            .cas_update_trigger_state("a1", Some(2000), 3000, true)
            .await
            .unwrap());

        assert!(matches!(
            store.cas_update_trigger_state("missing", None, 1, true).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "a1", "chart_id": "c1", "dataset_id": "d1", "type": "anomaly"}}]"#
        )
        .unwrap();

        let store = InMemoryAlertStore::from_json_file(file.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("a1").unwrap().active);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "not json").unwrap();
        assert!(matches!(
            InMemoryAlertStore::from_json_file(bad.path()),
            Err(StoreError::Load(_))
        ));
    }
}
