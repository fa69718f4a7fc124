//! Integration lookup
//!
//! Integrations (webhook URLs, Slack bindings) are owned by the CRUD layer;
//! the dispatcher resolves them by ID on every fire. [`CachedIntegrationStore`]
//! puts a short TTL cache in front of any store so bursts of fires for the
//! same binding do not hammer the backing storage.

use async_trait::async_trait;
use dashmap::DashMap;
use moka::sync::Cache;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::alerts::StoreError;
use crate::alerts::model::Integration;

#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn get_integration(&self, integration_id: &str)
        -> Result<Option<Integration>, StoreError>;
}

/// Process-local integration store
#[derive(Debug, Default)]
pub struct InMemoryIntegrationStore {
    integrations: DashMap<String, Integration>,
}

impl InMemoryIntegrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_integrations(integrations: impl IntoIterator<Item = Integration>) -> Self {
        let store = Self::new();
        for integration in integrations {
            store.upsert(integration);
        }
        store
    }

    /// Load integration records from a JSON array file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Load(format!("{}: {}", path.display(), e)))?;
        let integrations: Vec<Integration> = serde_json::from_str(&content)
            .map_err(|e| StoreError::Load(format!("{}: {}", path.display(), e)))?;
        Ok(Self::with_integrations(integrations))
    }

    pub fn upsert(&self, integration: Integration) -> Option<Integration> {
        self.integrations
            .insert(integration.id.clone(), integration)
    }

    pub fn remove(&self, id: &str) -> Option<Integration> {
        self.integrations.remove(id).map(|(_, i)| i)
    }

    pub fn len(&self) -> usize {
        self.integrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.integrations.is_empty()
    }
}

#[async_trait]
impl IntegrationStore for InMemoryIntegrationStore {
    async fn get_integration(
        &self,
        integration_id: &str,
    ) -> Result<Option<Integration>, StoreError> {
        Ok(self.integrations.get(integration_id).map(|i| i.clone()))
    }
}

/// TTL cache in front of another integration store.
///
/// Only found integrations are cached; misses and errors always go to the
/// inner store.
pub struct CachedIntegrationStore {
    inner: Arc<dyn IntegrationStore>,
    cache: Cache<String, Integration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedIntegrationStore {
    pub fn new(inner: Arc<dyn IntegrationStore>, ttl: Duration) -> Self {
        Self::with_config(inner, 1000, ttl)
    }

    pub fn with_config(inner: Arc<dyn IntegrationStore>, max_entries: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Drop a cached binding after it was edited
    pub fn invalidate(&self, integration_id: &str) {
        self.cache.invalidate(integration_id);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn stats(&self) -> IntegrationCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        IntegrationCacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.cache.entry_count(),
        }
    }
}

#[async_trait]
impl IntegrationStore for CachedIntegrationStore {
    async fn get_integration(
        &self,
        integration_id: &str,
    ) -> Result<Option<Integration>, StoreError> {
        if let Some(integration) = self.cache.get(integration_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(integration));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let found = self.inner.get_integration(integration_id).await?;
        if let Some(integration) = &found {
            self.cache
                .insert(integration_id.to_string(), integration.clone());
        }
        Ok(found)
    }
}

/// Integration cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct IntegrationCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entry_count: u64,
}
