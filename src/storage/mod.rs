pub mod alerts;
pub mod integrations;
pub mod window;

pub use alerts::{AlertStore, InMemoryAlertStore, StoreError};
pub use integrations::{
    CachedIntegrationStore, InMemoryIntegrationStore, IntegrationCacheStats, IntegrationStore,
};
pub use window::{Window, WindowStats, WindowStore};
