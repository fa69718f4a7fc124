//! Tripwire: Alert Rule Evaluation & Notification Dispatch Engine
//!
//! Given a fresh data sample for a dataset, Tripwire decides whether any
//! alert attached to that dataset fires, enforces per-alert cooldown and
//! one-time semantics under concurrent evaluation, and fans notifications
//! out to email, Slack and webhook channels with independent retries.
//!
//! # Features
//!
//! - **Rule Evaluation**: new value, milestone, threshold (above, below,
//!   between, outside) and anomaly rules
//! - **Sample Windows**: bounded per-dataset history with snapshot reads
//! - **Cooldown Gating**: compare-and-swap on alert storage, safe across
//!   concurrent workers
//! - **Notification Dispatch**: one task per delivery, exponential backoff,
//!   per-attempt timeouts
//! - **Sidecar Server**: HTTP entry point for out-of-process schedulers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tripwire::alerts::{Alert, AlertType, Medium};
//! use tripwire::clock::SystemClock;
//! use tripwire::config::EngineConfig;
//! use tripwire::data::Sample;
//! use tripwire::notify::{LogEmailTransport, ReqwestHttpTransport};
//! use tripwire::storage::{InMemoryAlertStore, InMemoryIntegrationStore};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let alerts = InMemoryAlertStore::with_alerts(vec![
//!     Alert::new("a1", "chart-1", "revenue", AlertType::ThresholdAbove)
//!         .with_value(100)
//!         .with_timeout(60)
//!         .with_medium(Medium::Email, true)
//!         .with_recipient("ops@example.com"),
//! ]);
//!
//! let engine = EngineConfig::default().build_engine(
//!     Arc::new(alerts),
//!     Arc::new(InMemoryIntegrationStore::new()),
//!     Arc::new(ReqwestHttpTransport::new()),
//!     Arc::new(LogEmailTransport),
//!     Arc::new(SystemClock),
//! );
//!
//! let report = engine.evaluate("revenue", Sample::new(1_700_000_000_000, 105)).await?;
//! println!("Fired: {:?}", report.fired());
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod clock;
pub mod config;
pub mod data;
pub mod notify;
pub mod storage;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use alerts::{AlertEngine, EngineError, EvaluationReport};
pub use config::{ConfigError, EngineConfig};
pub use data::{Sample, Value};
