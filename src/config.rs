//! Engine configuration
//!
//! Environment variables (all optional):
//! - TRIPWIRE_WINDOW_CAPACITY: samples kept per dataset (default: 50)
//! - TRIPWIRE_ANOMALY_MIN_SAMPLES: history required by anomaly rules (default: 10)
//! - TRIPWIRE_ANOMALY_SIGMA: anomaly deviation multiplier (default: 3.0)
//! - TRIPWIRE_RETRY_MAX: retries per delivery after the first attempt (default: 3)
//! - TRIPWIRE_RETRY_BASE_MS: first retry delay, doubled per retry (default: 1000)
//! - TRIPWIRE_DELIVERY_TIMEOUT_SECS: bound on each delivery attempt (default: 5)
//! - TRIPWIRE_INTEGRATION_CACHE_TTL_SECS: integration lookup cache TTL (default: 60)
//! - TRIPWIRE_APP_URL: base URL for chart links (default: http://localhost:3000)

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::alerts::{AlertEngine, EvaluatorConfig};
use crate::clock::Clock;
use crate::notify::{Dispatcher, DispatcherConfig, EmailTransport, HttpTransport, RetryPolicy};
use crate::storage::{AlertStore, IntegrationStore, WindowStore};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error(
        "TRIPWIRE_WINDOW_CAPACITY ({capacity}) must exceed TRIPWIRE_ANOMALY_MIN_SAMPLES ({min_samples})"
    )]
    WindowTooSmall { capacity: usize, min_samples: usize },
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub window_capacity: usize,
    pub evaluator: EvaluatorConfig,
    pub retry: RetryPolicy,
    pub delivery_timeout: Duration,
    pub integration_cache_ttl: Duration,
    pub app_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_capacity: 50,
            evaluator: EvaluatorConfig::default(),
            retry: RetryPolicy::default(),
            delivery_timeout: Duration::from_secs(5),
            integration_cache_ttl: Duration::from_secs(60),
            app_url: "http://localhost:3000".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `TRIPWIRE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(capacity) = parse(&lookup, "TRIPWIRE_WINDOW_CAPACITY")? {
            config.window_capacity = capacity;
        }
        if let Some(min_samples) = parse(&lookup, "TRIPWIRE_ANOMALY_MIN_SAMPLES")? {
            config.evaluator.anomaly_min_samples = min_samples;
        }
        // The window holds the new sample plus its history
        if config.window_capacity <= config.evaluator.anomaly_min_samples {
            return Err(ConfigError::WindowTooSmall {
                capacity: config.window_capacity,
                min_samples: config.evaluator.anomaly_min_samples,
            });
        }
        if let Some(sigma) = parse::<f64>(&lookup, "TRIPWIRE_ANOMALY_SIGMA")? {
            if !sigma.is_finite() || sigma < 0.0 {
                return Err(ConfigError::Invalid {
                    name: "TRIPWIRE_ANOMALY_SIGMA",
                    value: sigma.to_string(),
                });
            }
            config.evaluator.anomaly_sigma = sigma;
        }
        if let Some(max_retries) = parse(&lookup, "TRIPWIRE_RETRY_MAX")? {
            config.retry.max_retries = max_retries;
        }
        if let Some(ms) = parse(&lookup, "TRIPWIRE_RETRY_BASE_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse(&lookup, "TRIPWIRE_DELIVERY_TIMEOUT_SECS")? {
            config.delivery_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "TRIPWIRE_INTEGRATION_CACHE_TTL_SECS")? {
            config.integration_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(url) = lookup("TRIPWIRE_APP_URL").filter(|u| !u.trim().is_empty()) {
            config.app_url = url.trim().to_string();
        }

        Ok(config)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            retry: self.retry,
            delivery_timeout: self.delivery_timeout,
            app_url: self.app_url.clone(),
        }
    }

    /// Wire an engine from collaborators
    pub fn build_engine(
        &self,
        alerts: Arc<dyn AlertStore>,
        integrations: Arc<dyn IntegrationStore>,
        http: Arc<dyn HttpTransport>,
        email: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
    ) -> AlertEngine {
        let dispatcher = Arc::new(Dispatcher::new(
            http,
            email,
            integrations,
            self.dispatcher_config(),
        ));
        AlertEngine::new(
            WindowStore::new(self.window_capacity),
            alerts,
            dispatcher,
            clock,
            self.evaluator,
        )
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.window_capacity, 50);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.delivery_timeout, Duration::from_secs(5));
        assert_eq!(config.evaluator, EvaluatorConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("TRIPWIRE_WINDOW_CAPACITY", "200"),
            ("TRIPWIRE_ANOMALY_SIGMA", "2.5"),
            ("TRIPWIRE_RETRY_MAX", "1"),
            ("TRIPWIRE_RETRY_BASE_MS", "250"),
            ("TRIPWIRE_APP_URL", " https://charts.example.com "),
            ("TRIPWIRE_DELIVERY_TIMEOUT_SECS", ""),
        ]))
        .unwrap();

        assert_eq!(config.window_capacity, 200);
        assert_eq!(config.evaluator.anomaly_sigma, 2.5);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.app_url, "https://charts.example.com");
        assert_eq!(config.delivery_timeout, Duration::from_secs(5));
        assert_eq!(config.dispatcher_config().app_url, "https://charts.example.com");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("TRIPWIRE_WINDOW_CAPACITY", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("TRIPWIRE_WINDOW_CAPACITY"));

        assert!(EngineConfig::from_lookup(lookup(&[("TRIPWIRE_ANOMALY_SIGMA", "-1")])).is_err());
    }

    #[test]
    fn test_window_must_hold_anomaly_history() {
        let err = EngineConfig::from_lookup(lookup(&[("TRIPWIRE_WINDOW_CAPACITY", "10")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::WindowTooSmall {
                capacity: 10,
                min_samples: 10
            }
        ));

        assert!(EngineConfig::from_lookup(lookup(&[
            ("TRIPWIRE_WINDOW_CAPACITY", "20"),
            ("TRIPWIRE_ANOMALY_MIN_SAMPLES", "30"),
        ]))
        .is_err());

        let config = EngineConfig::from_lookup(lookup(&[
            ("TRIPWIRE_WINDOW_CAPACITY", "11"),
            ("TRIPWIRE_ANOMALY_MIN_SAMPLES", "10"),
        ]))
        .unwrap();
        assert_eq!(config.window_capacity, 11);
    }
}
