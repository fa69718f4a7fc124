//! Alert evaluation entry point
//!
//! `AlertEngine::evaluate` is called once per refreshed sample. It appends
//! the sample to the dataset window, loads the dataset's active alerts and
//! runs each one through evaluator, cooldown gate and dispatcher. Alerts are
//! evaluated concurrently and fail independently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::cooldown::{CooldownController, Gate, Suppression};
use super::evaluator::{evaluate, EvaluatorConfig, Rule};
use super::model::Alert;
use crate::clock::Clock;
use crate::data::Sample;
use crate::notify::{DispatchHandle, DispatchReport, DispatchStats, Dispatcher, Notification};
use crate::storage::{AlertStore, StoreError, WindowStats, WindowStore};

/// Dataset-level evaluation failure
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to load alerts for dataset {dataset_id}: {source}")]
    Storage {
        dataset_id: String,
        #[source]
        source: StoreError,
    },
}

/// Why a sample was not evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The sample carried no value
    Empty,
    /// The sample is not newer than the latest one in the window
    Stale,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Empty => "empty",
            SkipReason::Stale => "stale",
        }
    }
}

/// Per-alert result of one evaluation pass
#[derive(Debug, Clone, PartialEq)]
pub enum AlertStatus {
    NotFired,
    Fired {
        message: String,
        /// One-time alert, now inactive
        disabled: bool,
    },
    Suppressed(Suppression),
    /// Misconfigured rule or trigger state could not be stored
    Failed(String),
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::NotFired => "not_fired",
            AlertStatus::Fired { .. } => "fired",
            AlertStatus::Suppressed(_) => "suppressed",
            AlertStatus::Failed(_) => "failed",
        }
    }

    /// Human-readable detail, if any
    pub fn detail(&self) -> Option<String> {
        match self {
            AlertStatus::NotFired => None,
            AlertStatus::Fired { message, .. } => Some(message.clone()),
            AlertStatus::Suppressed(reason) => Some(reason.to_string()),
            AlertStatus::Failed(error) => Some(error.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertOutcome {
    pub alert_id: String,
    pub status: AlertStatus,
}

/// Result of `AlertEngine::evaluate` for one sample
#[derive(Debug)]
pub struct EvaluationReport {
    pub dataset_id: String,
    pub skipped: Option<SkipReason>,
    pub outcomes: Vec<AlertOutcome>,
    /// In-flight deliveries of the alerts that fired
    pub dispatches: Vec<DispatchHandle>,
}

impl EvaluationReport {
    fn skipped(dataset_id: &str, reason: SkipReason) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            skipped: Some(reason),
            outcomes: Vec::new(),
            dispatches: Vec::new(),
        }
    }

    pub fn outcome(&self, alert_id: &str) -> Option<&AlertStatus> {
        self.outcomes
            .iter()
            .find(|o| o.alert_id == alert_id)
            .map(|o| &o.status)
    }

    /// Ids of alerts that fired
    pub fn fired(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, AlertStatus::Fired { .. }))
            .map(|o| o.alert_id.as_str())
            .collect()
    }

    /// Wait for every delivery started by this evaluation
    pub async fn wait_for_deliveries(self) -> Vec<DispatchReport> {
        futures::future::join_all(self.dispatches.into_iter().map(DispatchHandle::join)).await
    }
}

#[derive(Debug, Default)]
struct EngineCounters {
    samples: AtomicU64,
    samples_skipped: AtomicU64,
    alerts_evaluated: AtomicU64,
    fired: AtomicU64,
    suppressed: AtomicU64,
    failed: AtomicU64,
    storage_errors: AtomicU64,
}

/// Engine statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    pub samples: u64,
    pub samples_skipped: u64,
    pub alerts_evaluated: u64,
    pub fired: u64,
    pub suppressed: u64,
    pub failed: u64,
    pub storage_errors: u64,
    pub windows: WindowStats,
    pub dispatch: DispatchStats,
}

/// Alert evaluation engine
pub struct AlertEngine {
    windows: WindowStore,
    alerts: Arc<dyn AlertStore>,
    cooldown: CooldownController,
    dispatcher: Arc<Dispatcher>,
    evaluator: EvaluatorConfig,
    counters: EngineCounters,
}

impl AlertEngine {
    pub fn new(
        windows: WindowStore,
        alerts: Arc<dyn AlertStore>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        evaluator: EvaluatorConfig,
    ) -> Self {
        Self {
            windows,
            cooldown: CooldownController::new(Arc::clone(&alerts), clock),
            alerts,
            dispatcher,
            evaluator,
            counters: EngineCounters::default(),
        }
    }

    pub fn windows(&self) -> &WindowStore {
        &self.windows
    }

    /// Evaluate every active alert of `dataset_id` against a fresh sample.
    ///
    /// Empty and stale samples are a no-op. Returns an error only when the
    /// dataset's alerts cannot be loaded; per-alert failures are reported in
    /// the outcomes.
    pub async fn evaluate(
        &self,
        dataset_id: &str,
        sample: Sample,
    ) -> Result<EvaluationReport, EngineError> {
        self.counters.samples.fetch_add(1, Ordering::Relaxed);

        if sample.value.is_null() {
            self.counters.samples_skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(dataset_id = %dataset_id, "Empty sample, nothing to evaluate");
            return Ok(EvaluationReport::skipped(dataset_id, SkipReason::Empty));
        }

        let Some(window) = self.windows.append(dataset_id, sample.clone()) else {
            self.counters.samples_skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                dataset_id = %dataset_id,
                timestamp = sample.timestamp,
                "Stale sample, nothing to evaluate"
            );
            return Ok(EvaluationReport::skipped(dataset_id, SkipReason::Stale));
        };

        let alerts = match self.alerts.list_active_alerts(dataset_id).await {
            Ok(alerts) => alerts,
            Err(e) => {
                self.counters.storage_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    dataset_id = %dataset_id,
                    error = %e,
                    "Failed to load alerts"
                );
                return Err(EngineError::Storage {
                    dataset_id: dataset_id.to_string(),
                    source: e,
                });
            }
        };

        let alerts: Vec<Alert> = alerts
            .into_iter()
            .filter(|a| {
                let eligible = a.active && a.dataset_id == dataset_id;
                if !eligible {
                    tracing::debug!(alert_id = %a.id, "Ignoring inactive or foreign alert");
                }
                eligible
            })
            .collect();

        let results = futures::future::join_all(
            alerts
                .into_iter()
                .map(|alert| self.evaluate_alert(alert, &sample, &window)),
        )
        .await;

        let mut report = EvaluationReport {
            dataset_id: dataset_id.to_string(),
            skipped: None,
            outcomes: Vec::with_capacity(results.len()),
            dispatches: Vec::new(),
        };
        for (outcome, dispatch) in results {
            report.outcomes.push(outcome);
            report.dispatches.extend(dispatch);
        }

        tracing::debug!(
            dataset_id = %dataset_id,
            alerts = report.outcomes.len(),
            fired = report.dispatches.len(),
            "Sample evaluated"
        );

        Ok(report)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            samples: self.counters.samples.load(Ordering::Relaxed),
            samples_skipped: self.counters.samples_skipped.load(Ordering::Relaxed),
            alerts_evaluated: self.counters.alerts_evaluated.load(Ordering::Relaxed),
            fired: self.counters.fired.load(Ordering::Relaxed),
            suppressed: self.counters.suppressed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            storage_errors: self.counters.storage_errors.load(Ordering::Relaxed),
            windows: self.windows.stats(),
            dispatch: self.dispatcher.stats(),
        }
    }

    async fn evaluate_alert(
        &self,
        alert: Alert,
        sample: &Sample,
        window: &[Sample],
    ) -> (AlertOutcome, Option<DispatchHandle>) {
        self.counters.alerts_evaluated.fetch_add(1, Ordering::Relaxed);
        let alert_id = alert.id.clone();

        let (status, dispatch) = self.run_alert(alert, sample, window).await;
        let counter = match status {
            AlertStatus::NotFired => None,
            AlertStatus::Fired { .. } => Some(&self.counters.fired),
            AlertStatus::Suppressed(_) => Some(&self.counters.suppressed),
            AlertStatus::Failed(_) => Some(&self.counters.failed),
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        (AlertOutcome { alert_id, status }, dispatch)
    }

    async fn run_alert(
        &self,
        alert: Alert,
        sample: &Sample,
        window: &[Sample],
    ) -> (AlertStatus, Option<DispatchHandle>) {
        let rule = match Rule::from_params(alert.alert_type, &alert.rules) {
            Ok(rule) => rule,
            Err(e) => {
                tracing::warn!(alert_id = %alert.id, error = %e, "Invalid alert rule, skipping");
                return (AlertStatus::Failed(e.to_string()), None);
            }
        };

        let evaluation = evaluate(&rule, sample, window, &self.evaluator);
        if !evaluation.fired {
            return (AlertStatus::NotFired, None);
        }

        let (triggered_at, disabled) = match self.cooldown.try_fire(&alert).await {
            Ok(Gate::Fire {
                triggered_at,
                disabled,
            }) => (triggered_at, disabled),
            Ok(Gate::Suppressed(reason)) => return (AlertStatus::Suppressed(reason), None),
            Err(e) => {
                tracing::error!(
                    alert_id = %alert.id,
                    error = %e,
                    "Failed to store alert trigger state"
                );
                return (AlertStatus::Failed(e.to_string()), None);
            }
        };

        tracing::warn!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            message = %evaluation.message,
            "Alert triggered"
        );

        let notification = Notification {
            rule_description: rule.describe(&self.evaluator),
            message: evaluation.message.clone(),
            current_value: sample.value.clone(),
            fired_at: triggered_at,
            alert: Arc::new(alert),
        };
        let handle = self.dispatcher.dispatch(notification);

        (
            AlertStatus::Fired {
                message: evaluation.message,
                disabled,
            },
            Some(handle),
        )
    }
}
