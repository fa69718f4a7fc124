//! Notification fan-out
//!
//! Every delivery (one email recipient, one integration binding) runs as its
//! own tokio task with its own retry loop. A slow or broken channel can only
//! ever delay or fail itself.

use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::payload::Notification;
use super::retry::{with_retry, DeliveryError, RetryPolicy};
use super::transport::{EmailTransport, HttpTransport};
use crate::alerts::model::{IntegrationTarget, Medium};
use crate::storage::IntegrationStore;

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub retry: RetryPolicy,
    /// Bound on each delivery attempt
    pub delivery_timeout: Duration,
    /// Base URL used to build chart links
    pub app_url: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            delivery_timeout: Duration::from_secs(5),
            app_url: "http://localhost:3000".to_string(),
        }
    }
}

/// One unit of delivery work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Email { to: String },
    Integration { integration_id: String },
    /// Recognized medium without a transport
    Unsupported { medium: Medium },
}

impl std::fmt::Display for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Email { to } => write!(f, "email:{}", to),
            Delivery::Integration { integration_id } => {
                write!(f, "integration:{}", integration_id)
            }
            Delivery::Unsupported { medium } => write!(f, "{}", medium),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
    Skipped(String),
}

/// Final result of one delivery
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub delivery: Delivery,
    pub status: DeliveryStatus,
    pub attempts: u32,
}

impl DeliveryOutcome {
    fn skipped(delivery: Delivery, reason: impl Into<String>) -> Self {
        Self {
            delivery,
            status: DeliveryStatus::Skipped(reason.into()),
            attempts: 0,
        }
    }

    fn failed(delivery: Delivery, error: &DeliveryError, attempts: u32) -> Self {
        Self {
            delivery,
            status: DeliveryStatus::Failed(error.to_string()),
            attempts,
        }
    }
}

/// In-flight deliveries for one fired alert.
///
/// Dropping the handle does not cancel anything; the tasks run to completion.
#[derive(Debug)]
pub struct DispatchHandle {
    pub alert_id: String,
    completed: Vec<DeliveryOutcome>,
    tasks: Vec<(Delivery, JoinHandle<DeliveryOutcome>)>,
}

impl DispatchHandle {
    /// Number of deliveries, finished or not
    pub fn len(&self) -> usize {
        self.completed.len() + self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every delivery to finish
    pub async fn join(self) -> DispatchReport {
        let mut outcomes = self.completed;
        let (deliveries, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        for (delivery, result) in deliveries.into_iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => outcomes.push(DeliveryOutcome {
                    delivery,
                    status: DeliveryStatus::Failed(format!("Delivery task failed: {}", e)),
                    attempts: 0,
                }),
            }
        }

        DispatchReport {
            alert_id: self.alert_id,
            outcomes,
        }
    }
}

/// Outcomes of every delivery for one fired alert
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub alert_id: String,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Delivered))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Skipped(_)))
    }

    /// Outcome for a specific delivery
    pub fn outcome(&self, delivery: &Delivery) -> Option<&DeliveryOutcome> {
        self.outcomes.iter().find(|o| &o.delivery == delivery)
    }

    fn count(&self, pred: impl Fn(&DeliveryStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Delivery counters
#[derive(Debug, Default)]
struct DispatchCounters {
    notifications: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    retries: AtomicU64,
}

/// Delivery statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DispatchStats {
    pub notifications: u64,
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retries: u64,
}

/// Fans fired alerts out to their channels
pub struct Dispatcher {
    http: Arc<dyn HttpTransport>,
    email: Arc<dyn EmailTransport>,
    integrations: Arc<dyn IntegrationStore>,
    config: DispatcherConfig,
    counters: DispatchCounters,
}

impl Dispatcher {
    pub fn new(
        http: Arc<dyn HttpTransport>,
        email: Arc<dyn EmailTransport>,
        integrations: Arc<dyn IntegrationStore>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            http,
            email,
            integrations,
            config,
            counters: DispatchCounters::default(),
        }
    }

    /// Work items for a notification, one per recipient / binding / medium
    pub fn plan(notification: &Notification) -> Vec<Delivery> {
        let alert = &notification.alert;
        let mediums = alert.enabled_mediums();
        let mut deliveries = Vec::new();

        for medium in &mediums {
            match medium {
                Medium::Email => {
                    let mut seen = HashSet::new();
                    for address in &alert.recipients {
                        let address = address.trim();
                        if address.is_empty() || !seen.insert(address.to_ascii_lowercase()) {
                            continue;
                        }
                        deliveries.push(Delivery::Email {
                            to: address.to_string(),
                        });
                    }
                    if seen.is_empty() {
                        tracing::info!(alert_id = %alert.id, "Email medium enabled without recipients");
                    }
                }
                // Resolved through integration bindings below
                Medium::Slack | Medium::Webhook => {}
                Medium::Telegram | Medium::Discord => {
                    deliveries.push(Delivery::Unsupported { medium: *medium });
                }
            }
        }

        if mediums.contains(&Medium::Slack) || mediums.contains(&Medium::Webhook) {
            let mut seen = HashSet::new();
            for binding in alert.alert_integrations.iter().filter(|b| b.enabled) {
                if seen.insert(binding.integration_id.as_str()) {
                    deliveries.push(Delivery::Integration {
                        integration_id: binding.integration_id.clone(),
                    });
                }
            }
        }

        deliveries
    }

    /// Start every delivery for `notification` and return without waiting
    pub fn dispatch(self: &Arc<Self>, notification: Notification) -> DispatchHandle {
        self.counters.notifications.fetch_add(1, Ordering::Relaxed);

        let alert_id = notification.alert.id.clone();
        let notification = Arc::new(notification);
        let mut completed = Vec::new();
        let mut tasks = Vec::new();

        for delivery in Self::plan(&notification) {
            if let Delivery::Unsupported { medium } = &delivery {
                tracing::info!(
                    alert_id = %alert_id,
                    medium = %medium,
                    "Medium has no transport, skipping"
                );
                let outcome = DeliveryOutcome::skipped(delivery, "no transport for medium");
                self.record(&outcome);
                completed.push(outcome);
                continue;
            }

            let this = Arc::clone(self);
            let notification = Arc::clone(&notification);
            let task_delivery = delivery.clone();
            let handle = tokio::spawn(async move {
                let outcome = this.deliver(&notification, task_delivery).await;
                this.record(&outcome);
                outcome
            });
            tasks.push((delivery, handle));
        }

        tracing::debug!(
            alert_id = %alert_id,
            deliveries = completed.len() + tasks.len(),
            "Notification dispatched"
        );

        DispatchHandle {
            alert_id,
            completed,
            tasks,
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            notifications: self.counters.notifications.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
        }
    }

    async fn deliver(&self, notification: &Notification, delivery: Delivery) -> DeliveryOutcome {
        let outcome = match &delivery {
            Delivery::Email { to } => {
                let to = to.clone();
                self.deliver_email(notification, delivery, &to).await
            }
            Delivery::Integration { integration_id } => {
                let integration_id = integration_id.clone();
                self.deliver_integration(notification, delivery, &integration_id)
                    .await
            }
            Delivery::Unsupported { .. } => {
                DeliveryOutcome::skipped(delivery, "no transport for medium")
            }
        };

        match &outcome.status {
            DeliveryStatus::Delivered => tracing::debug!(
                alert_id = %notification.alert.id,
                delivery = %outcome.delivery,
                attempts = outcome.attempts,
                "Notification delivered"
            ),
            DeliveryStatus::Failed(error) => tracing::error!(
                alert_id = %notification.alert.id,
                delivery = %outcome.delivery,
                attempts = outcome.attempts,
                error = %error,
                "Notification delivery failed"
            ),
            DeliveryStatus::Skipped(reason) => tracing::info!(
                alert_id = %notification.alert.id,
                delivery = %outcome.delivery,
                reason = %reason,
                "Notification delivery skipped"
            ),
        }

        outcome
    }

    async fn deliver_email(
        &self,
        notification: &Notification,
        delivery: Delivery,
        to: &str,
    ) -> DeliveryOutcome {
        if !is_valid_email(to) {
            let error = DeliveryError::InvalidAddress(to.to_string());
            return DeliveryOutcome::failed(delivery, &error, 0);
        }

        let subject = notification.email_subject();
        let body = notification.email_body(&self.config.app_url);
        let email = &*self.email;
        let (subject, body) = (subject.as_str(), body.as_str());

        let label = delivery.to_string();
        let attempted = with_retry(
            &self.config.retry,
            self.config.delivery_timeout,
            &label,
            || async move {
                email
                    .send(to, subject, body)
                    .await
                    .map_err(DeliveryError::from)
            },
        )
        .await;

        self.finish(delivery, attempted.result, attempted.attempts)
    }

    async fn deliver_integration(
        &self,
        notification: &Notification,
        delivery: Delivery,
        integration_id: &str,
    ) -> DeliveryOutcome {
        let integration = match self.integrations.get_integration(integration_id).await {
            Ok(Some(integration)) => integration,
            Ok(None) => return DeliveryOutcome::skipped(delivery, "integration not found"),
            Err(e) => {
                let error = DeliveryError::Integration(e.to_string());
                return DeliveryOutcome::failed(delivery, &error, 0);
            }
        };

        let medium = integration.target.medium();
        if !notification.alert.is_medium_enabled(medium) {
            return DeliveryOutcome::skipped(delivery, format!("{} medium not enabled", medium));
        }

        let app_url = &self.config.app_url;
        let payload = match &integration.target {
            IntegrationTarget::Webhook { .. } => notification.webhook_payload(app_url),
            IntegrationTarget::Slack { channel, .. } => {
                notification.slack_payload(app_url, channel.as_deref())
            }
        };

        let http = &*self.http;
        let url = integration.target.url();
        let payload = &payload;
        let timeout = self.config.delivery_timeout;

        let label = delivery.to_string();
        let attempted = with_retry(&self.config.retry, timeout, &label, || async move {
            match http.post(url, payload, timeout).await {
                Ok(status) if (200..300).contains(&status) => Ok(()),
                Ok(status) => Err(DeliveryError::Status(status)),
                Err(e) => Err(DeliveryError::from(e)),
            }
        })
        .await;

        self.finish(delivery, attempted.result, attempted.attempts)
    }

    fn finish(
        &self,
        delivery: Delivery,
        result: Result<(), DeliveryError>,
        attempts: u32,
    ) -> DeliveryOutcome {
        self.counters
            .retries
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);

        match result {
            Ok(()) => DeliveryOutcome {
                delivery,
                status: DeliveryStatus::Delivered,
                attempts,
            },
            Err(e) => DeliveryOutcome::failed(delivery, &e, attempts),
        }
    }

    fn record(&self, outcome: &DeliveryOutcome) {
        let counter = match outcome.status {
            DeliveryStatus::Delivered => &self.counters.delivered,
            DeliveryStatus::Failed(_) => &self.counters.failed,
            DeliveryStatus::Skipped(_) => &self.counters.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn is_valid_email(address: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
        .map(|re| re.is_match(address))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::model::{Alert, AlertType, Integration, MediumSetting};
    use crate::data::Value;
    use crate::storage::InMemoryIntegrationStore;
    use crate::testing::{RecordingEmail, RecordingHttp};

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            retry: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter: 0.0,
            },
            delivery_timeout: Duration::from_secs(1),
            app_url: "https://app.test".to_string(),
        }
    }

    fn integrations() -> Arc<InMemoryIntegrationStore> {
        Arc::new(InMemoryIntegrationStore::with_integrations(vec![
            Integration {
                id: "good-hook".into(),
                target: IntegrationTarget::Webhook {
                    url: "http://good.test/hook".into(),
                },
            },
            Integration {
                id: "bad-hook".into(),
                target: IntegrationTarget::Webhook {
                    url: "http://bad.test/hook".into(),
                },
            },
            Integration {
                id: "slack".into(),
                target: IntegrationTarget::Slack {
                    webhook_url: "http://slack.test/T1".into(),
                    channel: Some("#ops".into()),
                },
            },
        ]))
    }

    fn notification(alert: Alert) -> Notification {
        Notification {
            alert: Arc::new(alert),
            rule_description: "value above 100".into(),
            message: "Value 105 > threshold 100".into(),
            current_value: Value::Int64(105),
            fired_at: 1_700_000_000_000,
        }
    }

    fn dispatcher(http: Arc<RecordingHttp>, email: Arc<RecordingEmail>) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(http, email, integrations(), config()))
    }

    fn base_alert() -> Alert {
        Alert::new("a1", "chart-1", "ds-1", AlertType::ThresholdAbove).with_value(100)
    }

    #[test]
    fn test_plan_respects_mediums_and_bindings() {
        let alert = base_alert()
            .with_medium(Medium::Email, true)
            .with_medium(Medium::Webhook, true)
            .with_medium(Medium::Slack, false)
            .with_medium(Medium::Telegram, true)
            .with_recipient("a@example.com")
            .with_recipient("A@example.com")
            .with_recipient("b@example.com")
            .with_integration("good-hook", true)
            .with_integration("good-hook", true)
            .with_integration("slack", false);

        let plan = Dispatcher::plan(&notification(alert));
        assert_eq!(
            plan,
            vec![
                Delivery::Email {
                    to: "a@example.com".into()
                },
                Delivery::Email {
                    to: "b@example.com".into()
                },
                Delivery::Unsupported {
                    medium: Medium::Telegram
                },
                Delivery::Integration {
                    integration_id: "good-hook".into()
                },
            ]
        );
    }

    #[test]
    fn test_plan_ignores_bindings_without_integration_mediums() {
        let alert = base_alert()
            .with_medium(Medium::Email, false)
            .with_integration("good-hook", true);
        assert!(Dispatcher::plan(&notification(alert)).is_empty());
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let http = Arc::new(RecordingHttp::new().fail_url("http://bad.test/hook", 500));
        let email = Arc::new(RecordingEmail::new());
        let dispatcher = dispatcher(http.clone(), email.clone());

        let alert = base_alert()
            .with_medium(Medium::Webhook, true)
            .with_medium(Medium::Email, true)
            .with_recipient("ops@example.com")
            .with_integration("bad-hook", true)
            .with_integration("good-hook", true);

        let report = dispatcher.dispatch(notification(alert)).join().await;

        assert_eq!(report.delivered(), 2);
        assert_eq!(report.failed(), 1);

        let bad = report
            .outcome(&Delivery::Integration {
                integration_id: "bad-hook".into(),
            })
            .unwrap();
        assert_eq!(bad.attempts, 4);
        assert_eq!(http.posts_to("http://bad.test/hook"), 4);
        assert_eq!(http.posts_to("http://good.test/hook"), 1);
        assert_eq!(email.sent_to("ops@example.com"), 1);

        let stats = dispatcher.stats();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retries, 3);
    }

    #[tokio::test]
    async fn test_bad_address_isolated() {
        let http = Arc::new(RecordingHttp::new());
        let email = Arc::new(RecordingEmail::new().fail_address("flaky@example.com"));
        let dispatcher = dispatcher(http, email.clone());

        let alert = base_alert()
            .with_medium(Medium::Email, true)
            .with_recipient("not-an-address")
            .with_recipient("flaky@example.com")
            .with_recipient("ok@example.com");

        let report = dispatcher.dispatch(notification(alert)).join().await;

        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(email.sent_to("ok@example.com"), 1);
        // Invalid syntax never reaches the transport
        assert_eq!(email.sent_to("not-an-address"), 0);
        let invalid = report
            .outcome(&Delivery::Email {
                to: "not-an-address".into(),
            })
            .unwrap();
        assert_eq!(invalid.attempts, 0);
    }

    #[tokio::test]
    async fn test_slack_binding_uses_slack_payload() {
        let http = Arc::new(RecordingHttp::new());
        let dispatcher = dispatcher(http.clone(), Arc::new(RecordingEmail::new()));

        let alert = base_alert()
            .with_medium(Medium::Slack, true)
            .with_integration("slack", true)
            // Webhook medium is off, so this binding is skipped
            .with_integration("good-hook", true);

        let report = dispatcher.dispatch(notification(alert)).join().await;
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.skipped(), 1);

        let posts = http.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "http://slack.test/T1");
        assert_eq!(posts[0].1["channel"], "#ops");
        assert_eq!(posts[0].1["chart_link"], "https://app.test/chart/chart-1");
    }

    #[tokio::test]
    async fn test_unsupported_and_missing_integrations_skip() {
        let http = Arc::new(RecordingHttp::new());
        let dispatcher = dispatcher(http.clone(), Arc::new(RecordingEmail::new()));

        let alert = base_alert()
            .with_medium(Medium::Discord, true)
            .with_medium(Medium::Webhook, true)
            .with_integration("deleted", true)
            .with_integration("good-hook", true);

        let report = dispatcher.dispatch(notification(alert)).join().await;
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let http = Arc::new(RecordingHttp::new().fail_url("http://good.test/hook", 404));
        let dispatcher = dispatcher(http.clone(), Arc::new(RecordingEmail::new()));

        let alert = base_alert()
            .with_medium(Medium::Webhook, true)
            .with_integration("good-hook", true);

        let report = dispatcher.dispatch(notification(alert)).join().await;
        assert_eq!(report.failed(), 1);
        assert_eq!(http.posts_to("http://good.test/hook"), 1);
    }

    #[tokio::test]
    async fn test_capitalized_medium_keys_deliver() {
        let http = Arc::new(RecordingHttp::new());
        let email = Arc::new(RecordingEmail::new());
        let dispatcher = dispatcher(http.clone(), email.clone());

        let mut alert = base_alert()
            .with_name("Revenue spike")
            .with_recipient("ops@example.com")
            .with_integration("good-hook", true);
        alert.mediums.insert(
            "Webhook".to_string(),
            MediumSetting { enabled: true },
        );
        alert
            .mediums
            .insert("Email".to_string(), MediumSetting { enabled: true });
        alert
            .mediums
            .insert("email".to_string(), MediumSetting { enabled: true });

        let report = dispatcher.dispatch(notification(alert)).join().await;

        assert_eq!(report.delivered(), 2);
        assert_eq!(report.skipped(), 0);
        assert_eq!(http.posts_to("http://good.test/hook"), 1);
        // Both spellings of the email key collapse into one delivery
        assert_eq!(
            email.subjects(),
            vec!["[Alert] Revenue spike - value above 100".to_string()]
        );
    }

    #[test]
    fn test_email_syntax() {
        assert!(is_valid_email("ops@example.com"));
        assert!(!is_valid_email("ops@localhost"));
        assert!(!is_valid_email("two words@example.com"));
        assert!(!is_valid_email(""));
    }
}
