//! Alert and integration records

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::Value;

/// Alert definition as stored by the CRUD layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert ID
    pub id: String,
    /// Human-readable title, used in notifications
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "chartId")]
    pub chart_id: String,
    #[serde(alias = "datasetId")]
    pub dataset_id: String,
    /// Rule kind
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    /// Type-specific rule parameters
    #[serde(default)]
    pub rules: RuleParams,
    /// Email addresses, used only when the email medium is enabled
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Medium name -> setting
    #[serde(default)]
    pub mediums: BTreeMap<String, MediumSetting>,
    /// Bindings to externally managed integrations
    #[serde(default, alias = "alertIntegrations")]
    pub alert_integrations: Vec<AlertIntegration>,
    /// Cooldown in seconds
    #[serde(default)]
    pub timeout: u64,
    /// Disable after the first successful fire
    #[serde(default, alias = "oneTime")]
    pub one_time: bool,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Unix millis of the last successful fire
    #[serde(default, alias = "lastTriggeredAt")]
    pub last_triggered_at: Option<i64>,
}

fn default_active() -> bool {
    true
}

impl Alert {
    /// Create an active alert with no mediums and no cooldown
    pub fn new(
        id: impl Into<String>,
        chart_id: impl Into<String>,
        dataset_id: impl Into<String>,
        alert_type: AlertType,
    ) -> Self {
        Self {
            id: id.into(),
            name: None,
            chart_id: chart_id.into(),
            dataset_id: dataset_id.into(),
            alert_type,
            rules: RuleParams::default(),
            recipients: Vec::new(),
            mediums: BTreeMap::new(),
            alert_integrations: Vec::new(),
            timeout: 0,
            one_time: false,
            active: true,
            last_triggered_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set `rules.value` (milestone, threshold_above, threshold_below)
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.rules.value = Some(value.into());
        self
    }

    /// Set `rules.lower` / `rules.upper` (threshold_between, threshold_outside)
    pub fn with_bounds(mut self, lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        self.rules.lower = Some(lower.into());
        self.rules.upper = Some(upper.into());
        self
    }

    /// Set cooldown in seconds
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn with_one_time(mut self, one_time: bool) -> Self {
        self.one_time = one_time;
        self
    }

    pub fn with_medium(mut self, medium: Medium, enabled: bool) -> Self {
        self.mediums
            .insert(medium.to_string(), MediumSetting { enabled });
        self
    }

    pub fn with_recipient(mut self, address: impl Into<String>) -> Self {
        self.recipients.push(address.into());
        self
    }

    pub fn with_integration(mut self, integration_id: impl Into<String>, enabled: bool) -> Self {
        self.alert_integrations.push(AlertIntegration {
            integration_id: integration_id.into(),
            enabled,
        });
        self
    }

    /// Title shown in notifications
    pub fn title(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Alert {}", self.id),
        }
    }

    /// Cooldown in millis
    pub fn cooldown_ms(&self) -> i64 {
        i64::try_from(self.timeout)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }

    /// Recognized mediums switched on for this alert, each listed once.
    ///
    /// Medium names match case-insensitively. Unknown names are logged and
    /// ignored.
    pub fn enabled_mediums(&self) -> Vec<Medium> {
        let mediums: BTreeSet<Medium> = self
            .mediums
            .iter()
            .filter(|(_, setting)| setting.enabled)
            .filter_map(|(name, _)| match name.parse::<Medium>() {
                Ok(medium) => Some(medium),
                Err(e) => {
                    tracing::warn!(alert_id = %self.id, error = %e, "Ignoring medium");
                    None
                }
            })
            .collect();
        mediums.into_iter().collect()
    }

    /// Whether any entry naming `medium` (in any case) is enabled
    pub fn is_medium_enabled(&self, medium: Medium) -> bool {
        self.mediums
            .iter()
            .any(|(name, setting)| setting.enabled && name.parse::<Medium>().ok() == Some(medium))
    }

    /// Current trigger state as loaded from storage
    pub fn trigger_state(&self) -> TriggerState {
        TriggerState {
            last_triggered_at: self.last_triggered_at,
            active: self.active,
        }
    }
}

/// Rule kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    NewValue,
    Milestone,
    ThresholdAbove,
    ThresholdBelow,
    ThresholdBetween,
    ThresholdOutside,
    Anomaly,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::NewValue => "new_value",
            AlertType::Milestone => "milestone",
            AlertType::ThresholdAbove => "threshold_above",
            AlertType::ThresholdBelow => "threshold_below",
            AlertType::ThresholdBetween => "threshold_between",
            AlertType::ThresholdOutside => "threshold_outside",
            AlertType::Anomaly => "anomaly",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw rule parameters; values may arrive as numbers or numeric strings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<Value>,
}

/// Notification channel type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Medium {
    Email,
    Slack,
    Telegram,
    Discord,
    Webhook,
}

impl Medium {
    pub fn as_str(&self) -> &'static str {
        match self {
            Medium::Email => "email",
            Medium::Slack => "slack",
            Medium::Telegram => "telegram",
            Medium::Discord => "discord",
            Medium::Webhook => "webhook",
        }
    }
}

impl FromStr for Medium {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Medium::Email),
            "slack" => Ok(Medium::Slack),
            "telegram" => Ok(Medium::Telegram),
            "discord" => Ok(Medium::Discord),
            "webhook" => Ok(Medium::Webhook),
            other => Err(format!("unknown medium: {other}")),
        }
    }
}

impl std::fmt::Display for Medium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediumSetting {
    #[serde(default)]
    pub enabled: bool,
}

/// Alert -> integration binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertIntegration {
    pub integration_id: String,
    #[serde(default)]
    pub enabled: bool,
}

/// The two trigger fields this engine is allowed to mutate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerState {
    pub last_triggered_at: Option<i64>,
    pub active: bool,
}

/// Externally configured delivery endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    #[serde(flatten)]
    pub target: IntegrationTarget,
}

/// Integration kind and its endpoint binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntegrationTarget {
    /// Generic JSON webhook
    Webhook { url: String },
    /// Slack incoming webhook, optionally overriding the channel
    Slack {
        webhook_url: String,
        #[serde(default)]
        channel: Option<String>,
    },
}

impl IntegrationTarget {
    /// Medium that must be enabled on the alert for this integration to be used
    pub fn medium(&self) -> Medium {
        match self {
            IntegrationTarget::Webhook { .. } => Medium::Webhook,
            IntegrationTarget::Slack { .. } => Medium::Slack,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            IntegrationTarget::Webhook { url } => url,
            IntegrationTarget::Slack { webhook_url, .. } => webhook_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_builder() {
        let alert = Alert::new("a1", "chart-1", "ds-1", AlertType::ThresholdAbove)
            .with_value(100)
            .with_timeout(60)
            .with_medium(Medium::Email, true)
            .with_recipient("ops@example.com");

        assert_eq!(alert.id, "a1");
        assert_eq!(alert.cooldown_ms(), 60_000);
        assert!(alert.active);
        assert!(alert.is_medium_enabled(Medium::Email));
        assert!(!alert.is_medium_enabled(Medium::Slack));
        assert_eq!(alert.title(), "Alert a1");
    }

    #[test]
    fn test_deserialize_camel_case_record() {
        let json = serde_json::json!({
            "id": "a1",
            "chartId": "c1",
            "datasetId": "d1",
            "type": "threshold_between",
            "rules": {"lower": "10", "upper": 20},
            "recipients": ["ops@example.com"],
            "mediums": {"email": {"enabled": true}, "carrier_pigeon": {"enabled": true}},
            "alertIntegrations": [{"integration_id": "i1", "enabled": true}],
            "timeout": 300,
            "oneTime": true
        });

        let alert: Alert = serde_json::from_value(json).unwrap();
        assert_eq!(alert.alert_type, AlertType::ThresholdBetween);
        assert_eq!(alert.rules.lower, Some(Value::String("10".into())));
        assert_eq!(alert.rules.upper, Some(Value::Int64(20)));
        assert!(alert.one_time);
        assert!(alert.active);
        assert_eq!(alert.last_triggered_at, None);
        assert_eq!(alert.alert_integrations.len(), 1);
        // Unknown medium names are dropped
        assert_eq!(alert.enabled_mediums(), vec![Medium::Email]);
    }

    #[test]
    fn test_integration_tagging() {
        let json = serde_json::json!({
            "id": "i1",
            "type": "slack",
            "webhook_url": "https://hooks.slack.test/T000",
            "channel": "#alerts"
        });
        let integration: Integration = serde_json::from_value(json).unwrap();
        assert_eq!(integration.target.medium(), Medium::Slack);
        assert_eq!(integration.target.url(), "https://hooks.slack.test/T000");

        let json = serde_json::json!({"id": "i2", "type": "webhook", "url": "http://hook.test"});
        let integration: Integration = serde_json::from_value(json).unwrap();
        assert_eq!(integration.target.medium(), Medium::Webhook);
    }

    #[test]
    fn test_medium_keys_match_any_case() {
        let mut alert = Alert::new("a1", "c1", "d1", AlertType::NewValue);
        alert
            .mediums
            .insert("Webhook".to_string(), MediumSetting { enabled: true });
        alert
            .mediums
            .insert("EMAIL".to_string(), MediumSetting { enabled: true });
        alert
            .mediums
            .insert("email".to_string(), MediumSetting { enabled: false });

        assert!(alert.is_medium_enabled(Medium::Webhook));
        assert!(alert.is_medium_enabled(Medium::Email));
        assert!(!alert.is_medium_enabled(Medium::Slack));
        assert_eq!(alert.enabled_mediums(), vec![Medium::Email, Medium::Webhook]);
    }

    #[test]
    fn test_medium_parse() {
        assert_eq!("Slack".parse::<Medium>(), Ok(Medium::Slack));
        assert!("fax".parse::<Medium>().is_err());
    }
}
