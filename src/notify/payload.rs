//! Notification content for each channel

use std::sync::Arc;

use crate::alerts::model::Alert;
use crate::data::Value;

/// A committed alert fire, ready to fan out
#[derive(Debug, Clone)]
pub struct Notification {
    pub alert: Arc<Alert>,
    /// Rule description, e.g. "value above 100"
    pub rule_description: String,
    /// Evaluator message for this fire
    pub message: String,
    pub current_value: Value,
    /// Unix millis at which the fire was committed
    pub fired_at: i64,
}

impl Notification {
    pub fn chart_link(&self, app_url: &str) -> String {
        format!(
            "{}/chart/{}",
            app_url.trim_end_matches('/'),
            self.alert.chart_id
        )
    }

    pub fn fired_at_rfc3339(&self) -> String {
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.fired_at)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default()
    }

    /// Body POSTed to generic webhooks
    pub fn webhook_payload(&self, app_url: &str) -> serde_json::Value {
        serde_json::json!({
            "alert_title": self.alert.title(),
            "rule_description": self.rule_description,
            "current_value": self.current_value.to_json(),
            "chart_link": self.chart_link(app_url),
            "alert_id": self.alert.id,
            "chart_id": self.alert.chart_id,
            "dataset_id": self.alert.dataset_id,
            "message": self.message,
            "triggered_at": self.fired_at_rfc3339(),
        })
    }

    /// Body POSTed to Slack incoming webhooks; Slack renders `text`
    pub fn slack_payload(&self, app_url: &str, channel: Option<&str>) -> serde_json::Value {
        let link = self.chart_link(app_url);
        let mut payload = serde_json::json!({
            "text": format!(
                "*{}*: {}\nCurrent value: {}\n<{}|Open chart>",
                self.alert.title(),
                self.message,
                self.current_value,
                link
            ),
            "alert_title": self.alert.title(),
            "rule_description": self.rule_description,
            "current_value": self.current_value.to_json(),
            "chart_link": link,
        });
        if let (Some(channel), Some(obj)) = (channel, payload.as_object_mut()) {
            obj.insert("channel".to_string(), serde_json::json!(channel));
        }
        payload
    }

    pub fn email_subject(&self) -> String {
        format!("[Alert] {} - {}", self.alert.title(), self.rule_description)
    }

    pub fn email_body(&self, app_url: &str) -> String {
        format!(
            "Alert: {title}\nRule: {rule}\nCurrent value: {value}\nMessage: {message}\nTime: {time}\nChart: {link}",
            title = self.alert.title(),
            rule = self.rule_description,
            value = self.current_value,
            message = self.message,
            time = self.fired_at_rfc3339(),
            link = self.chart_link(app_url),
        )
    }
}
