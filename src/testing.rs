//! Recording fakes shared by unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::alerts::model::Alert;
use crate::notify::transport::{EmailTransport, HttpTransport, TransportError};
use crate::storage::{AlertStore, StoreError};

/// HTTP transport that records every POST and answers from a status table
#[derive(Default)]
pub struct RecordingHttp {
    statuses: HashMap<String, u16>,
    posts: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every POST to `url` with `status`
    pub fn fail_url(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn posts(&self) -> Vec<(String, serde_json::Value)> {
        self.posts.lock().clone()
    }

    pub fn posts_to(&self, url: &str) -> usize {
        self.posts.lock().iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl HttpTransport for RecordingHttp {
    async fn post(
        &self,
        url: &str,
        payload: &serde_json::Value,
        _timeout: Duration,
    ) -> Result<u16, TransportError> {
        self.posts.lock().push((url.to_string(), payload.clone()));
        Ok(self.statuses.get(url).copied().unwrap_or(200))
    }
}

/// Email transport that records sends; listed addresses get a connect error
#[derive(Default)]
pub struct RecordingEmail {
    failing: Vec<String>,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingEmail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_address(mut self, address: &str) -> Self {
        self.failing.push(address.to_string());
        self
    }

    /// Send attempts to `address`, failed ones included
    pub fn sent_to(&self, address: &str) -> usize {
        self.sent.lock().iter().filter(|(to, _)| to == address).count()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, s)| s.clone()).collect()
    }
}

#[async_trait]
impl EmailTransport for RecordingEmail {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), TransportError> {
        self.sent.lock().push((to.to_string(), subject.to_string()));
        if self.failing.iter().any(|a| a == to) {
            return Err(TransportError::Connect(format!("relay refused {}", to)));
        }
        Ok(())
    }
}

/// Alert store whose every call fails
pub struct UnavailableAlertStore;

#[async_trait]
impl AlertStore for UnavailableAlertStore {
    async fn list_active_alerts(&self, _dataset_id: &str) -> Result<Vec<Alert>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    async fn cas_update_trigger_state(
        &self,
        _alert_id: &str,
        _expected_last_triggered_at: Option<i64>,
        _new_last_triggered_at: i64,
        _new_active: bool,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}
