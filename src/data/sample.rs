use serde::{Deserialize, Serialize};

use super::value::Value;

/// One point of a dataset series, as delivered by a chart refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix millis
    pub timestamp: i64,
    pub value: Value,
}

impl Sample {
    pub fn new(timestamp: i64, value: impl Into<Value>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }

    /// Numeric reading of the value, if it has one
    pub fn number(&self) -> Option<f64> {
        self.value.as_number()
    }
}
