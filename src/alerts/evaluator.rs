//! Rule evaluation
//!
//! Pure decision logic: given a parsed [`Rule`], the incoming sample and the
//! dataset's recent history, decide whether the alert fires and describe why.
//! Nothing here performs I/O or mutates state.

use super::model::{AlertType, RuleParams};
use crate::data::{Sample, Value};

/// Tunables for the history-based rule kinds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluatorConfig {
    /// History points required before `anomaly` may fire
    pub anomaly_min_samples: usize,
    /// Deviation multiplier `k` in `|x - mean| > k * stddev`
    pub anomaly_sigma: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            anomaly_min_samples: 10,
            anomaly_sigma: 3.0,
        }
    }
}

/// Parsed alert rule
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Fire when the value differs from the previous sample
    NewValue,
    /// Fire when the series crosses `value` upwards
    Milestone { value: f64 },
    /// Fire when value > threshold
    ThresholdAbove { value: f64 },
    /// Fire when value < threshold
    ThresholdBelow { value: f64 },
    /// Fire when lower <= value <= upper
    ThresholdBetween { lower: f64, upper: f64 },
    /// Fire when value < lower or value > upper
    ThresholdOutside { lower: f64, upper: f64 },
    /// Fire when the value deviates from recent history
    Anomaly,
}

impl Rule {
    /// Parse the raw parameters stored with an alert
    pub fn from_params(alert_type: AlertType, params: &RuleParams) -> Result<Self, RuleError> {
        let rule = match alert_type {
            AlertType::NewValue => Rule::NewValue,
            AlertType::Anomaly => Rule::Anomaly,
            AlertType::Milestone => Rule::Milestone {
                value: param(alert_type, "value", params.value.as_ref())?,
            },
            AlertType::ThresholdAbove => Rule::ThresholdAbove {
                value: param(alert_type, "value", params.value.as_ref())?,
            },
            AlertType::ThresholdBelow => Rule::ThresholdBelow {
                value: param(alert_type, "value", params.value.as_ref())?,
            },
            AlertType::ThresholdBetween => Rule::ThresholdBetween {
                lower: param(alert_type, "lower", params.lower.as_ref())?,
                upper: param(alert_type, "upper", params.upper.as_ref())?,
            },
            AlertType::ThresholdOutside => Rule::ThresholdOutside {
                lower: param(alert_type, "lower", params.lower.as_ref())?,
                upper: param(alert_type, "upper", params.upper.as_ref())?,
            },
        };
        Ok(rule)
    }

    /// Human-readable rule description for notifications
    pub fn describe(&self, config: &EvaluatorConfig) -> String {
        match self {
            Rule::NewValue => "value changed".to_string(),
            Rule::Milestone { value } => format!("value reached milestone {}", value),
            Rule::ThresholdAbove { value } => format!("value above {}", value),
            Rule::ThresholdBelow { value } => format!("value below {}", value),
            Rule::ThresholdBetween { lower, upper } => {
                format!("value between {} and {}", lower, upper)
            }
            Rule::ThresholdOutside { lower, upper } => {
                format!("value outside {} to {}", lower, upper)
            }
            Rule::Anomaly => format!(
                "value deviates more than {}σ from the last samples",
                config.anomaly_sigma
            ),
        }
    }
}

fn param(
    alert_type: AlertType,
    name: &'static str,
    raw: Option<&Value>,
) -> Result<f64, RuleError> {
    let raw = raw.ok_or(RuleError::MissingParam { alert_type, name })?;
    raw.as_number().ok_or_else(|| RuleError::NotNumeric {
        name,
        value: raw.to_string(),
    })
}

/// Rule configuration errors
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("{alert_type} rule is missing '{name}'")]
    MissingParam {
        alert_type: AlertType,
        name: &'static str,
    },

    #[error("rule parameter '{name}' is not numeric: {value:?}")]
    NotNumeric { name: &'static str, value: String },
}

/// Outcome of evaluating one rule against one sample
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub fired: bool,
    pub message: String,
}

impl Evaluation {
    fn fired(message: String) -> Self {
        Self {
            fired: true,
            message,
        }
    }

    fn quiet(message: impl Into<String>) -> Self {
        Self {
            fired: false,
            message: message.into(),
        }
    }
}

/// Parse and evaluate in one step. Configuration errors evaluate to "not fired".
pub fn evaluate_alert(
    alert_type: AlertType,
    params: &RuleParams,
    sample: &Sample,
    window: &[Sample],
    config: &EvaluatorConfig,
) -> Evaluation {
    match Rule::from_params(alert_type, params) {
        Ok(rule) => evaluate(&rule, sample, window, config),
        Err(e) => Evaluation::quiet(format!("Invalid rule: {}", e)),
    }
}

/// Evaluate a rule against `sample`.
///
/// `window` is the dataset history, oldest first. It may already end with
/// `sample` (the orchestrator appends before evaluating); a trailing copy is
/// ignored when looking at history.
pub fn evaluate(
    rule: &Rule,
    sample: &Sample,
    window: &[Sample],
    config: &EvaluatorConfig,
) -> Evaluation {
    let history = history(sample, window);

    if let Rule::NewValue = rule {
        return evaluate_new_value(sample, history);
    }

    let Some(current) = sample.number() else {
        return Evaluation::quiet(format!(
            "Skipped: {} value {:?} is not numeric",
            sample.value.type_name(),
            sample.value.to_string()
        ));
    };

    match rule {
        Rule::NewValue => evaluate_new_value(sample, history),
        Rule::Milestone { value } => {
            let Some(previous) = history.iter().rev().find_map(Sample::number) else {
                return Evaluation::quiet("No previous value to detect a crossing");
            };
            if previous < *value && current >= *value {
                Evaluation::fired(format!(
                    "Value {} reached milestone {} (previous {})",
                    current, value, previous
                ))
            } else {
                Evaluation::quiet(format!(
                    "Value {} did not cross milestone {} (previous {})",
                    current, value, previous
                ))
            }
        }
        Rule::ThresholdAbove { value } => {
            let triggered = current > *value;
            compared(triggered, current, if triggered { ">" } else { "<=" }, *value)
        }
        Rule::ThresholdBelow { value } => {
            let triggered = current < *value;
            compared(triggered, current, if triggered { "<" } else { ">=" }, *value)
        }
        Rule::ThresholdBetween { lower, upper } => {
            if lower > upper {
                return invalid_bounds(*lower, *upper);
            }
            let triggered = *lower <= current && current <= *upper;
            let message = format!(
                "Value {} is {} [{}, {}]",
                current,
                if triggered { "within" } else { "not within" },
                lower,
                upper
            );
            Evaluation {
                fired: triggered,
                message,
            }
        }
        Rule::ThresholdOutside { lower, upper } => {
            if lower > upper {
                return invalid_bounds(*lower, *upper);
            }
            let triggered = current < *lower || current > *upper;
            let message = format!(
                "Value {} is {} [{}, {}]",
                current,
                if triggered { "outside" } else { "inside" },
                lower,
                upper
            );
            Evaluation {
                fired: triggered,
                message,
            }
        }
        Rule::Anomaly => evaluate_anomaly(current, history, config),
    }
}

/// History preceding `sample`
fn history<'a>(sample: &Sample, window: &'a [Sample]) -> &'a [Sample] {
    match window.split_last() {
        Some((last, rest)) if last == sample => rest,
        _ => window,
    }
}

fn compared(triggered: bool, current: f64, op: &str, threshold: f64) -> Evaluation {
    Evaluation {
        fired: triggered,
        message: format!("Value {} {} threshold {}", current, op, threshold),
    }
}

fn invalid_bounds(lower: f64, upper: f64) -> Evaluation {
    Evaluation::quiet(format!(
        "Invalid bounds: lower {} is greater than upper {}",
        lower, upper
    ))
}

fn evaluate_new_value(sample: &Sample, history: &[Sample]) -> Evaluation {
    if sample.value.is_null() {
        return Evaluation::quiet("Skipped: sample has no value");
    }
    let Some(previous) = history.last() else {
        return Evaluation::quiet("No previous value to compare against");
    };
    if previous.value != sample.value {
        Evaluation::fired(format!(
            "Value changed from {} to {}",
            previous.value, sample.value
        ))
    } else {
        Evaluation::quiet(format!("Value unchanged at {}", sample.value))
    }
}

fn evaluate_anomaly(current: f64, history: &[Sample], config: &EvaluatorConfig) -> Evaluation {
    let values: Vec<f64> = history.iter().filter_map(Sample::number).collect();
    if values.len() < config.anomaly_min_samples {
        return Evaluation::quiet(format!(
            "Insufficient history for anomaly detection ({} of {} samples)",
            values.len(),
            config.anomaly_min_samples
        ));
    }

    let (mean, std_dev) = mean_std_dev(&values);
    let deviation = (current - mean).abs();
    let triggered = deviation > config.anomaly_sigma * std_dev;

    let sigmas = if std_dev > 0.0 {
        deviation / std_dev
    } else if deviation == 0.0 {
        0.0
    } else {
        f64::INFINITY
    };

    let message = format!(
        "Value {} deviates {:.2} ({:.2}σ) from mean {:.2} (σ={:.2}, k={})",
        current, deviation, sigmas, mean, std_dev, config.anomaly_sigma
    );
    Evaluation {
        fired: triggered,
        message,
    }
}

/// Population mean and standard deviation; `values` must be non-empty
fn mean_std_dev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
