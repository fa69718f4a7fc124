//! Alert rules, cooldown gating and the evaluation engine

pub mod cooldown;
pub mod evaluator;
pub mod model;
pub mod orchestrator;

pub use cooldown::{CooldownController, CooldownState, Gate, Suppression};
pub use evaluator::{evaluate, evaluate_alert, Evaluation, EvaluatorConfig, Rule, RuleError};
pub use model::{Alert, AlertType, Integration, IntegrationTarget, Medium, RuleParams};
pub use orchestrator::{
    AlertEngine, AlertOutcome, AlertStatus, EngineError, EngineStats, EvaluationReport, SkipReason,
};
