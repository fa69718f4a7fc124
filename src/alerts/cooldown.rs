//! Per-alert cooldown and one-time gating
//!
//! Trigger state lives in alert storage, not in this process. Every fire
//! goes through a compare-and-swap on `last_triggered_at`, so any number of
//! concurrent evaluators agree on a single winner per tick.

use std::sync::Arc;

use super::model::{Alert, TriggerState};
use crate::clock::Clock;
use crate::storage::{AlertStore, StoreError};

/// Logical state of an alert with respect to firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    /// Eligible to fire
    Armed,
    /// Fired recently, suppressing until the cooldown elapses
    Cooldown { remaining_ms: i64 },
    /// Inactive; only the CRUD layer can re-enable it
    Disabled,
}

impl CooldownState {
    /// Derive the state from stored trigger fields.
    ///
    /// A fire at or after `now` always counts as cooling down, even with a
    /// zero timeout, so one tick can never fire twice.
    pub fn of(trigger: TriggerState, cooldown_ms: i64, now: i64) -> Self {
        if !trigger.active {
            return CooldownState::Disabled;
        }
        match trigger.last_triggered_at {
            Some(last) => {
                let elapsed = now.saturating_sub(last);
                let window = cooldown_ms.max(1);
                if elapsed < window {
                    CooldownState::Cooldown {
                        remaining_ms: window - elapsed,
                    }
                } else {
                    CooldownState::Armed
                }
            }
            None => CooldownState::Armed,
        }
    }
}

/// Decision for a fired evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// This evaluation won the right to dispatch
    Fire {
        triggered_at: i64,
        /// The alert was one-time and is now disabled
        disabled: bool,
    },
    Suppressed(Suppression),
}

/// Why a fired evaluation will not dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    Disabled,
    CoolingDown { remaining_ms: i64 },
    /// A concurrent evaluation committed first
    LostRace,
}

impl std::fmt::Display for Suppression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Suppression::Disabled => write!(f, "alert disabled"),
            Suppression::CoolingDown { remaining_ms } => {
                write!(f, "cooling down ({} ms remaining)", remaining_ms)
            }
            Suppression::LostRace => write!(f, "concurrent evaluation fired first"),
        }
    }
}

/// Gate between the rule evaluator and the dispatcher
pub struct CooldownController {
    store: Arc<dyn AlertStore>,
    clock: Arc<dyn Clock>,
}

impl CooldownController {
    pub fn new(store: Arc<dyn AlertStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Try to commit a fire for `alert`, whose trigger fields are the ones
    /// read together with the rest of the record.
    ///
    /// Only called after the evaluator reported `fired`. Storage errors are
    /// returned; a lost CAS is a suppression, not an error.
    pub async fn try_fire(&self, alert: &Alert) -> Result<Gate, StoreError> {
        let trigger = alert.trigger_state();
        let now = self.clock.now_millis();

        match CooldownState::of(trigger, alert.cooldown_ms(), now) {
            CooldownState::Disabled => {
                tracing::debug!(alert_id = %alert.id, "Fire ignored, alert disabled");
                return Ok(Gate::Suppressed(Suppression::Disabled));
            }
            CooldownState::Cooldown { remaining_ms } => {
                tracing::debug!(
                    alert_id = %alert.id,
                    remaining_ms,
                    "Alert suppressed (cooldown)"
                );
                return Ok(Gate::Suppressed(Suppression::CoolingDown { remaining_ms }));
            }
            CooldownState::Armed => {}
        }

        let new_active = !alert.one_time;
        let won = self
            .store
            .cas_update_trigger_state(&alert.id, trigger.last_triggered_at, now, new_active)
            .await?;

        if !won {
            tracing::debug!(alert_id = %alert.id, "Alert suppressed (lost trigger race)");
            return Ok(Gate::Suppressed(Suppression::LostRace));
        }

        if alert.one_time {
            tracing::info!(alert_id = %alert.id, "One-time alert fired, now disabled");
        }

        Ok(Gate::Fire {
            triggered_at: now,
            disabled: alert.one_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::model::AlertType;
    use crate::clock::ManualClock;
    use crate::storage::InMemoryAlertStore;

    fn setup(alert: Alert, now: i64) -> (Arc<InMemoryAlertStore>, Arc<ManualClock>, CooldownController) {
        let store = Arc::new(InMemoryAlertStore::with_alerts(vec![alert]));
        let clock = Arc::new(ManualClock::new(now));
        let controller = CooldownController::new(store.clone(), clock.clone());
        (store, clock, controller)
    }

    fn threshold_alert() -> Alert {
        Alert::new("a1", "c1", "d1", AlertType::ThresholdAbove)
            .with_value(100)
            .with_timeout(60)
    }

    #[test]
    fn test_state_derivation() {
        let armed = TriggerState {
            last_triggered_at: None,
            active: true,
        };
        assert_eq!(CooldownState::of(armed, 60_000, 0), CooldownState::Armed);

        let fired = TriggerState {
            last_triggered_at: Some(10_000),
            active: true,
        };
        assert_eq!(
            CooldownState::of(fired, 60_000, 20_000),
            CooldownState::Cooldown {
                remaining_ms: 50_000
            }
        );
        assert_eq!(CooldownState::of(fired, 60_000, 70_000), CooldownState::Armed);

        // Zero timeout still blocks the same tick
        assert!(matches!(
            CooldownState::of(fired, 0, 10_000),
            CooldownState::Cooldown { .. }
        ));
        assert_eq!(CooldownState::of(fired, 0, 10_001), CooldownState::Armed);

        let disabled = TriggerState {
            last_triggered_at: None,
            active: false,
        };
        assert_eq!(CooldownState::of(disabled, 0, 0), CooldownState::Disabled);
    }

    #[tokio::test]
    async fn test_fire_then_cooldown_then_rearm() {
        let (store, clock, controller) = setup(threshold_alert(), 10_000);

        let alert = store.get("a1").unwrap();
        assert_eq!(
            controller.try_fire(&alert).await.unwrap(),
            Gate::Fire {
                triggered_at: 10_000,
                disabled: false
            }
        );

        clock.set(20_000);
        let alert = store.get("a1").unwrap();
        assert!(matches!(
            controller.try_fire(&alert).await.unwrap(),
            Gate::Suppressed(Suppression::CoolingDown { .. })
        ));

        clock.set(70_000);
        let alert = store.get("a1").unwrap();
        assert!(matches!(
            controller.try_fire(&alert).await.unwrap(),
            Gate::Fire { .. }
        ));
        assert_eq!(store.get("a1").unwrap().last_triggered_at, Some(70_000));
    }

    #[tokio::test]
    async fn test_stale_read_loses_race() {
        let (store, clock, controller) = setup(threshold_alert(), 1_000);

        // Both evaluations loaded the record before either committed
        let first = store.get("a1").unwrap();
        let second = store.get("a1").unwrap();

        assert!(matches!(controller.try_fire(&first).await.unwrap(), Gate::Fire { .. }));
        clock.set(1_001);
        assert_eq!(
            controller.try_fire(&second).await.unwrap(),
            Gate::Suppressed(Suppression::LostRace)
        );
    }

    #[tokio::test]
    async fn test_one_time_disables() {
        let (store, clock, controller) = setup(threshold_alert().with_one_time(true), 5_000);

        let alert = store.get("a1").unwrap();
        assert_eq!(
            controller.try_fire(&alert).await.unwrap(),
            Gate::Fire {
                triggered_at: 5_000,
                disabled: true
            }
        );
        assert!(!store.get("a1").unwrap().active);

        clock.set(1_000_000);
        let alert = store.get("a1").unwrap();
        assert_eq!(
            controller.try_fire(&alert).await.unwrap(),
            Gate::Suppressed(Suppression::Disabled)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fires_single_winner() {
        let (store, _clock, controller) = setup(threshold_alert(), 42_000);
        let controller = Arc::new(controller);
        let alert = store.get("a1").unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let controller = Arc::clone(&controller);
                let alert = alert.clone();
                tokio::spawn(async move { controller.try_fire(&alert).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if let Gate::Fire { .. } = task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_storage_error_propagates() {
        let (store, _clock, controller) = setup(threshold_alert(), 1_000);
        let alert = store.get("a1").unwrap();
        store.remove("a1");

        assert!(matches!(
            controller.try_fire(&alert).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
