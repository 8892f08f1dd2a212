//! Process-wide snapshot activator: a single mutable slot
//! holding the active [`RuntimeSnapshot`] plus a `degraded` flag, swapped
//! atomically on every activation and retained as last-known-good across
//! failed runtime reloads.

use std::sync::{Mutex, OnceLock};

use openclaw_secrets_core::RuntimeSnapshot;
use tokio::sync::broadcast;

pub const EVENT_DEGRADED: &str = "SECRETS_RELOADER_DEGRADED";
pub const EVENT_RECOVERED: &str = "SECRETS_RELOADER_RECOVERED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationEvent {
    Degraded,
    Recovered,
}

/// Which trigger is calling `activate`: startup preflight/final failures are
/// fatal and never mark the activator degraded, while a failed config-reload
/// or `secrets.reload` RPC keeps serving the last-known-good snapshot and
/// raises `degraded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationPhase {
    Startup,
    Runtime,
}

struct ActivatorState {
    active: Option<RuntimeSnapshot>,
    degraded: bool,
}

pub struct SnapshotActivator {
    state: Mutex<ActivatorState>,
    events: broadcast::Sender<ActivationEvent>,
}

impl SnapshotActivator {
    fn new() -> Self {
        let (events, _receiver) = broadcast::channel(32);
        Self { state: Mutex::new(ActivatorState { active: None, degraded: false }), events }
    }

    /// The process-wide singleton instance.
    pub fn global() -> &'static SnapshotActivator {
        static INSTANCE: OnceLock<SnapshotActivator> = OnceLock::new();
        INSTANCE.get_or_init(SnapshotActivator::new)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivationEvent> {
        self.events.subscribe()
    }

    /// Applies an activation outcome. The state mutex is the serialization
    /// point that makes `activate` linearizable: whichever caller acquires
    /// it last wins the swap, and degraded/recovered transitions fire at
    /// most once per state change.
    pub fn activate(
        &self,
        phase: ActivationPhase,
        outcome: Result<RuntimeSnapshot, anyhow::Error>,
    ) -> Result<(), anyhow::Error> {
        let mut state = self.state.lock().expect("activator mutex poisoned");
        match outcome {
            Ok(snapshot) => {
                let was_degraded = state.degraded;
                let newer = state
                    .active
                    .as_ref()
                    .map(|active| snapshot.resolved_at >= active.resolved_at)
                    .unwrap_or(true);
                if newer {
                    state.active = Some(snapshot);
                }
                state.degraded = false;
                drop(state);
                if was_degraded {
                    let _ = self.events.send(ActivationEvent::Recovered);
                }
                Ok(())
            }
            Err(err) => match phase {
                ActivationPhase::Startup => Err(err),
                ActivationPhase::Runtime => {
                    let was_degraded = state.degraded;
                    state.degraded = true;
                    drop(state);
                    if !was_degraded {
                        let _ = self.events.send(ActivationEvent::Degraded);
                    }
                    Err(err)
                }
            },
        }
    }

    pub fn get_active(&self) -> Option<RuntimeSnapshot> {
        self.state.lock().expect("activator mutex poisoned").active.clone()
    }

    pub fn is_degraded(&self) -> bool {
        self.state.lock().expect("activator mutex poisoned").degraded
    }

    /// Resets the slot to its pre-activation state. Test-only: production
    /// code never clears an activated snapshot.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("activator mutex poisoned");
        state.active = None;
        state.degraded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(resolved_at: i128) -> RuntimeSnapshot {
        RuntimeSnapshot {
            config: json!({}),
            auth_stores: Vec::new(),
            warnings: Vec::new(),
            resolved_at,
        }
    }

    #[test]
    fn startup_failure_leaves_no_active_snapshot() {
        let activator = SnapshotActivator::new();
        let err = activator
            .activate(ActivationPhase::Startup, Err(anyhow::anyhow!("boom")))
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(activator.get_active().is_none());
        assert!(!activator.is_degraded());
    }

    #[test]
    fn runtime_failure_keeps_previous_snapshot_and_marks_degraded_once() {
        let activator = SnapshotActivator::new();
        activator.activate(ActivationPhase::Startup, Ok(snapshot(1))).unwrap();

        let mut events = activator.subscribe();
        activator
            .activate(ActivationPhase::Runtime, Err(anyhow::anyhow!("decrypt failed")))
            .unwrap_err();
        assert!(activator.is_degraded());
        assert_eq!(activator.get_active().unwrap().resolved_at, 1);
        assert_eq!(events.try_recv().unwrap(), ActivationEvent::Degraded);

        // A second failure while already degraded does not re-emit.
        activator
            .activate(ActivationPhase::Runtime, Err(anyhow::anyhow!("still broken")))
            .unwrap_err();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn successful_reload_clears_degraded_and_emits_recovered_once() {
        let activator = SnapshotActivator::new();
        activator.activate(ActivationPhase::Startup, Ok(snapshot(1))).unwrap();
        activator
            .activate(ActivationPhase::Runtime, Err(anyhow::anyhow!("fail")))
            .unwrap_err();
        assert!(activator.is_degraded());

        let mut events = activator.subscribe();
        activator.activate(ActivationPhase::Runtime, Ok(snapshot(2))).unwrap();
        assert!(!activator.is_degraded());
        assert_eq!(activator.get_active().unwrap().resolved_at, 2);
        assert_eq!(events.try_recv().unwrap(), ActivationEvent::Recovered);
    }

    #[test]
    fn concurrent_activation_keeps_the_newer_snapshot() {
        let activator = SnapshotActivator::new();
        activator.activate(ActivationPhase::Runtime, Ok(snapshot(5))).unwrap();
        // A stale, slower activation completing after a newer one must not
        // regress the active slot.
        activator.activate(ActivationPhase::Runtime, Ok(snapshot(3))).unwrap();
        assert_eq!(activator.get_active().unwrap().resolved_at, 5);
    }
}
