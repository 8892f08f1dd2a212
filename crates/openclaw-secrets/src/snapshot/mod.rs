pub mod activator;
pub mod builder;

pub use activator::{ActivationEvent, ActivationPhase, SnapshotActivator, EVENT_DEGRADED, EVENT_RECOVERED};
pub use builder::{prepare_snapshot, AuthStoreLoader, SnapshotBuildInput};
