//! External-tool driver: a typed façade over an opaque subprocess runner
//! that decrypts/encrypts a JSON document through the `sops` binary.

pub mod driver;
pub mod runner;

pub use driver::{ToolDriver, MIN_OUTPUT_BYTES};
pub use runner::{CommandOutput, RunError, SubprocessRunner, TokioSubprocessRunner};
