//! Sandbox module - Ephemeral, network-less containers per submission
//!
//! - state.rs: the sandbox record and its forward-only lifecycle
//! - provisioner.rs: create → start → wait → stop → remove with guaranteed teardown

mod provisioner;
mod state;

pub use provisioner::{
    ExecutionPlan, FailureReason, ProvisionOutcome, Provisioner, ProvisionerSettings,
};
pub use state::{Sandbox, SandboxState};
