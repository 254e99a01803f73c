//! Sandbox record and lifecycle state machine

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Lifecycle state of a sandbox container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxState {
    Created,
    Started,
    Stopped,
    Removed,
    Failed,
}

impl SandboxState {
    /// Removed and Failed are final
    pub fn is_terminal(self) -> bool {
        matches!(self, SandboxState::Removed | SandboxState::Failed)
    }

    /// Forward-only transition table. Teardown may skip straight to
    /// Stopped or Removed when an earlier step never happened.
    fn allows(self, next: SandboxState) -> bool {
        use SandboxState::*;
        match (self, next) {
            (Created, Started | Stopped | Removed) => true,
            (Started, Stopped | Removed) => true,
            (Stopped, Removed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for SandboxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxState::Created => write!(f, "created"),
            SandboxState::Started => write!(f, "started"),
            SandboxState::Stopped => write!(f, "stopped"),
            SandboxState::Removed => write!(f, "removed"),
            SandboxState::Failed => write!(f, "failed"),
        }
    }
}

/// One sandbox, owned by the provisioner for a single submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    name: String,
    image: String,
    state: SandboxState,
}

impl Sandbox {
    /// Deterministic container name for a submission
    pub fn name_for(prefix: &str, submission_id: Uuid) -> String {
        format!("{}{}", prefix, submission_id)
    }

    /// Record a sandbox the engine has just created
    pub fn created(prefix: &str, submission_id: Uuid, image: impl Into<String>) -> Self {
        Sandbox {
            name: Self::name_for(prefix, submission_id),
            image: image.into(),
            state: SandboxState::Created,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    /// Apply a transition; invalid ones leave the state untouched
    pub fn advance(&mut self, next: SandboxState) -> Result<()> {
        if !self.state.allows(next) {
            return Err(Error::Protocol(format!(
                "sandbox {}: cannot go from {} to {}",
                self.name, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}
