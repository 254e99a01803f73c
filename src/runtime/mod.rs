//! Runtime client - the container engine capability
//!
//! The provisioner, the health endpoint and the startup bootstrap all talk to
//! the engine through [`ContainerRuntime`]. Production uses the Docker
//! implementation; tests inject a scripted fake.

mod docker;
#[cfg(test)]
pub(crate) mod fake;

pub use docker::DockerRuntime;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Engine identification returned by `version`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineVersion {
    /// Engine release, absent when the engine did not report one
    pub version: Option<String>,
    /// API version
    pub api_version: Option<String>,
    /// Host operating system
    pub os: Option<String>,
    /// Host architecture
    pub arch: Option<String>,
}

/// Everything needed to create one sandbox container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    /// Container name
    pub name: String,
    /// Image tag
    pub image: String,
    /// Command to run
    pub command: Vec<String>,
    /// Network access disabled
    pub network_disabled: bool,
    /// Capture stdout
    pub attach_stdout: bool,
    /// Capture stderr
    pub attach_stderr: bool,
    /// Keep stdin open
    pub open_stdin: bool,
    /// Allocate a TTY
    pub tty: bool,
}

impl SandboxSpec {
    /// Isolated spec: no network, output captured, no stdin, no TTY
    pub fn isolated(name: impl Into<String>, image: impl Into<String>, command: Vec<String>) -> Self {
        SandboxSpec {
            name: name.into(),
            image: image.into(),
            command,
            network_disabled: true,
            attach_stdout: true,
            attach_stderr: true,
            open_stdin: false,
            tty: false,
        }
    }
}

/// A piece of output from an attached sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

impl OutputChunk {
    /// Stream label used in logs
    pub fn stream(&self) -> &'static str {
        match self {
            OutputChunk::Stdout(_) => "stdout",
            OutputChunk::Stderr(_) => "stderr",
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            OutputChunk::Stdout(b) | OutputChunk::Stderr(b) => b,
        }
    }
}

/// Live output of an attached sandbox; ends when the container exits
pub type OutputStream = BoxStream<'static, Result<OutputChunk>>;

/// Container engine operations
///
/// Implementations are shared across every in-flight submission, so all
/// methods take `&self`. Each submission works on its own uniquely named
/// container; no call needs coordination with another.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> &str;

    /// Raw ping response (`OK` when healthy)
    async fn ping(&self) -> Result<String>;

    /// Engine version information
    async fn version(&self) -> Result<EngineVersion>;

    /// Pull an image tag into the local store
    async fn pull(&self, tag: &str) -> Result<()>;

    /// Create a container without starting it
    async fn create(&self, spec: &SandboxSpec) -> Result<()>;

    /// Start a created container
    async fn start(&self, name: &str) -> Result<()>;

    /// Attach to stdout/stderr
    async fn attach(&self, name: &str) -> Result<OutputStream>;

    /// Wait until the container stops and return its exit code
    async fn wait(&self, name: &str) -> Result<i64>;

    /// Stop a container
    async fn stop(&self, name: &str) -> Result<()>;

    /// Remove a container, forcing if still running
    async fn remove(&self, name: &str) -> Result<()>;

    /// Names of all containers (any state) starting with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_spec() {
        let spec = SandboxSpec::isolated("sointu-1", "python:3", vec!["true".to_string()]);
        assert!(spec.network_disabled);
        assert!(spec.attach_stdout && spec.attach_stderr);
        assert!(!spec.open_stdin);
        assert!(!spec.tty);
    }

    #[test]
    fn test_output_chunk_accessors() {
        let chunk = OutputChunk::Stderr(b"boom".to_vec());
        assert_eq!(chunk.stream(), "stderr");
        assert_eq!(chunk.bytes(), b"boom");
    }
}
