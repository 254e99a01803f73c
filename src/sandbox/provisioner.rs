//! Sandbox provisioner
//!
//! Takes one submission through create → attach → start → wait → stop → remove.
//! Once `create` succeeds the sandbox is held by a [`SandboxGuard`], so stop and
//! remove are attempted on every exit path, including a dropped future.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::state::{Sandbox, SandboxState};
use crate::error::{Error, Result};
use crate::runtime::{ContainerRuntime, OutputChunk, OutputStream, SandboxSpec};

/// How long buffered output may keep draining once the container is gone
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Image and command for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Image tag, must already be pulled
    pub image: String,
    /// Command executed inside the sandbox
    pub command: Vec<String>,
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Create or start was refused
    Provisioning(String),
    /// Waiting on the command failed
    Execution(String),
    /// Command exited with a non-zero status
    NonZeroExit(i64),
    /// Execution deadline hit
    Timeout(Duration),
}

impl FailureReason {
    /// Coarse class reported to clients
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::Provisioning(_) => "provisioning",
            FailureReason::Execution(_) | FailureReason::NonZeroExit(_) => "execution",
            FailureReason::Timeout(_) => "timeout",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Provisioning(msg) => write!(f, "provisioning failed: {}", msg),
            FailureReason::Execution(msg) => write!(f, "execution failed: {}", msg),
            FailureReason::NonZeroExit(code) => write!(f, "command exited with status {}", code),
            FailureReason::Timeout(d) => write!(f, "timed out after {:?}", d),
        }
    }
}

impl From<Error> for FailureReason {
    fn from(err: Error) -> Self {
        match err {
            Error::Timeout(d) => FailureReason::Timeout(d),
            Error::Execution(msg) => FailureReason::Execution(msg),
            other => FailureReason::Provisioning(other.to_string()),
        }
    }
}

/// Result of one provisioning run, as seen by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Success { exit_code: i64 },
    RuntimeFailure { reason: FailureReason },
}

impl ProvisionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProvisionOutcome::Success { .. })
    }
}

/// Provisioner settings
#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    /// Container name prefix
    pub name_prefix: String,
    /// Maximum run time per sandbox (`None` = unbounded)
    pub execution_timeout: Option<Duration>,
    /// Per-chunk cap on logged output
    pub max_output_bytes: usize,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        ProvisionerSettings {
            name_prefix: "sointu-".to_string(),
            execution_timeout: None,
            max_output_bytes: 64 * 1024,
        }
    }
}

/// Runs submissions in throwaway sandboxes
#[derive(Clone)]
pub struct Provisioner {
    runtime: Arc<dyn ContainerRuntime>,
    settings: ProvisionerSettings,
}

impl Provisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: ProvisionerSettings) -> Self {
        Provisioner { runtime, settings }
    }

    /// Run `plan` for a submission and tear the sandbox down.
    ///
    /// Never returns an error: every failure becomes a `RuntimeFailure`.
    pub async fn run(&self, submission_id: Uuid, plan: &ExecutionPlan) -> ProvisionOutcome {
        let span = info_span!("sandbox", %submission_id);
        self.run_inner(submission_id, plan).instrument(span).await
    }

    async fn run_inner(&self, submission_id: Uuid, plan: &ExecutionPlan) -> ProvisionOutcome {
        let name = Sandbox::name_for(&self.settings.name_prefix, submission_id);
        let spec = SandboxSpec::isolated(&name, &plan.image, plan.command.clone());

        info!("Creating container {} with image '{}'", name, plan.image);
        if let Err(e) = self.runtime.create(&spec).await {
            error!("Failed to create container {}: {}", name, e);
            return ProvisionOutcome::RuntimeFailure {
                reason: FailureReason::Provisioning(e.to_string()),
            };
        }
        info!("Container {} created", name);

        let mut guard = SandboxGuard::new(
            self.runtime.clone(),
            Sandbox::created(&self.settings.name_prefix, submission_id, &plan.image),
        );

        let result = self.execute(&mut guard, submission_id).await;
        let final_state = guard.teardown().await;
        debug!("Container {} finished in state {}", name, final_state);

        match result {
            Ok(0) => ProvisionOutcome::Success { exit_code: 0 },
            Ok(code) => {
                warn!("Container {} exited with status {}", name, code);
                ProvisionOutcome::RuntimeFailure {
                    reason: FailureReason::NonZeroExit(code),
                }
            }
            Err(e) => {
                error!("Run in {} failed: {}", name, e);
                ProvisionOutcome::RuntimeFailure { reason: e.into() }
            }
        }
    }

    /// Attach, start and wait. Returns the exit code.
    async fn execute(&self, guard: &mut SandboxGuard, submission_id: Uuid) -> Result<i64> {
        let name = guard.sandbox.name().to_string();

        match self.runtime.attach(&name).await {
            Ok(stream) => {
                let forward = forward_output(stream, submission_id, self.settings.max_output_bytes);
                guard.forwarder = Some(tokio::spawn(
                    async move {
                        let chunks = forward.await;
                        debug!(chunks, "Output stream closed");
                    }
                    .in_current_span(),
                ));
            }
            Err(e) => warn!("Could not attach to {}: {}", name, e),
        }

        self.runtime
            .start(&name)
            .await
            .map_err(|e| Error::Provisioning(e.to_string()))?;
        guard.sandbox.advance(SandboxState::Started)?;
        info!("Container {} started", name);

        let wait = self.runtime.wait(&name);
        let exit_code = match self.settings.execution_timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                warn!("Container {} exceeded {:?}, stopping", name, limit);
                Error::Timeout(limit)
            })?,
            None => wait.await,
        }
        .map_err(|e| Error::Execution(e.to_string()))?;

        Ok(exit_code)
    }
}

/// Pipe sandbox output into the log. Returns how many chunks were forwarded.
async fn forward_output(mut stream: OutputStream, submission_id: Uuid, max_bytes: usize) -> usize {
    let mut forwarded = 0;
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                let (text, truncated) = render_chunk(&chunk, max_bytes);
                info!(
                    target: "sointu::output",
                    %submission_id,
                    stream = chunk.stream(),
                    truncated,
                    "{}",
                    text
                );
                forwarded += 1;
            }
            Err(e) => {
                warn!(%submission_id, "Output stream error: {}", e);
                break;
            }
        }
    }
    forwarded
}

/// Log line for one chunk, cut to `max_bytes`, and whether it was cut
fn render_chunk(chunk: &OutputChunk, max_bytes: usize) -> (String, bool) {
    let bytes = chunk.bytes();
    let shown = &bytes[..bytes.len().min(max_bytes)];
    let text = String::from_utf8_lossy(shown).trim_end().to_string();
    (text, bytes.len() > max_bytes)
}

/// Owns a created sandbox until it has been torn down
struct SandboxGuard {
    runtime: Arc<dyn ContainerRuntime>,
    sandbox: Sandbox,
    forwarder: Option<JoinHandle<()>>,
    armed: bool,
}

impl SandboxGuard {
    fn new(runtime: Arc<dyn ContainerRuntime>, sandbox: Sandbox) -> Self {
        SandboxGuard {
            runtime,
            sandbox,
            forwarder: None,
            armed: true,
        }
    }

    /// Stop then remove. Failures are logged and never propagated.
    async fn teardown(mut self) -> SandboxState {
        let name = self.sandbox.name().to_string();

        match self.runtime.stop(&name).await {
            Ok(()) => {
                let _ = self.sandbox.advance(SandboxState::Stopped);
                info!("Container {} stopped", name);
            }
            Err(e) => warn!("{}", Error::Teardown(format!("stop {}: {}", name, e))),
        }

        match self.runtime.remove(&name).await {
            Ok(()) => {
                let _ = self.sandbox.advance(SandboxState::Removed);
                info!("Container {} ({}) removed", name, self.sandbox.image());
            }
            Err(e) => {
                let _ = self.sandbox.advance(SandboxState::Failed);
                warn!("{}", Error::Teardown(format!("remove {}: {}", name, e)));
            }
        }
        self.armed = false;

        if let Some(forwarder) = self.forwarder.take() {
            let abort = forwarder.abort_handle();
            if tokio::time::timeout(OUTPUT_DRAIN_GRACE, forwarder).await.is_err() {
                abort.abort();
            }
        }

        self.sandbox.state()
    }
}

impl Drop for SandboxGuard {
    fn drop(&mut self) {
        if let Some(forwarder) = &self.forwarder {
            forwarder.abort();
        }
        if !self.armed {
            return;
        }

        let name = self.sandbox.name().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Run for {} abandoned, scheduling forced removal", name);
                let runtime = self.runtime.clone();
                handle.spawn(async move {
                    if let Err(e) = runtime.remove(&name).await {
                        error!("Forced removal of {} failed: {}", name, e);
                    }
                });
            }
            Err(_) => error!("Run for {} abandoned outside a runtime, container leaked", name),
        }
    }
}
