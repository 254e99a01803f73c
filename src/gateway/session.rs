//! Session handling - one per WebSocket connection
//!
//! Translates inbound frames into submissions and submissions' outcomes back
//! into events. The acknowledgement for a submission is written to the client
//! before its sandbox is created; provisioning then runs in its own task so
//! the session keeps reading frames. Every run is tracked by the [`Gateway`]
//! so shutdown can wait for in-flight sandboxes and reap what is left.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::pool::{Admission, Slot, Waiter, WorkerPool};
use super::protocol::{
    events, timestamp_millis, ClientFrame, CompletedPayload, EventFrame, InitPayload,
    ProtocolError, RejectedPayload, RuntimeErrorPayload, SubmittedPayload,
    ValidationFailedPayload,
};
use crate::bootstrap::reap_sandboxes;
use crate::config::{Config, ProtocolConfig, SandboxConfig};
use crate::error::Result;
use crate::runtime::ContainerRuntime;
use crate::sandbox::{ProvisionOutcome, Provisioner};
use crate::submission::{Submission, SubmissionRequest, SubmissionStatus, Validated};

/// Where a session's outbound events go
///
/// `emit` resolves once the frame has been handed to the transport.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, frame: EventFrame) -> Result<()>;
}

/// State shared by every session
pub struct Gateway {
    runtime: Arc<dyn ContainerRuntime>,
    provisioner: Provisioner,
    sandbox: SandboxConfig,
    protocol: ProtocolConfig,
    pool: WorkerPool,
    runs: TaskTracker,
}

impl Gateway {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &Config) -> Self {
        Gateway {
            provisioner: Provisioner::new(runtime.clone(), config.sandbox.provisioner_settings()),
            runtime,
            sandbox: config.sandbox.clone(),
            protocol: config.protocol.clone(),
            pool: WorkerPool::new(&config.pool),
            runs: TaskTracker::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Provisioning runs not yet finished, queued ones included
    pub fn runs_in_flight(&self) -> usize {
        self.runs.len()
    }

    /// Stop accepting runs, give in-flight ones `grace` to finish, then
    /// remove any sandbox still carrying the name prefix.
    pub async fn shutdown(&self, grace: Duration) {
        self.runs.close();
        info!(in_flight = self.runs.len(), "Draining sandbox runs");

        if tokio::time::timeout(grace, self.runs.wait()).await.is_err() {
            warn!(
                in_flight = self.runs.len(),
                "Runs still active after {:?}, removing their sandboxes", grace
            );
        }

        match reap_sandboxes(self.runtime.as_ref(), &self.sandbox.name_prefix).await {
            Ok(0) => debug!("No sandboxes left behind"),
            Ok(n) => info!(removed = n, "Removed sandboxes left at shutdown"),
            Err(e) => warn!("Sandbox sweep failed at shutdown: {}", e),
        }
    }

    /// Provision a submission and report the outcome to its session
    async fn execute(&self, mut submission: Submission, sink: Arc<dyn EventSink>, _slot: Slot) {
        advance_or_log(&mut submission, SubmissionStatus::Executing);
        let plan = self.sandbox.plan_for(submission.exercise_id());
        let outcome = self.provisioner.run(submission.id(), &plan).await;
        self.on_provision_result(submission, outcome, sink.as_ref()).await;
    }

    async fn on_provision_result(
        &self,
        mut submission: Submission,
        outcome: ProvisionOutcome,
        sink: &dyn EventSink,
    ) {
        let submission_id = submission.id();
        let frame = match outcome {
            ProvisionOutcome::Success { exit_code } => {
                advance_or_log(&mut submission, SubmissionStatus::Completed);
                info!(%submission_id, "Submission completed");
                if !self.protocol.emit_completion_event {
                    return;
                }
                EventFrame::new(
                    events::EXERCISE_COMPLETED,
                    CompletedPayload {
                        submission_id,
                        timestamp: timestamp_millis(),
                        exit_code,
                    },
                )
            }
            ProvisionOutcome::RuntimeFailure { reason } => {
                advance_or_log(&mut submission, SubmissionStatus::Failed);
                warn!(%submission_id, "Submission failed: {}", reason);
                EventFrame::new(
                    events::EXERCISE_RUNTIME_ERROR,
                    RuntimeErrorPayload {
                        submission_id,
                        timestamp: timestamp_millis(),
                        reason: reason.kind().to_string(),
                    },
                )
            }
        };

        if let Err(e) = sink.emit(frame).await {
            debug!(%submission_id, "Dropping terminal event, session gone: {}", e);
        }
    }
}

/// One connected client
pub struct Session {
    id: Uuid,
    gateway: Arc<Gateway>,
    sink: Arc<dyn EventSink>,
}

impl Session {
    /// Register a new connection and assign its id
    pub fn connect(gateway: Arc<Gateway>, sink: Arc<dyn EventSink>) -> Self {
        let id = Uuid::new_v4();
        debug!(session_id = %id, "Session connected");
        Session { id, gateway, sink }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Handle one text frame from the client
    pub async fn handle_text(&self, text: &str) -> Result<Option<JoinHandle<()>>> {
        match ClientFrame::decode(text) {
            Ok(frame) => self.handle_frame(frame).await,
            Err(e) => {
                self.protocol_error(ProtocolError::parse_error(e.to_string())).await?;
                Ok(None)
            }
        }
    }

    /// Handle one decoded frame.
    ///
    /// Returns the provisioning task when a submission was dispatched.
    pub async fn handle_frame(&self, frame: ClientFrame) -> Result<Option<JoinHandle<()>>> {
        match frame.event.as_str() {
            events::INIT => {
                self.on_init().await?;
                Ok(None)
            }
            events::SUBMIT_EXERCISE => self.on_submit(&frame.data).await,
            other => {
                self.protocol_error(ProtocolError::unknown_event(other)).await?;
                Ok(None)
            }
        }
    }

    pub(crate) async fn protocol_error(&self, error: ProtocolError) -> Result<()> {
        debug!(session_id = %self.id, "Protocol error: {}", error.message);
        self.sink
            .emit(EventFrame::new(events::PROTOCOL_ERROR, error))
            .await
    }

    async fn on_init(&self) -> Result<()> {
        self.sink
            .emit(EventFrame::new(
                events::INIT_SEND_UUID,
                InitPayload { user_id: self.id },
            ))
            .await
    }

    async fn on_submit(&self, raw: &Value) -> Result<Option<JoinHandle<()>>> {
        let request = match SubmissionRequest::parse(raw) {
            Validated::Valid(request) => request,
            Validated::Invalid(errors) => {
                debug!(session_id = %self.id, errors = errors.len(), "Rejected invalid submission");
                self.sink
                    .emit(EventFrame::new(
                        events::FAILED_TO_SUBMIT_EXERCISE,
                        ValidationFailedPayload { errors },
                    ))
                    .await?;
                return Ok(None);
            }
        };

        debug!(
            user_id = %request.user_id,
            exercise_id = request.exercise_id,
            "Received submission for exercise"
        );
        let mut submission = Submission::new(request);
        debug!(submission_id = %submission.id(), "Created new submission");

        match self.gateway.pool.try_admit() {
            Admission::Granted(slot) => {
                acknowledge(&mut submission, self.sink.as_ref()).await?;
                Ok(Some(self.dispatch(submission, slot)))
            }
            Admission::Queued(waiter) => {
                debug!(submission_id = %submission.id(), "Worker pool full, queueing");
                let sink = self.sink.clone();
                Ok(Some(self.dispatch_after(submission, waiter, sink)))
            }
            Admission::Rejected => {
                advance_or_log(&mut submission, SubmissionStatus::Failed);
                self.sink
                    .emit(EventFrame::new(
                        events::EXERCISE_REJECTED,
                        RejectedPayload {
                            reason: "capacity".to_string(),
                            timestamp: timestamp_millis(),
                        },
                    ))
                    .await?;
                Ok(None)
            }
        }
    }

    /// Spawn the run on an already granted slot
    fn dispatch(&self, submission: Submission, slot: Slot) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let sink = self.sink.clone();
        self.gateway
            .runs
            .spawn(async move { gateway.execute(submission, sink, slot).await })
    }

    /// Queue for a slot, acknowledge when granted, then run
    fn dispatch_after(
        &self,
        mut submission: Submission,
        waiter: Waiter,
        sink: Arc<dyn EventSink>,
    ) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        self.gateway.runs.spawn(async move {
            let slot = match waiter.acquire().await {
                Ok(slot) => slot,
                Err(e) => {
                    warn!(submission_id = %submission.id(), "Queued submission dropped: {}", e);
                    return;
                }
            };
            if let Err(e) = acknowledge(&mut submission, sink.as_ref()).await {
                debug!(submission_id = %submission.id(), "Session gone before ack: {}", e);
                return;
            }
            gateway.execute(submission, sink, slot).await;
        })
    }
}

/// Apply a status transition; a refused one is logged and leaves the status as is
fn advance_or_log(submission: &mut Submission, next: SubmissionStatus) -> bool {
    match submission.advance(next) {
        Ok(()) => true,
        Err(e) => {
            debug!(submission_id = %submission.id(), "Status not advanced: {}", e);
            false
        }
    }
}

/// Emit `exercise_submitted` and mark the submission acknowledged
async fn acknowledge(submission: &mut Submission, sink: &dyn EventSink) -> Result<()> {
    sink.emit(EventFrame::new(
        events::EXERCISE_SUBMITTED,
        SubmittedPayload {
            submission_id: submission.id(),
            timestamp: timestamp_millis(),
        },
    ))
    .await?;
    submission.advance(SubmissionStatus::Acknowledged)
}
