//! Gateway protocol types
//!
//! Payloads carried by each event.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::submission::FieldError;

/// Milliseconds since the Unix epoch, the timestamp unit on the wire
pub fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Events
// ============================================================================

/// Event names
pub mod events {
    /// Client asks for its session id
    pub const INIT: &str = "init";
    /// Session id, answer to `init`
    pub const INIT_SEND_UUID: &str = "init_send_uuid";
    /// Client submits an exercise
    pub const SUBMIT_EXERCISE: &str = "submit_exercise";
    /// Submission payload failed validation
    pub const FAILED_TO_SUBMIT_EXERCISE: &str = "failed_to_submit_exercise";
    /// Submission accepted, sent before any sandbox work
    pub const EXERCISE_SUBMITTED: &str = "exercise_submitted";
    /// Provisioning or execution failed
    pub const EXERCISE_RUNTIME_ERROR: &str = "exercise_runtime_error";
    /// Run finished successfully (opt-in)
    pub const EXERCISE_COMPLETED: &str = "exercise_completed";
    /// Worker pool full
    pub const EXERCISE_REJECTED: &str = "exercise_rejected";
    /// Unknown event or undecodable frame
    pub const PROTOCOL_ERROR: &str = "protocol_error";
}

// ============================================================================
// Session
// ============================================================================

/// Answer to `init`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    /// Session identifier
    pub user_id: Uuid,
}

// ============================================================================
// Submissions
// ============================================================================

/// Validation failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationFailedPayload {
    /// One entry per violated field
    pub errors: Vec<FieldError>,
}

/// Acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedPayload {
    /// Server-assigned submission id
    pub submission_id: Uuid,
    /// Milliseconds since epoch
    pub timestamp: i64,
}

/// Terminal failure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeErrorPayload {
    /// Submission id
    pub submission_id: Uuid,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Failure class: provisioning, execution or timeout
    pub reason: String,
}

/// Terminal success
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPayload {
    /// Submission id
    pub submission_id: Uuid,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Exit status of the command
    pub exit_code: i64,
}

/// Capacity rejection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedPayload {
    /// Why the submission was refused
    pub reason: String,
    /// Milliseconds since epoch
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payloads_use_camel_case() {
        let payload = SubmittedPayload {
            submission_id: Uuid::nil(),
            timestamp: 1,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("submissionId").is_some());

        let init = serde_json::to_value(InitPayload { user_id: Uuid::nil() }).unwrap();
        assert!(init.get("userId").is_some());
    }

    #[test]
    fn test_timestamp_is_millis() {
        // anything after 2020-01-01 in milliseconds
        assert!(timestamp_millis() > 1_577_836_800_000);
    }
}
