//! Submission model and payload validation
//!
//! Inbound `submit_exercise` payloads are parsed into a tagged result:
//! either a [`SubmissionRequest`] or one [`FieldError`] per violated field.
//! Nothing downstream ever looks at the raw JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

/// One violated field in a submission payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    /// Field path (`$` for the payload itself)
    pub path: String,
    /// Expected type
    pub expected: String,
    /// What was found instead (`undefined` when missing)
    pub actual: String,
    /// Human-readable message
    pub message: String,
}

impl FieldError {
    fn new(path: &str, expected: &str, actual: String) -> Self {
        let message = format!(
            "Expecting {} at {} but instead got: {}",
            expected, path, actual
        );
        FieldError {
            path: path.to_string(),
            expected: expected.to_string(),
            actual,
            message,
        }
    }

    /// Field is absent
    pub fn missing(path: &str, expected: &str) -> Self {
        Self::new(path, expected, "undefined".to_string())
    }

    /// Field has the wrong type
    pub fn wrong_type(path: &str, expected: &str, actual: &Value) -> Self {
        Self::new(path, expected, actual.to_string())
    }

    /// Payload is not decodable JSON
    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        let mut err = Self::new("$", "JSON object", "malformed JSON".to_string());
        err.message = format!("Malformed payload: {}", reason);
        err
    }
}

/// A decoded, well-typed submission request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    /// Opaque user identifier
    pub user_id: String,
    /// Exercise being attempted
    pub exercise_id: i64,
}

/// Outcome of decoding a submission payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated {
    Valid(SubmissionRequest),
    Invalid(Vec<FieldError>),
}

impl Validated {
    /// Convert into a `Result`, mapping field errors to [`Error::Validation`]
    pub fn into_result(self) -> Result<SubmissionRequest> {
        match self {
            Validated::Valid(req) => Ok(req),
            Validated::Invalid(errors) => Err(Error::Validation(errors)),
        }
    }
}

impl SubmissionRequest {
    /// Decode a raw payload.
    ///
    /// Clients send the request serialized as a JSON string; a bare object is
    /// accepted as well. Every field is checked so the client gets the full
    /// list of problems in one round trip.
    pub fn parse(raw: &Value) -> Validated {
        let decoded;
        let payload = match raw {
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => {
                    decoded = value;
                    &decoded
                }
                Err(e) => return Validated::Invalid(vec![FieldError::malformed(e)]),
            },
            other => other,
        };

        let Some(fields) = payload.as_object() else {
            return Validated::Invalid(vec![FieldError::wrong_type(
                "$",
                "JSON object",
                payload,
            )]);
        };

        let mut errors = Vec::new();

        let user_id = match fields.get("userId") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                errors.push(FieldError::wrong_type("userId", "string", other));
                None
            }
            None => {
                errors.push(FieldError::missing("userId", "string"));
                None
            }
        };

        let exercise_id = match fields.get("exerciseId") {
            Some(value) => match as_integer(value) {
                Some(id) => Some(id),
                None => {
                    errors.push(FieldError::wrong_type("exerciseId", "integer", value));
                    None
                }
            },
            None => {
                errors.push(FieldError::missing("exerciseId", "integer"));
                None
            }
        };

        match (user_id, exercise_id) {
            (Some(user_id), Some(exercise_id)) if errors.is_empty() => {
                Validated::Valid(SubmissionRequest {
                    user_id,
                    exercise_id,
                })
            }
            _ => Validated::Invalid(errors),
        }
    }
}

/// Accept integral JSON numbers, including `5.0`
fn as_integer(value: &Value) -> Option<i64> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(i) = number.as_i64() {
        return Some(i);
    }
    let f = number.as_f64()?;
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Protocol state of a single submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Received,
    Validated,
    Acknowledged,
    Executing,
    Completed,
    Failed,
}

impl SubmissionStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionStatus::Completed | SubmissionStatus::Failed)
    }

    fn can_advance_to(self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        matches!(
            (self, next),
            (Received, Validated)
                | (Validated, Acknowledged)
                // capacity rejection before acknowledgement
                | (Validated, Failed)
                | (Acknowledged, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubmissionStatus::Received => "received",
            SubmissionStatus::Validated => "validated",
            SubmissionStatus::Acknowledged => "acknowledged",
            SubmissionStatus::Executing => "executing",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A validated submission
///
/// Everything except `status` is fixed at construction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    submission_id: Uuid,
    user_id: String,
    exercise_id: i64,
    created_at: DateTime<Utc>,
    status: SubmissionStatus,
}

impl Submission {
    /// Build a submission from a validated request, assigning a fresh id
    pub fn new(request: SubmissionRequest) -> Self {
        Submission {
            submission_id: Uuid::new_v4(),
            user_id: request.user_id,
            exercise_id: request.exercise_id,
            created_at: Utc::now(),
            status: SubmissionStatus::Validated,
        }
    }

    pub fn id(&self) -> Uuid {
        self.submission_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn exercise_id(&self) -> i64 {
        self.exercise_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    /// Move to the next protocol state; backwards or skipping moves are rejected
    pub fn advance(&mut self, next: SubmissionStatus) -> Result<()> {
        if !self.status.can_advance_to(next) {
            return Err(Error::Protocol(format!(
                "submission {}: cannot go from {} to {}",
                self.submission_id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invalid_paths(validated: Validated) -> Vec<String> {
        match validated {
            Validated::Invalid(errors) => errors.into_iter().map(|e| e.path).collect(),
            Validated::Valid(req) => panic!("expected invalid, got {:?}", req),
        }
    }

    #[test]
    fn test_parse_serialized_payload() {
        let raw = json!(r#"{"userId":"u1","exerciseId":5}"#);
        assert_eq!(
            SubmissionRequest::parse(&raw),
            Validated::Valid(SubmissionRequest {
                user_id: "u1".to_string(),
                exercise_id: 5,
            })
        );
    }

    #[test]
    fn test_parse_object_payload() {
        let raw = json!({"userId": "u1", "exerciseId": 7.0});
        let req = SubmissionRequest::parse(&raw).into_result().unwrap();
        assert_eq!(req.exercise_id, 7);
    }

    #[test]
    fn test_wrong_type_exercise_id() {
        let raw = json!({"userId": "u1", "exerciseId": "five"});
        let validated = SubmissionRequest::parse(&raw);
        let Validated::Invalid(errors) = validated else {
            panic!("expected invalid");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "exerciseId");
        assert_eq!(errors[0].actual, "\"five\"");
        assert!(errors[0].message.contains("exerciseId"));
    }

    #[test]
    fn test_fractional_exercise_id_rejected() {
        let raw = json!({"userId": "u1", "exerciseId": 5.5});
        assert_eq!(invalid_paths(SubmissionRequest::parse(&raw)), vec!["exerciseId"]);
    }

    #[test]
    fn test_all_missing_fields_reported() {
        let raw = json!({});
        assert_eq!(
            invalid_paths(SubmissionRequest::parse(&raw)),
            vec!["userId", "exerciseId"]
        );
    }

    #[test]
    fn test_wrong_user_id_type() {
        let raw = json!({"userId": 42, "exerciseId": 1});
        assert_eq!(invalid_paths(SubmissionRequest::parse(&raw)), vec!["userId"]);
    }

    #[test]
    fn test_malformed_json() {
        let raw = json!("{userId: nope");
        assert_eq!(invalid_paths(SubmissionRequest::parse(&raw)), vec!["$"]);
    }

    #[test]
    fn test_non_object_payload() {
        let raw = json!([1, 2, 3]);
        assert_eq!(invalid_paths(SubmissionRequest::parse(&raw)), vec!["$"]);
    }

    #[test]
    fn test_submission_ids_are_v4_and_distinct() {
        let req = SubmissionRequest {
            user_id: "u1".to_string(),
            exercise_id: 1,
        };
        let a = Submission::new(req.clone());
        let b = Submission::new(req);
        assert_eq!(a.id().get_version_num(), 4);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.status(), SubmissionStatus::Validated);
    }

    #[test]
    fn test_status_advances_forward_only() {
        let mut sub = Submission::new(SubmissionRequest {
            user_id: "u1".to_string(),
            exercise_id: 1,
        });
        sub.advance(SubmissionStatus::Acknowledged).unwrap();
        sub.advance(SubmissionStatus::Executing).unwrap();
        assert!(sub.advance(SubmissionStatus::Acknowledged).is_err());
        sub.advance(SubmissionStatus::Failed).unwrap();
        assert!(sub.status().is_terminal());
        assert!(sub.advance(SubmissionStatus::Completed).is_err());
    }

    #[test]
    fn test_out_of_range_float_is_rejected() {
        assert_eq!(as_integer(&json!(5.0)), Some(5));
        assert_eq!(as_integer(&json!(-9223372036854775808.0_f64)), Some(i64::MIN));
        assert_eq!(as_integer(&json!(9223372036854775808.0_f64)), None);

        let payload = json!({"userId": "u1", "exerciseId": 9223372036854775808.0_f64});
        assert!(matches!(SubmissionRequest::parse(&payload), Validated::Invalid(_)));
    }
}
