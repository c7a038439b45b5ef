//! Uniform success/failure envelope returned by every pipeline operation.

use serde::ser::{Serialize, Serializer};
use serde::Deserialize;

use crate::error::{ErrorKind, RagError};

/// Steps of a single request. Any step can short-circuit to assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validating,
    Embedding,
    Retrieving,
    Templating,
    Generating,
    Assembling,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Validating => "validating",
            Stage::Embedding => "embedding",
            Stage::Retrieving => "retrieving",
            Stage::Templating => "templating",
            Stage::Generating => "generating",
            Stage::Assembling => "assembling",
        };
        f.write_str(s)
    }
}

/// A `RagError` tagged with the stage it interrupted.
#[derive(Debug)]
pub struct StageError {
    pub stage: Stage,
    pub error: RagError,
}

pub trait InStage<T> {
    fn in_stage(self, stage: Stage) -> Result<T, StageError>;
}

impl<T> InStage<T> for Result<T, RagError> {
    fn in_stage(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|error| StageError { stage, error })
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct PipelineFailure {
    pub error: String,
    pub error_kind: ErrorKind,
    pub retryable: bool,
    pub stage: Stage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult<T> {
    Success(T),
    Failure(PipelineFailure),
}

impl<T> PipelineResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success(_))
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            PipelineResult::Success(p) => Some(p),
            PipelineResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&PipelineFailure> {
        match self {
            PipelineResult::Success(_) => None,
            PipelineResult::Failure(f) => Some(f),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failure().map(|f| f.error_kind)
    }

    pub fn into_result(self) -> Result<T, PipelineFailure> {
        match self {
            PipelineResult::Success(p) => Ok(p),
            PipelineResult::Failure(f) => Err(f),
        }
    }
}

/// Close out a request: successes pass through, failures become a
/// structured record and are logged once here.
pub fn assemble<T>(operation: &'static str, outcome: Result<T, StageError>) -> PipelineResult<T> {
    match outcome {
        Ok(payload) => {
            tracing::debug!(operation, stage = %Stage::Assembling, "Pipeline succeeded");
            PipelineResult::Success(payload)
        }
        Err(StageError { stage, error }) => {
            tracing::warn!(
                operation,
                stage = %stage,
                error_kind = %error.kind(),
                retryable = error.is_retryable(),
                "Pipeline failed: {}",
                error
            );
            PipelineResult::Failure(PipelineFailure {
                error: error.to_string(),
                error_kind: error.kind(),
                retryable: error.is_retryable(),
                stage,
            })
        }
    }
}

#[derive(serde::Serialize)]
struct Tagged<'a, P: Serialize> {
    success: bool,
    #[serde(flatten)]
    body: &'a P,
}

impl<T: Serialize> Serialize for PipelineResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PipelineResult::Success(payload) => Tagged {
                success: true,
                body: payload,
            }
            .serialize(serializer),
            PipelineResult::Failure(failure) => Tagged {
                success: false,
                body: failure,
            }
            .serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatsPayload;
    use serde_json::json;

    #[test]
    fn test_success_is_flattened() {
        let result = assemble(
            "stats",
            Ok(StatsPayload {
                collection: "course_1_mixed".into(),
                document_count: 3,
            }),
        );
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": true, "collection": "course_1_mixed", "document_count": 3})
        );
    }

    #[test]
    fn test_failure_carries_kind_and_stage() {
        let outcome: Result<StatsPayload, StageError> =
            Err(RagError::not_found("course_9_mixed")).in_stage(Stage::Retrieving);
        let result = assemble("stats", outcome);
        assert_eq!(result.error_kind(), Some(ErrorKind::NotFoundError));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error_kind"], json!("NotFoundError"));
        assert_eq!(value["stage"], json!("retrieving"));
        assert_eq!(value["retryable"], json!(false));
        assert!(value["error"].as_str().unwrap().contains("course_9_mixed"));
    }
}
