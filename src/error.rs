//! Error handling for the model runner
//!
//! This module provides a unified error handling system with proper error mapping
//! to HTTP status codes and structured error responses.

use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the model runner
#[derive(Error, Debug)]
pub enum RunnerError {
    /// More than one candidate model artifact was found in the code directory
    #[error("Multiple candidate model artifacts found: {}", candidates.join(", "))]
    ArtifactAmbiguous { candidates: Vec<String> },

    /// No model artifact was found and no load hook can take its place
    #[error("No model artifact found in {code_dir} and no load hook was provided")]
    ArtifactMissing { code_dir: String },

    /// Artifact extension is not claimed by any registered loader
    #[error("No registered loader supports artifact {artifact}")]
    UnsupportedArtifact { artifact: String },

    /// Model loading failed (artifact unreadable, load hook raised, ...)
    #[error("Model load failed: {message}")]
    ModelLoad { message: String },

    /// A user hook raised during pipeline execution
    #[error("Hook {stage} failed: {message}")]
    Hook { stage: String, message: String },

    /// Final predictions do not match the shape required by the target type
    #[error("Prediction output failed validation: {message}")]
    OutputShape { message: String },

    /// Declared content type could not be resolved to a known encoding
    #[error("Content type could not be resolved: {message}")]
    ContentType { message: String },

    /// Request payload is malformed or unparseable
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal server errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Error response structure for API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    pub error_type: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl RunnerError {
    /// Create a model load error
    pub fn model_load<S: Into<String>>(message: S) -> Self {
        Self::ModelLoad {
            message: message.into(),
        }
    }

    /// Create a hook execution error for the given pipeline stage
    pub fn hook<S: Into<String>, M: Into<String>>(stage: S, message: M) -> Self {
        Self::Hook {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create an output validation error
    pub fn output_shape<S: Into<String>>(message: S) -> Self {
        Self::OutputShape {
            message: message.into(),
        }
    }

    /// Create a content type resolution error
    pub fn content_type<S: Into<String>>(message: S) -> Self {
        Self::ContentType {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Pipeline stage this error is attributed to, if any
    pub fn stage(&self) -> Option<&str> {
        match self {
            RunnerError::Hook { stage, .. } => Some(stage),
            RunnerError::OutputShape { .. } => Some("output_validation"),
            _ => None,
        }
    }

    /// Convert to an error response for API
    pub fn to_error_response(&self) -> ErrorResponse {
        let (error_type, code) = match self {
            RunnerError::ArtifactAmbiguous { .. } => ("artifact_error", "ARTIFACT_AMBIGUOUS"),
            RunnerError::ArtifactMissing { .. } => ("artifact_error", "ARTIFACT_MISSING"),
            RunnerError::UnsupportedArtifact { .. } => ("artifact_error", "ARTIFACT_UNSUPPORTED"),
            RunnerError::ModelLoad { .. } => ("model_load_error", "MODEL_LOAD_FAILED"),
            RunnerError::Hook { .. } => ("hook_error", "HOOK_FAILED"),
            RunnerError::OutputShape { .. } => ("output_shape_error", "OUTPUT_INVALID"),
            RunnerError::ContentType { .. } => ("content_type_error", "CONTENT_TYPE_UNRESOLVED"),
            RunnerError::InvalidInput { .. } => ("invalid_input_error", "INVALID_INPUT"),
            RunnerError::Config { .. } => ("config_error", "CONFIG_ERROR"),
            RunnerError::Internal { .. } => ("internal_error", "INTERNAL_ERROR"),
            RunnerError::Io(_) => ("io_error", "IO_ERROR"),
            RunnerError::Serde(_) => ("serialization_error", "SERIALIZATION_ERROR"),
        };

        ErrorResponse {
            error: ErrorDetails {
                message: self.to_string(),
                error_type: error_type.to_string(),
                code: code.to_string(),
                stage: self.stage().map(|s| s.to_string()),
            },
        }
    }
}

impl ResponseError for RunnerError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            RunnerError::InvalidInput { .. } | RunnerError::ContentType { .. } => {
                actix_web::http::StatusCode::UNPROCESSABLE_ENTITY
            }
            // Convention inherited from the platform this runner plugs into:
            // a model that cannot be brought up answers 513.
            RunnerError::ModelLoad { .. } => actix_web::http::StatusCode::from_u16(513)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            RunnerError::ArtifactAmbiguous { .. }
            | RunnerError::ArtifactMissing { .. }
            | RunnerError::UnsupportedArtifact { .. }
            | RunnerError::Hook { .. }
            | RunnerError::OutputShape { .. }
            | RunnerError::Config { .. }
            | RunnerError::Internal { .. }
            | RunnerError::Io(_)
            | RunnerError::Serde(_) => actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.to_error_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = RunnerError::config("Test config error");
        assert!(error.to_string().contains("Test config error"));

        let error = RunnerError::invalid_input("Invalid parameter");
        assert!(error.to_string().contains("Invalid parameter"));
    }

    #[test]
    fn test_error_response() {
        let error = RunnerError::invalid_input("Test error");
        let response = error.to_error_response();

        assert_eq!(response.error.error_type, "invalid_input_error");
        assert_eq!(response.error.code, "INVALID_INPUT");
        assert!(response.error.message.contains("Test error"));
        assert!(response.error.stage.is_none());
    }

    #[test]
    fn test_hook_error_names_stage() {
        let error = RunnerError::hook("score", "boom");
        let response = error.to_error_response();

        assert_eq!(response.error.stage.as_deref(), Some("score"));
        assert!(response.error.message.contains("score"));
        assert!(response.error.message.contains("boom"));
    }

    #[test]
    fn test_http_response() {
        let error = RunnerError::invalid_input("Test error");
        let http_response = error.error_response();
        assert_eq!(http_response.status(), 422);

        let error = RunnerError::model_load("weights corrupt");
        let http_response = error.error_response();
        assert_eq!(http_response.status(), 513);

        let error = RunnerError::hook("transform", "oops");
        let http_response = error.error_response();
        assert_eq!(http_response.status(), 500);
    }

    #[test]
    fn test_ambiguous_artifact_message_lists_candidates() {
        let error = RunnerError::ArtifactAmbiguous {
            candidates: vec!["model.json".to_string(), "model.pkl".to_string()],
        };
        let text = error.to_string();
        assert!(text.contains("model.json"));
        assert!(text.contains("model.pkl"));
    }
}
