use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::RequestStatus;

/// Message shown to the operator when the whole fleet is committed.
pub const FLEET_BUSY_MESSAGE: &str = "All ambulances are busy. Please wait.";

/// Main error type for the dispatch service
#[derive(Debug, Error)]
pub enum DispatchError {
    // Dispatch outcomes surfaced to operators
    #[error("{}", FLEET_BUSY_MESSAGE)]
    NoAvailableVehicle,

    #[error("Cannot {action} request {request_id} while it is {from}")]
    InvalidStateTransition {
        request_id: String,
        from: RequestStatus,
        action: &'static str,
    },

    // Lookups
    #[error("Request not found: {0}")]
    RequestNotFound(String),

    #[error("Ambulance not found: {0}")]
    AmbulanceNotFound(String),

    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    #[error("Request {request_id} has no {field}")]
    MissingReference {
        request_id: String,
        field: &'static str,
    },

    // Validation errors
    #[error("Validation failed: {} errors", .0.len())]
    ValidationFailed(Vec<ValidationError>),

    // Collaborator and setup errors
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, error_type, details) = match &self {
            DispatchError::NoAvailableVehicle => (StatusCode::CONFLICT, "no_available_vehicle", None),
            DispatchError::InvalidStateTransition { .. } => (StatusCode::CONFLICT, "invalid_state_transition", None),

            DispatchError::RequestNotFound(_) => (StatusCode::NOT_FOUND, "request_not_found", None),
            DispatchError::AmbulanceNotFound(_) => (StatusCode::NOT_FOUND, "ambulance_not_found", None),
            DispatchError::DriverNotFound(_) => (StatusCode::NOT_FOUND, "driver_not_found", None),
            DispatchError::MissingReference { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "missing_reference", None),

            DispatchError::ValidationFailed(errors) => {
                (StatusCode::BAD_REQUEST, "validation_failed", serde_json::to_value(errors).ok())
            }

            // All other errors are treated as internal server errors
            DispatchError::Repository(_) | DispatchError::Configuration(_) => {
                tracing::error!("Internal dispatch error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            details,
        };

        (status, axum::Json(error_response)).into_response()
    }
}

// Convenience type alias for Results
pub type DispatchResult<T> = Result<T, DispatchError>;

impl From<chrono::ParseError> for DispatchError {
    fn from(err: chrono::ParseError) -> Self {
        DispatchError::validation_error("timestamp", format!("Invalid date/time format: {}", err))
    }
}

// Helper functions for creating common errors
impl DispatchError {
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        DispatchError::ValidationFailed(vec![ValidationError::new(field, message)])
    }

    pub fn request_not_found(request_id: impl Into<String>) -> Self {
        DispatchError::RequestNotFound(request_id.into())
    }

    pub fn ambulance_not_found(ambulance_id: impl Into<String>) -> Self {
        DispatchError::AmbulanceNotFound(ambulance_id.into())
    }

    pub fn driver_not_found(driver_id: impl Into<String>) -> Self {
        DispatchError::DriverNotFound(driver_id.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        DispatchError::Configuration(msg.into())
    }

    /// Recoverable outcomes the operator can act on, as opposed to faults.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DispatchError::NoAvailableVehicle
                | DispatchError::InvalidStateTransition { .. }
                | DispatchError::MissingReference { .. }
        )
    }
}
