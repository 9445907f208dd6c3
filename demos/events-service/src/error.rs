//! Error types for storage and the HTTP surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors returned by [`EventStore`](crate::EventStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The database URL was blank.
    #[error("database URL must not be blank")]
    BlankDatabaseUrl,

    /// Establishing a `SQLite` connection failed.
    #[error("failed to connect to SQLite database: {message}")]
    ConnectionFailed {
        /// Error detail from Diesel.
        message: String,
    },

    /// Configuring the connection failed.
    #[error("failed to configure connection: {message}")]
    PragmaFailed {
        /// Error detail from the PRAGMA execution.
        message: String,
    },

    /// Running pending migrations failed.
    #[error("failed to run database migrations: {message}")]
    MigrationFailed {
        /// Error detail from Diesel migrations.
        message: String,
    },

    /// A uniqueness constraint rejected the write.
    #[error("record already exists")]
    Duplicate,

    /// A referenced row does not exist.
    #[error("referenced record does not exist")]
    MissingReference,

    /// A stored value could not be decoded.
    #[error("corrupt {column} value '{value}'")]
    CorruptValue {
        /// Column holding the value.
        column: &'static str,
        /// Raw stored text.
        value: String,
    },

    /// Any other query failure.
    #[error("database query failed: {message}")]
    QueryFailed {
        /// Error detail from Diesel.
        message: String,
    },
}

/// Business errors rendered as `{"code": ..., "message": ...}` bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The event name was blank.
    #[error("event name is required")]
    EventNameRequired,

    /// The event date was not a `YYYY-MM-DD` date.
    #[error("event date '{0}' is not a valid YYYY-MM-DD date")]
    EventDateInvalid(String),

    /// The event date lies before today.
    #[error("event date {0} is in the past")]
    EventDateInPast(chrono::NaiveDate),

    /// The tenant already has an event with this name.
    #[error("an event named '{0}' already exists")]
    EventNameAlreadyExists(String),

    /// No event with this id is visible to the tenant.
    #[error("event {0} not found")]
    EventNotFound(i64),

    /// The user name was blank.
    #[error("user name is required")]
    UserNameRequired,

    /// No user with this id is visible to the tenant.
    #[error("user {0} not found")]
    UserNotFound(i64),

    /// Storage failed for reasons the caller cannot fix.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EventNameRequired => "EVENT-NAME-REQUIRED",
            Self::EventDateInvalid(_) => "EVENT-DATE-INVALID",
            Self::EventDateInPast(_) => "EVENT-DATE-IN-PAST",
            Self::EventNameAlreadyExists(_) => "EVENT-NAME-ALREADY-EXISTS",
            Self::EventNotFound(_) => "EVENT-NOT-FOUND",
            Self::UserNameRequired => "USER-NAME-REQUIRED",
            Self::UserNotFound(_) => "USER-NOT-FOUND",
            Self::Internal(_) => "INTERNAL-ERROR",
        }
    }

    /// HTTP status for the error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::EventNameRequired | Self::EventDateInvalid(_) | Self::UserNameRequired => {
                StatusCode::BAD_REQUEST
            }
            Self::EventDateInPast(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::EventNameAlreadyExists(_) => StatusCode::CONFLICT,
            Self::EventNotFound(_) | Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self::Internal(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = json!({ "code": self.code(), "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ApiError::EventNameRequired, 400, "EVENT-NAME-REQUIRED")]
    #[case(ApiError::EventDateInvalid("15/10/2025".to_owned()), 400, "EVENT-DATE-INVALID")]
    #[case(ApiError::EventNameAlreadyExists("Tech Conference".to_owned()), 409, "EVENT-NAME-ALREADY-EXISTS")]
    #[case(ApiError::UserNotFound(7), 404, "USER-NOT-FOUND")]
    #[case(ApiError::Internal("disk full".to_owned()), 500, "INTERNAL-ERROR")]
    fn maps_errors_to_status_and_code(
        #[case] error: ApiError,
        #[case] status: u16,
        #[case] code: &str,
    ) {
        assert_eq!(error.status().as_u16(), status);
        assert_eq!(error.code(), code);
    }

    #[test]
    fn storage_errors_are_internal() {
        let error = ApiError::from(StoreError::QueryFailed {
            message: "locked".to_owned(),
        });
        assert_eq!(error.code(), "INTERNAL-ERROR");
    }
}
