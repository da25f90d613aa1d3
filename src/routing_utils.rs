use crate::domain::todo::driving_ports::TodoError;
use crate::domain::user::driving_ports::{IdentityError, LoginError, RegisterError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, OriginalUri, Request};
use axum::http::{Extensions, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};
use utoipa::{ToResponse, ToSchema};
use validator::ValidationErrors;

/// Every way a request can fail once it reaches a route. Converted to an HTTP response exactly
/// once, at the route boundary, via [Failure::at].
#[derive(Debug, Error)]
pub enum Failure {
    #[error("Invalid ID: {0}")]
    InvalidArgument(String),
    #[error("Validation failed: {}", describe_validation_errors(.0))]
    FieldValidation(ValidationErrors),
    #[error("Malformed request body: {0}")]
    MalformedBody(String),
    #[error("Authentication failed: {0}")]
    Unauthorized(String),
    #[error("Access denied: {0}")]
    Forbidden(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(anyhow::Error),
}

impl Failure {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) | Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::FieldValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts the failure into the error response for a request made to `path`
    pub fn at(self, path: &str) -> ApiErrorResponse {
        let status = self.status();
        match self {
            Self::Unexpected(ref err) => error!(path, "Request failed unexpectedly: {err:?}"),
            ref expected => debug!(path, status = status.as_u16(), "Request rejected: {expected}"),
        }

        ApiErrorResponse {
            status,
            body: ApiError {
                timestamp: Utc::now(),
                status: status.as_u16(),
                error: status.canonical_reason().unwrap_or("Unknown").to_owned(),
                message: self.to_string(),
                path: path.to_owned(),
            },
        }
    }
}

/// Renders validation errors as `field: reason` pairs sorted by field name
fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut field_errors: Vec<_> = errors.field_errors().into_iter().collect();
    field_errors.sort_by_key(|(field, _)| *field);

    field_errors
        .into_iter()
        .flat_map(|(field, reasons)| {
            reasons.iter().map(move |reason| {
                let reason_text = match reason.message {
                    Some(ref message) => message.to_string(),
                    None => reason.code.to_string(),
                };
                format!("{field}: {reason_text}")
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<ValidationErrors> for Failure {
    fn from(value: ValidationErrors) -> Self {
        Self::FieldValidation(value)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(value: anyhow::Error) -> Self {
        Self::Unexpected(value)
    }
}

impl From<TodoError> for Failure {
    fn from(value: TodoError) -> Self {
        match value {
            TodoError::InvalidArgument(detail) => Self::InvalidArgument(detail),
            // Routes turn a missing todo into a 404 themselves, anything reaching here is unplanned
            not_found @ TodoError::NotFound(_) => Self::Unexpected(not_found.into()),
            TodoError::PortError(err) => Self::Unexpected(err),
        }
    }
}

impl From<RegisterError> for Failure {
    fn from(value: RegisterError) -> Self {
        match value {
            taken @ RegisterError::UsernameTaken => Self::InvalidArgument(taken.to_string()),
            RegisterError::PortError(err) => Self::Unexpected(err),
        }
    }
}

impl From<LoginError> for Failure {
    fn from(value: LoginError) -> Self {
        match value {
            bad @ LoginError::BadCredentials => Self::Unauthorized(bad.to_string()),
            LoginError::PortError(err) => Self::Unexpected(err),
        }
    }
}

impl From<IdentityError> for Failure {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::UserNotFound(_) => {
                Self::Unauthorized("the token's user no longer exists".to_owned())
            }
            IdentityError::PortError(err) => Self::Unexpected(err),
        }
    }
}

/// Body of every error response
#[derive(Serialize, Debug, ToSchema, ToResponse)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[response(examples(
    ("Invalid ID" = (
        summary = "A todo id was not a positive integer (400)",
        value = json!({
            "timestamp": "2024-03-01T12:00:00Z",
            "status": 400,
            "error": "Bad Request",
            "message": "Invalid ID: todo id must be a positive integer, got 0",
            "path": "/todos/0"
        })
    )),

    ("Validation Failure" = (
        summary = "Submitted fields broke one or more constraints (422)",
        value = json!({
            "timestamp": "2024-03-01T12:00:00Z",
            "status": 422,
            "error": "Unprocessable Entity",
            "message": "Validation failed: title: must not be blank",
            "path": "/todos"
        })
    )),

    ("Forbidden" = (
        summary = "Caller lacks the role the operation requires (403)",
        value = json!({
            "timestamp": "2024-03-01T12:00:00Z",
            "status": 403,
            "error": "Forbidden",
            "message": "Access denied: requires role ADMIN",
            "path": "/todos/3"
        })
    )),

    ("Internal Failure" = (
        summary = "Something unexpected went wrong inside the server (500)",
        value = json!({
            "timestamp": "2024-03-01T12:00:00Z",
            "status": 500,
            "error": "Internal Server Error",
            "message": "An unexpected error occurred: acquiring a connection from the db pool",
            "path": "/todos"
        })
    ))
))]
pub struct ApiError {
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

/// A mapped [Failure], ready to be sent
#[derive(Debug)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub body: ApiError,
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, axum::Json(self.body)).into_response()
    }
}

/// The path the client actually requested, before any router nesting stripped a prefix
pub fn original_path(extensions: &Extensions, uri: &Uri) -> String {
    match extensions.get::<OriginalUri>() {
        Some(OriginalUri(original)) => original.path().to_owned(),
        None => uri.path().to_owned(),
    }
}

/// Wrapper for [axum::Json] which reports unparseable bodies through [Failure::MalformedBody]
pub struct Json<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for Json<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiErrorResponse;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let path = original_path(req.extensions(), req.uri());

        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(Failure::MalformedBody(rejection.body_text()).at(&path)),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}
