use crate::routing_utils::ApiError;
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};
use validator::ValidationError;

pub mod auth;
pub mod todo;

/// Collects every request/response schema so the route docs can refer to them by name
#[derive(OpenApi)]
#[openapi(components(
    schemas(
        todo::TodoItem,
        todo::NewTodo,
        todo::UpdateTodo,
        todo::DeletedCount,
        auth::Credentials,
        auth::RegisteredUser,
        auth::TokenResponse,
        TodoItemEnvelope,
        TodoListEnvelope,
        DeletedCountEnvelope,
        TokenEnvelope,
        RegisteredUserEnvelope,
        ApiError
    ),
    responses(ApiError)
))]
pub struct OpenApiSchemas;

/// Uniform wrapper around every successful response body, and around the 404s produced when a
/// todo doesn't exist
#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize, Debug))]
#[aliases(
    TodoItemEnvelope = ApiResponse<todo::TodoItem>,
    TodoListEnvelope = ApiResponse<Vec<todo::TodoItem>>,
    DeletedCountEnvelope = ApiResponse<todo::DeletedCount>,
    TokenEnvelope = ApiResponse<auth::TokenResponse>,
    RegisteredUserEnvelope = ApiResponse<auth::RegisteredUser>
)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Rejects strings that are empty or only whitespace
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }

    Ok(())
}
