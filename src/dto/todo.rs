use super::not_blank;
use crate::domain;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// DTO for a todo returned from the API
#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug, PartialEq, Eq))]
pub struct TodoItem {
    #[schema(example = 10)]
    pub id: i64,
    #[schema(example = "Buy milk")]
    pub title: String,
    #[schema(example = "Two litres, semi-skimmed")]
    pub description: Option<String>,
    pub completed: bool,
}

impl From<domain::todo::TodoItem> for TodoItem {
    fn from(value: domain::todo::TodoItem) -> Self {
        TodoItem {
            id: value.id,
            title: value.title,
            description: value.description,
            completed: value.completed,
        }
    }
}

/// DTO for creating a new todo via the API
#[derive(Deserialize, Validate, ToSchema)]
#[cfg_attr(test, derive(Serialize, Default))]
pub struct NewTodo {
    /// A missing title deserializes as empty and fails the blank check
    #[serde(default)]
    #[validate(
        custom = "not_blank",
        length(max = 255, message = "must be at most 255 characters")
    )]
    #[schema(example = "Buy milk")]
    pub title: String,
    #[validate(length(max = 1000, message = "must be at most 1000 characters"))]
    pub description: Option<String>,
    pub completed: Option<bool>,
}

impl From<NewTodo> for domain::todo::NewTodo {
    fn from(value: NewTodo) -> Self {
        domain::todo::NewTodo {
            title: value.title,
            description: value.description,
            completed: value.completed.unwrap_or(false),
        }
    }
}

/// DTO for changing a todo. Used by both PUT and PATCH, which disagree on what a missing field
/// means.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[cfg_attr(test, derive(Serialize, Default))]
pub struct UpdateTodo {
    #[validate(
        custom = "not_blank",
        length(max = 255, message = "must be at most 255 characters")
    )]
    pub title: Option<String>,
    #[validate(length(max = 1000, message = "must be at most 1000 characters"))]
    pub description: Option<String>,
    pub completed: Option<bool>,
}

impl From<UpdateTodo> for domain::todo::TodoUpdate {
    fn from(value: UpdateTodo) -> Self {
        domain::todo::TodoUpdate {
            title: value.title,
            description: value.description,
            completed: value.completed,
        }
    }
}

/// DTO reporting how many todos a bulk delete removed
#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug))]
pub struct DeletedCount {
    #[schema(example = 3)]
    pub deleted: u64,
}
