use crate::auth::{AuthenticatedUser, require_role};
use crate::domain::todo::driving_ports::{TodoError, TodoPort};
use crate::domain::user::Role;
use crate::dto::ApiResponse;
use crate::dto::todo::{DeletedCount, NewTodo, TodoItem, UpdateTodo};
use crate::external_connections::{ExternalConnectivity, Transactable};
use crate::persistence::db_todo_driven_ports::{DbTodoReader, DbTodoWriter};
use crate::routing_utils::{ApiError, Failure, Json};
use crate::{AppState, SharedData, domain, dto};
use axum::Router;
use axum::extract::{OriginalUri, Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;
use validator::Validate;

#[derive(OpenApi)]
#[openapi(paths(
    list_todos,
    get_todo,
    create_todo,
    replace_todo,
    patch_todo,
    delete_todo,
    delete_all_todos
))]
/// Defines the OpenAPI documentation for the todo API
pub struct TodoApi;
/// Constant used to group todo endpoints in OpenAPI documentation
pub const TODO_API_GROUP: &str = "Todos";

type TodoResponse = (StatusCode, Json<ApiResponse<TodoItem>>);
type DeleteResponse = (StatusCode, Json<ApiResponse<DeletedCount>>);

/// Creates a router for endpoints under the "/todos" group of APIs. Every route needs a bearer
/// token, deletes additionally need the ADMIN role.
pub fn todo_routes() -> Router<Arc<SharedData>> {
    Router::new()
        .route(
            "/",
            get(
                |State(app_state): AppState,
                 _caller: AuthenticatedUser,
                 OriginalUri(uri): OriginalUri| async move {
                    let mut ext_cxn = app_state.ext_cxn.clone();
                    let todo_service = domain::todo::TodoService {};

                    list_todos(&mut ext_cxn, &todo_service)
                        .await
                        .map_err(|failure| failure.at(uri.path()))
                },
            )
            .post(create_todo_handler)
            .delete(
                |State(app_state): AppState,
                 caller: AuthenticatedUser,
                 OriginalUri(uri): OriginalUri| async move {
                    let ext_cxn = app_state.ext_cxn.clone();
                    let todo_service = domain::todo::TodoService {};

                    delete_all_todos(&caller, &ext_cxn, &todo_service)
                        .await
                        .map_err(|failure| failure.at(uri.path()))
                },
            ),
        )
        .route(
            "/:todo_id",
            get(
                |State(app_state): AppState,
                 _caller: AuthenticatedUser,
                 OriginalUri(uri): OriginalUri,
                 Path(raw_todo_id): Path<String>| async move {
                    let mut ext_cxn = app_state.ext_cxn.clone();
                    let todo_service = domain::todo::TodoService {};

                    get_todo(&raw_todo_id, &mut ext_cxn, &todo_service)
                        .await
                        .map_err(|failure| failure.at(uri.path()))
                },
            )
            .put(
                |State(app_state): AppState,
                 _caller: AuthenticatedUser,
                 OriginalUri(uri): OriginalUri,
                 Path(raw_todo_id): Path<String>,
                 Json(update): Json<UpdateTodo>| async move {
                    let ext_cxn = app_state.ext_cxn.clone();
                    let todo_service = domain::todo::TodoService {};

                    replace_todo(&raw_todo_id, update, &ext_cxn, &todo_service)
                        .await
                        .map_err(|failure| failure.at(uri.path()))
                },
            )
            .patch(
                |State(app_state): AppState,
                 _caller: AuthenticatedUser,
                 OriginalUri(uri): OriginalUri,
                 Path(raw_todo_id): Path<String>,
                 Json(update): Json<UpdateTodo>| async move {
                    let ext_cxn = app_state.ext_cxn.clone();
                    let todo_service = domain::todo::TodoService {};

                    patch_todo(&raw_todo_id, update, &ext_cxn, &todo_service)
                        .await
                        .map_err(|failure| failure.at(uri.path()))
                },
            )
            .delete(
                |State(app_state): AppState,
                 caller: AuthenticatedUser,
                 OriginalUri(uri): OriginalUri,
                 Path(raw_todo_id): Path<String>| async move {
                    let ext_cxn = app_state.ext_cxn.clone();
                    let todo_service = domain::todo::TodoService {};

                    delete_todo(&caller, &raw_todo_id, &ext_cxn, &todo_service)
                        .await
                        .map_err(|failure| failure.at(uri.path()))
                },
            ),
        )
}

#[axum_macros::debug_handler(state = Arc<SharedData>)]
async fn create_todo_handler(
    State(app_state): AppState,
    caller: AuthenticatedUser,
    OriginalUri(uri): OriginalUri,
    Json(new_todo): Json<NewTodo>,
) -> Result<TodoResponse, crate::routing_utils::ApiErrorResponse> {
    info!("{} is creating a todo", caller.username);
    let ext_cxn = app_state.ext_cxn.clone();
    let todo_service = domain::todo::TodoService {};

    create_todo(new_todo, &ext_cxn, &todo_service)
        .await
        .map_err(|failure| failure.at(uri.path()))
}

/// Path ids arrive as raw text so a non-numeric id gets the same treatment as a non-positive one
fn parse_todo_id(raw_todo_id: &str) -> Result<i64, Failure> {
    raw_todo_id.parse::<i64>().map_err(|err| {
        Failure::InvalidArgument(format!("'{raw_todo_id}' is not a valid todo id ({err})"))
    })
}

fn todo_not_found(todo_id: i64) -> TodoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::failure(format!(
            "Todo not found with id: {todo_id}"
        ))),
    )
}

#[utoipa::path(
    get,
    path = "/todos",
    tag = TODO_API_GROUP,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Every todo, ordered by id", body = dto::TodoListEnvelope),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Unexpected failure", body = ApiError),
    ),
)]
#[tracing::instrument(skip_all)]
/// Lists all todos
async fn list_todos(
    ext_cxn: &mut impl ExternalConnectivity,
    todo_service: &impl TodoPort,
) -> Result<Json<ApiResponse<Vec<TodoItem>>>, Failure> {
    let todo_reader = DbTodoReader {};

    let todos = todo_service.list_todos(&mut *ext_cxn, &todo_reader).await?;

    Ok(Json(ApiResponse::success(
        todos.into_iter().map(TodoItem::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/todos/{todo_id}",
    tag = TODO_API_GROUP,
    security(("bearer_auth" = [])),
    params(("todo_id" = i64, Path, description = "Positive id of the todo")),
    responses(
        (status = 200, description = "The requested todo", body = dto::TodoItemEnvelope),
        (status = 400, description = "The id was not a positive integer", body = ApiError),
        (status = 404, description = "No todo has that id", body = dto::TodoItemEnvelope),
    ),
)]
#[tracing::instrument(skip(ext_cxn, todo_service))]
/// Fetches one todo by its id
async fn get_todo(
    raw_todo_id: &str,
    ext_cxn: &mut impl ExternalConnectivity,
    todo_service: &impl TodoPort,
) -> Result<TodoResponse, Failure> {
    let todo_id = parse_todo_id(raw_todo_id)?;
    let todo_reader = DbTodoReader {};

    let todo = todo_service
        .todo_by_id(todo_id, &mut *ext_cxn, &todo_reader)
        .await?;

    Ok(match todo {
        Some(todo) => (
            StatusCode::OK,
            Json(ApiResponse::success(TodoItem::from(todo))),
        ),
        None => todo_not_found(todo_id),
    })
}

#[utoipa::path(
    post,
    path = "/todos",
    tag = TODO_API_GROUP,
    security(("bearer_auth" = [])),
    request_body = NewTodo,
    responses(
        (status = 201, description = "The stored todo with its assigned id", body = dto::TodoItemEnvelope),
        (status = 400, description = "Unreadable JSON", body = ApiError),
        (status = 422, description = "A field broke its constraints", body = ApiError),
    ),
)]
#[tracing::instrument(skip_all)]
/// Creates a todo
async fn create_todo(
    new_todo: NewTodo,
    ext_cxn: &impl Transactable,
    todo_service: &impl TodoPort,
) -> Result<TodoResponse, Failure> {
    new_todo.validate()?;
    let todo_writer = DbTodoWriter {};

    let created = todo_service
        .create_todo(&new_todo.into(), ext_cxn, &todo_writer)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            "Todo created",
            TodoItem::from(created),
        )),
    ))
}

/// Shared tail of PUT and PATCH. A todo that is missing at lookup time becomes a 404 envelope,
/// every other failure goes through the error mapper.
fn updated_todo_response(
    todo_id: i64,
    update_result: Result<domain::todo::TodoItem, TodoError>,
) -> Result<TodoResponse, Failure> {
    match update_result {
        Ok(updated) => Ok((
            StatusCode::OK,
            Json(ApiResponse::success_with_message(
                "Todo updated",
                TodoItem::from(updated),
            )),
        )),
        Err(TodoError::NotFound(_)) => Ok(todo_not_found(todo_id)),
        Err(other) => Err(other.into()),
    }
}

#[utoipa::path(
    put,
    path = "/todos/{todo_id}",
    tag = TODO_API_GROUP,
    security(("bearer_auth" = [])),
    params(("todo_id" = i64, Path, description = "Positive id of the todo")),
    request_body(content = UpdateTodo, description = "Missing fields reset: description clears, completed becomes false, title is kept"),
    responses(
        (status = 200, description = "The replaced todo", body = dto::TodoItemEnvelope),
        (status = 400, description = "The id was not a positive integer", body = ApiError),
        (status = 404, description = "No todo has that id", body = dto::TodoItemEnvelope),
        (status = 422, description = "A field broke its constraints", body = ApiError),
    ),
)]
#[tracing::instrument(skip(update, ext_cxn, todo_service))]
/// Replaces a todo's content
async fn replace_todo(
    raw_todo_id: &str,
    update: UpdateTodo,
    ext_cxn: &impl Transactable,
    todo_service: &impl TodoPort,
) -> Result<TodoResponse, Failure> {
    let todo_id = parse_todo_id(raw_todo_id)?;
    update.validate()?;
    let todo_reader = DbTodoReader {};
    let todo_writer = DbTodoWriter {};

    let update_result = todo_service
        .replace_todo(todo_id, &update.into(), ext_cxn, &todo_reader, &todo_writer)
        .await;

    updated_todo_response(todo_id, update_result)
}

#[utoipa::path(
    patch,
    path = "/todos/{todo_id}",
    tag = TODO_API_GROUP,
    security(("bearer_auth" = [])),
    params(("todo_id" = i64, Path, description = "Positive id of the todo")),
    request_body(content = UpdateTodo, description = "Only the fields present are changed"),
    responses(
        (status = 200, description = "The patched todo", body = dto::TodoItemEnvelope),
        (status = 400, description = "The id was not a positive integer", body = ApiError),
        (status = 404, description = "No todo has that id", body = dto::TodoItemEnvelope),
        (status = 422, description = "A field broke its constraints", body = ApiError),
    ),
)]
#[tracing::instrument(skip(update, ext_cxn, todo_service))]
/// Changes only the supplied fields of a todo
async fn patch_todo(
    raw_todo_id: &str,
    update: UpdateTodo,
    ext_cxn: &impl Transactable,
    todo_service: &impl TodoPort,
) -> Result<TodoResponse, Failure> {
    let todo_id = parse_todo_id(raw_todo_id)?;
    update.validate()?;
    let todo_reader = DbTodoReader {};
    let todo_writer = DbTodoWriter {};

    let update_result = todo_service
        .patch_todo(todo_id, &update.into(), ext_cxn, &todo_reader, &todo_writer)
        .await;

    updated_todo_response(todo_id, update_result)
}

#[utoipa::path(
    delete,
    path = "/todos/{todo_id}",
    tag = TODO_API_GROUP,
    security(("bearer_auth" = [])),
    params(("todo_id" = i64, Path, description = "Positive id of the todo")),
    responses(
        (status = 200, description = "The todo was removed", body = dto::DeletedCountEnvelope),
        (status = 400, description = "The id was not a positive integer", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
        (status = 404, description = "No todo has that id", body = dto::DeletedCountEnvelope),
    ),
)]
#[tracing::instrument(skip(caller, ext_cxn, todo_service), fields(caller = %caller.username))]
/// Deletes one todo. Admin only.
async fn delete_todo(
    caller: &AuthenticatedUser,
    raw_todo_id: &str,
    ext_cxn: &impl Transactable,
    todo_service: &impl TodoPort,
) -> Result<DeleteResponse, Failure> {
    require_role(caller, Role::Admin)?;
    let todo_id = parse_todo_id(raw_todo_id)?;
    let todo_writer = DbTodoWriter {};

    let deleted = todo_service
        .delete_todo(todo_id, ext_cxn, &todo_writer)
        .await?;
    if !deleted {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::failure(format!(
                "Todo not found with id: {todo_id}"
            ))),
        ));
    }

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success_with_message(
            "Todo deleted",
            DeletedCount { deleted: 1 },
        )),
    ))
}

#[utoipa::path(
    delete,
    path = "/todos",
    tag = TODO_API_GROUP,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "How many todos were removed", body = dto::DeletedCountEnvelope),
        (status = 403, description = "Caller is not an admin", body = ApiError),
    ),
)]
#[tracing::instrument(skip_all, fields(caller = %caller.username))]
/// Deletes every todo. Admin only.
async fn delete_all_todos(
    caller: &AuthenticatedUser,
    ext_cxn: &impl Transactable,
    todo_service: &impl TodoPort,
) -> Result<DeleteResponse, Failure> {
    require_role(caller, Role::Admin)?;
    let todo_writer = DbTodoWriter {};

    let deleted = todo_service
        .delete_all_todos(ext_cxn, &todo_writer)
        .await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success_with_message(
            "All todos deleted",
            DeletedCount { deleted },
        )),
    ))
}
