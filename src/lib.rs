use axum::Router;
use axum::extract::State;
use std::sync::Arc;

pub mod api;
pub mod app_env;
pub mod auth;
pub mod db;
pub mod domain;
pub mod dto;
pub mod external_connections;
pub mod logging;
pub mod persistence;
pub mod routing_utils;

/// State handed to every request handler
pub struct SharedData {
    pub ext_cxn: persistence::PgConnectivity,
    pub jwt_keys: auth::JwtKeys,
}

pub type AppState = State<Arc<SharedData>>;

/// Assembles every route of the service, including the OpenAPI docs, with request tracing
/// attached
pub fn app_router(shared_data: Arc<SharedData>) -> Router {
    let router = Router::new()
        .nest("/todos", api::todo::todo_routes())
        .nest("/auth", api::auth::auth_routes())
        .merge(api::swagger_main::build_documentation())
        .with_state(shared_data);

    logging::attach_tracing_http(router)
}
