use crate::auth::{BcryptHasher, JwtKeys};
use crate::domain::user::driving_ports::UserPort;
use crate::dto::ApiResponse;
use crate::dto::auth::{Credentials, RegisteredUser, TokenResponse};
use crate::external_connections::{ExternalConnectivity, Transactable};
use crate::persistence::db_user_driven_ports::{DbDetectUser, DbReadUsers, DbWriteUsers};
use crate::routing_utils::{ApiError, Failure, Json};
use crate::{AppState, SharedData, domain, dto};
use axum::Router;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::routing::post;
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;
use validator::Validate;

#[derive(OpenApi)]
#[openapi(paths(login, register))]
/// Defines the OpenAPI documentation for the authentication API
pub struct AuthApi;
/// Constant used to group authentication endpoints in OpenAPI documentation
pub const AUTH_API_GROUP: &str = "Authentication";

/// Creates a router for endpoints under the "/auth" group of APIs. None of them need a token.
pub fn auth_routes() -> Router<Arc<SharedData>> {
    Router::new()
        .route(
            "/login",
            post(
                |State(app_state): AppState,
                 OriginalUri(uri): OriginalUri,
                 Json(credentials): Json<Credentials>| async move {
                    let mut ext_cxn = app_state.ext_cxn.clone();
                    let user_service = domain::user::UserService {};

                    login(credentials, &mut ext_cxn, &user_service, &app_state.jwt_keys)
                        .await
                        .map_err(|failure| failure.at(uri.path()))
                },
            ),
        )
        .route(
            "/register",
            post(
                |State(app_state): AppState,
                 OriginalUri(uri): OriginalUri,
                 Json(credentials): Json<Credentials>| async move {
                    let ext_cxn = app_state.ext_cxn.clone();
                    let user_service = domain::user::UserService {};

                    register(credentials, &ext_cxn, &user_service)
                        .await
                        .map_err(|failure| failure.at(uri.path()))
                },
            ),
        )
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = AUTH_API_GROUP,
    request_body = Credentials,
    responses(
        (status = 200, description = "A bearer token for the user", body = dto::TokenEnvelope),
        (status = 401, description = "Unknown user or wrong password", body = ApiError),
        (status = 422, description = "A field broke its constraints", body = ApiError),
    ),
)]
#[tracing::instrument(skip_all, fields(username = %credentials.username))]
/// Exchanges a username and password for a bearer token
async fn login(
    credentials: Credentials,
    ext_cxn: &mut impl ExternalConnectivity,
    user_service: &impl UserPort,
    jwt_keys: &JwtKeys,
) -> Result<Json<ApiResponse<TokenResponse>>, Failure> {
    credentials.validate()?;
    let user_reader = DbReadUsers {};
    let hasher = Arc::new(BcryptHasher::default());

    let identity = user_service
        .login(
            &credentials.username,
            &credentials.password,
            &mut *ext_cxn,
            &user_reader,
            &hasher,
        )
        .await?;
    let token = jwt_keys.issue(&identity)?;
    info!("Issued a token for {}", identity.username);

    Ok(Json(ApiResponse::success(TokenResponse::bearer(token))))
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = AUTH_API_GROUP,
    request_body = Credentials,
    responses(
        (status = 201, description = "The new user, always with the USER role", body = dto::RegisteredUserEnvelope),
        (status = 400, description = "The username is already taken", body = ApiError),
        (status = 422, description = "A field broke its constraints", body = ApiError),
    ),
)]
#[tracing::instrument(skip_all, fields(username = %credentials))]
/// Registers a new user
async fn register(
    credentials: Credentials,
    ext_cxn: &impl Transactable,
    user_service: &impl UserPort,
) -> Result<(StatusCode, Json<ApiResponse<RegisteredUser>>), Failure> {
    credentials.validate()?;
    let user_writer = DbWriteUsers {};
    let user_detect = DbDetectUser {};
    let hasher = Arc::new(BcryptHasher::default());

    let registered = user_service
        .register(
            &credentials.into(),
            ext_cxn,
            &user_writer,
            &user_detect,
            &hasher,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            "User registered",
            RegisteredUser::from(registered),
        )),
    ))
}
