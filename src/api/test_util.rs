use crate::routing_utils::{ApiError, Failure};
use axum::body;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::de::DeserializeOwned;

/// Used in tests to both extract the raw bytes from the HTTP response body and then deserialize them into the
/// requested type. Will panic and fail the test if either step fails somehow.
pub async fn deserialize_body<T: DeserializeOwned>(response_body: body::Body) -> T {
    let bytes = body::to_bytes(response_body, usize::MAX)
        .await
        .expect("Could not read data from response body!");

    serde_json::from_slice(&bytes).unwrap_or_else(|err| {
        panic!(
            "Could not parse body content into data structure! Error: {}, Received body: {:?}",
            err, bytes
        )
    })
}

/// Runs a route's result through the response conversion the router would apply, mapping
/// failures at `path`, and hands back the status and decoded body
pub async fn respond<T, B>(result: Result<T, Failure>, path: &str) -> (StatusCode, B)
where
    T: IntoResponse,
    B: DeserializeOwned,
{
    let response = match result {
        Ok(success) => success.into_response(),
        Err(failure) => failure.at(path).into_response(),
    };
    let status = response.status();

    (status, deserialize_body(response.into_body()).await)
}

/// Like [respond], for results expected to fail
pub async fn respond_with_error<T: IntoResponse>(
    result: Result<T, Failure>,
    path: &str,
) -> (StatusCode, ApiError) {
    respond(result, path).await
}
