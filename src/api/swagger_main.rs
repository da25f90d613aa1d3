use crate::dto;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Todo REST API",
        description = "Todo management with username/password authentication"
    ),
    modifiers(&BearerSecurity)
)]
struct TodoRestApi;

/// Registers the "bearer_auth" scheme that protected paths refer to
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// The complete OpenAPI document, merged from the [dto] schemas and each API module
pub fn api_documentation() -> utoipa::openapi::OpenApi {
    let mut api_docs = TodoRestApi::openapi();
    api_docs.merge(dto::OpenApiSchemas::openapi());
    api_docs.merge(super::todo::TodoApi::openapi());
    api_docs.merge(super::auth::AuthApi::openapi());

    api_docs
}

/// Constructs the route on the API that renders the swagger UI and returns the OpenAPI schema
pub fn build_documentation() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api_documentation())
}
