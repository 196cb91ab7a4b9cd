//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use domain::UserResponse;

use super::handlers;

/// OpenAPI documentation for the user service
#[derive(OpenApi)]
#[openapi(
    info(
        title = "User Service",
        version = "0.1.0",
        description = "User registration with duplicate-email notifications",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8081", description = "Local development server")),
    paths(
        handlers::list_users,
        handlers::create_user,
        handlers::get_user,
        handlers::update_user,
        handlers::delete_user,
    ),
    components(schemas(UserResponse, handlers::UserRequest)),
    tags((name = "Users", description = "User management operations"))
)]
pub struct ApiDoc;
