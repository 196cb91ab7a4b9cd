//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use domain::{EmailResponse, EmailStatus};

use super::handlers;

/// OpenAPI documentation for the email service
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Email Service",
        version = "0.1.0",
        description = "Email records created from user service notifications",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8082", description = "Local development server")),
    paths(
        handlers::list_emails,
        handlers::get_email,
        handlers::list_user_emails,
    ),
    components(schemas(EmailResponse, EmailStatus)),
    tags((name = "Emails", description = "Email record lookup"))
)]
pub struct ApiDoc;
