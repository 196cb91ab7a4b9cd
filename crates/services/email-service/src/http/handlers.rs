//! Email record handlers.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use uuid::Uuid;

use common::{AppError, AppResult};
use domain::EmailResponse;

use super::AppState;

/// Create email routes
pub fn email_routes() -> Router<AppState> {
    Router::new()
        .route("/emails", get(list_emails))
        .route("/emails/:id", get(get_email))
        .route("/users/:id/emails", get(list_user_emails))
}

fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::validation("Invalid ID format"))
}

/// List all email records
#[utoipa::path(
    get,
    path = "/emails",
    tag = "Emails",
    responses(
        (status = 200, description = "All email records, oldest first", body = Vec<EmailResponse>)
    )
)]
pub async fn list_emails(State(state): State<AppState>) -> AppResult<Json<Vec<EmailResponse>>> {
    let records = state.email_service.list().await?;
    Ok(Json(records.into_iter().map(EmailResponse::from).collect()))
}

/// Get email record by ID
#[utoipa::path(
    get,
    path = "/emails/{id}",
    tag = "Emails",
    params(("id" = Uuid, Path, description = "Email record ID")),
    responses(
        (status = 200, description = "Email record found", body = EmailResponse),
        (status = 400, description = "Invalid ID format"),
        (status = 404, description = "Email record not found")
    )
)]
pub async fn get_email(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<EmailResponse>> {
    let record = state.email_service.get(parse_id(&id)?).await?;
    Ok(Json(EmailResponse::from(record)))
}

/// List email records sent on behalf of a user
#[utoipa::path(
    get,
    path = "/users/{id}/emails",
    tag = "Emails",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Email records for the user", body = Vec<EmailResponse>),
        (status = 400, description = "Invalid ID format")
    )
)]
pub async fn list_user_emails(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<EmailResponse>>> {
    let records = state.email_service.list_for_user(parse_id(&id)?).await?;
    Ok(Json(records.into_iter().map(EmailResponse::from).collect()))
}
