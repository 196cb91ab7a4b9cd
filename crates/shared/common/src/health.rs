//! Health check response shared by both services.

use axum::{http::StatusCode, response::Json};
use serde::Serialize;

use crate::AppResult;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: ServiceHealth,
}

/// Individual dependency health
#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub database: ServiceStatus,
    pub channel: ServiceStatus,
}

/// Dependency status
#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceStatus {
    fn from_result(result: AppResult<()>) -> Self {
        match result {
            Ok(()) => Self {
                status: "healthy",
                error: None,
            },
            Err(e) => Self {
                status: "unhealthy",
                error: Some(e.to_string()),
            },
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Build the health response from the store and channel probes.
///
/// 200 when both answer, 503 with `"degraded"` otherwise.
pub fn health_report(
    database: AppResult<()>,
    channel: AppResult<()>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = ServiceStatus::from_result(database);
    let channel = ServiceStatus::from_result(channel);

    let all_healthy = database.is_healthy() && channel.is_healthy();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" },
        services: ServiceHealth { database, channel },
    };

    (status_code, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppError;

    #[test]
    fn test_degraded_when_a_probe_fails() {
        let (status, Json(body)) =
            health_report(Ok(()), Err(AppError::infrastructure("Event channel")));

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert!(body.services.database.is_healthy());
        assert!(!body.services.channel.is_healthy());
    }

    #[test]
    fn test_healthy_when_all_probes_pass() {
        let (status, Json(body)) = health_report(Ok(()), Ok(()));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "healthy");
    }
}
