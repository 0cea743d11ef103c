use serde::Serialize;

use super::ApiResponse;

#[derive(Serialize)]
pub struct HealthStatus {
    status: &'static str,
}

pub async fn health_check() -> ApiResponse<HealthStatus> {
    ApiResponse::ok("Healthy", HealthStatus { status: "ok" })
}
