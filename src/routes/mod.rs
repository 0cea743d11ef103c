use axum::http::{header, HeaderValue, StatusCode};
use axum::{
    extract::DefaultBodyLimit,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod chat;
pub mod documents;
pub mod health;

/// Success body: `statusCode` and `message` next to the payload's own
/// top-level fields.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(rename = "statusCode")]
    status_code: u16,
    message: &'static str,
    #[serde(flatten)]
    payload: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: &'static str, payload: T) -> Self {
        Self {
            status_code: StatusCode::OK.as_u16(),
            message,
            payload,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

fn cors_layer(allowed: Option<&String>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => AllowOrigin::list(origins.split(',').filter_map(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(origin) => Some(origin),
                Err(err) => {
                    tracing::warn!(origin = %trimmed, error = %err, "ignoring invalid CORS origin");
                    None
                }
            }
        })),
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_ref());

    let documents_routes = Router::new()
        .route("/list", post(documents::list_documents))
        .route("/sync", post(documents::sync_knowledge_base))
        .route("/delete", post(documents::delete_documents))
        .route(
            "/downloadpresignedurl",
            post(documents::generate_download_link),
        )
        .route("/uploadpresignedurl", post(documents::generate_upload_links));

    let chat_routes = Router::new().route("/query", post(chat::query_knowledge_base));

    Router::new()
        .nest("/documents", documents_routes)
        .nest("/chat", chat_routes)
        .route("/health", get(health::health_check))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains; preload"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'self'; script-src 'self'"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024))
}
