use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::logic::{AtomicOutcome, AtomicPipeline};
use crate::model::{
    operations_pointer, AtomicError, ErrorKind, ATOMIC_CONTENT_TYPE, ATOMIC_EXTENSION,
    JSON_API_MEDIA_TYPE,
};
use crate::store::traits::ResourceStore;

pub type AppState<S> = Arc<AtomicPipeline<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Execute an atomic operations request
pub async fn post_operations<S: ResourceStore + 'static>(
    State(pipeline): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if !is_atomic_media_type(content_type) {
        return error_response(&AtomicError::new(
            ErrorKind::UnsupportedMediaType,
            format!("Content-Type must be {}", ATOMIC_CONTENT_TYPE),
            "",
        ));
    }

    let document: Value = match serde_json::from_slice(&body) {
        Ok(document) => document,
        Err(e) => {
            return error_response(&AtomicError::new(
                ErrorKind::InvalidJson,
                format!("Request body is not valid JSON: {}", e),
                operations_pointer(),
            ))
        }
    };

    match pipeline.run(&document).await {
        Ok(outcome) => outcome_response(&outcome),
        Err(error) => error_response(&error),
    }
}

/// `application/vnd.api+json` with an `ext` parameter naming the atomic
/// extension. Parameter whitespace and quoting are tolerated.
pub fn is_atomic_media_type(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };

    let mut parts = content_type.split(';');
    let media_type = parts.next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case(JSON_API_MEDIA_TYPE) {
        return false;
    }

    parts.any(|parameter| {
        let Some((name, value)) = parameter.split_once('=') else {
            return false;
        };
        name.trim().eq_ignore_ascii_case("ext")
            && value
                .trim()
                .trim_matches('"')
                .split_whitespace()
                .any(|extension| extension == ATOMIC_EXTENSION)
    })
}

fn outcome_response(outcome: &AtomicOutcome) -> Response {
    match outcome.to_body() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, ATOMIC_CONTENT_TYPE)],
            body.to_string(),
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn error_response(error: &AtomicError) -> Response {
    let status =
        StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, ATOMIC_CONTENT_TYPE)],
        error.to_document().to_string(),
    )
        .into_response()
}
