//! Cross-origin handling.
//!
//! Two layers cooperate: [`origin_gate`] refuses requests whose `Origin` the
//! policy rejects before any route runs, and [`layer`] answers preflights and
//! decorates allowed responses with the CORS headers.

use axum::{
    extract::{Request, State},
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN},
        request::Parts,
        HeaderName, HeaderValue, Method,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, warn};

use super::error::ApiError;
use crate::origin::OriginPolicy;

pub const REJECTED_MESSAGE: &str = "Not allowed by CORS";

pub const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Request headers the front-ends are allowed to send.
pub fn allowed_headers() -> [HeaderName; 9] {
    [
        CONTENT_TYPE,
        AUTHORIZATION,
        HeaderName::from_static("x-requested-with"),
        ACCEPT,
        ORIGIN,
        HeaderName::from_static("x-tenant-id"),
        HeaderName::from_static("x-tenant-domain"),
        HeaderName::from_static("x-session-id"),
        HeaderName::from_static("x-admin-api-key"),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginRejected(pub String);

impl IntoResponse for OriginRejected {
    fn into_response(self) -> Response {
        ApiError::forbidden(REJECTED_MESSAGE).into_response()
    }
}

/// Refuse requests from origins the policy does not authorize.
///
/// # Errors
/// Returns [`OriginRejected`] (rendered as `403`) for an unauthorized origin.
pub async fn origin_gate(
    State(policy): State<Arc<OriginPolicy>>,
    request: Request,
    next: Next,
) -> Result<Response, OriginRejected> {
    let rejected = match request.headers().get(ORIGIN) {
        None => None,
        Some(value) => match value.to_str() {
            Ok(origin) => match policy.classify(origin) {
                Some(rule) => {
                    debug!("Origin {} allowed by {} rule", origin, rule.kind());
                    None
                }
                None => Some(origin.to_string()),
            },
            Err(_) => Some(String::from_utf8_lossy(value.as_bytes()).into_owned()),
        },
    };

    if let Some(origin) = rejected {
        warn!("Rejected request from origin {}", origin);
        return Err(OriginRejected(origin));
    }

    Ok(next.run(request).await)
}

#[must_use]
pub fn layer(policy: Arc<OriginPolicy>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .is_ok_and(|origin| policy.is_authorized(Some(origin)))
            },
        ))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(allowed_headers())
        .allow_credentials(true)
}
