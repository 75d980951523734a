//! `/health`: connection state plus a bounded database ping.

use crate::{
    database::{ConnectionManager, ConnectionState},
    GIT_COMMIT_HASH,
};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};
use utoipa::ToSchema;

const HEALTH_DB_TIMEOUT_SECONDS: u64 = 2;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    pub commit: String,
    pub name: String,
    pub version: String,
    pub database: String,
    pub status: String,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Database is reachable", body = Health),
        (status = 503, description = "Database is unreachable or torn down", body = Health)
    ),
    tag = "health",
)]
/// Report build information and database reachability.
pub async fn health(
    method: Method,
    connection: Extension<Arc<ConnectionManager>>,
) -> impl IntoResponse {
    let state = connection.state().await;

    let healthy = if state == ConnectionState::Disconnected {
        false
    } else {
        match connection
            .probe(Duration::from_secs(HEALTH_DB_TIMEOUT_SECONDS))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!("Database health probe failed: {}", err);
                false
            }
        }
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: state.to_string(),
        status: if healthy { "ok" } else { "error" }.to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .map_err(|err| {
            debug!("Failed to parse X-App header: {}", err);
        })
        .unwrap_or_else(|()| HeaderMap::new());

    if healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
