//! Per-request entry into the cached application.

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use tracing::{error, instrument};

use crate::{api::ApiError, bootstrap::ApplicationBootstrap, config::Environment};

pub mod serverless;

#[derive(Clone, Debug)]
pub struct Entrypoint {
    bootstrap: ApplicationBootstrap,
    expose_errors: bool,
}

impl Entrypoint {
    /// `environment` decides whether failure details reach the caller.
    #[must_use]
    pub fn new(bootstrap: ApplicationBootstrap, environment: Environment) -> Self {
        Self {
            bootstrap,
            expose_errors: environment.exposes_errors(),
        }
    }

    #[must_use]
    pub const fn bootstrap(&self) -> &ApplicationBootstrap {
        &self.bootstrap
    }

    /// Obtain the cached application, building it if needed, and dispatch.
    ///
    /// Never fails: a bootstrap error becomes a generic `500`.
    #[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
    pub async fn handle(&self, request: Request<Body>) -> Response {
        match self.bootstrap.get_or_create().await {
            Ok(app) => app.dispatch(request).await,
            Err(err) => {
                error!("Error handling request: {}", err);
                ApiError::internal(err.to_string(), self.expose_errors).into_response()
            }
        }
    }
}
