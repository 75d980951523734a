use crate::{
    config::Environment, database::ConnectionManager, entrypoint::Entrypoint,
    origin::OriginPolicy,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use std::{any::Any, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, error, info, Span};
use ulid::Ulid;
use utoipa::OpenApi;

pub mod cors;
pub mod error;
pub mod handlers;

pub use self::error::{ApiError, ErrorBody};
use self::handlers::health;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(OpenApi)]
#[openapi(
    paths(health::health),
    components(schemas(health::Health)),
    tags((name = "health", description = "Service health"))
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Wrap the business routes with the entry layer.
///
/// Outermost first: request id, tracing span, panic capture, origin gate,
/// CORS headers. `/health` is added next to the business routes, which must
/// not define it themselves.
#[must_use]
pub fn router(
    routes: Router,
    policy: Arc<OriginPolicy>,
    connection: Arc<ConnectionManager>,
    environment: Environment,
) -> Router {
    let expose_errors = environment.exposes_errors();

    routes
        .route("/health", get(health::health).options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID_HEADER),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID_HEADER,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CatchPanicLayer::custom(
                    move |panic: Box<dyn Any + Send + 'static>| {
                        panic_response(panic, expose_errors)
                    },
                ))
                .layer(middleware::from_fn_with_state(
                    policy.clone(),
                    cors::origin_gate,
                ))
                .layer(cors::layer(policy))
                .layer(Extension(connection)),
        )
}

/// Serve every request through `entrypoint` until ctrl-c or SIGTERM.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(port: u16, entrypoint: Entrypoint) -> Result<()> {
    let app = Router::new().fallback(move |request: Request<Body>| {
        let entrypoint = entrypoint.clone();
        async move { entrypoint.handle(request).await }
    });

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn panic_response(panic: Box<dyn Any + Send + 'static>, expose_errors: bool) -> Response<Body> {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "handler panicked".to_string()
    };

    error!("Request handler panicked: {}", detail);

    ApiError::internal(detail, expose_errors).into_response()
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
