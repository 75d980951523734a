//! End-to-end checks of the entry layer through its public API, with an
//! in-memory database client standing in for Postgres.

use authgate::{
    bootstrap::{ApplicationBootstrap, BootstrapError},
    config::{Environment, Settings, SettingsProvider, StaticSettings},
    database::{
        ClientFuture, ConnectionError, ConnectionState, DatabaseClient, DatabaseProvider,
        InterceptError, InterceptorCapability, InterceptorFactory, MiddlewareLoadError,
        QueryInterceptor, QueryParams,
    },
    entrypoint::Entrypoint,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinSet;

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

struct MemoryClient {
    counters: Arc<Counters>,
    reachable: bool,
}

impl DatabaseClient for MemoryClient {
    fn connect(&self) -> ClientFuture<'_> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let reachable = self.reachable;
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            if reachable {
                Ok(())
            } else {
                Err(ConnectionError::Unreachable("connection refused".to_string()))
            }
        })
    }

    fn disconnect(&self) -> ClientFuture<'_> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn ping(&self) -> ClientFuture<'_> {
        let reachable = self.reachable;
        Box::pin(async move {
            if reachable {
                Ok(())
            } else {
                Err(ConnectionError::Unreachable("connection refused".to_string()))
            }
        })
    }

    fn register_interceptor(
        &self,
        _interceptor: Arc<dyn QueryInterceptor>,
    ) -> Result<(), MiddlewareLoadError> {
        Ok(())
    }
}

struct MemoryProvider {
    counters: Arc<Counters>,
    reachable: bool,
}

impl DatabaseProvider for MemoryProvider {
    fn open(&self, _settings: &Settings) -> Result<Arc<dyn DatabaseClient>, ConnectionError> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryClient {
            counters: self.counters.clone(),
            reachable: self.reachable,
        }))
    }
}

struct Redactor;

impl QueryInterceptor for Redactor {
    fn name(&self) -> &str {
        "field-encryption"
    }

    fn intercept(&self, _params: &mut QueryParams) -> Result<(), InterceptError> {
        Ok(())
    }
}

struct RedactorFactory {
    key_configured: bool,
}

impl InterceptorFactory for RedactorFactory {
    fn name(&self) -> &str {
        "field-encryption"
    }

    fn build(&self, _settings: &Settings) -> Result<Arc<dyn QueryInterceptor>, MiddlewareLoadError> {
        if self.key_configured {
            Ok(Arc::new(Redactor))
        } else {
            Err(MiddlewareLoadError::Unavailable(
                "field-encryption".to_string(),
                "encryption key not configured".to_string(),
            ))
        }
    }
}

fn settings() -> Settings {
    Settings::default()
        .with_jwt_secret("integration-secret")
        .with_dsn("postgres://auth@localhost:5432/auth")
        .with_frontend_url("https://app.example.com/dashboard")
        .with_connect_timeout(Duration::from_millis(500))
}

fn routes() -> Router {
    Router::new()
        .route("/auth/login", post(|| async { "token" }))
        .route("/auth/me", get(|| async { "me" }))
}

fn build(
    settings: Settings,
    reachable: bool,
    key_configured: bool,
) -> (ApplicationBootstrap, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let provider: Arc<dyn DatabaseProvider> = Arc::new(MemoryProvider {
        counters: counters.clone(),
        reachable,
    });
    let settings: Arc<dyn SettingsProvider> = Arc::new(StaticSettings::new(settings));
    let bootstrap = ApplicationBootstrap::new(settings, provider)
        .with_interceptor(Arc::new(RedactorFactory { key_configured }))
        .with_routes(routes());
    (bootstrap, counters)
}

fn request(method: Method, uri: &str, origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    match builder.body(Body::empty()) {
        Ok(request) => request,
        Err(err) => panic!("invalid request: {err}"),
    }
}

async fn body_string(response: Response) -> String {
    match to_bytes(response.into_body(), usize::MAX).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => panic!("failed to read body: {err}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cold_start_burst_initializes_once() {
    let (bootstrap, counters) = build(settings(), true, true);
    let entrypoint = Entrypoint::new(bootstrap, Environment::Production);

    let mut tasks = JoinSet::new();
    for _ in 0..32 {
        let entrypoint = entrypoint.clone();
        tasks.spawn(async move {
            entrypoint
                .handle(request(
                    Method::POST,
                    "/auth/login",
                    Some("https://app.example.com"),
                ))
                .await
                .status()
        });
    }

    while let Some(status) = tasks.join_next().await {
        assert!(matches!(status, Ok(StatusCode::OK)));
    }

    assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn origin_policy_is_enforced_end_to_end() {
    let (bootstrap, _) = build(settings(), true, true);
    let entrypoint = Entrypoint::new(bootstrap, Environment::Production);

    let allowed = [
        "https://app.example.com",
        "http://localhost:8080",
        "http://mystore.localhost:8080",
        "https://shop.saaah.com",
        "http://192.168.1.20:3000",
        "https://my-branch-abc123.vercel.app",
    ];
    for origin in allowed {
        let response = entrypoint
            .handle(request(Method::GET, "/auth/me", Some(origin)))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{origin} should be allowed");
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|value| value.to_str().ok()),
            Some(origin)
        );
    }

    let rejected = [
        "https://evil.example",
        "http://10.0.0.5",
        "https://app.example.com.evil.example",
    ];
    for origin in rejected {
        let response = entrypoint
            .handle(request(Method::GET, "/auth/me", Some(origin)))
            .await;
        assert_eq!(
            response.status(),
            StatusCode::FORBIDDEN,
            "{origin} should be rejected"
        );
        assert_eq!(
            body_string(response).await,
            r#"{"success":false,"message":"Not allowed by CORS"}"#
        );
    }

    let response = entrypoint.handle(request(Method::GET, "/auth/me", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unreachable_database_outside_production_is_fatal() {
    let (bootstrap, counters) = build(settings(), false, true);
    let entrypoint = Entrypoint::new(bootstrap.clone(), Environment::Development);

    let response = entrypoint.handle(request(Method::GET, "/auth/me", None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(response)
        .await
        .contains(r#""error":"database unreachable: connection refused""#));

    assert!(matches!(
        bootstrap.get_or_create().await,
        Err(BootstrapError::Connection(ConnectionError::Unreachable(_)))
    ));
    assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_database_in_production_degrades() {
    let production = settings().with_environment(Environment::Production);
    let (bootstrap, _) = build(production, false, false);

    let app = match bootstrap.get_or_create().await {
        Ok(app) => app,
        Err(err) => panic!("production bootstrap should degrade: {err}"),
    };
    assert_eq!(
        app.connection().state().await,
        ConnectionState::DeferredOnDemand
    );
    assert_eq!(app.interceptor(), &InterceptorCapability::Absent);

    let response = app.dispatch(request(Method::GET, "/auth/me", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.dispatch(request(Method::GET, "/health", None)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn serverless_never_connects_eagerly() {
    let serverless = settings().with_serverless(true);
    let (bootstrap, counters) = build(serverless, true, true);
    let entrypoint = Entrypoint::new(bootstrap.clone(), Environment::Production);

    for _ in 0..3 {
        let response = entrypoint.handle(request(Method::GET, "/auth/me", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    assert_eq!(counters.connects.load(Ordering::SeqCst), 0);

    let app = match bootstrap.get_or_create().await {
        Ok(app) => app,
        Err(err) => panic!("bootstrap should succeed: {err}"),
    };
    assert!(app.interceptor().is_present());
}

#[tokio::test]
async fn shutdown_disconnects_persistent_client() {
    let (bootstrap, counters) = build(settings(), true, true);
    assert!(bootstrap.get_or_create().await.is_ok());

    bootstrap.shutdown().await;
    assert!(!bootstrap.is_ready().await);
    assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);
}
