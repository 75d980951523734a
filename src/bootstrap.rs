//! Process-wide application bootstrap.
//!
//! The wired application is expensive to build (settings, database client,
//! interceptor, router), so it is built once and cached for the life of the
//! process. Concurrent callers share a single in-flight initialization: the
//! first caller that finds nothing cached publishes a pending outcome and
//! starts the wiring on its own task, everyone else waits on that outcome.
//! Because the wiring runs on a spawned task, a caller that goes away does not
//! cancel it. A failed attempt caches nothing and the next call starts over.

use axum::{body::Body, http::Request, response::Response, Router};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tower::ServiceExt;
use tracing::{error, info, instrument};

use crate::{
    api,
    config::{Environment, EnvironmentContext, SettingsProvider},
    database::{
        ConnectionError, ConnectionManager, DatabaseProvider, InterceptorCapability,
        InterceptorFactory, MiddlewareRegistrar,
    },
    origin::OriginPolicy,
};

#[derive(Debug, Clone, Error)]
pub enum BootstrapError {
    #[error("JWT secret is not configured")]
    MissingSecret,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("bootstrap failed: {0}")]
    Unhandled(String),
}

type Outcome = Result<Arc<Application>, BootstrapError>;

enum BootstrapState {
    NotStarted,
    InProgress(watch::Receiver<Option<Outcome>>),
    Ready(Arc<Application>),
}

/// The fully wired application cached by [`ApplicationBootstrap`].
pub struct Application {
    router: Router,
    connection: Arc<ConnectionManager>,
    context: EnvironmentContext,
    environment: Environment,
    policy: Arc<OriginPolicy>,
    interceptor: InterceptorCapability,
}

impl Application {
    /// Run one request through the wrapped router.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    #[must_use]
    pub const fn context(&self) -> &EnvironmentContext {
        &self.context
    }

    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn policy(&self) -> &OriginPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn interceptor(&self) -> &InterceptorCapability {
        &self.interceptor
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("context", &self.context)
            .field("environment", &self.environment)
            .field("interceptor", &self.interceptor)
            .finish_non_exhaustive()
    }
}

// Everything one bootstrap attempt needs, detached from the caller.
#[derive(Clone)]
struct Wiring {
    settings: Arc<dyn SettingsProvider>,
    database: Arc<dyn DatabaseProvider>,
    interceptor: Option<Arc<dyn InterceptorFactory>>,
    routes: Router,
}

impl Wiring {
    #[instrument(skip(self), name = "bootstrap")]
    async fn run(self) -> Outcome {
        info!("Initializing auth service");

        let settings = self
            .settings
            .load()
            .map_err(|err| BootstrapError::Unhandled(format!("failed to load settings: {err:#}")))?;
        let context = settings.context();

        if !context.has_required_secret {
            error!("JWT secret is not configured in the auth service environment");
            return Err(BootstrapError::MissingSecret);
        }

        let policy = OriginPolicy::from_settings(&settings)
            .map_err(|err| BootstrapError::Unhandled(format!("invalid origin policy: {err}")))?;
        let policy = Arc::new(policy);

        let client = self.database.open(&settings).map_err(|err| {
            BootstrapError::Unhandled(format!("failed to create database client: {err}"))
        })?;

        let connection = Arc::new(ConnectionManager::new(
            client.clone(),
            settings.connect_timeout,
        ));
        let state = connection.prepare(&context).await.map_err(|err| {
            error!(
                "Database connection string configured: {}",
                if settings.dsn.is_some() { "yes" } else { "no" }
            );
            BootstrapError::from(err)
        })?;

        let interceptor =
            MiddlewareRegistrar::attach(client.as_ref(), self.interceptor.as_deref(), &settings);

        let router = api::router(
            self.routes,
            policy.clone(),
            connection.clone(),
            settings.environment,
        );

        info!(
            "Auth service initialized (environment: {}, serverless: {}, database: {})",
            settings.environment, context.is_serverless, state
        );

        Ok(Arc::new(Application {
            router,
            connection,
            context,
            environment: settings.environment,
            policy,
            interceptor,
        }))
    }
}

/// Builds the [`Application`] at most once per process and hands out the cached handle.
///
/// Clones share the same cached state.
#[derive(Clone)]
pub struct ApplicationBootstrap {
    wiring: Wiring,
    state: Arc<Mutex<BootstrapState>>,
}

impl ApplicationBootstrap {
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsProvider>, database: Arc<dyn DatabaseProvider>) -> Self {
        Self {
            wiring: Wiring {
                settings,
                database,
                interceptor: None,
                routes: Router::new(),
            },
            state: Arc::new(Mutex::new(BootstrapState::NotStarted)),
        }
    }

    #[must_use]
    pub fn with_interceptor(mut self, factory: Arc<dyn InterceptorFactory>) -> Self {
        self.wiring.interceptor = Some(factory);
        self
    }

    /// Business routes served behind the origin policy.
    #[must_use]
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.wiring.routes = routes;
        self
    }

    /// Return the cached application, building it first if needed.
    ///
    /// # Errors
    /// Returns the error of the bootstrap attempt this call waited on.
    pub async fn get_or_create(&self) -> Result<Arc<Application>, BootstrapError> {
        let mut pending = {
            let mut state = self.state.lock().await;
            let in_flight = match &*state {
                BootstrapState::Ready(app) => return Ok(app.clone()),
                BootstrapState::InProgress(pending) => Some(pending.clone()),
                BootstrapState::NotStarted => None,
            };

            match in_flight {
                Some(pending) => pending,
                None => {
                    let (tx, rx) = watch::channel(None);
                    *state = BootstrapState::InProgress(rx.clone());
                    self.spawn(tx);
                    rx
                }
            }
        };

        let outcome = match pending.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            Err(BootstrapError::Unhandled(
                "bootstrap ended without an outcome".to_string(),
            ))
        })
    }

    fn spawn(&self, tx: watch::Sender<Option<Outcome>>) {
        let wiring = self.wiring.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            // A panic while wiring must still release the waiters.
            let outcome = match tokio::spawn(wiring.run()).await {
                Ok(outcome) => outcome,
                Err(err) => Err(BootstrapError::Unhandled(format!(
                    "bootstrap task failed: {err}"
                ))),
            };

            if let Err(err) = &outcome {
                error!("Failed to initialize auth service: {}", err);
            }

            {
                let mut state = state.lock().await;
                *state = match &outcome {
                    Ok(app) => BootstrapState::Ready(app.clone()),
                    Err(_) => BootstrapState::NotStarted,
                };
            }

            tx.send_replace(Some(outcome));
        });
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.lock().await, BootstrapState::Ready(_))
    }

    /// Tear down the cached application's connection and forget it.
    pub async fn shutdown(&self) {
        let app = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, BootstrapState::NotStarted) {
                BootstrapState::Ready(app) => Some(app),
                other => {
                    *state = other;
                    None
                }
            }
        };

        if let Some(app) = app {
            app.connection().teardown().await;
            info!("Auth service shut down");
        }
    }
}

impl fmt::Debug for ApplicationBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationBootstrap")
            .field("interceptor", &self.wiring.interceptor.as_ref().map(|i| i.name().to_string()))
            .finish_non_exhaustive()
    }
}
