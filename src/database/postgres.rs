use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Connection,
};
use std::{
    fmt,
    sync::{Arc, RwLock},
    time::Duration,
};
use secrecy::ExposeSecret;
use tracing::{debug, info_span, Instrument};

use super::{
    ClientFuture, ConnectionError, DatabaseClient, DatabaseProvider, InterceptError,
    MiddlewareLoadError, QueryInterceptor, QueryParams,
};
use crate::config::Settings;

const POOL_MAX_LIFETIME_SECONDS: u64 = 60 * 2;

/// Postgres client backed by a lazily connecting `sqlx` pool.
pub struct PgDatabase {
    pool: PgPool,
    interceptors: RwLock<Vec<Arc<dyn QueryInterceptor>>>,
}

impl PgDatabase {
    /// Create the pool without opening any connection.
    ///
    /// # Errors
    /// Returns an error if the connection string cannot be parsed.
    pub fn lazy(
        dsn: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(max_connections)
            .max_lifetime(Duration::from_secs(POOL_MAX_LIFETIME_SECONDS))
            .acquire_timeout(acquire_timeout)
            .test_before_acquire(true)
            .connect_lazy(dsn)?;

        Ok(Self {
            pool,
            interceptors: RwLock::new(Vec::new()),
        })
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `params` through the registered interceptors, in registration order.
    ///
    /// # Errors
    /// Returns the first interceptor error.
    pub fn prepare_query(&self, mut params: QueryParams) -> Result<QueryParams, InterceptError> {
        let interceptors = match self.interceptors.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        for interceptor in &interceptors {
            interceptor.intercept(&mut params)?;
        }

        Ok(params)
    }

    async fn acquire_and_ping(&self) -> Result<(), ConnectionError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;

        Ok(())
    }
}

impl DatabaseClient for PgDatabase {
    fn connect(&self) -> ClientFuture<'_> {
        Box::pin(self.acquire_and_ping())
    }

    fn disconnect(&self) -> ClientFuture<'_> {
        Box::pin(async move {
            self.pool.close().await;
            Ok(())
        })
    }

    fn ping(&self) -> ClientFuture<'_> {
        Box::pin(self.acquire_and_ping())
    }

    fn register_interceptor(
        &self,
        interceptor: Arc<dyn QueryInterceptor>,
    ) -> Result<(), MiddlewareLoadError> {
        let name = interceptor.name().to_string();
        let mut interceptors = self.interceptors.write().map_err(|_| {
            MiddlewareLoadError::Registration(name.clone(), "interceptor chain poisoned".to_string())
        })?;

        debug!("Registering query interceptor {}", name);
        interceptors.push(interceptor);

        Ok(())
    }
}

impl fmt::Debug for PgDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interceptors = self.interceptors.read().map_or(0, |guard| guard.len());
        f.debug_struct("PgDatabase")
            .field("pool_size", &self.pool.size())
            .field("interceptors", &interceptors)
            .finish()
    }
}

/// Opens a [`PgDatabase`] from the configured connection string.
#[derive(Clone, Copy, Debug, Default)]
pub struct PgProvider;

impl DatabaseProvider for PgProvider {
    fn open(&self, settings: &Settings) -> Result<Arc<dyn DatabaseClient>, ConnectionError> {
        let dsn = settings
            .dsn
            .as_ref()
            .map(|dsn| dsn.expose_secret().trim())
            .filter(|dsn| !dsn.is_empty())
            .ok_or_else(|| {
                ConnectionError::Configuration(
                    "database connection string is not configured".to_string(),
                )
            })?;

        let database = PgDatabase::lazy(dsn, settings.max_connections, settings.connect_timeout)?;

        Ok(Arc::new(database))
    }
}
