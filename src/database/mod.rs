//! Database client seam.
//!
//! The auth service talks to Postgres through a [`DatabaseClient`]. Only the
//! [`ConnectionManager`] connects or disconnects it; request handlers share the
//! client for queries.

use serde::{Deserialize, Serialize};
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};
use thiserror::Error;

use crate::config::Settings;

pub mod lifecycle;
pub mod middleware;
pub mod postgres;

pub use lifecycle::{ConnectionManager, ConnectionState};
pub use middleware::{InterceptorCapability, InterceptorFactory, MiddlewareLoadError, MiddlewareRegistrar};
pub use postgres::{PgDatabase, PgProvider};

pub type ClientFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ConnectionError>> + Send + 'a>>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("database connection timed out after {0:?}")]
    Timeout(Duration),
    #[error("database authentication failed: {0}")]
    Authentication(String),
    #[error("database unreachable: {0}")]
    Unreachable(String),
    #[error("invalid database configuration: {0}")]
    Configuration(String),
    #[error("database client error: {0}")]
    Client(String),
}

impl From<sqlx::Error> for ConnectionError {
    fn from(error: sqlx::Error) -> Self {
        if is_authentication_error(&error) {
            return Self::Authentication(error.to_string());
        }

        match error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => Self::Unreachable(error.to_string()),
            sqlx::Error::Configuration(_) => Self::Configuration(error.to_string()),
            other => Self::Client(other.to_string()),
        }
    }
}

/// Returns true when the error means the credentials were rejected.
fn is_authentication_error(error: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_error) = error {
        if let Some(code) = db_error.code() {
            if matches!(code.as_ref(), "28P01" | "28000") {
                return true;
            }
        }

        return db_error
            .message()
            .to_ascii_lowercase()
            .contains("password authentication failed");
    }

    error
        .to_string()
        .to_ascii_lowercase()
        .contains("password authentication failed for user")
}

/// Parameters of a single ORM operation as seen by interceptors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub model: String,
    pub action: String,
    pub args: serde_json::Value,
}

impl QueryParams {
    #[must_use]
    pub fn new(model: impl Into<String>, action: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            model: model.into(),
            action: action.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("interceptor {name} rejected {model}.{action}: {reason}")]
pub struct InterceptError {
    pub name: String,
    pub model: String,
    pub action: String,
    pub reason: String,
}

/// A link in the client's query interceptor chain (for example field-level encryption).
pub trait QueryInterceptor: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect or rewrite the parameters before the query runs.
    ///
    /// # Errors
    /// Returns an error to abort the query.
    fn intercept(&self, params: &mut QueryParams) -> Result<(), InterceptError>;
}

pub trait DatabaseClient: Send + Sync {
    fn connect(&self) -> ClientFuture<'_>;
    fn disconnect(&self) -> ClientFuture<'_>;
    fn ping(&self) -> ClientFuture<'_>;

    /// # Errors
    /// Returns an error if the client cannot accept the interceptor.
    fn register_interceptor(
        &self,
        interceptor: Arc<dyn QueryInterceptor>,
    ) -> Result<(), MiddlewareLoadError>;
}

/// Creates the database client for one bootstrap attempt.
pub trait DatabaseProvider: Send + Sync {
    /// # Errors
    /// Returns an error if the client cannot be constructed from the settings.
    fn open(&self, settings: &Settings) -> Result<Arc<dyn DatabaseClient>, ConnectionError>;
}
