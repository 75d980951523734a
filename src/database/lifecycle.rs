//! Connection lifecycle of the shared database client.
//!
//! Serverless platforms recycle the process per request, so connecting at
//! startup only adds latency: the client is left to open its connection on
//! the first query. A persistent process connects eagerly within a bounded
//! timeout. Outside production a failed connect aborts startup; in production
//! the process keeps running and the client retries on demand.

use std::{fmt, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::timeout};
use tracing::{error, info, instrument, warn};

use super::{ConnectionError, DatabaseClient};
use crate::config::EnvironmentContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connected,
    DeferredOnDemand,
    Disconnected,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connected => "connected",
            Self::DeferredOnDemand => "on-demand",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ConnectionManager {
    client: Arc<dyn DatabaseClient>,
    connect_timeout: Duration,
    state: Mutex<ConnectionState>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(client: Arc<dyn DatabaseClient>, connect_timeout: Duration) -> Self {
        Self {
            client,
            connect_timeout,
            state: Mutex::new(ConnectionState::Uninitialized),
        }
    }

    /// Bring the client into a usable state for the given environment.
    ///
    /// Calling it again after a successful prepare returns the current state
    /// without reconnecting.
    ///
    /// # Errors
    /// Returns the connection error only for a persistent, non-production process.
    #[instrument(skip(self))]
    pub async fn prepare(
        &self,
        ctx: &EnvironmentContext,
    ) -> Result<ConnectionState, ConnectionError> {
        let mut state = self.state.lock().await;
        if *state != ConnectionState::Uninitialized {
            return Ok(*state);
        }

        if ctx.is_serverless {
            info!("Database ready (serverless mode, connections are created on demand)");
            *state = ConnectionState::DeferredOnDemand;
            return Ok(*state);
        }

        let result = match timeout(self.connect_timeout, self.client.connect()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout(self.connect_timeout)),
        };

        match result {
            Ok(()) => {
                info!("Database connected");
                *state = ConnectionState::Connected;
                Ok(*state)
            }
            Err(err) if ctx.is_production => {
                error!("Failed to connect to database: {}", err);
                warn!("Continuing without a connection, the client will retry on demand");
                *state = ConnectionState::DeferredOnDemand;
                Ok(*state)
            }
            Err(err) => {
                error!("Failed to connect to database: {}", err);
                Err(err)
            }
        }
    }

    /// Release the connection. Safe to call any number of times.
    pub async fn teardown(&self) {
        let mut state = self.state.lock().await;
        if *state == ConnectionState::Connected {
            match self.client.disconnect().await {
                Ok(()) => info!("Database disconnected"),
                Err(err) => warn!("Failed to disconnect from database: {}", err),
            }
        }
        *state = ConnectionState::Disconnected;
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Ping the database for health reporting.
    ///
    /// # Errors
    /// Returns an error if the manager was torn down, the ping fails, or it times out.
    pub async fn probe(&self, limit: Duration) -> Result<(), ConnectionError> {
        if self.state().await == ConnectionState::Disconnected {
            return Err(ConnectionError::Client("connection was torn down".to_string()));
        }

        match timeout(limit, self.client.ping()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout(limit)),
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}
