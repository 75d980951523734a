//! Optional query interceptor registration.
//!
//! The interceptor (field-level encryption) is defense in depth, so failing to
//! build or register it degrades the service instead of stopping it. The
//! outcome is resolved once per bootstrap and kept as an
//! [`InterceptorCapability`].

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{DatabaseClient, QueryInterceptor};
use crate::config::Settings;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MiddlewareLoadError {
    #[error("interceptor {0} is unavailable: {1}")]
    Unavailable(String, String),
    #[error("failed to construct interceptor {0}: {1}")]
    Construction(String, String),
    #[error("failed to register interceptor {0}: {1}")]
    Registration(String, String),
}

/// Builds the interceptor from configuration at bootstrap time.
pub trait InterceptorFactory: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    /// Returns an error if the interceptor cannot be located or constructed.
    fn build(&self, settings: &Settings) -> Result<Arc<dyn QueryInterceptor>, MiddlewareLoadError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterceptorCapability {
    Present { name: String },
    Absent,
}

impl InterceptorCapability {
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MiddlewareRegistrar;

impl MiddlewareRegistrar {
    /// Attach the interceptor if one is configured. Never fails the caller.
    pub fn attach(
        client: &dyn DatabaseClient,
        factory: Option<&dyn InterceptorFactory>,
        settings: &Settings,
    ) -> InterceptorCapability {
        let Some(factory) = factory else {
            debug!("No query interceptor configured");
            return InterceptorCapability::Absent;
        };

        match Self::try_attach(client, factory, settings) {
            Ok(name) => {
                info!("Query interceptor {} registered", name);
                InterceptorCapability::Present { name }
            }
            Err(err) => {
                warn!("Continuing without query interceptor: {}", err);
                InterceptorCapability::Absent
            }
        }
    }

    fn try_attach(
        client: &dyn DatabaseClient,
        factory: &dyn InterceptorFactory,
        settings: &Settings,
    ) -> Result<String, MiddlewareLoadError> {
        let interceptor = factory.build(settings)?;
        let name = interceptor.name().to_string();
        client.register_interceptor(interceptor)?;
        Ok(name)
    }
}
