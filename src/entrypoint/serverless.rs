//! Process-wide entrypoint for serverless platforms.
//!
//! The platform calls [`handler`] once per invocation and may reuse the process
//! for the next one, so the entrypoint (and the application it caches) lives in
//! a static. Configuration comes from `AUTHGATE_*` environment variables unless
//! the embedding function [`install`]s its own entrypoint first.

use anyhow::Result;
use axum::{body::Body, http::Request, response::Response};
use std::sync::{Arc, OnceLock};
use tracing::warn;

use super::Entrypoint;
use crate::{
    bootstrap::ApplicationBootstrap,
    config::{EnvSettings, Environment, Settings, SettingsProvider},
    database::PgProvider,
};

static ENTRYPOINT: OnceLock<Entrypoint> = OnceLock::new();

/// Settings for a function invocation: always serverless, whatever the
/// environment says.
#[derive(Clone, Copy, Debug, Default)]
pub struct FunctionSettings<P = EnvSettings>(pub P);

impl<P: SettingsProvider> SettingsProvider for FunctionSettings<P> {
    fn load(&self) -> Result<Settings> {
        Ok(self.0.load()?.with_serverless(true))
    }
}

/// Install the entrypoint used by [`handler`].
///
/// # Errors
/// Returns the given entrypoint back if one is already in use.
pub fn install(entrypoint: Entrypoint) -> Result<(), Entrypoint> {
    ENTRYPOINT.set(entrypoint)
}

/// The installed entrypoint, or one built from the environment on first use.
pub fn entrypoint() -> &'static Entrypoint {
    ENTRYPOINT.get_or_init(from_env)
}

/// Handle one invocation.
pub async fn handler(request: Request<Body>) -> Response {
    entrypoint().handle(request).await
}

fn from_env() -> Entrypoint {
    // Bootstrap re-reads the environment; this read only decides error exposure.
    let settings = FunctionSettings(EnvSettings);
    let environment = match settings.load() {
        Ok(settings) => settings.environment,
        Err(err) => {
            warn!("Failed to read settings from environment: {:#}", err);
            Environment::Production
        }
    };

    let bootstrap = ApplicationBootstrap::new(Arc::new(settings), Arc::new(PgProvider));

    Entrypoint::new(bootstrap, environment)
}
