//! Process configuration and the execution-environment facts derived from it.

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, str::FromStr, time::Duration};

pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_PRIMARY_DOMAIN: &str = "saaah.com";
pub const DEFAULT_PREVIEW_SUFFIX: &str = "vercel.app";

/// Front-ends that are always allowed unless overridden.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 6] = [
    "http://localhost:4173",
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:4173",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Error details are only shown to callers while developing.
    #[must_use]
    pub const fn exposes_errors(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct Settings {
    pub serverless: bool,
    pub environment: Environment,
    pub jwt_secret: Option<SecretString>,
    pub frontend_url: Option<String>,
    pub dsn: Option<SecretString>,
    pub allowed_origins: Vec<String>,
    pub primary_domain: String,
    pub preview_suffix: String,
    pub connect_timeout: Duration,
    pub max_connections: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            serverless: false,
            environment: Environment::default(),
            jwt_secret: None,
            frontend_url: None,
            dsn: None,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(ToString::to_string)
                .collect(),
            primary_domain: DEFAULT_PRIMARY_DOMAIN.to_string(),
            preview_suffix: DEFAULT_PREVIEW_SUFFIX.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Settings {
    #[must_use]
    pub fn with_serverless(mut self, serverless: bool) -> Self {
        self.serverless = serverless;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(SecretString::from(secret.into()));
        self
    }

    #[must_use]
    pub fn with_frontend_url(mut self, url: impl Into<String>) -> Self {
        self.frontend_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = Some(SecretString::from(dsn.into()));
        self
    }

    #[must_use]
    pub fn with_preview_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.preview_suffix = suffix.into();
        self
    }

    #[must_use]
    pub fn with_primary_domain(mut self, domain: impl Into<String>) -> Self {
        self.primary_domain = domain.into();
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn context(&self) -> EnvironmentContext {
        EnvironmentContext {
            is_serverless: self.serverless,
            is_production: self.environment.is_production(),
            has_required_secret: self
                .jwt_secret
                .as_ref()
                .is_some_and(|secret| !secret.expose_secret().is_empty()),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("serverless", &self.serverless)
            .field("environment", &self.environment)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "***"))
            .field("frontend_url", &self.frontend_url)
            .field("dsn", &self.dsn.as_ref().map(|_| "***"))
            .field("allowed_origins", &self.allowed_origins)
            .field("primary_domain", &self.primary_domain)
            .field("preview_suffix", &self.preview_suffix)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Immutable facts about how this process is executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvironmentContext {
    pub is_serverless: bool,
    pub is_production: bool,
    pub has_required_secret: bool,
}

/// Source of [`Settings`], consulted once per bootstrap attempt.
pub trait SettingsProvider: Send + Sync {
    /// # Errors
    /// Returns an error if the configuration cannot be read or parsed.
    fn load(&self) -> Result<Settings>;
}

/// Settings fixed at construction, used by the long-lived server.
#[derive(Clone, Debug)]
pub struct StaticSettings(Settings);

impl StaticSettings {
    #[must_use]
    pub const fn new(settings: Settings) -> Self {
        Self(settings)
    }
}

impl SettingsProvider for StaticSettings {
    fn load(&self) -> Result<Settings> {
        Ok(self.0.clone())
    }
}

/// Reads `AUTHGATE_*` variables on every load, so a fixed environment is
/// picked up by the next bootstrap attempt.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvSettings;

impl SettingsProvider for EnvSettings {
    fn load(&self) -> Result<Settings> {
        let matches = crate::cli::commands::new().try_get_matches_from([env!("CARGO_PKG_NAME")])?;
        crate::cli::commands::settings(&matches)
    }
}
