use crate::{
    api,
    bootstrap::ApplicationBootstrap,
    cli::telemetry,
    config::{Settings, StaticSettings},
    database::PgProvider,
    entrypoint::Entrypoint,
};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub settings: Settings,
}

/// Execute the server action.
///
/// The application is bootstrapped before the listener is bound so a
/// persistent process fails fast on a broken configuration.
///
/// # Errors
/// Returns an error if bootstrap or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let environment = args.settings.environment;
    let bootstrap = ApplicationBootstrap::new(
        Arc::new(StaticSettings::new(args.settings)),
        Arc::new(PgProvider),
    );

    bootstrap
        .get_or_create()
        .await
        .context("Failed to initialize auth service")?;

    let result = api::serve(args.port, Entrypoint::new(bootstrap.clone(), environment)).await;

    bootstrap.shutdown().await;
    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let settings = &args.settings;
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("environment", settings.environment.to_string()),
        ("serverless", settings.serverless.to_string()),
        (
            "dsn",
            settings
                .dsn
                .as_ref()
                .map_or_else(|| "none".to_string(), |dsn| redact_dsn(dsn.expose_secret())),
        ),
        ("jwt_secret_set", settings.jwt_secret.is_some().to_string()),
        (
            "frontend_url",
            settings
                .frontend_url
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        ),
        ("allowed_origins", settings.allowed_origins.join(", ")),
        ("primary_domain", settings.primary_domain.clone()),
        ("preview_suffix", settings.preview_suffix.clone()),
        (
            "connect_timeout",
            format!("{}s", settings.connect_timeout.as_secs()),
        ),
        ("max_connections", settings.max_connections.to_string()),
    ];
    info!("{}", format_entries("Startup configuration", &entries));
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() && parsed.set_password(Some("REDACTED")).is_err() {
                return "invalid-dsn".to_string();
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn format_entries(title: &str, entries: &[(&str, String)]) -> String {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    message
}

fn banner() -> String {
    let short_hash = short_commit(crate::GIT_COMMIT_HASH);
    BANNER.replace(
        "{VERSION}",
        &format!(" - {} - {}", env!("CARGO_PKG_VERSION"), short_hash),
    )
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}

const BANNER: &str = r"
   .-----.
  /  .-.  \
  | |   | |
 _|_|___|_|_
|    (o)    |  A U T H G A T E {VERSION}
|     |     |
|___________|";
