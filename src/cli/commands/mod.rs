pub mod database;
pub mod logging;
pub mod origins;

use anyhow::Result;
use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        BoolishValueParser, ValueParser,
    },
    Arg, ArgAction, ArgMatches, ColorChoice, Command,
};
use secrecy::SecretString;
use std::sync::OnceLock;

use crate::config::{Environment, Settings};

pub const ARG_PORT: &str = "port";
pub const ARG_SERVERLESS: &str = "serverless";
pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_JWT_SECRET: &str = "jwt-secret";

static LONG_VERSION: OnceLock<String> = OnceLock::new();

fn long_version() -> &'static str {
    LONG_VERSION.get_or_init(|| format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH))
}

fn validator_environment() -> ValueParser {
    ValueParser::from(|value: &str| value.parse::<Environment>())
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let command = Command::new("authgate")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version())
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("AUTHGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SERVERLESS)
                .long(ARG_SERVERLESS)
                .help("Defer database connections to first use")
                .env("AUTHGATE_SERVERLESS")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .short('e')
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment: development, production, test")
                .env("AUTHGATE_ENV")
                .default_value("development")
                .value_parser(validator_environment()),
        )
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign session tokens")
                .env("AUTHGATE_JWT_SECRET")
                .hide_env_values(true),
        );

    let command = database::with_args(command);
    let command = origins::with_args(command);
    logging::with_args(command)
}

/// Variables set by the hosting platform on serverless functions.
pub const SERVERLESS_PLATFORM_VARS: [&str; 2] = ["VERCEL", "VERCEL_ENV"];

/// True when running as a serverless function, whatever the flag says.
#[must_use]
pub fn serverless_platform() -> bool {
    SERVERLESS_PLATFORM_VARS
        .iter()
        .any(|key| std::env::var_os(key).is_some_and(|value| !value.is_empty()))
}

/// Build [`Settings`] from parsed matches.
///
/// A missing JWT secret is not an error here; bootstrap refuses to start
/// without one.
///
/// # Errors
/// Returns an error if an argument is present but invalid.
pub fn settings(matches: &ArgMatches) -> Result<Settings> {
    let database_opts = database::Options::parse(matches)?;
    let origin_opts = origins::Options::parse(matches)?;

    Ok(Settings {
        serverless: matches.get_flag(ARG_SERVERLESS) || serverless_platform(),
        environment: matches
            .get_one::<Environment>(ARG_ENVIRONMENT)
            .copied()
            .unwrap_or_default(),
        jwt_secret: matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::from(v.clone())),
        frontend_url: origin_opts.frontend_url,
        dsn: database_opts.dsn.map(SecretString::from),
        allowed_origins: origin_opts.allowed,
        primary_domain: origin_opts.primary_domain,
        preview_suffix: origin_opts.preview_suffix,
        connect_timeout: database_opts.connect_timeout,
        max_connections: database_opts.max_connections,
    })
}
