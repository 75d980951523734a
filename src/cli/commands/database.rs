use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

use crate::config::{DEFAULT_CONNECT_TIMEOUT_SECONDS, DEFAULT_MAX_CONNECTIONS};

pub const ARG_DSN: &str = "dsn";
pub const ARG_CONNECT_TIMEOUT: &str = "connect-timeout";
pub const ARG_MAX_CONNECTIONS: &str = "max-connections";

#[derive(Debug, Clone)]
pub struct Options {
    pub dsn: Option<String>,
    pub connect_timeout: Duration,
    pub max_connections: u32,
}

impl Options {
    /// Parse database arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the timeout or pool size is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let connect_timeout = matches
            .get_one::<u64>(ARG_CONNECT_TIMEOUT)
            .copied()
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS);
        if connect_timeout == 0 {
            anyhow::bail!("--{ARG_CONNECT_TIMEOUT} must be greater than zero");
        }

        let max_connections = matches
            .get_one::<u32>(ARG_MAX_CONNECTIONS)
            .copied()
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        if max_connections == 0 {
            anyhow::bail!("--{ARG_MAX_CONNECTIONS} must be greater than zero");
        }

        Ok(Self {
            dsn: matches
                .get_one::<String>(ARG_DSN)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
            connect_timeout: Duration::from_secs(connect_timeout),
            max_connections,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("AUTHGATE_DSN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_CONNECT_TIMEOUT)
                .long(ARG_CONNECT_TIMEOUT)
                .help("Seconds to wait for the startup connection")
                .env("AUTHGATE_CONNECT_TIMEOUT")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_MAX_CONNECTIONS)
                .long(ARG_MAX_CONNECTIONS)
                .help("Maximum number of pooled connections")
                .env("AUTHGATE_MAX_CONNECTIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
}
