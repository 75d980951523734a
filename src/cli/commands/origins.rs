use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::config::{DEFAULT_ALLOWED_ORIGINS, DEFAULT_PREVIEW_SUFFIX, DEFAULT_PRIMARY_DOMAIN};

pub const ARG_ALLOWED_ORIGINS: &str = "allowed-origins";
pub const ARG_FRONTEND_URL: &str = "frontend-url";
pub const ARG_PRIMARY_DOMAIN: &str = "primary-domain";
pub const ARG_PREVIEW_SUFFIX: &str = "preview-suffix";

#[derive(Debug, Clone)]
pub struct Options {
    pub allowed: Vec<String>,
    pub frontend_url: Option<String>,
    pub primary_domain: String,
    pub preview_suffix: String,
}

impl Options {
    /// Parse origin policy arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a domain argument is blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_domain = |id: &str| -> anyhow::Result<String> {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().trim_start_matches('.').to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let allowed = matches
            .get_many::<String>(ARG_ALLOWED_ORIGINS)
            .map(|values| {
                values
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            allowed,
            frontend_url: matches
                .get_one::<String>(ARG_FRONTEND_URL)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            primary_domain: read_domain(ARG_PRIMARY_DOMAIN)?,
            preview_suffix: read_domain(ARG_PREVIEW_SUFFIX)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ALLOWED_ORIGINS)
                .long(ARG_ALLOWED_ORIGINS)
                .help("Origins allowed verbatim, comma separated")
                .env("AUTHGATE_ALLOWED_ORIGINS")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .default_values(DEFAULT_ALLOWED_ORIGINS),
        )
        .arg(
            Arg::new(ARG_FRONTEND_URL)
                .long(ARG_FRONTEND_URL)
                .help("Front-end URL, its origin is always allowed")
                .env("AUTHGATE_FRONTEND_URL"),
        )
        .arg(
            Arg::new(ARG_PRIMARY_DOMAIN)
                .long(ARG_PRIMARY_DOMAIN)
                .help("Domain whose subdomains are allowed over http and https")
                .env("AUTHGATE_PRIMARY_DOMAIN")
                .default_value(DEFAULT_PRIMARY_DOMAIN),
        )
        .arg(
            Arg::new(ARG_PREVIEW_SUFFIX)
                .long(ARG_PREVIEW_SUFFIX)
                .help("Hosting suffix of preview deployments allowed over https")
                .env("AUTHGATE_PREVIEW_SUFFIX")
                .default_value(DEFAULT_PREVIEW_SUFFIX),
        )
}
