//! Cross-origin authorization policy.
//!
//! Rules are evaluated in a fixed order and the first match wins: exact
//! allow-list entries first, then the broader patterns, so a pattern can never
//! preempt an explicit entry. A request without an `Origin` header comes from a
//! non-browser client and is always allowed; anything else that matches no rule
//! is refused.

use crate::config::Settings;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

#[derive(Clone, Debug)]
pub enum OriginRule {
    Exact(String),
    Subdomain(Regex),
    PrivateNetwork(Regex),
    HostedPreview(Regex),
}

impl OriginRule {
    #[must_use]
    pub fn matches(&self, origin: &str) -> bool {
        match self {
            Self::Exact(value) => value == origin,
            Self::Subdomain(re) | Self::PrivateNetwork(re) | Self::HostedPreview(re) => {
                re.is_match(origin)
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Exact(_) => "exact",
            Self::Subdomain(_) => "subdomain",
            Self::PrivateNetwork(_) => "private-network",
            Self::HostedPreview(_) => "hosted-preview",
        }
    }
}

#[derive(Clone, Debug)]
pub struct OriginPolicy {
    rules: Vec<OriginRule>,
}

impl OriginPolicy {
    /// Build the ordered rule list.
    ///
    /// # Errors
    /// Returns an error if a pattern built from the configured domains fails to compile.
    pub fn new(
        allowed_origins: &[String],
        frontend_url: Option<&str>,
        primary_domain: &str,
        preview_suffix: &str,
    ) -> Result<Self, regex::Error> {
        let mut rules: Vec<OriginRule> = allowed_origins
            .iter()
            .map(|origin| origin.trim().trim_end_matches('/'))
            .filter(|origin| !origin.is_empty())
            .map(|origin| OriginRule::Exact(origin.to_string()))
            .collect();

        if let Some(origin) = frontend_url.and_then(frontend_origin) {
            rules.push(OriginRule::Exact(origin));
        }

        rules.push(OriginRule::Subdomain(Regex::new(
            r"^http://[\w-]+\.localhost(:\d+)?$",
        )?));
        rules.push(OriginRule::Subdomain(Regex::new(&format!(
            r"^https?://[\w-]+\.{}$",
            regex::escape(primary_domain)
        ))?));
        rules.push(OriginRule::PrivateNetwork(Regex::new(
            r"^http://192\.168\.\d+\.\d+(:\d+)?$",
        )?));
        rules.push(OriginRule::HostedPreview(Regex::new(&format!(
            r"^https://[\w.-]+\.{}$",
            regex::escape(preview_suffix)
        ))?));

        Ok(Self { rules })
    }

    /// # Errors
    /// Returns an error if a pattern built from the settings fails to compile.
    pub fn from_settings(settings: &Settings) -> Result<Self, regex::Error> {
        Self::new(
            &settings.allowed_origins,
            settings.frontend_url.as_deref(),
            &settings.primary_domain,
            &settings.preview_suffix,
        )
    }

    #[must_use]
    pub fn is_authorized(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return true;
        };

        if let Some(rule) = self.classify(origin) {
            debug!("Origin {} allowed by {} rule", origin, rule.kind());
            true
        } else {
            debug!("Origin {} matched no rule", origin);
            false
        }
    }

    /// First rule matching `origin`, if any.
    #[must_use]
    pub fn classify(&self, origin: &str) -> Option<&OriginRule> {
        self.rules.iter().find(|rule| rule.matches(origin))
    }

    #[must_use]
    pub fn rules(&self) -> &[OriginRule] {
        &self.rules
    }
}

// Browsers send `scheme://host[:port]`, so reduce the configured URL to that.
fn frontend_origin(frontend_url: &str) -> Option<String> {
    let trimmed = frontend_url.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = match Url::parse(trimmed) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("Ignoring invalid frontend URL {}: {}", trimmed, err);
            return None;
        }
    };

    let host = parsed.host_str()?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));

    Some(format!("{}://{}{}", parsed.scheme(), host, port))
}
