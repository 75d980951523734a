//! # Authgate
//!
//! `authgate` is the entry layer of the auth service. It owns everything that
//! happens before a request reaches the authentication routes:
//!
//! - **Bootstrap**: the application (settings, database client, optional
//!   query interceptor, router) is wired once per process and cached.
//!   Concurrent cold-start requests share a single initialization, and a
//!   failed initialization is retried by the next request.
//! - **Connection lifecycle**: serverless processes connect on first query,
//!   persistent processes connect at startup within a bounded timeout.
//!   Outside production a failed startup connection is fatal; in production
//!   the service keeps running and reconnects on demand.
//! - **Origin policy**: requests from origins outside the allow-list, the
//!   primary domain, private networks and hosted preview deployments are
//!   refused with `403` before any route runs.
//!
//! The same [`entrypoint::Entrypoint`] serves both the long-lived HTTP server
//! (`authgate` binary) and serverless invocations
//! ([`entrypoint::serverless::handler`]).

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod database;
pub mod entrypoint;
pub mod origin;

#[cfg(test)]
mod testing;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
