//! Map parsed command-line arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{self, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if an argument is present but invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let settings = commands::settings(matches)?;

    Ok(Action::Server(Args { port, settings }))
}
