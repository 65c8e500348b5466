// Command handlers module
pub mod caps;
pub mod config;
pub mod prune;
pub mod query;
pub mod rules;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::config::default_database_path;
use crate::storage::Repository;

// Re-exports for cleaner imports
pub use caps::execute as caps;
pub use prune::execute as prune;
pub use query::execute as query;
pub use run::execute as run;

/// Database path from the global `--db` option, or the default location
pub fn database_path(matches: &clap::ArgMatches) -> Result<PathBuf> {
    match matches.get_one::<PathBuf>("db") {
        Some(path) => Ok(path.clone()),
        None => default_database_path(),
    }
}

pub fn open_repository(matches: &clap::ArgMatches) -> Result<Repository> {
    let path = database_path(matches)?;
    log::debug!("Opening database at {}", path.display());

    Repository::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))
}
