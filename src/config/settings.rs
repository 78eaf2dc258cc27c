//! Run settings resolved once at startup
//!
//! Merges the config file with flag/environment overrides and resolves the
//! recipe search directories. The result is passed explicitly into every
//! component that needs a path.

use crate::cli::Cli;
use crate::config::Config;
use crate::error::RunnerResult;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PREFERENCES_FILE: &str = "Library/Preferences/com.github.autopkg.plist";
const SEARCH_DIRS_KEY: &str = "RECIPE_SEARCH_DIRS";

/// Fully resolved settings for one process run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Cross-run metadata cache file
    pub metadata_cache: PathBuf,
    /// Shared report plist path
    pub report_plist: PathBuf,
    /// AutoPkg executable
    pub autopkg: PathBuf,
    /// Directories searched (recursively) for recipe files
    pub recipe_search_dirs: Vec<PathBuf>,
    /// Slack incoming webhook
    pub slack_webhook: Option<String>,
    /// Username on posted Slack attachments
    pub slack_username: String,
    /// Replay and record download metadata
    pub cache: bool,
    /// Suppress notifications, raise verbosity
    pub debug: bool,
}

impl Settings {
    /// Resolve settings from the loaded config file and parsed flags
    pub fn resolve(config: &Config, cli: &Cli) -> Self {
        let metadata_cache = cli
            .metadata_cache
            .clone()
            .unwrap_or_else(|| config.paths.metadata_cache.clone());

        let recipe_search_dirs = if let Some(ref name) = cli.recipes_dir_name {
            vec![Path::new("/tmp").join(name)]
        } else if !config.paths.recipe_search_dirs.is_empty() {
            config.paths.recipe_search_dirs.clone()
        } else {
            search_dirs_from_preferences()
        };
        debug!("Recipe search dirs: {:?}", recipe_search_dirs);

        Self {
            metadata_cache,
            report_plist: config.paths.report_plist.clone(),
            autopkg: config.paths.autopkg.clone(),
            recipe_search_dirs,
            slack_webhook: cli
                .slack_webhook
                .clone()
                .or_else(|| config.notify.slack_webhook.clone()),
            slack_username: config.notify.username.clone(),
            cache: cli.cache,
            debug: cli.debug,
        }
    }
}

/// Read `RECIPE_SEARCH_DIRS` (string or array) from an AutoPkg preferences plist
pub fn read_search_dirs(prefs: &Path) -> RunnerResult<Vec<PathBuf>> {
    let value = plist::Value::from_file(prefs)?;
    let dirs = match value.as_dictionary().and_then(|d| d.get(SEARCH_DIRS_KEY)) {
        Some(plist::Value::String(dir)) => vec![PathBuf::from(dir)],
        Some(plist::Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_string())
            .map(PathBuf::from)
            .collect(),
        _ => vec![],
    };
    Ok(dirs)
}

fn search_dirs_from_preferences() -> Vec<PathBuf> {
    for prefs in preference_candidates() {
        match read_search_dirs(&prefs) {
            Ok(dirs) if !dirs.is_empty() => {
                debug!("Using recipe search dirs from {}", prefs.display());
                return dirs;
            }
            Ok(_) => debug!("No {} in {}", SEARCH_DIRS_KEY, prefs.display()),
            Err(e) => warn!("Unable to read {}: {}", prefs.display(), e),
        }
    }
    warn!("No recipe search directories configured; recipes will not be found");
    vec![]
}

/// The current user's preferences first, then any other local account's
fn preference_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(PREFERENCES_FILE));
    }
    if let Ok(entries) = std::fs::read_dir("/Users") {
        let mut others: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path().join(PREFERENCES_FILE))
            .collect();
        others.sort();
        candidates.extend(others);
    }
    candidates.retain(|p| p.is_file());
    candidates.dedup();
    candidates
}
