//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// autopkg-runner - run AutoPkg recipes one at a time
///
/// Replays cached download metadata before each run so unchanged remote
/// artifacts are not downloaded again, and reports new builds to Slack.
#[derive(Parser, Debug)]
#[command(name = "autopkg-runner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to JSON blob or PLIST of recipe names
    #[arg(short, long)]
    pub list: Option<PathBuf>,

    /// Load and write previously cached metadata/xattrs for comparison; save out new metadata post-run
    #[arg(short, long)]
    pub cache: bool,

    /// Disables Slack alerts and increases verbosity for logging/stdout
    #[arg(short, long)]
    pub debug: bool,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(long, env = "AUTOPKG_RUNNER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Recipes to run instead of the list file (comma-separated)
    #[arg(long, env = "RECIPE", value_delimiter = ',')]
    pub recipe: Vec<String>,

    /// Metadata cache file
    #[arg(long, env = "METADATA_CACHE_PATH")]
    pub metadata_cache: Option<PathBuf>,

    /// Directory name under /tmp to search for recipes
    #[arg(long, env = "RECIPES_DIR_NAME")]
    pub recipes_dir_name: Option<String>,

    /// Slack incoming webhook URL
    #[arg(long, env = "SLACK_WEBHOOK_TOKEN", hide_env_values = true)]
    pub slack_webhook: Option<String>,
}

impl Cli {
    /// Recipe identifiers from the override, trimmed, empties dropped
    pub fn recipe_override(&self) -> Vec<String> {
        self.recipe
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect()
    }
}
