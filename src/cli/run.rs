//! The recipe run loop
//!
//! Resolves the recipe list, replays the metadata cache, then runs each
//! recipe in order: execute, record downloads, notify. A failing recipe
//! never stops the loop.

use crate::attrs::{AttributeStore, NativeAttributes};
use crate::cache::{
    CacheStore, MetadataCache, MetadataRecorder, PlaceholderReplicator, PrimaryDownload,
};
use crate::cli::Cli;
use crate::config::Settings;
use crate::error::{RunnerError, RunnerResult};
use crate::host::{HostSystem, SystemInfo};
use crate::notify::{self, SlackNotifier};
use crate::recipe::{list, AutopkgCli, Recipe, RecipeRunner, RecipeState, RecipeTool};
use tracing::{debug, error, info, warn};

/// Counts reported once the loop finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub not_found: usize,
    pub recorded: usize,
    pub notified: usize,
}

/// Collaborators the loop talks to
pub struct Pipeline<'a> {
    pub tool: &'a dyn RecipeTool,
    pub attrs: &'a dyn AttributeStore,
    pub system: &'a dyn SystemInfo,
    pub notifier: SlackNotifier,
}

/// Run every requested recipe against the real host
pub async fn execute(cli: &Cli, settings: &Settings) -> RunnerResult<RunSummary> {
    let recipes = resolve_recipes(cli).await?;

    let tool = AutopkgCli::new(&settings.autopkg);
    let attrs = NativeAttributes::new();
    let system = HostSystem::new();
    let pipeline = Pipeline {
        tool: &tool,
        attrs: &attrs,
        system: &system,
        notifier: SlackNotifier::new(
            settings.slack_webhook.clone(),
            settings.slack_username.clone(),
            settings.debug,
        ),
    };

    let summary = run_all(&recipes, settings, &pipeline).await;
    info!(
        "Finished {} recipe(s): {} succeeded, {} failed, {} not found",
        recipes.len(),
        summary.succeeded,
        summary.failed,
        summary.not_found
    );
    Ok(summary)
}

/// Recipe identifiers from the override, else from the list file
pub async fn resolve_recipes(cli: &Cli) -> RunnerResult<Vec<String>> {
    let overrides = cli.recipe_override();
    if !overrides.is_empty() {
        debug!("Using recipe override: {:?}", overrides);
        return Ok(list::from_override(&overrides));
    }
    match cli.list {
        Some(ref path) => list::load(path).await,
        None => Err(RunnerError::NoRecipesProvided),
    }
}

/// Drive `recipes` through the pipeline, one at a time
pub async fn run_all(recipes: &[String], settings: &Settings, pipeline: &Pipeline<'_>) -> RunSummary {
    let store = CacheStore::new(&settings.metadata_cache);
    let mut cache = MetadataCache::new();
    let console_user = pipeline.system.console_user().await;

    if settings.cache {
        cache = store.load().await;
        PlaceholderReplicator::new(pipeline.attrs, pipeline.system)
            .replicate(&cache)
            .await;
    }

    let runner = RecipeRunner::new(pipeline.tool, &settings.report_plist);
    let recorder = MetadataRecorder::new(&store, pipeline.attrs, pipeline.system);
    let mut summary = RunSummary::default();

    for identifier in recipes {
        info!("Running {}...", identifier);
        let mut recipe = Recipe::locate(identifier, &settings.recipe_search_dirs);

        if let Err(e) = runner.run(&mut recipe).await {
            error!("{}: {}", identifier, e);
        }

        match recipe.state() {
            RecipeState::Succeeded(_) => summary.succeeded += 1,
            RecipeState::NotFound => summary.not_found += 1,
            _ => summary.failed += 1,
        }

        if settings.cache && recipe.tool_succeeded() {
            match record(&recorder, &mut cache, &recipe, console_user.as_deref(), pipeline).await {
                Ok(true) => summary.recorded += 1,
                Ok(false) => {}
                Err(e) => warn!("Unable to record metadata for {}: {}", identifier, e),
            }
        }

        if let Some(notice) = notify::evaluate(&recipe) {
            match pipeline.notifier.send(&notice).await {
                Ok(true) => summary.notified += 1,
                Ok(false) => {}
                Err(e) => error!("{}", e),
            }
        }
    }

    summary
}

async fn record(
    recorder: &MetadataRecorder<'_>,
    cache: &mut MetadataCache,
    recipe: &Recipe,
    console_user: Option<&str>,
    pipeline: &Pipeline<'_>,
) -> RunnerResult<bool> {
    let (Some(key), Some(outcome)) = (recipe.file_name(), recipe.outcome()) else {
        return Ok(false);
    };
    let Some(primary) =
        PrimaryDownload::discover(outcome, cache.get(&key), console_user, pipeline.attrs).await
    else {
        debug!("No download to record for {}", recipe.identifier());
        return Ok(false);
    };
    recorder.record(cache, &key, &primary).await
}
