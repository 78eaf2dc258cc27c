//! Per-recipe run notifications
//!
//! `evaluate` turns a finished recipe into an optional `Notice`; the
//! `SlackNotifier` delivers it. Runs that produced nothing new stay quiet.

mod slack;

pub use slack::SlackNotifier;

use crate::recipe::{Failure, Recipe, RecipeState};
use crate::report::{FailureRow, RunOutcome};
use regex::Regex;
use std::sync::LazyLock;

/// Failure message AutoPkg's GitHub processors emit when there is simply no release
const NO_RELEASES: &str = "No releases found for repo";

static VERSION_IN_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[0-9](.*)[0-9]").ok());

/// Attachment color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Good,
    Danger,
}

impl Color {
    /// Slack color keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Danger => "danger",
        }
    }
}

/// A message about one recipe run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub color: Color,
}

impl Notice {
    fn danger(title: String, description: String) -> Self {
        Self {
            title,
            description,
            color: Color::Danger,
        }
    }
}

/// Decide what, if anything, to report for a finished recipe
pub fn evaluate(recipe: &Recipe) -> Option<Notice> {
    match recipe.state() {
        RecipeState::NotFound => Some(Notice::danger(
            "ERROR: Unable to locate specified recipe!".to_string(),
            format!(
                "Skipping run of {}; recipe doesn't exist or name is malformed.",
                recipe.identifier()
            ),
        )),
        RecipeState::Failed(failure) => failure_notice(recipe.name(), failure),
        RecipeState::Succeeded(outcome) => success_notice(recipe.name(), outcome),
        RecipeState::Created | RecipeState::Running | RecipeState::Parsed(_) => None,
    }
}

fn failure_notice(name: &str, failure: &Failure) -> Option<Notice> {
    let description = match failure {
        Failure::ToolExit {
            failures,
            ..
        } if !failures.is_empty() => describe_failure(&failures[0])?,
        Failure::ToolExit { code, output, .. } => {
            let code = code.map_or_else(|| "none".to_string(), |c| c.to_string());
            format!("ERROR: AutoPkg exited with code {}\n```{}```\n", code, output)
        }
        Failure::Report(reason) => format!("ERROR: Unable to read run report: {}\n", reason),
        Failure::Outcome(outcome) => describe_failure(outcome.failed.first()?)?,
    };
    Some(Notice::danger(format!("Failed to run {}", name), description))
}

fn describe_failure(row: &FailureRow) -> Option<String> {
    let message = row.message.as_deref().unwrap_or("Unknown error");
    if message.contains(NO_RELEASES) {
        return None;
    }
    Some(format!(
        "ERROR: {}\nTraceback: {}\n",
        message,
        row.traceback.as_deref().unwrap_or("None")
    ))
}

fn success_notice(name: &str, outcome: &RunOutcome) -> Option<Notice> {
    let last = outcome.built.last()?;
    let version = last
        .version()
        .map(str::to_string)
        .or_else(|| {
            last.pkg_path()
                .and_then(|path| VERSION_IN_PATH.as_ref()?.find(path))
                .map(|m| m.as_str().to_string())
        })
        .unwrap_or_else(|| "Unknown".to_string());

    let paths: Vec<&str> = outcome.built.iter().filter_map(|row| row.pkg_path()).collect();
    Some(Notice {
        title: format!("SUCCESS: Recipe {} packaged new version {}", name, version),
        description: format!("*Build Path(s):*\n {}\n", paths.join("\n")),
        color: Color::Good,
    })
}
