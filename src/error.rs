//! Error types for autopkg-runner
//!
//! All modules use `RunnerResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;

/// All errors that can occur while driving recipe runs
#[derive(Error, Debug)]
pub enum RunnerError {
    // Input errors
    #[error("Recipe --list or RECIPE not provided")]
    NoRecipesProvided,

    #[error("Invalid recipe list extension for {path}: expected .plist/.json, got {extension:?}")]
    UnsupportedRecipeList { path: PathBuf, extension: String },

    #[error("Could not locate recipe {0}")]
    RecipeNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Cache errors
    #[error("Invalid cached download record for {key}: {reason}")]
    InvalidRecord { key: String, reason: String },

    #[error("Attribute {name} on {path}: {reason}")]
    Attribute {
        path: PathBuf,
        name: String,
        reason: String,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Notification errors
    #[error("Request to Slack returned an error {status} with response {body}")]
    NotificationFailed { status: u16, body: String },

    #[error("Notification error: {0}")]
    Notification(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Property list error: {0}")]
    Plist(#[from] plist::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl RunnerError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an invalid cached record error
    pub fn invalid_record(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NoRecipesProvided => {
                Some("Pass --list <recipes.json|recipes.plist> or set RECIPE=<name>")
            }
            Self::UnsupportedRecipeList { .. } => Some("Recipe lists must be .json or .plist"),
            Self::RecipeNotFound(_) => {
                Some("Check RECIPES_DIR_NAME or RECIPE_SEARCH_DIRS in the AutoPkg preferences")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RunnerError::RecipeNotFound("Firefox.pkg.recipe".to_string());
        assert!(err.to_string().contains("Firefox.pkg.recipe"));
    }

    #[test]
    fn error_hint() {
        let err = RunnerError::NoRecipesProvided;
        assert!(err.hint().unwrap().contains("--list"));
        assert!(RunnerError::Notification("x".into()).hint().is_none());
    }

    #[test]
    fn notification_error_mentions_status() {
        let err = RunnerError::NotificationFailed {
            status: 404,
            body: "no_service".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Request to Slack returned an error 404 with response no_service"
        );
    }
}
