//! Recipe list loading
//!
//! Recipes come either from the `RECIPE` override or from a JSON/plist
//! array of identifiers.

use crate::error::{RunnerError, RunnerResult};
use std::path::{Path, PathBuf};
use tracing::debug;

const RECIPE_EXTENSION: &str = "recipe";

/// Identifiers from the override, with `.recipe` appended where missing
pub fn from_override(ids: &[String]) -> Vec<String> {
    ids.iter()
        .map(|id| {
            if Path::new(id).extension().is_some_and(|ext| ext == RECIPE_EXTENSION) {
                id.clone()
            } else {
                format!("{}.{}", id, RECIPE_EXTENSION)
            }
        })
        .collect()
}

/// Load identifiers from a `.json` or `.plist` list file
///
/// A path that does not exist is retried next to the running executable.
pub async fn load(path: &Path) -> RunnerResult<Vec<String>> {
    let path = locate_list(path);
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default();

    let bytes = match extension.as_str() {
        "json" | "plist" => tokio::fs::read(&path).await.map_err(|e| {
            RunnerError::io(format!("reading recipe list {}", path.display()), e)
        })?,
        _ => {
            return Err(RunnerError::UnsupportedRecipeList {
                path: path.clone(),
                extension,
            })
        }
    };

    let recipes: Vec<String> = if extension == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        plist::from_bytes(&bytes)?
    };
    debug!("Loaded {} recipe(s) from {}", recipes.len(), path.display());
    Ok(recipes)
}

fn locate_list(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(path)))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn override_appends_extension() {
        let ids = vec!["Firefox.pkg".to_string(), "Zoom.pkg.recipe".to_string()];
        assert_eq!(
            from_override(&ids),
            vec!["Firefox.pkg.recipe", "Zoom.pkg.recipe"]
        );
    }

    #[tokio::test]
    async fn loads_json_list() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("recipes.json");
        std::fs::write(&path, r#"["Firefox.pkg.recipe", "Slack.pkg.recipe"]"#).unwrap();

        assert_eq!(
            load(&path).await.unwrap(),
            vec!["Firefox.pkg.recipe", "Slack.pkg.recipe"]
        );
    }

    #[tokio::test]
    async fn loads_plist_list() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("recipes.plist");
        plist::Value::Array(vec![plist::Value::String("Zoom.pkg.recipe".into())])
            .to_file_xml(&path)
            .unwrap();

        assert_eq!(load(&path).await.unwrap(), vec!["Zoom.pkg.recipe"]);
    }

    #[tokio::test]
    async fn rejects_other_extensions() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("recipes.txt");
        std::fs::write(&path, "Firefox.pkg.recipe").unwrap();

        let err = load(&path).await.unwrap_err();
        assert!(matches!(err, RunnerError::UnsupportedRecipeList { ref extension, .. } if extension == "txt"));
    }
}
