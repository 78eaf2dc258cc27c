//! Recipe discovery and execution
//!
//! Recipes run strictly one at a time. Each one moves through
//! `Created -> Running -> Parsed -> Succeeded | Failed`, or straight to
//! `NotFound` when its file is not under any search directory.

pub mod list;
pub mod runner;

pub use runner::{AutopkgCli, Failure, Recipe, RecipeRunner, RecipeState, RecipeTool, ToolOutput};
