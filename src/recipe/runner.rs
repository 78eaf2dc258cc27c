//! Recipe lifecycle
//!
//! `RecipeRunner` invokes the external tool once per recipe, parses the
//! report it leaves behind and settles the recipe into a terminal state.
//! The tool sits behind `RecipeTool` so the lifecycle can be exercised
//! without AutoPkg installed.

use crate::error::{RunnerError, RunnerResult};
use crate::report::{FailureRow, ReportParser, RunOutcome};
use async_trait::async_trait;
use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info};
use walkdir::WalkDir;

/// Max number of output lines kept from a failed tool run
const OUTPUT_TAIL_LINES: usize = 50;

/// Why a recipe ended in `Failed`
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The tool could not be started or exited non-zero
    ///
    /// `failures` holds whatever the report listed before the tool gave up.
    ToolExit {
        code: Option<i32>,
        output: String,
        failures: Vec<FailureRow>,
    },
    /// The tool exited cleanly but its report was unreadable
    Report(String),
    /// The report was parsed but nothing was built
    Outcome(RunOutcome),
}

/// Lifecycle state of one recipe
#[derive(Debug, Clone, PartialEq)]
pub enum RecipeState {
    /// Located, not yet run
    Created,
    /// No matching file under the search directories
    NotFound,
    /// Tool invocation in progress
    Running,
    /// Report parsed, not yet classified
    Parsed(RunOutcome),
    /// At least one package was built
    Succeeded(RunOutcome),
    /// Run finished without a build
    Failed(Failure),
}

impl RecipeState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound | Self::Succeeded(_) | Self::Failed(_))
    }
}

/// One recipe from the run list
#[derive(Debug)]
pub struct Recipe {
    identifier: String,
    path: Option<PathBuf>,
    name: OnceCell<String>,
    state: RecipeState,
}

impl Recipe {
    /// Resolve `identifier` to the first matching file under `search_dirs`
    pub fn locate(identifier: &str, search_dirs: &[PathBuf]) -> Self {
        let path = search_dirs
            .iter()
            .find_map(|dir| find_recipe_file(dir, identifier));

        let state = match path {
            Some(ref p) => {
                debug!("Located {} at {}", identifier, p.display());
                RecipeState::Created
            }
            None => {
                error!("{}", RunnerError::RecipeNotFound(identifier.to_string()));
                RecipeState::NotFound
            }
        };

        Self {
            identifier: identifier.to_string(),
            path,
            name: OnceCell::new(),
            state,
        }
    }

    /// Identifier as given in the run list
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Resolved recipe file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current state
    pub fn state(&self) -> &RecipeState {
        &self.state
    }

    /// Cache key: the recipe's file name
    pub fn file_name(&self) -> Option<String> {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Display name from the recipe's `Input.NAME`, read on first use
    pub fn name(&self) -> &str {
        self.name.get_or_init(|| {
            self.path
                .as_deref()
                .and_then(read_recipe_name)
                .unwrap_or_else(|| self.identifier.clone())
        })
    }

    /// Parsed outcome, when the report was read
    pub fn outcome(&self) -> Option<&RunOutcome> {
        match &self.state {
            RecipeState::Parsed(o) | RecipeState::Succeeded(o) => Some(o),
            RecipeState::Failed(Failure::Outcome(o)) => Some(o),
            _ => None,
        }
    }

    /// Whether the tool itself exited cleanly
    pub fn tool_succeeded(&self) -> bool {
        matches!(
            self.state,
            RecipeState::Parsed(_)
                | RecipeState::Succeeded(_)
                | RecipeState::Failed(Failure::Outcome(_))
                | RecipeState::Failed(Failure::Report(_))
        )
    }

    fn transition(&mut self, next: RecipeState) {
        debug!("{}: {:?} -> {:?}", self.identifier, StateName(&self.state), StateName(&next));
        self.state = next;
    }
}

/// Compact state label for logs
struct StateName<'a>(&'a RecipeState);

impl std::fmt::Debug for StateName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            RecipeState::Created => "Created",
            RecipeState::NotFound => "NotFound",
            RecipeState::Running => "Running",
            RecipeState::Parsed(_) => "Parsed",
            RecipeState::Succeeded(_) => "Succeeded",
            RecipeState::Failed(_) => "Failed",
        };
        f.write_str(name)
    }
}

fn find_recipe_file(dir: &Path, identifier: &str) -> Option<PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|p| p.ends_with(identifier))
}

fn read_recipe_name(path: &Path) -> Option<String> {
    let value = plist::Value::from_file(path).ok()?;
    value
        .as_dictionary()?
        .get("Input")?
        .as_dictionary()?
        .get("NAME")?
        .as_string()
        .map(str::to_string)
}

/// Captured result of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (`None` when killed by a signal)
    pub code: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
}

impl ToolOutput {
    /// Whether the tool exited zero
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// The external recipe execution tool
#[async_trait]
pub trait RecipeTool: Send + Sync {
    /// Run `recipe`, writing the report to `report`
    async fn run_recipe(&self, recipe: &Path, report: &Path) -> RunnerResult<ToolOutput>;

    /// Human-readable tool name for logs
    fn tool_name(&self) -> &'static str;
}

/// AutoPkg invoked as a subprocess
#[derive(Debug, Clone)]
pub struct AutopkgCli {
    binary: PathBuf,
}

impl AutopkgCli {
    /// Use the AutoPkg executable at `binary`
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl RecipeTool for AutopkgCli {
    async fn run_recipe(&self, recipe: &Path, report: &Path) -> RunnerResult<ToolOutput> {
        let command = format!(
            "{} run -vvv {} --report-plist {}",
            self.binary.display(),
            recipe.display(),
            report.display()
        );
        debug!("Running {}", command);

        let mut child = Command::new(&self.binary)
            .args(["run", "-vvv"])
            .arg(recipe)
            .arg("--report-plist")
            .arg(report)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RunnerError::command_failed(command.clone(), e))?;

        let output = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => interleave_lines(stdout, stderr).await,
            _ => String::new(),
        };
        let status = child
            .wait()
            .await
            .map_err(|e| RunnerError::command_failed(command, e))?;

        Ok(ToolOutput {
            code: status.code(),
            output,
        })
    }

    fn tool_name(&self) -> &'static str {
        "autopkg"
    }
}

/// Read two streams to completion, keeping lines in arrival order
async fn interleave_lines<O, E>(stdout: O, stderr: E) -> String
where
    O: tokio::io::AsyncRead + Unpin,
    E: tokio::io::AsyncRead + Unpin,
{
    let mut out = BufReader::new(stdout).lines();
    let mut err = BufReader::new(stderr).lines();
    let (mut out_done, mut err_done) = (false, false);
    let mut lines = Vec::new();

    while !(out_done && err_done) {
        tokio::select! {
            line = out.next_line(), if !out_done => match line {
                Ok(Some(line)) => lines.push(line),
                _ => out_done = true,
            },
            line = err.next_line(), if !err_done => match line {
                Ok(Some(line)) => lines.push(line),
                _ => err_done = true,
            },
        }
    }
    lines.join("\n").trim().to_string()
}

/// Last `OUTPUT_TAIL_LINES` lines of tool output
pub fn output_tail(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    lines[start..].join("\n")
}

/// Drives recipes through their lifecycle
pub struct RecipeRunner<'a> {
    tool: &'a dyn RecipeTool,
    parser: ReportParser,
    report_path: PathBuf,
}

impl<'a> RecipeRunner<'a> {
    /// Create a runner writing reports to `report_path`
    pub fn new(tool: &'a dyn RecipeTool, report_path: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            parser: ReportParser::new(),
            report_path: report_path.into(),
        }
    }

    /// Run a `Created` recipe to a terminal state; other states are left untouched
    pub async fn run(&self, recipe: &mut Recipe) -> RunnerResult<()> {
        if recipe.state != RecipeState::Created {
            return Ok(());
        }
        let Some(path) = recipe.path.clone() else {
            recipe.transition(RecipeState::NotFound);
            return Ok(());
        };

        self.prepare_report().await?;
        recipe.transition(RecipeState::Running);

        let result = match self.tool.run_recipe(&path, &self.report_path).await {
            Ok(result) => result,
            Err(e) => {
                error!("{}", e);
                recipe.transition(RecipeState::Failed(Failure::ToolExit {
                    code: None,
                    output: e.to_string(),
                    failures: vec![],
                }));
                return Ok(());
            }
        };

        if !result.success() {
            let tail = output_tail(&result.output);
            error!(
                "{} exited with code {:?} for {}:\n{}",
                self.tool.tool_name(),
                result.code,
                recipe.identifier,
                tail
            );
            let failures = self.parser.failures(&self.report_path).await;
            recipe.transition(RecipeState::Failed(Failure::ToolExit {
                code: result.code,
                output: tail,
                failures,
            }));
            return Ok(());
        }

        let outcome = match self.parser.parse(&self.report_path).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Unable to parse report for {}: {}", recipe.identifier, e);
                recipe.transition(RecipeState::Failed(Failure::Report(e.to_string())));
                return Ok(());
            }
        };
        recipe.transition(RecipeState::Parsed(outcome.clone()));

        if !outcome.downloaded.is_empty() {
            info!("SUCCESS: Downloaded {}", recipe.name());
        }
        if outcome.built.is_empty() {
            recipe.transition(RecipeState::Failed(Failure::Outcome(outcome)));
        } else {
            info!("SUCCESS: Built {}", recipe.name());
            recipe.transition(RecipeState::Succeeded(outcome));
        }
        Ok(())
    }

    /// Create or truncate the shared report so the tool can write into it
    async fn prepare_report(&self) -> RunnerResult<()> {
        if let Some(parent) = self.report_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    RunnerError::io(format!("creating directory {}", parent.display()), e)
                })?;
            }
        }
        tokio::fs::write(&self.report_path, b"").await.map_err(|e| {
            RunnerError::io(format!("preparing report {}", self.report_path.display()), e)
        })
    }
}
