#![forbid(unsafe_code)]

pub mod cache;
pub mod command;
pub mod compare;
pub mod error;
pub mod orchestrator;
pub mod run_log;
pub mod runner;
pub mod scenario;

pub use cache::OutputCache;
pub use command::CommandBuilder;
pub use compare::{ComparisonResult, LineMismatch, OutputSide, PrematureEnd, compare_outputs};
pub use error::{ReadError, RegressError, RunError, ScenarioError, ScenarioFailure};
pub use orchestrator::{Orchestrator, RunOptions};
pub use runner::{ProcessRunner, SubprocessRunner};
pub use scenario::{RunMode, ScenarioDescriptor, ScenarioMatrix, UpdateMode};

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_MISMATCH_LIMIT: usize = 5;
pub const DEFAULT_THREAD_COUNT: u32 = 8;

/// Everything a regression run needs to know about its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegressConfig {
    pub reference_program: String,
    pub sequential_program: String,
    pub parallel_program: String,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub mismatch_limit: usize,
    pub log_path: Option<PathBuf>,
}

impl RegressConfig {
    /// Layout expected when running from the simulator's source directory.
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            reference_program: "./grun.py".to_string(),
            sequential_program: "./crun-seq".to_string(),
            parallel_program: "./crun-omp".to_string(),
            data_dir: PathBuf::from("./data"),
            cache_dir: PathBuf::from("./regression-cache"),
            mismatch_limit: DEFAULT_MISMATCH_LIMIT,
            log_path: None,
        }
    }

    /// Defaults overridden by `CRUN_REGRESS_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default_paths().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(value) = var("CRUN_REGRESS_REFERENCE") {
            self.reference_program = value;
        }
        if let Some(value) = var("CRUN_REGRESS_SEQ") {
            self.sequential_program = value;
        }
        if let Some(value) = var("CRUN_REGRESS_OMP") {
            self.parallel_program = value;
        }
        if let Some(value) = var("CRUN_REGRESS_DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }
        if let Some(value) = var("CRUN_REGRESS_CACHE_DIR") {
            self.cache_dir = PathBuf::from(value);
        }
        if let Some(value) = var("CRUN_REGRESS_MISMATCH_LIMIT") {
            match value.parse() {
                Ok(limit) => self.mismatch_limit = limit,
                Err(err) => warn!(
                    "ignoring CRUN_REGRESS_MISMATCH_LIMIT='{value}' ({err}); using {}",
                    self.mismatch_limit
                ),
            }
        }
        if let Some(value) = var("CRUN_REGRESS_LOG_PATH") {
            self.log_path = Some(PathBuf::from(value));
        }
        self
    }
}

impl Default for RegressConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub passed: bool,
    pub reason_code: String,
    pub detail: Option<String>,
    pub comparison: Option<ComparisonResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegressionReport {
    pub suite: &'static str,
    pub mode: String,
    pub total_scenarios: usize,
    pub attempted_scenarios: usize,
    pub passed_scenarios: usize,
    pub outcomes: Vec<ScenarioOutcome>,
}

impl RegressionReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.passed_scenarios == self.total_scenarios
    }

    #[must_use]
    pub fn verdict(&self) -> &'static str {
        if self.all_passed() { "SUCCESS" } else { "FAILED" }
    }

    #[must_use]
    pub fn failed_names(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.passed)
            .map(|outcome| outcome.name.as_str())
            .collect()
    }

    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "Regression set size {}.  {}/{} tests successful. {}",
            self.total_scenarios,
            self.passed_scenarios,
            self.attempted_scenarios,
            self.verdict()
        )
    }
}

pub fn write_regression_report(path: &Path, report: &RegressionReport) -> Result<(), RegressError> {
    let report_error = |detail: String| RegressError::Report {
        path: path.to_path_buf(),
        detail,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|err| report_error(format!("failed creating {}: {err}", parent.display())))?;
    }

    let raw = serde_json::to_string_pretty(report)
        .map_err(|err| report_error(format!("failed to serialize regression report: {err}")))?;
    fs::write(path, raw).map_err(|err| report_error(err.to_string()))
}
