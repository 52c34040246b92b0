#![forbid(unsafe_code)]

use crate::cache::OutputCache;
use crate::command::CommandBuilder;
use crate::compare::{ComparisonResult, compare_outputs};
use crate::error::{RegressError, ScenarioFailure};
use crate::run_log::{ScenarioLogEntry, append_scenario_log, file_sha256};
use crate::runner::{ProcessRunner, SubprocessRunner};
use crate::scenario::{RunMode, ScenarioDescriptor, ScenarioMatrix};
use crate::{DEFAULT_THREAD_COUNT, RegressConfig, RegressionReport, ScenarioOutcome};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub clear_cache: bool,
    pub thread_count: u32,
    pub include_extra: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            clear_cache: false,
            thread_count: DEFAULT_THREAD_COUNT,
            include_extra: false,
        }
    }
}

/// Drives the scenario matrix through the reference cache, the test program
/// and the comparator, one scenario at a time.
pub struct Orchestrator<R = SubprocessRunner> {
    config: RegressConfig,
    runner: R,
    builder: CommandBuilder,
    cache: OutputCache,
    matrix: ScenarioMatrix,
}

impl Orchestrator<SubprocessRunner> {
    #[must_use]
    pub fn with_subprocesses(config: RegressConfig) -> Self {
        Self::new(config, SubprocessRunner)
    }
}

impl<R: ProcessRunner> Orchestrator<R> {
    #[must_use]
    pub fn new(config: RegressConfig, runner: R) -> Self {
        let builder = CommandBuilder::new(&config);
        let cache = OutputCache::new(config.cache_dir.clone());
        Self {
            config,
            runner,
            builder,
            cache,
            matrix: ScenarioMatrix::builtin(),
        }
    }

    #[must_use]
    pub fn with_matrix(mut self, matrix: ScenarioMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &OutputCache {
        &self.cache
    }

    #[must_use]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run every selected scenario. Only an unusable cache directory aborts
    /// the batch; scenario failures are recorded in the report.
    pub fn run(&self, options: &RunOptions) -> Result<RegressionReport, RegressError> {
        if options.clear_cache
            && let Err(err) = self.cache.invalidate_all()
        {
            warn!(
                "Could not flush old result cache {}: {err}",
                self.cache.root().display()
            );
        }
        self.cache.ensure_root()?;

        let mode = RunMode::for_threads(options.thread_count);
        let scenarios = self.matrix.selected(options.include_extra);

        let mut report = RegressionReport {
            suite: "crun_regression",
            mode: mode.to_string(),
            total_scenarios: scenarios.len(),
            attempted_scenarios: 0,
            passed_scenarios: 0,
            outcomes: Vec::with_capacity(scenarios.len()),
        };

        for scenario in scenarios {
            report.attempted_scenarios += 1;
            let outcome = self.run_scenario(scenario, mode);
            let test_key = scenario.cache_key(mode);
            if outcome.passed {
                report.passed_scenarios += 1;
                info!("Regression {test_key} Passed");
            } else {
                warn!("Regression {test_key} Failed");
            }
            report.outcomes.push(outcome);
        }

        info!("{}", report.summary_line());
        Ok(report)
    }

    /// Reference (cached), test run and comparison for one scenario.
    ///
    /// Expects the cache root to exist; [`Orchestrator::run`] guarantees it.
    pub fn run_scenario(&self, scenario: &ScenarioDescriptor, mode: RunMode) -> ScenarioOutcome {
        info!(
            "+++++++++++++++++ Regression {} +++++++++++++++",
            scenario.short_name()
        );
        let result = self.check_scenario(scenario, mode);

        let outcome = match result {
            Ok(comparison) if comparison.passed() => ScenarioOutcome {
                name: scenario.short_name(),
                passed: true,
                reason_code: "pass".to_string(),
                detail: None,
                comparison: Some(comparison),
            },
            Ok(comparison) => {
                let failure = ScenarioFailure::Mismatch {
                    count: comparison.mismatch_count,
                    premature_end: comparison.premature_end,
                };
                failed_outcome(scenario, &failure, Some(comparison))
            }
            Err(failure) => {
                warn!("{}: {failure}", scenario.short_name());
                failed_outcome(scenario, &failure, None)
            }
        };

        self.log_outcome(scenario, mode, &outcome);
        outcome
    }

    fn check_scenario(
        &self,
        scenario: &ScenarioDescriptor,
        mode: RunMode,
    ) -> Result<ComparisonResult, ScenarioFailure> {
        let reference_path = self
            .cache
            .ensure(&self.runner, &self.builder, scenario)
            .map_err(ScenarioFailure::ReferenceRun)?;
        let test_path = self
            .cache
            .capture(&self.runner, &self.builder, scenario, mode)
            .map_err(ScenarioFailure::TestRun)?;
        Ok(compare_outputs(
            &reference_path,
            &test_path,
            self.config.mismatch_limit,
        )?)
    }

    fn log_outcome(&self, scenario: &ScenarioDescriptor, mode: RunMode, outcome: &ScenarioOutcome) {
        let Some(log_path) = &self.config.log_path else {
            return;
        };
        let comparison = outcome.comparison.as_ref();
        let entry = ScenarioLogEntry {
            suite: "crun_regression",
            scenario: outcome.name.clone(),
            mode: mode.to_string(),
            reference_key: scenario.cache_key(RunMode::Reference),
            test_key: scenario.cache_key(mode),
            passed: outcome.passed,
            reason_code: outcome.reason_code.clone(),
            mismatch_count: comparison.map_or(0, |c| c.mismatch_count),
            premature_end_line: comparison
                .and_then(|c| c.premature_end)
                .map(|end| end.line_number),
            reference_sha256: file_sha256(&self.cache.path_for(scenario, RunMode::Reference)),
            test_sha256: file_sha256(&self.cache.path_for(scenario, mode)),
            detail: outcome.detail.clone().unwrap_or_default(),
            ts_unix_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_millis()),
        };
        if let Err(err) = append_scenario_log(log_path, &entry) {
            warn!("regression log not written: {err}");
        }
    }
}

fn failed_outcome(
    scenario: &ScenarioDescriptor,
    failure: &ScenarioFailure,
    comparison: Option<ComparisonResult>,
) -> ScenarioOutcome {
    ScenarioOutcome {
        name: scenario.short_name(),
        passed: false,
        reason_code: failure.reason_code().to_string(),
        detail: Some(failure.to_string()),
        comparison,
    }
}
