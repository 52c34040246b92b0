use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crun_regress::{
    Orchestrator, OutputSide, ProcessRunner, RegressConfig, RunError, RunMode, RunOptions,
    ScenarioDescriptor, ScenarioMatrix, UpdateMode, compare_outputs,
};

/// Serves canned stdout per program, counting executions.
#[derive(Default)]
struct CannedRunner {
    outputs: BTreeMap<String, String>,
    executions: Cell<usize>,
    seen: RefCell<Vec<String>>,
}

impl CannedRunner {
    fn with(mut self, program: &str, stdout: &str) -> Self {
        self.outputs.insert(program.to_string(), stdout.to_string());
        self
    }
}

impl ProcessRunner for CannedRunner {
    fn run(&self, command: &[String], output_path: &Path) -> Result<(), RunError> {
        self.executions.set(self.executions.get() + 1);
        let program = command.first().cloned().unwrap_or_default();
        self.seen.borrow_mut().push(program.clone());
        let Some(stdout) = self.outputs.get(&program) else {
            return Err(RunError::SpawnFailed {
                command: command.join(" "),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such program"),
            });
        };
        fs::write(output_path, stdout).map_err(|source| RunError::CannotOpenOutput {
            path: output_path.to_path_buf(),
            source,
        })
    }
}

fn config(root: &Path) -> RegressConfig {
    RegressConfig {
        cache_dir: root.join("regression-cache"),
        ..RegressConfig::default_paths()
    }
}

fn single(scenario: ScenarioDescriptor) -> ScenarioMatrix {
    ScenarioMatrix {
        regression: vec![scenario],
        extra: Vec::new(),
    }
}

fn example_scenario() -> ScenarioDescriptor {
    ScenarioDescriptor::new("g-006x004-fracX.gph", "r-006x004-c1.rats", 10, UpdateMode::Batch, 1)
        .expect("valid scenario")
}

fn sequential() -> RunOptions {
    RunOptions {
        thread_count: 1,
        ..RunOptions::default()
    }
}

#[test]
fn matching_outputs_pass() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = CannedRunner::default()
        .with("./grun.py", "3\n7\n2\n")
        .with("./crun-seq", "3\n7\n2\n");
    let orchestrator =
        Orchestrator::new(config(dir.path()), runner).with_matrix(single(example_scenario()));

    let report = orchestrator.run(&sequential()).expect("run");
    assert_eq!(report.passed_scenarios, 1);
    assert_eq!(report.verdict(), "SUCCESS");

    let outcome = serde_json::to_value(&report.outcomes[0]).expect("serialize");
    assert_eq!(outcome["name"], "g-006x004-fracX.gph+r-006x004-c1.rats+10+b+01");
    assert!(outcome.get("scenario").is_none());
}

#[test]
fn one_differing_line_is_reported_with_context() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = CannedRunner::default()
        .with("./grun.py", "3\n7\n2\n")
        .with("./crun-seq", "3\n8\n2\n");
    let orchestrator =
        Orchestrator::new(config(dir.path()), runner).with_matrix(single(example_scenario()));

    let report = orchestrator.run(&sequential()).expect("run");
    assert_eq!(report.passed_scenarios, 0);
    let outcome = &report.outcomes[0];
    let comparison = outcome.comparison.as_ref().expect("compared");
    assert_eq!(comparison.mismatch_count, 1);
    assert_eq!(comparison.reported_mismatches.len(), 1);
    assert_eq!(comparison.reported_mismatches[0].line_number, 2);
    assert_eq!(comparison.reported_mismatches[0].reference_line, "7");
    assert_eq!(comparison.reported_mismatches[0].test_line, "8");
    assert_eq!(outcome.detail.as_deref(), Some("1 total mismatches"));
}

#[test]
fn missing_test_program_fails_only_that_scenario() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = CannedRunner::default()
        .with("./grun.py", "1\n")
        .with("./crun-seq", "1\n");
    let orchestrator = Orchestrator::new(config(dir.path()), runner);

    // crun-omp is unknown to the runner, so every parallel run fails to spawn
    let report = orchestrator.run(&RunOptions::default()).expect("run");
    assert_eq!(report.total_scenarios, 8);
    assert_eq!(report.attempted_scenarios, 8);
    assert_eq!(report.passed_scenarios, 0);
    assert!(report.outcomes.iter().all(|o| o.reason_code == "test_run_failed"));

    let report = orchestrator.run(&sequential()).expect("run");
    assert_eq!(report.passed_scenarios, 8);
}

#[test]
fn reference_is_computed_once_per_scenario() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = CannedRunner::default()
        .with("./grun.py", "ref\n")
        .with("./crun-seq", "ref\n");
    let orchestrator =
        Orchestrator::new(config(dir.path()), runner).with_matrix(single(example_scenario()));

    orchestrator.run(&sequential()).expect("first");
    orchestrator.run(&sequential()).expect("second");
    orchestrator.run(&sequential()).expect("third");

    let seen = orchestrator.runner().seen.borrow();
    assert_eq!(seen.iter().filter(|p| *p == "./grun.py").count(), 1);
    assert_eq!(seen.iter().filter(|p| *p == "./crun-seq").count(), 3);
    assert_eq!(orchestrator.runner().executions.get(), 4);
}

#[test]
fn cached_reference_wins_over_a_changed_oracle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = config(dir.path());
    let scenario = example_scenario();

    let first = CannedRunner::default()
        .with("./grun.py", "old\n")
        .with("./crun-seq", "old\n");
    Orchestrator::new(cfg.clone(), first)
        .with_matrix(single(scenario.clone()))
        .run(&sequential())
        .expect("seed cache");

    let changed = CannedRunner::default()
        .with("./grun.py", "new\n")
        .with("./crun-seq", "old\n");
    let orchestrator = Orchestrator::new(cfg, changed).with_matrix(single(scenario.clone()));
    assert!(orchestrator.run(&sequential()).expect("cached").all_passed());

    let cleared = RunOptions {
        clear_cache: true,
        ..sequential()
    };
    let report = orchestrator.run(&cleared).expect("fresh oracle");
    assert!(!report.all_passed());
    let reference = orchestrator.cache().path_for(&scenario, RunMode::Reference);
    assert_eq!(fs::read_to_string(reference).expect("read"), "new\n");
}

#[test]
fn cache_holds_flat_mode_qualified_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = CannedRunner::default()
        .with("./grun.py", "x\n")
        .with("./crun-omp", "x\n");
    let orchestrator =
        Orchestrator::new(config(dir.path()), runner).with_matrix(single(example_scenario()));
    orchestrator.run(&RunOptions::default()).expect("run");

    let mut names: Vec<PathBuf> = fs::read_dir(dir.path().join("regression-cache"))
        .expect("cache dir")
        .map(|entry| PathBuf::from(entry.expect("entry").file_name()))
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            PathBuf::from("omp8-g-006x004-fracX.gph+r-006x004-c1.rats+10+b+01"),
            PathBuf::from("ref-g-006x004-fracX.gph+r-006x004-c1.rats+10+b+01"),
        ]
    );
}

#[test]
fn prefix_comparison_attributes_the_short_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let full = dir.path().join("full");
    let prefix = dir.path().join("prefix");
    fs::write(&full, "1\n2\n3\n4\n5\n").expect("write");
    fs::write(&prefix, "1\n2\n3\n").expect("write");

    let result = compare_outputs(&full, &prefix, 5).expect("compare");
    assert_eq!(result.mismatch_count, 1);
    let end = result.premature_end.expect("premature end");
    assert_eq!(end.ended, OutputSide::Test);
    assert_eq!(end.line_number, 4);
}

#[test]
fn bundled_matrix_fixture_matches_builtin() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/scenario_matrix.json");
    let loaded = crun_regress::scenario::load_scenario_matrix(&path).expect("fixture loads");
    assert_eq!(loaded, ScenarioMatrix::builtin());
}

#[cfg(unix)]
mod subprocess {
    use super::{config, example_scenario, sequential, single};
    use crun_regress::{Orchestrator, RegressConfig};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn script(path: &Path, body: &str) {
        fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("chmod");
    }

    #[test]
    fn real_programs_are_compared_through_the_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reference = dir.path().join("grun");
        let test = dir.path().join("crun-seq");
        // both print their arguments minus the reference-only determinism flag
        script(&reference, r#"echo "$2 $4 $6 $8 ${10}""#);
        script(&test, r#"echo "$2 $4 $6 $8 ${10}""#);

        let cfg = RegressConfig {
            reference_program: reference.display().to_string(),
            sequential_program: test.display().to_string(),
            data_dir: dir.path().join("data"),
            ..config(dir.path())
        };
        let orchestrator =
            Orchestrator::with_subprocesses(cfg).with_matrix(single(example_scenario()));
        let report = orchestrator.run(&sequential()).expect("run");
        assert!(report.all_passed(), "{:?}", report.failed_names());
    }
}
