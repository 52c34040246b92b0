#![forbid(unsafe_code)]

use crate::RegressConfig;
use crate::scenario::{RunMode, ScenarioDescriptor};
use std::path::{Path, PathBuf};

/// Builds simulator argument vectors from a fixed set of program paths.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    reference_program: String,
    sequential_program: String,
    parallel_program: String,
    data_dir: PathBuf,
}

impl CommandBuilder {
    #[must_use]
    pub fn new(config: &RegressConfig) -> Self {
        Self {
            reference_program: config.reference_program.clone(),
            sequential_program: config.sequential_program.clone(),
            parallel_program: config.parallel_program.clone(),
            data_dir: config.data_dir.clone(),
        }
    }

    #[must_use]
    pub fn program_for(&self, mode: RunMode) -> &str {
        match mode {
            RunMode::Reference => &self.reference_program,
            RunMode::TestSequential => &self.sequential_program,
            RunMode::TestParallel(_) => &self.parallel_program,
        }
    }

    /// Argument vector for running `scenario` under `mode`, program first.
    ///
    /// `TestParallel` requires a thread count above one; `RunMode::for_threads`
    /// is the intended way to obtain it.
    #[must_use]
    pub fn build(&self, scenario: &ScenarioDescriptor, mode: RunMode) -> Vec<String> {
        debug_assert!(
            !matches!(mode, RunMode::TestParallel(threads) if threads <= 1),
            "parallel runs need more than one thread"
        );

        let mut cmd = vec![
            self.program_for(mode).to_string(),
            "-g".to_string(),
            data_path(&self.data_dir, scenario.primary_input()),
            "-r".to_string(),
            data_path(&self.data_dir, scenario.secondary_input()),
            "-u".to_string(),
            scenario.update_mode().flag().to_string(),
            "-n".to_string(),
            scenario.step_count().to_string(),
            "-s".to_string(),
            scenario.seed().to_string(),
        ];

        match mode {
            // canonical order in the oracle so its output is reproducible
            RunMode::Reference => cmd.extend(["-m".to_string(), "d".to_string()]),
            RunMode::TestParallel(threads) => {
                cmd.extend(["-t".to_string(), threads.to_string()]);
            }
            RunMode::TestSequential => {}
        }
        cmd
    }
}

/// Shell-style rendering for log lines.
#[must_use]
pub fn display_command(command: &[String]) -> String {
    command.join(" ")
}

fn data_path(data_dir: &Path, file: &str) -> String {
    data_dir.join(file).display().to_string()
}
