#![forbid(unsafe_code)]

use crate::compare::{OutputSide, PrematureEnd};
use std::path::PathBuf;
use thiserror::Error;

/// Failure to execute one simulator run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("couldn't open file '{}' to write: {source}", .path.display())]
    CannotOpenOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("couldn't execute {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("refusing to execute an empty command")]
    EmptyCommand,
}

/// Failure to read one of the two outputs being compared.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("couldn't open {side} file '{}': {source}", .path.display())]
    CannotOpen {
        side: OutputSide,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed reading {side} file '{}': {source}", .path.display())]
    Io {
        side: OutputSide,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rejected scenario parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    #[error("step count must be positive")]
    ZeroSteps,
    #[error("seed {0} is outside 0..=99")]
    SeedOutOfRange(u32),
    #[error("{0} input file name must not be empty")]
    EmptyInput(&'static str),
    #[error("unknown update mode '{0}' (expected one of s, b, r)")]
    UnknownUpdateMode(String),
}

/// Why a single scenario was recorded as failed.
#[derive(Debug, Error)]
pub enum ScenarioFailure {
    #[error("failed to run simulation with reference simulator: {0}")]
    ReferenceRun(#[source] RunError),
    #[error("failed to run simulation with test simulator: {0}")]
    TestRun(#[source] RunError),
    #[error("{0}")]
    Read(#[from] ReadError),
    #[error("{count} total mismatches{}", premature_suffix(.premature_end))]
    Mismatch {
        count: usize,
        premature_end: Option<PrematureEnd>,
    },
}

fn premature_suffix(premature_end: &Option<PrematureEnd>) -> String {
    match premature_end {
        Some(end) => format!(
            " ({} output ended prematurely at line {})",
            end.ended, end.line_number
        ),
        None => String::new(),
    }
}

/// Errors that stop a whole regression run.
#[derive(Debug, Error)]
pub enum RegressError {
    #[error("couldn't create cache directory '{}': {source}", .path.display())]
    CacheDirectoryFatal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scenario matrix {}: {detail}", .path.display())]
    Matrix { path: PathBuf, detail: String },
    #[error("failed writing report {}: {detail}", .path.display())]
    Report { path: PathBuf, detail: String },
}

impl ScenarioFailure {
    /// Stable machine-readable tag used in run logs and JSON reports.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ReferenceRun(_) => "reference_run_failed",
            Self::TestRun(_) => "test_run_failed",
            Self::Read(ReadError::CannotOpen { side: OutputSide::Reference, .. })
            | Self::Read(ReadError::Io { side: OutputSide::Reference, .. }) => {
                "reference_output_unreadable"
            }
            Self::Read(_) => "test_output_unreadable",
            Self::Mismatch {
                premature_end: Some(_),
                ..
            } => "output_length_mismatch",
            Self::Mismatch { .. } => "output_line_mismatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RunError, ScenarioFailure};
    use crate::compare::{OutputSide, PrematureEnd};

    #[test]
    fn mismatch_message_names_the_short_side() {
        let failure = ScenarioFailure::Mismatch {
            count: 1,
            premature_end: Some(PrematureEnd {
                ended: OutputSide::Test,
                line_number: 4,
            }),
        };
        assert_eq!(
            failure.to_string(),
            "1 total mismatches (test output ended prematurely at line 4)"
        );
        assert_eq!(failure.reason_code(), "output_length_mismatch");
    }

    #[test]
    fn run_failures_keep_their_phase() {
        let failure = ScenarioFailure::TestRun(RunError::EmptyCommand);
        assert_eq!(failure.reason_code(), "test_run_failed");
        assert!(failure.to_string().contains("test simulator"));
    }
}
