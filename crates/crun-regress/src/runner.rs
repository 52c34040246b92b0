#![forbid(unsafe_code)]

use crate::command::display_command;
use crate::error::RunError;
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Executes one command with its standard output captured into a file.
///
/// Success means the program ran to completion; its exit status is not a
/// verdict, the comparison of outputs is.
pub trait ProcessRunner {
    fn run(&self, command: &[String], output_path: &Path) -> Result<(), RunError>;
}

/// Runs programs as real child processes, blocking until each exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessRunner;

impl ProcessRunner for SubprocessRunner {
    fn run(&self, command: &[String], output_path: &Path) -> Result<(), RunError> {
        let (program, args) = command.split_first().ok_or(RunError::EmptyCommand)?;
        let command_line = display_command(command);

        let out_file = File::create(output_path).map_err(|source| RunError::CannotOpenOutput {
            path: output_path.to_path_buf(),
            source,
        })?;

        let output_name = output_path.file_name().map_or_else(
            || output_path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        info!("Executing {command_line} > {output_name}");

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out_file))
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| RunError::SpawnFailed {
                command: format!("{command_line} > {output_name}"),
                source,
            })?;

        if !status.success() {
            warn!(
                "{} exited with {status}; its output will be judged by comparison",
                program
            );
        }
        Ok(())
    }
}
