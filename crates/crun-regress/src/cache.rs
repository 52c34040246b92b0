#![forbid(unsafe_code)]

use crate::command::CommandBuilder;
use crate::error::{RegressError, RunError};
use crate::runner::ProcessRunner;
use crate::scenario::{RunMode, ScenarioDescriptor};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Flat directory of captured simulator outputs, one file per cache key.
///
/// Reference entries are written once and then reused until
/// [`OutputCache::invalidate_all`] removes the whole directory, so repeated
/// runs compare against the same oracle output.
#[derive(Debug, Clone)]
pub struct OutputCache {
    root: PathBuf,
}

impl OutputCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, scenario: &ScenarioDescriptor, mode: RunMode) -> PathBuf {
        self.root.join(scenario.cache_key(mode))
    }

    #[must_use]
    pub fn contains(&self, scenario: &ScenarioDescriptor, mode: RunMode) -> bool {
        self.path_for(scenario, mode).is_file()
    }

    /// Create the cache root if it is missing. Nothing else works without it.
    pub fn ensure_root(&self) -> Result<(), RegressError> {
        fs::create_dir_all(&self.root).map_err(|source| RegressError::CacheDirectoryFatal {
            path: self.root.clone(),
            source,
        })
    }

    /// Remove every cached output, reference entries included.
    pub fn invalidate_all(&self) -> std::io::Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Path of the reference output for `scenario`, running the reference
    /// program only when no cached output exists.
    pub fn ensure<R: ProcessRunner>(
        &self,
        runner: &R,
        builder: &CommandBuilder,
        scenario: &ScenarioDescriptor,
    ) -> Result<PathBuf, RunError> {
        let path = self.path_for(scenario, RunMode::Reference);
        if path.exists() {
            debug!("reusing cached reference output {}", path.display());
            return Ok(path);
        }
        self.run_into(runner, builder, scenario, RunMode::Reference, &path)?;
        Ok(path)
    }

    /// Run a test program and store its output under the cache root,
    /// replacing any previous output for the same key.
    pub fn capture<R: ProcessRunner>(
        &self,
        runner: &R,
        builder: &CommandBuilder,
        scenario: &ScenarioDescriptor,
        mode: RunMode,
    ) -> Result<PathBuf, RunError> {
        debug_assert!(!mode.is_reference(), "reference outputs go through ensure");
        let path = self.path_for(scenario, mode);
        self.run_into(runner, builder, scenario, mode, &path)?;
        Ok(path)
    }

    fn run_into<R: ProcessRunner>(
        &self,
        runner: &R,
        builder: &CommandBuilder,
        scenario: &ScenarioDescriptor,
        mode: RunMode,
        path: &Path,
    ) -> Result<(), RunError> {
        let cmd = builder.build(scenario, mode);
        let result = runner.run(&cmd, path);
        if result.is_err() && mode.is_reference() {
            // a half-written oracle must not be picked up as a cache hit later
            if let Err(err) = fs::remove_file(path)
                && err.kind() != ErrorKind::NotFound
            {
                warn!("couldn't remove partial output {}: {err}", path.display());
            }
        }
        result
    }
}
