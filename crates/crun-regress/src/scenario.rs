#![forbid(unsafe_code)]

use crate::error::{RegressError, ScenarioError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Simulator update discipline, passed through as a single flag character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UpdateMode {
    #[serde(rename = "s")]
    Synchronous,
    #[serde(rename = "b")]
    Batch,
    #[serde(rename = "r")]
    Rat,
}

impl UpdateMode {
    #[must_use]
    pub const fn flag(self) -> char {
        match self {
            Self::Synchronous => 's',
            Self::Batch => 'b',
            Self::Rat => 'r',
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ScenarioError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "s" => Ok(Self::Synchronous),
            "b" => Ok(Self::Batch),
            "r" => Ok(Self::Rat),
            other => Err(ScenarioError::UnknownUpdateMode(other.to_string())),
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.flag())
    }
}

/// Which program a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    Reference,
    TestSequential,
    TestParallel(u32),
}

impl RunMode {
    /// Test mode for a requested thread count; one thread or fewer means the
    /// sequential program.
    #[must_use]
    pub const fn for_threads(thread_count: u32) -> Self {
        if thread_count > 1 {
            Self::TestParallel(thread_count)
        } else {
            Self::TestSequential
        }
    }

    #[must_use]
    pub const fn is_reference(self) -> bool {
        matches!(self, Self::Reference)
    }

    /// Prefix that makes cache keys mode-qualified.
    #[must_use]
    pub fn tag(self) -> String {
        match self {
            Self::Reference => "ref".to_string(),
            Self::TestSequential => "tst".to_string(),
            Self::TestParallel(threads) => format!("omp{threads}"),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => f.write_str("reference"),
            Self::TestSequential => f.write_str("test-sequential"),
            Self::TestParallel(threads) => write!(f, "test-parallel({threads})"),
        }
    }
}

/// One regression case: a graph file, a rat file and the simulation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ScenarioDescriptor {
    primary_input: String,
    secondary_input: String,
    step_count: u32,
    update_mode: UpdateMode,
    seed: u8,
}

impl ScenarioDescriptor {
    pub fn new(
        primary_input: impl Into<String>,
        secondary_input: impl Into<String>,
        step_count: u32,
        update_mode: UpdateMode,
        seed: u32,
    ) -> Result<Self, ScenarioError> {
        let primary_input = primary_input.into();
        let secondary_input = secondary_input.into();
        if primary_input.trim().is_empty() {
            return Err(ScenarioError::EmptyInput("primary"));
        }
        if secondary_input.trim().is_empty() {
            return Err(ScenarioError::EmptyInput("secondary"));
        }
        if step_count == 0 {
            return Err(ScenarioError::ZeroSteps);
        }
        let seed = u8::try_from(seed)
            .ok()
            .filter(|seed| *seed <= 99)
            .ok_or(ScenarioError::SeedOutOfRange(seed))?;
        Ok(Self {
            primary_input,
            secondary_input,
            step_count,
            update_mode,
            seed,
        })
    }

    // Built-in table entries are known valid.
    fn builtin(
        primary_input: &str,
        secondary_input: &str,
        step_count: u32,
        update_mode: UpdateMode,
        seed: u8,
    ) -> Self {
        Self {
            primary_input: primary_input.to_string(),
            secondary_input: secondary_input.to_string(),
            step_count,
            update_mode,
            seed,
        }
    }

    #[must_use]
    pub fn primary_input(&self) -> &str {
        &self.primary_input
    }

    #[must_use]
    pub fn secondary_input(&self) -> &str {
        &self.secondary_input
    }

    #[must_use]
    pub const fn step_count(&self) -> u32 {
        self.step_count
    }

    #[must_use]
    pub const fn update_mode(&self) -> UpdateMode {
        self.update_mode
    }

    #[must_use]
    pub const fn seed(&self) -> u8 {
        self.seed
    }

    /// Human-readable label, e.g. `g-006x004-fracX.gph+r-006x004-c1.rats+10+b+01`.
    #[must_use]
    pub fn short_name(&self) -> String {
        format!(
            "{}+{}+{:02}+{}+{:02}",
            self.primary_input, self.secondary_input, self.step_count, self.update_mode, self.seed
        )
    }

    /// File name of the cached output for this scenario under `mode`.
    ///
    /// Input names are escaped so that `+` stays an unambiguous separator and
    /// the key never contains a path separator.
    #[must_use]
    pub fn cache_key(&self, mode: RunMode) -> String {
        format!(
            "{}-{}+{}+{:02}+{}+{:02}",
            mode.tag(),
            escape_component(&self.primary_input),
            escape_component(&self.secondary_input),
            self.step_count,
            self.update_mode,
            self.seed
        )
    }
}

impl fmt::Display for ScenarioDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

fn escape_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '+' => out.push_str("%2B"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            other => out.push(other),
        }
    }
    out
}

/// The ordered default regression set.
#[must_use]
pub fn regression_list() -> Vec<ScenarioDescriptor> {
    use UpdateMode::{Batch, Rat, Synchronous};
    vec![
        ScenarioDescriptor::builtin("g-006x004-fracX.gph", "r-006x004-c1.rats", 10, Batch, 1),
        ScenarioDescriptor::builtin("g-006x004-uniU.gph", "r-006x004-d1.rats", 10, Batch, 2),
        ScenarioDescriptor::builtin("g-006x004-fracX.gph", "r-006x004-r1.rats", 10, Batch, 3),
        ScenarioDescriptor::builtin("g-006x004-uniU.gph", "r-006x004-u1.rats", 10, Batch, 4),
        ScenarioDescriptor::builtin("g-006x004-fracX.gph", "r-006x004-c1.rats", 10, Rat, 5),
        ScenarioDescriptor::builtin("g-006x004-uniU.gph", "r-006x004-d1.rats", 10, Synchronous, 6),
        ScenarioDescriptor::builtin("g-018x012-fracY.gph", "r-018x012-c5.rats", 5, Batch, 7),
        ScenarioDescriptor::builtin("g-036x032-uniV.gph", "r-036x032-u10.rats", 5, Batch, 8),
    ]
}

/// Cases too large for the reference program's interpreted path; only run on
/// request.
#[must_use]
pub fn extra_regression_list() -> Vec<ScenarioDescriptor> {
    vec![
        ScenarioDescriptor::builtin(
            "g-180x160-fracD.gph",
            "r-180x160-d35.rats",
            3,
            UpdateMode::Batch,
            21,
        ),
        ScenarioDescriptor::builtin(
            "g-180x160-uniE.gph",
            "r-180x160-r35.rats",
            3,
            UpdateMode::Batch,
            22,
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioMatrix {
    pub regression: Vec<ScenarioDescriptor>,
    pub extra: Vec<ScenarioDescriptor>,
}

impl Default for ScenarioMatrix {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ScenarioMatrix {
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            regression: regression_list(),
            extra: extra_regression_list(),
        }
    }

    /// Scenarios for one run, in order; the extra set is appended on request.
    #[must_use]
    pub fn selected(&self, include_extra: bool) -> Vec<&ScenarioDescriptor> {
        let extra: &[ScenarioDescriptor] = if include_extra { &self.extra } else { &[] };
        self.regression.iter().chain(extra).collect()
    }
}

#[derive(Debug, Deserialize)]
struct MatrixFile {
    regression: Vec<MatrixFileCase>,
    #[serde(default)]
    extra: Vec<MatrixFileCase>,
}

#[derive(Debug, Deserialize)]
struct MatrixFileCase {
    graph: String,
    rats: String,
    steps: u32,
    update: String,
    seed: u32,
}

impl MatrixFileCase {
    fn into_scenario(self) -> Result<ScenarioDescriptor, ScenarioError> {
        let update_mode = UpdateMode::parse(&self.update)?;
        ScenarioDescriptor::new(self.graph, self.rats, self.steps, update_mode, self.seed)
    }
}

/// Load a matrix from JSON of the form
/// `{"regression": [{"graph", "rats", "steps", "update", "seed"}], "extra": [...]}`.
pub fn load_scenario_matrix(path: &Path) -> Result<ScenarioMatrix, RegressError> {
    let matrix_error = |detail: String| RegressError::Matrix {
        path: path.to_path_buf(),
        detail,
    };
    let raw = fs::read_to_string(path).map_err(|err| matrix_error(format!("read failed: {err}")))?;
    let file: MatrixFile =
        serde_json::from_str(&raw).map_err(|err| matrix_error(format!("invalid json: {err}")))?;

    let convert = |cases: Vec<MatrixFileCase>, set: &str| {
        cases
            .into_iter()
            .enumerate()
            .map(|(idx, case)| {
                case.into_scenario()
                    .map_err(|err| matrix_error(format!("{set}[{idx}]: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()
    };

    Ok(ScenarioMatrix {
        regression: convert(file.regression, "regression")?,
        extra: convert(file.extra, "extra")?,
    })
}
