#![forbid(unsafe_code)]

use crate::error::ReadError;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSide {
    Reference,
    Test,
}

impl fmt::Display for OutputSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => f.write_str("reference"),
            Self::Test => f.write_str("test"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineMismatch {
    pub line_number: usize,
    pub reference_line: String,
    pub test_line: String,
}

/// One output ran out of lines while the other still had some.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrematureEnd {
    pub ended: OutputSide,
    pub line_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonResult {
    pub mismatch_count: usize,
    pub reported_mismatches: Vec<LineMismatch>,
    pub premature_end: Option<PrematureEnd>,
}

impl ComparisonResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.mismatch_count == 0
    }
}

struct LineSource {
    side: OutputSide,
    path: std::path::PathBuf,
    reader: BufReader<File>,
    buf: Vec<u8>,
}

impl LineSource {
    fn open(side: OutputSide, path: &Path) -> Result<Self, ReadError> {
        let file = File::open(path).map_err(|source| ReadError::CannotOpen {
            side,
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            side,
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            buf: Vec::new(),
        })
    }

    /// Next line without its terminator, or `None` at end of file.
    fn next_line(&mut self) -> Result<Option<&[u8]>, ReadError> {
        self.buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .map_err(|source| ReadError::Io {
                side: self.side,
                path: self.path.clone(),
                source,
            })?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(strip_terminator(&self.buf)))
    }
}

/// Drop exactly one trailing `\n`; a carriage return stays part of the line.
fn strip_terminator(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}

/// Compare two captured outputs line by line.
///
/// Counting stops at the first line where one output has ended and the other
/// has not; that divergence counts as a single mismatch. Only the first
/// `mismatch_limit` differing lines are kept in detail, the count is exact.
pub fn compare_outputs(
    reference_path: &Path,
    test_path: &Path,
    mismatch_limit: usize,
) -> Result<ComparisonResult, ReadError> {
    let mut reference = LineSource::open(OutputSide::Reference, reference_path)?;
    let mut test = LineSource::open(OutputSide::Test, test_path)?;

    let mut result = ComparisonResult {
        mismatch_count: 0,
        reported_mismatches: Vec::new(),
        premature_end: None,
    };
    let mut line_number = 0usize;

    loop {
        line_number += 1;
        let rline = reference.next_line()?.map(<[u8]>::to_vec);
        let tline = test.next_line()?;

        let (rline, tline) = match (rline, tline) {
            (None, None) => break,
            (None, Some(_)) => {
                result.mismatch_count += 1;
                result.premature_end = Some(PrematureEnd {
                    ended: OutputSide::Reference,
                    line_number,
                });
                warn!(
                    "Mismatch at line {line_number}.  File {} ended prematurely",
                    reference_path.display()
                );
                break;
            }
            (Some(_), None) => {
                result.mismatch_count += 1;
                result.premature_end = Some(PrematureEnd {
                    ended: OutputSide::Test,
                    line_number,
                });
                warn!(
                    "Mismatch at line {line_number}.  File {} ended prematurely",
                    test_path.display()
                );
                break;
            }
            (Some(rline), Some(tline)) => (rline, tline),
        };

        if rline.as_slice() != tline {
            result.mismatch_count += 1;
            if result.mismatch_count <= mismatch_limit {
                let mismatch = LineMismatch {
                    line_number,
                    reference_line: String::from_utf8_lossy(&rline).into_owned(),
                    test_line: String::from_utf8_lossy(tline).into_owned(),
                };
                warn!(
                    "Mismatch at line {line_number}.  File {}:'{}'.  File {}:'{}'",
                    reference_path.display(),
                    mismatch.reference_line,
                    test_path.display(),
                    mismatch.test_line
                );
                result.reported_mismatches.push(mismatch);
            }
        }
    }

    if result.mismatch_count > 0 {
        warn!(
            "{} total mismatches.  Files {}, {}",
            result.mismatch_count,
            reference_path.display(),
            test_path.display()
        );
    }
    Ok(result)
}
