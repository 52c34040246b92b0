#![forbid(unsafe_code)]

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// One JSONL record per regression scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioLogEntry {
    pub suite: &'static str,
    pub scenario: String,
    pub mode: String,
    pub reference_key: String,
    pub test_key: String,
    pub passed: bool,
    pub reason_code: String,
    pub mismatch_count: usize,
    pub premature_end_line: Option<usize>,
    pub reference_sha256: Option<String>,
    pub test_sha256: Option<String>,
    pub detail: String,
    pub ts_unix_ms: u128,
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

/// Digest of a captured output, or `None` when it cannot be read.
pub(crate) fn file_sha256(path: &Path) -> Option<String> {
    fs::read(path).ok().map(|bytes| sha256_hex(&bytes))
}

pub fn append_scenario_log(path: &Path, entry: &ScenarioLogEntry) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
    let line = serde_json::to_string(entry)
        .map_err(|err| format!("failed serializing regression log entry: {err}"))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| format!("failed appending regression log {}: {err}", path.display()))
}
