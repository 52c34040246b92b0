#![forbid(unsafe_code)]

use crun_regress::scenario::load_scenario_matrix;
use crun_regress::{
    DEFAULT_THREAD_COUNT, Orchestrator, RegressConfig, RunOptions, write_regression_report,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: crun-regress [-h] [-c] [-a] [-t THD] [--matrix <path>] [--report <path>] [--log-path <path>]
    -h       Print this message
    -c       Clear expected result cache
    -a       Also run the extra (large) scenarios
    -t THD   Specify number of OMP threads
       If > 1, will run crun-omp.  Else will run crun-seq
    --matrix <path>    Load the scenario matrix from JSON
    --report <path>    Write the regression report as JSON
    --log-path <path>  Append one JSON line per scenario";

#[derive(Debug)]
struct CliArgs {
    options: RunOptions,
    matrix_path: Option<PathBuf>,
    report_path: Option<PathBuf>,
    log_path: Option<PathBuf>,
}

fn main() {
    init_logging();
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("crun-regress failed: {err}");
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Returns whether every scenario passed.
fn run() -> Result<bool, String> {
    let Some(args) = parse_args(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(true);
    };

    let mut config = RegressConfig::from_env();
    if args.log_path.is_some() {
        config.log_path = args.log_path;
    }

    let mut orchestrator = Orchestrator::with_subprocesses(config);
    if let Some(path) = &args.matrix_path {
        let matrix = load_scenario_matrix(path).map_err(|err| err.to_string())?;
        orchestrator = orchestrator.with_matrix(matrix);
    }

    let report = orchestrator
        .run(&args.options)
        .map_err(|err| err.to_string())?;

    if let Some(path) = &args.report_path {
        write_regression_report(path, &report).map_err(|err| err.to_string())?;
        eprintln!("wrote {}", path.display());
    }
    Ok(report.all_passed())
}

/// `Ok(None)` means help was requested.
fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Option<CliArgs>, String> {
    let mut parsed = CliArgs {
        options: RunOptions {
            thread_count: DEFAULT_THREAD_COUNT,
            ..RunOptions::default()
        },
        matrix_path: None,
        report_path: None,
        log_path: None,
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-c" => parsed.options.clear_cache = true,
            "-a" | "--all" => parsed.options.include_extra = true,
            "-t" => {
                let value = args.next().ok_or_else(|| "-t requires a value".to_string())?;
                parsed.options.thread_count = parse_thread_count(&value)?;
            }
            "--matrix" => parsed.matrix_path = Some(path_value(&mut args, "--matrix")?),
            "--report" => parsed.report_path = Some(path_value(&mut args, "--report")?),
            "--log-path" => parsed.log_path = Some(path_value(&mut args, "--log-path")?),
            other if other.starts_with("-t") && other.len() > 2 => {
                parsed.options.thread_count = parse_thread_count(&other[2..])?;
            }
            unknown => return Err(format!("unknown argument: {unknown}\n{USAGE}")),
        }
    }
    Ok(Some(parsed))
}

// Counts at or below one select the sequential program, so negatives clamp to zero.
fn parse_thread_count(raw: &str) -> Result<u32, String> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|err| format!("invalid thread count '{raw}': {err}"))?;
    Ok(u32::try_from(value.max(0)).unwrap_or(u32::MAX))
}

fn path_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<PathBuf, String> {
    args.next()
        .map(PathBuf::from)
        .ok_or_else(|| format!("{flag} requires a value"))
}
