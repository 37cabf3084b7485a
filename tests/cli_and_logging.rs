// tests/cli_and_logging.rs

use clap::Parser;
use pipedag::cli::{CliArgs, LogLevel};
use pipedag::logging::resolve_level;
use tracing::Level;

#[test]
fn defaults() {
    let args = CliArgs::try_parse_from(["pipedag"]).expect("no flags is valid");
    assert_eq!(args.config, "Pipedag.toml");
    assert_eq!(args.max_concurrency, None);
    assert!(args.log_level.is_none());
    assert!(!args.dry_run);
}

#[test]
fn all_flags() {
    let args = CliArgs::try_parse_from([
        "pipedag",
        "--config",
        "pipelines/etl.toml",
        "--max-concurrency",
        "3",
        "--log-level",
        "debug",
        "--dry-run",
    ])
    .expect("valid flags");

    assert_eq!(args.config, "pipelines/etl.toml");
    assert_eq!(args.max_concurrency, Some(3));
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert!(args.dry_run);
}

#[test]
fn zero_concurrency_is_rejected() {
    assert!(CliArgs::try_parse_from(["pipedag", "--max-concurrency", "0"]).is_err());
}

#[test]
fn log_level_priority() {
    assert_eq!(resolve_level(Some(LogLevel::Trace), Some("error")), Level::TRACE);
    assert_eq!(resolve_level(None, Some(" Warning ")), Level::WARN);
    assert_eq!(resolve_level(None, Some("nonsense")), Level::INFO);
    assert_eq!(resolve_level(None, None), Level::INFO);
}
