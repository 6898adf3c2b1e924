use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Create the intake and output directories (and any missing parents).
pub fn ensure_directories(intake_dir: &Path, output_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(intake_dir)?;
    std::fs::create_dir_all(output_dir)?;
    Ok(())
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name to a tracing filter directive.
fn filter_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" => "error".to_string(),
        _ => log_level.to_lowercase(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Output goes to stderr, or is appended to `log_file` without ANSI colours
/// when one is given. Unrecognised levels fall back to `"info"`.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(filter_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = log_file.is_none().then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_directories() {
        let tmp = TempDir::new().expect("tempdir");
        let intake = tmp.path().join("project").join("input");
        let output = tmp.path().join("project").join("output");

        ensure_directories(&intake, &output).expect("ensure_directories should succeed");

        assert!(intake.is_dir(), "input dir must exist");
        assert!(output.is_dir(), "output dir must exist");

        // Idempotent.
        ensure_directories(&intake, &output).expect("second call should succeed");
    }

    #[test]
    fn test_ensure_directories_fails_on_file() {
        let tmp = TempDir::new().expect("tempdir");
        let blocker = tmp.path().join("input");
        std::fs::write(&blocker, "x").unwrap();

        assert!(ensure_directories(&blocker, &tmp.path().join("output")).is_err());
    }

    #[test]
    fn test_filter_directive_maps_level_names() {
        assert_eq!(filter_directive("DEBUG"), "debug");
        assert_eq!(filter_directive("info"), "info");
        assert_eq!(filter_directive("WARNING"), "warn");
        assert_eq!(filter_directive("ERROR"), "error");
        assert_eq!(filter_directive("trace"), "trace");
    }

    #[test]
    fn test_setup_logging_to_file() {
        let tmp = TempDir::new().expect("tempdir");
        let log = tmp.path().join("logs").join("timerow.log");

        // Only one global subscriber per process; a second init may fail
        // when other tests got there first.
        let _ = setup_logging("INFO", Some(&log));
        assert!(log.exists());
    }
}
