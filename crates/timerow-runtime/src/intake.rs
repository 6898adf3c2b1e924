//! Intake directory handling.
//!
//! Raw exports land as `.csv` files directly inside the intake directory. A
//! passive scan picks them up in file-name order.

use std::path::{Path, PathBuf};

use timerow_core::error::{Result, TimerowError};
use tracing::{debug, info};

/// All raw exports waiting in `intake_dir`, sorted by path.
///
/// A missing directory holds no exports.
pub fn list_raw_exports(intake_dir: &Path) -> Vec<PathBuf> {
    if !intake_dir.exists() {
        debug!("Intake directory does not exist: {}", intake_dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(intake_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_raw_export(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// The first raw export in `intake_dir`, if any.
pub fn find_raw_export(intake_dir: &Path) -> Option<PathBuf> {
    list_raw_exports(intake_dir).into_iter().next()
}

/// Copy `file` into `intake_dir` under its own file name.
///
/// Used when a remote operator delivers an export; the copy is what the
/// orchestrator consumes, the original stays untouched.
pub fn deliver(file: &Path, intake_dir: &Path) -> Result<PathBuf> {
    let read_err = |source: std::io::Error| TimerowError::FileRead {
        path: file.to_path_buf(),
        source,
    };

    if !is_raw_export(file) {
        return Err(read_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "raw exports must have a .csv extension",
        )));
    }
    let name = file.file_name().ok_or_else(|| {
        read_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a file path",
        ))
    })?;

    std::fs::create_dir_all(intake_dir)?;
    let target = intake_dir.join(name);
    if target.exists() && std::fs::canonicalize(&target).ok() == std::fs::canonicalize(file).ok() {
        return Ok(target);
    }
    std::fs::copy(file, &target).map_err(read_err)?;
    info!("Received {}", target.display());
    Ok(target)
}

fn is_raw_export(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}
