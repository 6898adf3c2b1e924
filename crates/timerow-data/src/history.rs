//! Canonical dataset storage.
//!
//! The dataset is a flat table with one row per reading:
//!
//! ```text
//! datetime,time,value,type
//! 2024-03-01 08:15:00,08:15:00,5.6,0
//! ```
//!
//! Writes go through a temporary file in the same directory followed by a
//! rename, so readers never observe a truncated dataset.

use std::io::Write;
use std::path::{Path, PathBuf};

use timerow_core::error::{Result, TimerowError};
use timerow_core::formatting::format_value;
use timerow_core::models::{CanonicalSeries, Reading, SourceKind};
use timerow_core::time_utils::{format_datetime, format_time, parse_datetime, parse_time};
use tracing::debug;

use crate::parser::split_row;

/// Header line of the canonical dataset.
pub const DATASET_HEADER: &str = "datetime,time,value,type";

// ── HistoryStore ──────────────────────────────────────────────────────────────

/// Owner of the canonical dataset file.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted series. A missing file is the first-run case and
    /// yields an empty series.
    pub fn load(&self) -> Result<CanonicalSeries> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No dataset at {}; starting empty", self.path.display());
                return Ok(CanonicalSeries::empty());
            }
            Err(source) => {
                return Err(TimerowError::DatasetRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let series = parse_dataset(&content, &self.path)?;
        debug!(
            "Loaded {} readings from {}",
            series.len(),
            self.path.display()
        );
        Ok(series)
    }

    /// Atomically replace the persisted series.
    pub fn persist(&self, series: &CanonicalSeries) -> Result<()> {
        write_atomic(&self.path, render_dataset(series).as_bytes())?;
        debug!(
            "Persisted {} readings to {}",
            series.len(),
            self.path.display()
        );
        Ok(())
    }
}

// ── Merge ─────────────────────────────────────────────────────────────────────

/// Union of two series keyed by `(timestamp, source_kind)`.
///
/// On a key collision the reading from `incoming` replaces the existing one.
pub fn merge(existing: CanonicalSeries, incoming: CanonicalSeries) -> CanonicalSeries {
    CanonicalSeries::from_readings(
        existing
            .into_readings()
            .into_iter()
            .chain(incoming.into_readings()),
    )
}

// ── Serialization ─────────────────────────────────────────────────────────────

/// Render a series in the canonical table format.
pub fn render_dataset(series: &CanonicalSeries) -> String {
    let mut out = String::with_capacity(32 * (series.len() + 1));
    out.push_str(DATASET_HEADER);
    out.push('\n');
    for reading in series {
        out.push_str(&format!(
            "{},{},{},{}\n",
            format_datetime(&reading.timestamp()),
            format_time(&reading.time_of_day()),
            format_value(reading.value()),
            reading.source_kind().discriminator()
        ));
    }
    out
}

/// Parse the canonical table format. `path` is only used in error messages.
pub fn parse_dataset(content: &str, path: &Path) -> Result<CanonicalSeries> {
    let corrupt = |line: usize, reason: String| TimerowError::CorruptDataset {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut lines = content.lines().enumerate();
    match lines.next() {
        Some((_, header)) if header.trim() == DATASET_HEADER => {}
        Some((_, header)) => return Err(corrupt(1, format!("unexpected header {:?}", header))),
        None => return Err(corrupt(1, "empty file".to_string())),
    }

    let mut readings = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let reading = parse_dataset_row(line).map_err(|reason| corrupt(line_no, reason))?;
        readings.push(reading);
    }

    Ok(CanonicalSeries::from_readings(readings))
}

fn parse_dataset_row(line: &str) -> std::result::Result<Reading, String> {
    let fields = split_row(line);
    let [datetime, time, value, kind] = fields.as_slice() else {
        return Err(format!("expected 4 columns, found {}", fields.len()));
    };

    let timestamp = parse_datetime(datetime).ok_or_else(|| format!("bad datetime {:?}", datetime))?;
    let time_of_day = parse_time(time).ok_or_else(|| format!("bad time {:?}", time))?;
    if time_of_day != timestamp.time() {
        return Err(format!("time {:?} does not match datetime {:?}", time, datetime));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("bad value {:?}", value))?;
    let kind = kind
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(SourceKind::from_discriminator)
        .ok_or_else(|| format!("bad type {:?}", kind))?;

    Reading::new(timestamp, value, kind).map_err(|e| e.to_string())
}

/// Write `bytes` to `path` through a synced temporary file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let persist_err = |source: std::io::Error| TimerowError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(persist_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(persist_err)?;
    tmp.write_all(bytes).map_err(persist_err)?;
    // Temporary files start out owner-only; the published files are world-readable.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(persist_err)?;
    }
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(path).map_err(|e| persist_err(e.error))?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn reading(day: u32, hour: u32, minute: u32, value: f64, kind: SourceKind) -> Reading {
        Reading::new(ts(day, hour, minute), value, kind).unwrap()
    }

    fn series(readings: Vec<Reading>) -> CanonicalSeries {
        CanonicalSeries::from_readings(readings)
    }

    // ── load / persist ────────────────────────────────────────────────────────

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("prepared_dataset.csv"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_persist_then_load() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("out").join("prepared_dataset.csv"));
        let original = series(vec![
            reading(1, 8, 15, 5.6, SourceKind::Scan),
            reading(1, 8, 20, 7.0, SourceKind::Retrospective),
        ]);

        store.persist(&original).unwrap();
        assert_eq!(store.load().unwrap(), original);
    }

    #[test]
    fn test_persisted_format() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("prepared_dataset.csv"));
        store
            .persist(&series(vec![
                reading(2, 9, 0, 6.0, SourceKind::Retrospective),
                reading(1, 8, 15, 5.6, SourceKind::Scan),
            ]))
            .unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            content,
            "datetime,time,value,type\n\
             2024-03-01 08:15:00,08:15:00,5.6,0\n\
             2024-03-02 09:00:00,09:00:00,6.0,1\n"
        );
    }

    #[test]
    fn test_persist_of_load_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("prepared_dataset.csv"));
        store
            .persist(&series(vec![
                reading(1, 8, 15, 5.6, SourceKind::Scan),
                reading(1, 8, 15, 5.1, SourceKind::Retrospective),
                reading(3, 23, 59, 12.25, SourceKind::Scan),
            ]))
            .unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let loaded = store.load().unwrap();
        store.persist(&loaded).unwrap();

        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_persist_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("prepared_dataset.csv"));
        store.persist(&CanonicalSeries::empty()).unwrap();
        store
            .persist(&series(vec![reading(1, 8, 0, 5.0, SourceKind::Scan)]))
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_persisted_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("views.json");
        write_atomic(&path, b"{}").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_persist_into_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        // A regular file where the parent directory should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let store = HistoryStore::new(blocker.join("prepared_dataset.csv"));

        let err = store.persist(&CanonicalSeries::empty()).unwrap_err();
        assert!(matches!(err, TimerowError::Persist { .. }));
    }

    #[test]
    fn test_load_corrupted_dataset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prepared_dataset.csv");
        std::fs::write(
            &path,
            "datetime,time,value,type\n2024-03-01 08:15:00,08:15:00,abc,0\n",
        )
        .unwrap();

        let err = HistoryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, TimerowError::CorruptDataset { line: 2, .. }));
        assert_eq!(err.kind(), timerow_core::error::ErrorKind::PersistError);
    }

    #[test]
    fn test_load_rejects_wrong_header_and_mismatched_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prepared_dataset.csv");

        std::fs::write(&path, "a,b,c\n").unwrap();
        assert!(HistoryStore::new(&path).load().is_err());

        std::fs::write(
            &path,
            "datetime,time,value,type\n2024-03-01 08:15:00,09:00:00,5.0,0\n",
        )
        .unwrap();
        assert!(HistoryStore::new(&path).load().is_err());

        std::fs::write(&path, "").unwrap();
        assert!(HistoryStore::new(&path).load().is_err());
    }

    // ── merge ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_merge_incoming_wins_on_collision() {
        let existing = series(vec![
            reading(1, 8, 0, 5.0, SourceKind::Scan),
            reading(1, 9, 0, 6.0, SourceKind::Scan),
        ]);
        let incoming = series(vec![
            reading(1, 9, 0, 6.5, SourceKind::Scan),
            reading(1, 9, 0, 4.0, SourceKind::Retrospective),
        ]);

        let merged = merge(existing, incoming);
        assert_eq!(merged.len(), 3);
        let values: Vec<f64> = merged.iter().map(|r| r.value()).collect();
        assert_eq!(values, vec![5.0, 6.5, 4.0]);
    }

    #[test]
    fn test_merge_is_sorted() {
        let merged = merge(
            series(vec![reading(3, 8, 0, 5.0, SourceKind::Scan)]),
            series(vec![
                reading(1, 8, 0, 5.0, SourceKind::Scan),
                reading(2, 8, 0, 5.0, SourceKind::Scan),
            ]),
        );
        let stamps: Vec<NaiveDateTime> = merged.iter().map(|r| r.timestamp()).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let base = series(vec![reading(1, 8, 0, 5.0, SourceKind::Scan)]);
        let file = series(vec![
            reading(1, 8, 0, 5.5, SourceKind::Scan),
            reading(2, 8, 0, 6.0, SourceKind::Retrospective),
        ]);

        let once = merge(base.clone(), file.clone());
        let twice = merge(once.clone(), file);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_order_independent_for_disjoint_keys() {
        let base = series(vec![reading(1, 7, 0, 4.0, SourceKind::Scan)]);
        let a = series(vec![reading(1, 8, 0, 5.0, SourceKind::Scan)]);
        let b = series(vec![reading(1, 9, 0, 6.0, SourceKind::Retrospective)]);

        let ab = merge(merge(base.clone(), a.clone()), b.clone());
        let ba = merge(merge(base, b), a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_merge_overlap_last_merged_wins() {
        let a = series(vec![reading(1, 8, 0, 5.0, SourceKind::Scan)]);
        let b = series(vec![reading(1, 8, 0, 9.0, SourceKind::Scan)]);

        let ab = merge(merge(CanonicalSeries::empty(), a.clone()), b.clone());
        let ba = merge(merge(CanonicalSeries::empty(), b), a);
        assert_eq!(ab.first().unwrap().value(), 9.0);
        assert_eq!(ba.first().unwrap().value(), 5.0);
        assert_eq!(ab.len(), ba.len());
    }
}
