//! Raw sensor export parsing.
//!
//! An export is a comma-delimited file whose first line is a banner. Every
//! row carries a timestamp in column 3 and a record-type discriminator in
//! column 4; the measurement sits in column 5 for scans and column 6 for
//! retrospective readings. Rows are turned into tagged [`Reading`]s here so
//! that nothing downstream has to know about column positions.

use std::path::Path;

use timerow_core::error::{Result, TimerowError};
use timerow_core::formatting::parse_decimal;
use timerow_core::models::{CanonicalSeries, Reading, SourceKind};
use timerow_core::time_utils::parse_raw_timestamp;
use tracing::debug;

const TIMESTAMP_COLUMN: usize = 2;
const DISCRIMINATOR_COLUMN: usize = 3;
const SCAN_VALUE_COLUMN: usize = 4;
const RETROSPECTIVE_VALUE_COLUMN: usize = 5;

// ── Public API ────────────────────────────────────────────────────────────────

/// Read and parse a raw export from disk.
pub fn parse_file(path: &Path) -> Result<CanonicalSeries> {
    let bytes = std::fs::read(path).map_err(|source| TimerowError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Parsing raw export {}", path.display());
    parse_bytes(&bytes)
}

/// Parse a raw export.
///
/// Any unusable row on a modelled record type fails the whole parse; rows
/// whose discriminator is neither `0` nor `1` are skipped.
pub fn parse_bytes(bytes: &[u8]) -> Result<CanonicalSeries> {
    let decoded = String::from_utf8_lossy(bytes);
    let text = decoded.strip_prefix('\u{feff}').unwrap_or(&decoded);

    let mut readings: Vec<Reading> = Vec::new();
    let mut rows_seen = 0u64;
    let mut rows_skipped = 0u64;
    let mut column_header_checked = false;

    // Line 1 is the export banner.
    for (idx, line) in text.lines().enumerate().skip(1) {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let fields = split_row(line);

        // Exports usually repeat the column names right below the banner.
        if !column_header_checked {
            column_header_checked = true;
            if is_column_header(&fields) {
                debug!("Skipping column header on line {}", line_no);
                continue;
            }
        }

        rows_seen += 1;
        match parse_row(&fields, line_no)? {
            RawRecord::Modelled(reading) => readings.push(reading),
            RawRecord::Unmodelled(discriminator) => {
                rows_skipped += 1;
                debug!(
                    "Line {}: skipping unmodelled record type {}",
                    line_no, discriminator
                );
            }
        }
    }

    let series = CanonicalSeries::from_readings(readings);
    debug!(
        "Raw export: {} rows, {} skipped, {} readings",
        rows_seen,
        rows_skipped,
        series.len()
    );
    Ok(series)
}

// ── Row handling ──────────────────────────────────────────────────────────────

/// One data row, tagged by its record type.
#[derive(Debug, PartialEq)]
enum RawRecord {
    Modelled(Reading),
    Unmodelled(i64),
}

fn parse_row(fields: &[String], line_no: usize) -> Result<RawRecord> {
    let discriminator_text = field(fields, DISCRIMINATOR_COLUMN, line_no, "record type")?;
    let discriminator: i64 = discriminator_text.trim().parse().map_err(|_| {
        TimerowError::malformed(
            line_no,
            format!("record type {:?} is not an integer", discriminator_text),
        )
    })?;

    let Some(kind) = SourceKind::from_discriminator(discriminator) else {
        return Ok(RawRecord::Unmodelled(discriminator));
    };

    let timestamp_text = field(fields, TIMESTAMP_COLUMN, line_no, "timestamp")?;
    let timestamp = parse_raw_timestamp(timestamp_text).ok_or_else(|| {
        TimerowError::malformed(line_no, format!("bad timestamp {:?}", timestamp_text))
    })?;

    let value_column = match kind {
        SourceKind::Scan => SCAN_VALUE_COLUMN,
        SourceKind::Retrospective => RETROSPECTIVE_VALUE_COLUMN,
    };
    let value_text = field(fields, value_column, line_no, "value")?;
    let value = parse_decimal(value_text).ok_or_else(|| {
        TimerowError::malformed(line_no, format!("bad {} value {:?}", kind, value_text))
    })?;

    let reading = Reading::new(timestamp, value, kind)
        .map_err(|e| TimerowError::malformed(line_no, e.to_string()))?;
    Ok(RawRecord::Modelled(reading))
}

fn field<'a>(fields: &'a [String], index: usize, line_no: usize, name: &str) -> Result<&'a str> {
    fields.get(index).map(String::as_str).ok_or_else(|| {
        TimerowError::malformed(
            line_no,
            format!("missing {} column (found {} columns)", name, fields.len()),
        )
    })
}

/// `true` when the row names its columns rather than carrying data.
///
/// A header has no parseable timestamp, record type or measurement; a row
/// with any of them is data and goes through the strict row parser.
fn is_column_header(fields: &[String]) -> bool {
    let timestamp_is_data = fields
        .get(TIMESTAMP_COLUMN)
        .is_some_and(|f| parse_raw_timestamp(f).is_some());
    let discriminator_is_data = fields
        .get(DISCRIMINATOR_COLUMN)
        .is_some_and(|f| f.trim().parse::<i64>().is_ok());
    let value_is_data = [SCAN_VALUE_COLUMN, RETROSPECTIVE_VALUE_COLUMN]
        .iter()
        .any(|&col| fields.get(col).is_some_and(|f| parse_decimal(f).is_some()));
    !timestamp_is_data && !discriminator_is_data && !value_is_data
}

/// Split one delimited line into fields.
///
/// Fields may be wrapped in double quotes, inside which commas are literal
/// and `""` stands for one quote character.
pub(crate) fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

// ── Tests ─────────────────────────────────────────────────────────────────────
