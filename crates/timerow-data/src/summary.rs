//! Human-readable overview of the canonical dataset.

use chrono::NaiveDateTime;
use timerow_core::formatting::format_value;
use timerow_core::models::{CanonicalSeries, Reading, SourceKind};
use timerow_core::time_utils::{format_datetime, format_time};

/// Number of leading readings included in the summary.
pub const HEAD_LEN: usize = 5;

/// Overview of a series: time span, counts and the first few readings.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    pub count: usize,
    pub scan_count: usize,
    pub retrospective_count: usize,
    pub head: Vec<Reading>,
}

impl DatasetSummary {
    pub fn from_series(series: &CanonicalSeries) -> Self {
        Self {
            first: series.first().map(Reading::timestamp),
            last: series.last().map(Reading::timestamp),
            count: series.len(),
            scan_count: series.count_kind(SourceKind::Scan),
            retrospective_count: series.count_kind(SourceKind::Retrospective),
            head: series.iter().take(HEAD_LEN).copied().collect(),
        }
    }
}

impl std::fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stamp = |ts: Option<NaiveDateTime>| {
            ts.map(|t| format_datetime(&t))
                .unwrap_or_else(|| "-".to_string())
        };
        writeln!(f, "First data point:      {}", stamp(self.first))?;
        writeln!(f, "Last data point:       {}", stamp(self.last))?;
        writeln!(
            f,
            "Number of data points: {} ({} scan, {} retrospective)",
            self.count, self.scan_count, self.retrospective_count
        )?;
        if self.head.is_empty() {
            return Ok(());
        }
        writeln!(f, "First points:")?;
        writeln!(f, "  {:<19}  {:<8}  {:>6}  type", "datetime", "time", "value")?;
        for reading in &self.head {
            writeln!(
                f,
                "  {:<19}  {:<8}  {:>6}  {}",
                format_datetime(&reading.timestamp()),
                format_time(&reading.time_of_day()),
                format_value(reading.value()),
                reading.source_kind().discriminator()
            )?;
        }
        if self.count > self.head.len() {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}
