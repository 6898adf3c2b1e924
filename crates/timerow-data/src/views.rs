//! Read-only views handed to the presentation layer.
//!
//! Two views are exposed after every successful run: the full history split by
//! record type, and the typical-day profile with a ±1σ band.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use timerow_core::error::Result;
use timerow_core::models::{CanonicalSeries, DailyBucketStat, SourceKind};
use timerow_core::time_utils::{format_datetime, format_time};

use crate::aggregator::DailyAggregator;
use crate::history::write_atomic;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub datetime: String,
    pub value: f64,
}

/// Every reading, one trace per record type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    pub scan: Vec<HistoryPoint>,
    pub retrospective: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePoint {
    pub time: String,
    pub mean: f64,
    pub std_dev: f64,
    pub lower: f64,
    pub upper: f64,
    pub sample_count: usize,
}

impl From<&DailyBucketStat> for ProfilePoint {
    fn from(stat: &DailyBucketStat) -> Self {
        Self {
            time: format_time(&stat.bucket),
            mean: stat.mean,
            std_dev: stat.std_dev,
            lower: stat.mean - stat.std_dev,
            upper: stat.mean + stat.std_dev,
            sample_count: stat.sample_count,
        }
    }
}

/// Typical-day profile for one record type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyProfileView {
    pub bucket_minutes: u64,
    pub kind: SourceKind,
    pub points: Vec<ProfilePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentationViews {
    pub history: HistoryView,
    pub profile: DailyProfileView,
}

impl HistoryView {
    pub fn from_series(series: &CanonicalSeries) -> Self {
        let points = |kind: SourceKind| -> Vec<HistoryPoint> {
            series
                .iter()
                .filter(|r| r.source_kind() == kind)
                .map(|r| HistoryPoint {
                    datetime: format_datetime(&r.timestamp()),
                    value: r.value(),
                })
                .collect()
        };
        Self {
            scan: points(SourceKind::Scan),
            retrospective: points(SourceKind::Retrospective),
        }
    }
}

impl DailyProfileView {
    pub fn from_series(
        series: &CanonicalSeries,
        bucket_size: Duration,
        kind: SourceKind,
    ) -> Result<Self> {
        let stats = DailyAggregator::aggregate(series, bucket_size, kind)?;
        Ok(Self {
            bucket_minutes: bucket_size.as_secs() / 60,
            kind,
            points: stats.iter().map(ProfilePoint::from).collect(),
        })
    }
}

impl PresentationViews {
    /// Build both views; the profile is computed over scan readings.
    pub fn build(series: &CanonicalSeries, bucket_size: Duration) -> Result<Self> {
        Ok(Self {
            history: HistoryView::from_series(series),
            profile: DailyProfileView::from_series(series, bucket_size, SourceKind::Scan)?,
        })
    }

    /// Write the views as pretty JSON, replacing any previous export atomically.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use timerow_core::models::Reading;

    fn sample_series() -> CanonicalSeries {
        let ts = |day: u32, h: u32, m: u32| {
            NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap()
        };
        CanonicalSeries::from_readings(vec![
            Reading::new(ts(1, 8, 0), 4.0, SourceKind::Scan).unwrap(),
            Reading::new(ts(2, 8, 5), 6.0, SourceKind::Scan).unwrap(),
            Reading::new(ts(2, 8, 5), 5.5, SourceKind::Retrospective).unwrap(),
        ])
    }

    #[test]
    fn test_history_view_splits_kinds() {
        let view = HistoryView::from_series(&sample_series());
        assert_eq!(view.scan.len(), 2);
        assert_eq!(view.retrospective.len(), 1);
        assert_eq!(view.scan[0].datetime, "2024-03-01 08:00:00");
    }

    #[test]
    fn test_profile_band() {
        let views =
            PresentationViews::build(&sample_series(), DailyAggregator::DEFAULT_BUCKET).unwrap();
        assert_eq!(views.profile.bucket_minutes, 15);
        assert_eq!(views.profile.points.len(), 1);

        let point = &views.profile.points[0];
        assert_eq!(point.time, "08:00:00");
        assert_eq!(point.mean, 5.0);
        assert!((point.upper - point.lower - 2.0 * point.std_dev).abs() < 1e-12);
    }

    #[test]
    fn test_write_views_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("views.json");
        let views =
            PresentationViews::build(&sample_series(), DailyAggregator::DEFAULT_BUCKET).unwrap();
        views.write_to(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["profile"]["kind"], "scan");
        assert_eq!(value["history"]["scan"].as_array().unwrap().len(), 2);
    }
}
