use std::collections::BTreeMap;

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result, TimerowError};

/// Which instrument record type a reading came from.
///
/// Ordered so that `Scan` sorts before `Retrospective` at equal timestamps.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Continuous sensor scan (raw discriminator `0`).
    Scan,
    /// Retrospective reading (raw discriminator `1`).
    Retrospective,
}

impl SourceKind {
    /// Map a raw discriminator to a kind; unmodelled record types yield `None`.
    pub fn from_discriminator(value: i64) -> Option<Self> {
        match value {
            0 => Some(SourceKind::Scan),
            1 => Some(SourceKind::Retrospective),
            _ => None,
        }
    }

    /// Numeric tag written to the canonical dataset's `type` column.
    pub fn discriminator(self) -> u8 {
        match self {
            SourceKind::Scan => 0,
            SourceKind::Retrospective => 1,
        }
    }

    /// Display label for presentation layers.
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Scan => "Scan",
            SourceKind::Retrospective => "Retrospective",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of a reading inside the canonical series.
pub type ReadingKey = (NaiveDateTime, SourceKind);

/// One normalized measurement. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    timestamp: NaiveDateTime,
    value: f64,
    source_kind: SourceKind,
}

impl Reading {
    /// Build a reading, rejecting negative or non-finite values.
    pub fn new(timestamp: NaiveDateTime, value: f64, source_kind: SourceKind) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(TimerowError::InvalidValue(value));
        }
        Ok(Self {
            timestamp,
            value,
            source_kind,
        })
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Wall-clock component of the timestamp, used for bucketing.
    pub fn time_of_day(&self) -> NaiveTime {
        self.timestamp.time()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn key(&self) -> ReadingKey {
        (self.timestamp, self.source_kind)
    }
}

/// Readings ordered by `(timestamp, source_kind)` with no duplicate keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalSeries {
    readings: Vec<Reading>,
}

impl CanonicalSeries {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collect readings into a series. When two readings share a key, the one
    /// yielded later wins.
    pub fn from_readings(readings: impl IntoIterator<Item = Reading>) -> Self {
        let mut by_key: BTreeMap<ReadingKey, Reading> = BTreeMap::new();
        for reading in readings {
            by_key.insert(reading.key(), reading);
        }
        Self {
            readings: by_key.into_values().collect(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reading> {
        self.readings.iter()
    }

    pub fn into_readings(self) -> Vec<Reading> {
        self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn first(&self) -> Option<&Reading> {
        self.readings.first()
    }

    pub fn last(&self) -> Option<&Reading> {
        self.readings.last()
    }

    /// Number of readings of the given kind.
    pub fn count_kind(&self, kind: SourceKind) -> usize {
        self.readings
            .iter()
            .filter(|r| r.source_kind() == kind)
            .count()
    }
}

impl<'a> IntoIterator for &'a CanonicalSeries {
    type Item = &'a Reading;
    type IntoIter = std::slice::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}

/// Statistic for one time-of-day bucket, derived from the canonical series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBucketStat {
    /// Start of the bucket (time of day floored to the bucket size).
    pub bucket: NaiveTime,
    pub mean: f64,
    /// Sample standard deviation; `0.0` for single-sample buckets.
    pub std_dev: f64,
    pub sample_count: usize,
}

/// Stage of a publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Parsing,
    Merging,
    Persisting,
    Diffing,
    Committing,
    Pushing,
    Reporting,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Reporting | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Parsing => "parsing",
            RunState::Merging => "merging",
            RunState::Persisting => "persisting",
            RunState::Diffing => "diffing",
            RunState::Committing => "committing",
            RunState::Pushing => "pushing",
            RunState::Reporting => "reporting",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishOutcome {
    /// `true` when the canonical dataset differed from the published one.
    pub changed: bool,
    /// Commit created by this run, if any.
    pub commit_ref: Option<String>,
    pub error: Option<ErrorKind>,
    /// Last state reached: `Reporting` on success, `Failed` otherwise.
    pub state: RunState,
    /// Human-readable status line for the operator.
    pub message: String,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// `NoInput` is reported but does not count as a failed run.
    pub fn exit_code(&self) -> i32 {
        match self.error {
            None | Some(ErrorKind::NoInput) => 0,
            Some(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_source_kind_discriminators() {
        assert_eq!(SourceKind::from_discriminator(0), Some(SourceKind::Scan));
        assert_eq!(
            SourceKind::from_discriminator(1),
            Some(SourceKind::Retrospective)
        );
        assert_eq!(SourceKind::from_discriminator(4), None);
        assert_eq!(SourceKind::Scan.discriminator(), 0);
        assert_eq!(SourceKind::Retrospective.discriminator(), 1);
    }

    #[test]
    fn test_reading_rejects_invalid_values() {
        assert!(Reading::new(ts(1, 8, 0), -0.1, SourceKind::Scan).is_err());
        assert!(Reading::new(ts(1, 8, 0), f64::NAN, SourceKind::Scan).is_err());
        assert!(Reading::new(ts(1, 8, 0), f64::INFINITY, SourceKind::Scan).is_err());
        assert!(Reading::new(ts(1, 8, 0), 0.0, SourceKind::Scan).is_ok());
    }

    #[test]
    fn test_reading_time_of_day() {
        let reading = Reading::new(ts(1, 8, 15), 5.6, SourceKind::Scan).unwrap();
        assert_eq!(
            reading.time_of_day(),
            NaiveTime::from_hms_opt(8, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_series_sorted_and_deduplicated() {
        let series = CanonicalSeries::from_readings(vec![
            Reading::new(ts(2, 9, 0), 7.0, SourceKind::Scan).unwrap(),
            Reading::new(ts(1, 8, 0), 5.0, SourceKind::Retrospective).unwrap(),
            Reading::new(ts(1, 8, 0), 5.5, SourceKind::Scan).unwrap(),
            Reading::new(ts(2, 9, 0), 7.5, SourceKind::Scan).unwrap(),
        ]);

        assert_eq!(series.len(), 3);
        let keys: Vec<ReadingKey> = series.iter().map(|r| r.key()).collect();
        assert_eq!(
            keys,
            vec![
                (ts(1, 8, 0), SourceKind::Scan),
                (ts(1, 8, 0), SourceKind::Retrospective),
                (ts(2, 9, 0), SourceKind::Scan),
            ]
        );
        // later duplicate wins
        assert_eq!(series.last().unwrap().value(), 7.5);
        assert_eq!(series.count_kind(SourceKind::Scan), 2);
    }

    #[test]
    fn test_outcome_exit_codes() {
        let mut outcome = PublishOutcome {
            changed: false,
            commit_ref: None,
            error: Some(ErrorKind::NoInput),
            state: RunState::Reporting,
            message: String::new(),
        };
        assert_eq!(outcome.exit_code(), 0);
        outcome.error = Some(ErrorKind::PublishError);
        outcome.state = RunState::Failed;
        assert_eq!(outcome.exit_code(), 1);
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Pushing.is_terminal());
    }
}
