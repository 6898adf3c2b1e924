//! Typical-day aggregation over fixed time-of-day buckets.
//!
//! Readings are grouped by wall-clock time regardless of calendar date, so the
//! result describes the shape of an average day.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveTime;
use timerow_core::error::Result;
use timerow_core::models::{CanonicalSeries, DailyBucketStat, SourceKind};
use timerow_core::time_utils::{floor_to_bucket, validate_bucket_size};

// ── BucketAccumulator ─────────────────────────────────────────────────────────

/// Running mean and sum of squared deviations (Welford).
#[derive(Debug, Clone, Default)]
struct BucketAccumulator {
    count: usize,
    mean: f64,
    m2: f64,
}

impl BucketAccumulator {
    fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Sample standard deviation; a single sample has zero spread.
    fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / (self.count - 1) as f64).max(0.0).sqrt()
    }

    fn finish(self, bucket: NaiveTime) -> DailyBucketStat {
        DailyBucketStat {
            bucket,
            mean: self.mean,
            std_dev: self.std_dev(),
            sample_count: self.count,
        }
    }
}

// ── DailyAggregator ───────────────────────────────────────────────────────────

/// Stateless helper that folds a series into per-bucket statistics.
pub struct DailyAggregator;

impl DailyAggregator {
    /// Default bucket width: 15 minutes.
    pub const DEFAULT_BUCKET: Duration = Duration::from_secs(15 * 60);

    /// Bucket readings of kind `filter` by time of day.
    ///
    /// Returns one stat per non-empty bucket, ordered by bucket start. Fails
    /// only when `bucket_size` is not a whole number of minutes within a day.
    pub fn aggregate(
        series: &CanonicalSeries,
        bucket_size: Duration,
        filter: SourceKind,
    ) -> Result<Vec<DailyBucketStat>> {
        validate_bucket_size(bucket_size)?;

        let mut buckets: BTreeMap<NaiveTime, BucketAccumulator> = BTreeMap::new();
        for reading in series.iter().filter(|r| r.source_kind() == filter) {
            buckets
                .entry(floor_to_bucket(reading.time_of_day(), bucket_size))
                .or_default()
                .add(reading.value());
        }

        Ok(buckets
            .into_iter()
            .map(|(bucket, acc)| acc.finish(bucket))
            .collect())
    }

    /// Scan readings in 15-minute buckets.
    #[cfg(test)]
    fn aggregate_default(series: &CanonicalSeries) -> Vec<DailyBucketStat> {
        Self::aggregate(series, Self::DEFAULT_BUCKET, SourceKind::Scan).unwrap_or_default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
