use crate::record::{CheckRecord, CounterRecord, MetricTags, OperationRecord};
use hdrhistogram::Histogram;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Identifies one latency series: the tags of the worker that made the call and the endpoint tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub tags: MetricTags,
    pub endpoint: String,
}

/// Identifies the pass/fail counts for one named check on one series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckKey {
    pub series: SeriesKey,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    pub tags: MetricTags,
    pub name: String,
}

/// Latency histogram, in microseconds, plus request and failure counts.
///
/// Only calls that received a response contribute a latency sample. Transport failures count as
/// requests and failures.
#[derive(Debug, Clone)]
pub struct LatencySeries {
    histogram: Histogram<u64>,
    requests: u64,
    failed: u64,
}

impl LatencySeries {
    pub(crate) fn new() -> Self {
        Self {
            histogram: Histogram::new(3)
                .expect("3 significant figures is a valid histogram precision"),
            requests: 0,
            failed: 0,
        }
    }

    pub(crate) fn record(&mut self, operation: &OperationRecord) {
        self.requests += 1;
        if operation.is_error() {
            self.failed += 1;
        }

        if let (Some(elapsed), Some(_)) = (operation.elapsed(), operation.status()) {
            self.histogram.saturating_record(elapsed.as_micros() as u64);
        }
    }

    pub(crate) fn merge(&mut self, other: &LatencySeries) {
        self.requests += other.requests;
        self.failed += other.failed;
        if let Err(e) = self.histogram.add(&other.histogram) {
            log::warn!("Failed to merge latency histogram: {e:?}");
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Number of latency samples, which excludes calls that got no response.
    pub fn samples(&self) -> u64 {
        self.histogram.len()
    }

    pub fn percentile_ms(&self, percentile: f64) -> Option<f64> {
        self.non_empty()
            .map(|h| h.value_at_percentile(percentile) as f64 / 1000.0)
    }

    pub fn mean_ms(&self) -> Option<f64> {
        self.non_empty().map(|h| h.mean() / 1000.0)
    }

    pub fn min_ms(&self) -> Option<f64> {
        self.non_empty().map(|h| h.min() as f64 / 1000.0)
    }

    pub fn max_ms(&self) -> Option<f64> {
        self.non_empty().map(|h| h.max() as f64 / 1000.0)
    }

    pub fn failure_rate(&self) -> Option<f64> {
        (self.requests > 0).then(|| self.failed as f64 / self.requests as f64)
    }

    fn non_empty(&self) -> Option<&Histogram<u64>> {
        (!self.histogram.is_empty()).then_some(&self.histogram)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
}

impl CheckCounts {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    pub fn pass_rate(&self) -> Option<f64> {
        (self.total() > 0).then(|| self.passes as f64 / self.total() as f64)
    }

    fn add(&mut self, other: CheckCounts) {
        self.passes += other.passes;
        self.fails += other.fails;
    }
}

/// Selects records by tag. The keys `scenario` and `endpoint` match those fields, any other key
/// matches a scenario tag of the same name. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter(BTreeMap<String, String>);

impl TagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn matches(&self, tags: &MetricTags, endpoint: Option<&str>) -> bool {
        self.0.iter().all(|(name, value)| match name.as_str() {
            "scenario" => tags.scenario() == value,
            "endpoint" => endpoint == Some(value.as_str()),
            other => tags.get(other) == Some(value.as_str()),
        })
    }
}

/// Aggregated metrics. Each reporter shard holds one of these and they are merged when the run
/// is finalised.
#[derive(Debug, Default)]
pub(crate) struct Aggregate {
    latency: HashMap<SeriesKey, LatencySeries>,
    checks: HashMap<CheckKey, CheckCounts>,
    counters: HashMap<CounterKey, u64>,
}

impl Aggregate {
    pub(crate) fn add_operation(&mut self, operation: &OperationRecord) {
        let key = SeriesKey {
            tags: operation.tags().clone(),
            endpoint: operation.endpoint().to_string(),
        };
        self.latency
            .entry(key)
            .or_insert_with(LatencySeries::new)
            .record(operation);
    }

    pub(crate) fn add_check(&mut self, check: &CheckRecord) {
        let key = CheckKey {
            series: SeriesKey {
                tags: check.tags().clone(),
                endpoint: check.endpoint().to_string(),
            },
            name: check.name().to_string(),
        };
        let counts = self.checks.entry(key).or_default();
        if check.passed() {
            counts.passes += 1;
        } else {
            counts.fails += 1;
        }
    }

    pub(crate) fn add_counter(&mut self, counter: &CounterRecord) {
        let key = CounterKey {
            tags: counter.tags().clone(),
            name: counter.name().to_string(),
        };
        *self.counters.entry(key).or_default() += counter.value();
    }

    pub(crate) fn merge(&mut self, other: Aggregate) {
        for (key, series) in other.latency {
            match self.latency.entry(key) {
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(series);
                }
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    entry.get_mut().merge(&series);
                }
            }
        }
        for (key, counts) in other.checks {
            self.checks.entry(key).or_default().add(counts);
        }
        for (key, value) in other.counters {
            *self.counters.entry(key).or_default() += value;
        }
    }
}

/// Raw records, only kept when the reporter is configured to keep them in memory.
#[derive(Debug, Default)]
pub(crate) struct RecordLog {
    pub(crate) operations: Vec<OperationRecord>,
    pub(crate) checks: Vec<CheckRecord>,
}

impl RecordLog {
    pub(crate) fn append(&mut self, mut other: RecordLog) {
        self.operations.append(&mut other.operations);
        self.checks.append(&mut other.checks);
    }
}

/// The merged metrics for a run, produced by [Reporter::finalize](crate::Reporter::finalize).
#[derive(Debug)]
pub struct RunMetrics {
    started_at: Instant,
    aggregate: Aggregate,
    records: Option<RecordLog>,
}

impl RunMetrics {
    pub(crate) fn new(started_at: Instant, aggregate: Aggregate, records: Option<RecordLog>) -> Self {
        Self {
            started_at,
            aggregate,
            records,
        }
    }

    /// When the reporter was created, which is the reference point for record timestamps.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Merge every latency series that matches the filter.
    pub fn latency(&self, filter: &TagFilter) -> Option<LatencySeries> {
        self.aggregate
            .latency
            .iter()
            .filter(|(key, _)| filter.matches(&key.tags, Some(&key.endpoint)))
            .fold(None, |acc: Option<LatencySeries>, (_, series)| {
                let mut merged = acc.unwrap_or_else(LatencySeries::new);
                merged.merge(series);
                Some(merged)
            })
    }

    pub fn checks(&self, filter: &TagFilter) -> CheckCounts {
        self.aggregate
            .checks
            .iter()
            .filter(|(key, _)| filter.matches(&key.series.tags, Some(&key.series.endpoint)))
            .fold(CheckCounts::default(), |mut acc, (_, counts)| {
                acc.add(*counts);
                acc
            })
    }

    /// Counts for a single named check across all series that match the filter.
    pub fn check(&self, name: &str, filter: &TagFilter) -> CheckCounts {
        self.aggregate
            .checks
            .iter()
            .filter(|(key, _)| key.name == name)
            .filter(|(key, _)| filter.matches(&key.series.tags, Some(&key.series.endpoint)))
            .fold(CheckCounts::default(), |mut acc, (_, counts)| {
                acc.add(*counts);
                acc
            })
    }

    pub fn counter(&self, name: &str, filter: &TagFilter) -> u64 {
        self.aggregate
            .counters
            .iter()
            .filter(|(key, _)| key.name == name && filter.matches(&key.tags, None))
            .map(|(_, value)| *value)
            .sum()
    }

    pub fn latency_series(&self) -> Vec<(&SeriesKey, &LatencySeries)> {
        let mut series = self.aggregate.latency.iter().collect::<Vec<_>>();
        series.sort_by(|a, b| a.0.cmp(b.0));
        series
    }

    pub fn check_series(&self) -> Vec<(&CheckKey, &CheckCounts)> {
        let mut checks = self.aggregate.checks.iter().collect::<Vec<_>>();
        checks.sort_by(|a, b| a.0.cmp(b.0));
        checks
    }

    /// Every check that was recorded, if the reporter kept records in memory.
    pub fn check_records(&self) -> &[CheckRecord] {
        self.records
            .as_ref()
            .map(|r| r.checks.as_slice())
            .unwrap_or_default()
    }

    /// Every operation that was recorded, if the reporter kept records in memory.
    pub fn operation_records(&self) -> &[OperationRecord] {
        self.records
            .as_ref()
            .map(|r| r.operations.as_slice())
            .unwrap_or_default()
    }
}
