use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// The tags that are attached to every record produced by a worker.
///
/// The scenario name is always present. Any other tags come from the scenario definition, for
/// example `service=pass-api` or `mode=continuous`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricTags {
    scenario: String,
    tags: BTreeMap<String, String>,
}

impl MetricTags {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }
}

/// A single timed call against a target service.
///
/// Create the record just before the call is made and [finish](OperationRecord::finish) it once
/// the response has been fully read, or the call has failed.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    tags: MetricTags,
    endpoint: String,
    started: Instant,
    elapsed: Option<Duration>,
    status: Option<u16>,
    is_error: bool,
}

impl OperationRecord {
    pub fn new(tags: MetricTags, endpoint: impl Into<String>) -> Self {
        Self {
            tags,
            endpoint: endpoint.into(),
            started: Instant::now(),
            elapsed: None,
            status: None,
            is_error: false,
        }
    }

    /// Stop the timer. A `None` status means no response was received.
    pub fn finish(&mut self, status: Option<u16>, is_error: bool) {
        self.elapsed = Some(self.started.elapsed());
        self.status = status;
        self.is_error = is_error;
    }

    pub fn tags(&self) -> &MetricTags {
        &self.tags
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }
}

/// The outcome of a named assertion against a response.
#[derive(Debug, Clone)]
pub struct CheckRecord {
    tags: MetricTags,
    endpoint: String,
    name: String,
    passed: bool,
    checked_at: Instant,
    latency: Option<Duration>,
}

impl CheckRecord {
    pub fn new(
        tags: MetricTags,
        endpoint: impl Into<String>,
        name: impl Into<String>,
        passed: bool,
        latency: Option<Duration>,
    ) -> Self {
        Self {
            tags,
            endpoint: endpoint.into(),
            name: name.into(),
            passed,
            checked_at: Instant::now(),
            latency,
        }
    }

    pub fn tags(&self) -> &MetricTags {
        &self.tags
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn checked_at(&self) -> Instant {
        self.checked_at
    }

    /// Latency of the call that this check was evaluated against, if a response was received.
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }
}

/// A named count, such as `dropped_iterations`, attributed to a scenario.
#[derive(Debug, Clone)]
pub struct CounterRecord {
    tags: MetricTags,
    name: String,
    value: u64,
}

impl CounterRecord {
    pub fn new(tags: MetricTags, name: impl Into<String>, value: u64) -> Self {
        Self {
            tags,
            name: name.into(),
            value,
        }
    }

    pub fn tags(&self) -> &MetricTags {
        &self.tags
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}
