mod summary_tables;

use crate::metrics::{Aggregate, RecordLog, RunMetrics};
use crate::record::{CheckRecord, CounterRecord, OperationRecord};
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Configures what the [Reporter] keeps and what it prints when the run is finalised.
#[derive(Debug, Clone, Default)]
pub struct ReportConfig {
    in_memory: bool,
    summary: bool,
}

impl ReportConfig {
    /// Keep every raw record as well as the aggregated metrics.
    ///
    /// This is useful for tests that need to inspect individual records. It is not recommended for
    /// long runs because memory use grows with the number of requests.
    pub fn enable_in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    /// Print summary tables when the run is finalised.
    pub fn enable_summary(mut self) -> Self {
        self.summary = true;
        self
    }

    pub fn is_summary_enabled(&self) -> bool {
        self.summary
    }

    pub fn init(self) -> Reporter {
        Reporter::new(self)
    }
}

#[derive(Debug, Default)]
struct Shard {
    aggregate: Aggregate,
    records: RecordLog,
}

static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD_INDEX: Cell<usize> = Cell::new(NEXT_SHARD.fetch_add(1, Ordering::Relaxed));
}

/// Collects records from every worker thread.
///
/// Records are written to one of several shards, picked per thread, so that worker threads
/// rarely contend on the same lock. The shards are merged by [Reporter::finalize].
#[derive(Debug)]
pub struct Reporter {
    config: ReportConfig,
    started_at: Instant,
    shards: Box<[Mutex<Shard>]>,
}

impl Reporter {
    fn new(config: ReportConfig) -> Self {
        let shard_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .max(4);

        Self {
            config,
            started_at: Instant::now(),
            shards: (0..shard_count)
                .map(|_| Mutex::new(Shard::default()))
                .collect(),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn add_operation(&self, operation: &OperationRecord) {
        let mut shard = self.shard().lock();
        shard.aggregate.add_operation(operation);
        if self.config.in_memory {
            shard.records.operations.push(operation.clone());
        }
    }

    pub fn add_check(&self, check: &CheckRecord) {
        let mut shard = self.shard().lock();
        shard.aggregate.add_check(check);
        if self.config.in_memory {
            shard.records.checks.push(check.clone());
        }
    }

    pub fn add_counter(&self, counter: &CounterRecord) {
        self.shard().lock().aggregate.add_counter(counter);
    }

    /// Merge everything recorded so far into [RunMetrics].
    ///
    /// The shards are emptied, so records added after this call are not included in the returned
    /// metrics.
    pub fn finalize(&self) -> RunMetrics {
        let mut aggregate = Aggregate::default();
        let mut records = RecordLog::default();
        for shard in self.shards.iter() {
            let shard = std::mem::take(&mut *shard.lock());
            aggregate.merge(shard.aggregate);
            records.append(shard.records);
        }

        let metrics = RunMetrics::new(
            self.started_at,
            aggregate,
            self.config.in_memory.then_some(records),
        );

        if self.config.summary {
            summary_tables::print_summary(&metrics);
        }

        metrics
    }

    fn shard(&self) -> &Mutex<Shard> {
        let index = SHARD_INDEX.with(|i| i.get());
        &self.shards[index % self.shards.len()]
    }
}
