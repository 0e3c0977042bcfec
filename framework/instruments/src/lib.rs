mod metrics;
mod record;
mod report;
mod threshold;

pub use metrics::{CheckCounts, CheckKey, CounterKey, LatencySeries, RunMetrics, SeriesKey, TagFilter};
pub use record::{CheckRecord, CounterRecord, MetricTags, OperationRecord};
pub use report::{ReportConfig, Reporter};
pub use threshold::{
    Aggregation, Comparison, ThresholdMetric, ThresholdParseError, ThresholdResult, ThresholdRule,
};

pub mod prelude {
    pub use crate::metrics::{RunMetrics, TagFilter};
    pub use crate::record::{CheckRecord, CounterRecord, MetricTags, OperationRecord};
    pub use crate::report::{ReportConfig, Reporter};
    pub use crate::threshold::{ThresholdResult, ThresholdRule};
}
