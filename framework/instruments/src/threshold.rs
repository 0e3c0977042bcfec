use crate::metrics::{RunMetrics, TagFilter};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ThresholdParseError {
    #[error("Threshold `{0}` must be written as `metric:expression`")]
    MissingExpression(String),
    #[error("Unknown threshold metric `{0}`")]
    UnknownMetric(String),
    #[error("Invalid tag filter `{0}`, expected `{{name:value,...}}`")]
    InvalidTagFilter(String),
    #[error("Unknown aggregation `{0}`")]
    UnknownAggregation(String),
    #[error("Invalid percentile `{0}`, expected a value between 0 and 100")]
    InvalidPercentile(String),
    #[error("Expression `{0}` has no comparison, expected one of <, <=, >, >=, ==")]
    MissingComparison(String),
    #[error("Invalid threshold limit `{0}`")]
    InvalidLimit(String),
    #[error("Aggregation `{aggregation}` is not supported for metric `{metric}`")]
    UnsupportedAggregation {
        metric: ThresholdMetric,
        aggregation: Aggregation,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMetric {
    /// Response latency in milliseconds.
    HttpReqDuration,
    /// Requests that failed at the transport level or returned a status of 400 or more.
    HttpReqFailed,
    Checks,
    DroppedIterations,
    Iterations,
}

impl ThresholdMetric {
    fn supports(&self, aggregation: &Aggregation) -> bool {
        match self {
            ThresholdMetric::HttpReqDuration => !matches!(aggregation, Aggregation::Rate),
            ThresholdMetric::HttpReqFailed | ThresholdMetric::Checks => {
                matches!(aggregation, Aggregation::Rate | Aggregation::Count)
            }
            ThresholdMetric::DroppedIterations | ThresholdMetric::Iterations => {
                matches!(aggregation, Aggregation::Count)
            }
        }
    }
}

impl FromStr for ThresholdMetric {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http_req_duration" => Ok(ThresholdMetric::HttpReqDuration),
            "http_req_failed" => Ok(ThresholdMetric::HttpReqFailed),
            "checks" => Ok(ThresholdMetric::Checks),
            "dropped_iterations" => Ok(ThresholdMetric::DroppedIterations),
            "iterations" => Ok(ThresholdMetric::Iterations),
            other => Err(ThresholdParseError::UnknownMetric(other.to_string())),
        }
    }
}

impl Display for ThresholdMetric {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ThresholdMetric::HttpReqDuration => "http_req_duration",
            ThresholdMetric::HttpReqFailed => "http_req_failed",
            ThresholdMetric::Checks => "checks",
            ThresholdMetric::DroppedIterations => "dropped_iterations",
            ThresholdMetric::Iterations => "iterations",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Percentile(f64),
    Avg,
    Min,
    Max,
    Med,
    Rate,
    Count,
}

impl FromStr for Aggregation {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "med" => Ok(Aggregation::Med),
            "rate" => Ok(Aggregation::Rate),
            "count" => Ok(Aggregation::Count),
            other => {
                let percentile = other
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| ThresholdParseError::UnknownAggregation(other.to_string()))?;

                match percentile.trim().parse::<f64>() {
                    Ok(p) if (0.0..=100.0).contains(&p) => Ok(Aggregation::Percentile(p)),
                    _ => Err(ThresholdParseError::InvalidPercentile(percentile.to_string())),
                }
            }
        }
    }
}

impl Display for Aggregation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Rate => f.write_str("rate"),
            Aggregation::Count => f.write_str("count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Comparison {
    pub fn holds(&self, observed: f64, limit: f64) -> bool {
        match self {
            Comparison::Lt => observed < limit,
            Comparison::Le => observed <= limit,
            Comparison::Gt => observed > limit,
            Comparison::Ge => observed >= limit,
            Comparison::Eq => (observed - limit).abs() < f64::EPSILON,
        }
    }
}

/// A pass/fail rule over an aggregated metric, written in the k6 style.
///
/// ```
/// use pass_load_instruments::ThresholdRule;
///
/// let rule: ThresholdRule = "http_req_duration{scenario:pass_api}:p(95)<500".parse().unwrap();
/// assert_eq!(rule.to_string(), "http_req_duration{scenario:pass_api}:p(95)<500");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    metric: ThresholdMetric,
    filter: TagFilter,
    aggregation: Aggregation,
    comparison: Comparison,
    limit: f64,
    source: String,
}

impl ThresholdRule {
    /// Parse a rule from a metric selector, such as `checks{mode:continuous}`, and an expression
    /// such as `rate>0.99`.
    pub fn parse(selector: &str, expression: &str) -> Result<Self, ThresholdParseError> {
        let selector = selector.trim();
        let expression = expression.trim();

        let (metric, filter) = match selector.split_once('{') {
            Some((metric, filter)) => {
                let filter = filter
                    .strip_suffix('}')
                    .ok_or_else(|| ThresholdParseError::InvalidTagFilter(selector.to_string()))?;
                (metric.trim(), parse_tag_filter(filter)?)
            }
            None => (selector, TagFilter::new()),
        };
        let metric = metric.parse::<ThresholdMetric>()?;

        let operator_at = expression
            .find(['<', '>', '='])
            .ok_or_else(|| ThresholdParseError::MissingComparison(expression.to_string()))?;
        let (aggregation, rest) = expression.split_at(operator_at);
        let aggregation = aggregation.trim().parse::<Aggregation>()?;

        let (comparison, limit) = if let Some(limit) = rest.strip_prefix("<=") {
            (Comparison::Le, limit)
        } else if let Some(limit) = rest.strip_prefix(">=") {
            (Comparison::Ge, limit)
        } else if let Some(limit) = rest.strip_prefix("==") {
            (Comparison::Eq, limit)
        } else if let Some(limit) = rest.strip_prefix('<') {
            (Comparison::Lt, limit)
        } else if let Some(limit) = rest.strip_prefix('>') {
            (Comparison::Gt, limit)
        } else {
            return Err(ThresholdParseError::MissingComparison(
                expression.to_string(),
            ));
        };
        let limit = limit
            .trim()
            .parse::<f64>()
            .map_err(|_| ThresholdParseError::InvalidLimit(limit.trim().to_string()))?;

        if !metric.supports(&aggregation) {
            return Err(ThresholdParseError::UnsupportedAggregation {
                metric,
                aggregation,
            });
        }

        Ok(Self {
            metric,
            filter,
            aggregation,
            comparison,
            limit,
            source: format!("{selector}:{expression}"),
        })
    }

    pub fn metric(&self) -> ThresholdMetric {
        self.metric
    }

    pub fn filter(&self) -> &TagFilter {
        &self.filter
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    /// Compute the observed value and compare it to the limit.
    ///
    /// A metric with no samples has no value for anything but a count, and the rule passes.
    pub fn evaluate(&self, metrics: &RunMetrics) -> ThresholdResult {
        let observed = self.observe(metrics);
        let passed = observed.map_or(true, |value| self.comparison.holds(value, self.limit));

        ThresholdResult {
            rule: self.clone(),
            observed,
            passed,
        }
    }

    fn observe(&self, metrics: &RunMetrics) -> Option<f64> {
        match self.metric {
            ThresholdMetric::HttpReqDuration => {
                let series = metrics.latency(&self.filter);
                match self.aggregation {
                    Aggregation::Count => {
                        Some(series.map(|s| s.samples()).unwrap_or_default() as f64)
                    }
                    Aggregation::Percentile(p) => series?.percentile_ms(p),
                    Aggregation::Med => series?.percentile_ms(50.0),
                    Aggregation::Avg => series?.mean_ms(),
                    Aggregation::Min => series?.min_ms(),
                    Aggregation::Max => series?.max_ms(),
                    Aggregation::Rate => None,
                }
            }
            ThresholdMetric::HttpReqFailed => {
                let series = metrics.latency(&self.filter);
                match self.aggregation {
                    Aggregation::Count => {
                        Some(series.map(|s| s.failed()).unwrap_or_default() as f64)
                    }
                    _ => series?.failure_rate(),
                }
            }
            ThresholdMetric::Checks => {
                let counts = metrics.checks(&self.filter);
                match self.aggregation {
                    Aggregation::Count => Some(counts.total() as f64),
                    _ => counts.pass_rate(),
                }
            }
            ThresholdMetric::DroppedIterations => {
                Some(metrics.counter("dropped_iterations", &self.filter) as f64)
            }
            ThresholdMetric::Iterations => {
                Some(metrics.counter("iterations", &self.filter) as f64)
            }
        }
    }
}

impl FromStr for ThresholdRule {
    type Err = ThresholdParseError;

    /// Parse `metric{tag:value}:expression`. The tag filter is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split_at = match s.find('}') {
            Some(close) => s[close..].find(':').map(|i| close + i),
            None => s.find(':'),
        }
        .ok_or_else(|| ThresholdParseError::MissingExpression(s.to_string()))?;

        Self::parse(&s[..split_at], &s[split_at + 1..])
    }
}

impl Display for ThresholdRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_tag_filter(input: &str) -> Result<TagFilter, ThresholdParseError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .try_fold(TagFilter::new(), |filter, part| {
            let (name, value) = part
                .split_once(':')
                .filter(|(name, value)| !name.trim().is_empty() && !value.trim().is_empty())
                .ok_or_else(|| ThresholdParseError::InvalidTagFilter(input.to_string()))?;
            Ok(filter.with(name.trim(), value.trim()))
        })
}

#[derive(Debug, Clone)]
pub struct ThresholdResult {
    pub rule: ThresholdRule,
    /// `None` when the metric had no samples to aggregate.
    pub observed: Option<f64>,
    pub passed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CheckRecord, CounterRecord, MetricTags, OperationRecord};
    use crate::ReportConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_k6_style_rules() {
        let rule: ThresholdRule = "http_req_duration:p(95)<500".parse().unwrap();
        assert_eq!(rule.metric(), ThresholdMetric::HttpReqDuration);
        assert_eq!(rule.aggregation(), Aggregation::Percentile(95.0));
        assert_eq!(rule.comparison(), Comparison::Lt);
        assert_eq!(rule.limit(), 500.0);
        assert!(rule.filter().is_empty());

        let rule: ThresholdRule = "checks{scenario:continuous, mode:continuous}:rate>=0.99"
            .parse()
            .unwrap();
        assert_eq!(
            rule.filter(),
            &TagFilter::new()
                .with("scenario", "continuous")
                .with("mode", "continuous")
        );
        assert_eq!(rule.comparison(), Comparison::Ge);

        let rule = ThresholdRule::parse("dropped_iterations", "count == 0").unwrap();
        assert_eq!(rule.comparison(), Comparison::Eq);
        assert_eq!(rule.to_string(), "dropped_iterations:count == 0");
    }

    #[test]
    fn reject_invalid_rules() {
        assert_eq!(
            "http_req_duration".parse::<ThresholdRule>(),
            Err(ThresholdParseError::MissingExpression(
                "http_req_duration".to_string()
            ))
        );
        assert_eq!(
            ThresholdRule::parse("http_req_waiting", "p(95)<500"),
            Err(ThresholdParseError::UnknownMetric(
                "http_req_waiting".to_string()
            ))
        );
        assert_eq!(
            ThresholdRule::parse("http_req_duration", "p(95)"),
            Err(ThresholdParseError::MissingComparison("p(95)".to_string()))
        );
        assert_eq!(
            ThresholdRule::parse("http_req_duration", "p(120)<5"),
            Err(ThresholdParseError::InvalidPercentile("120".to_string()))
        );
        assert_eq!(
            ThresholdRule::parse("http_req_duration", "avg<fast"),
            Err(ThresholdParseError::InvalidLimit("fast".to_string()))
        );
        assert_eq!(
            ThresholdRule::parse("http_req_duration{scenario}", "avg<5"),
            Err(ThresholdParseError::InvalidTagFilter("scenario".to_string()))
        );
        assert_eq!(
            ThresholdRule::parse("iterations", "p(95)<5"),
            Err(ThresholdParseError::UnsupportedAggregation {
                metric: ThresholdMetric::Iterations,
                aggregation: Aggregation::Percentile(95.0),
            })
        );
    }

    #[test]
    fn metric_without_samples_passes() {
        let metrics = ReportConfig::default().init().finalize();

        let result = ThresholdRule::parse("http_req_duration", "p(95)<500")
            .unwrap()
            .evaluate(&metrics);
        assert!(result.passed);
        assert_eq!(result.observed, None);

        let result = ThresholdRule::parse("http_req_duration", "count>0")
            .unwrap()
            .evaluate(&metrics);
        assert!(!result.passed);
        assert_eq!(result.observed, Some(0.0));
    }

    #[test]
    fn evaluate_against_recorded_metrics() {
        let reporter = ReportConfig::default().init();
        let tags = MetricTags::new("pass_api").with_tag("service", "pass-api");

        for status in [200, 200, 200, 503] {
            let mut operation = OperationRecord::new(tags.clone(), "get_all_passes");
            operation.finish(Some(status), status >= 400);
            reporter.add_operation(&operation);
            reporter.add_check(&CheckRecord::new(
                tags.clone(),
                "get_all_passes",
                "status is 200",
                status == 200,
                operation.elapsed(),
            ));
        }
        reporter.add_counter(&CounterRecord::new(tags.clone(), "dropped_iterations", 3));
        let metrics = reporter.finalize();

        let evaluate = |rule: &str| rule.parse::<ThresholdRule>().unwrap().evaluate(&metrics);

        let failed = evaluate("http_req_failed{endpoint:get_all_passes}:rate<0.1");
        assert_eq!(failed.observed, Some(0.25));
        assert!(!failed.passed);

        let checks = evaluate("checks{service:pass-api}:rate>=0.75");
        assert_eq!(checks.observed, Some(0.75));
        assert!(checks.passed);

        assert!(evaluate("http_req_duration:p(95)<5000").passed);
        assert!(!evaluate("dropped_iterations:count<1").passed);
        assert!(evaluate("dropped_iterations{scenario:other}:count<1").passed);
    }
}
